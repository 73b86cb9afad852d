use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("alice_requests_total", "Total number of submitted prompts").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("alice_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("alice_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_STORE_FAILURES: Counter = register_counter!(
        "alice_cache_store_failures_total",
        "Generated responses that could not be written to the cache"
    )
    .unwrap();
    pub static ref GENERATION_LATENCY: Histogram = register_histogram!(
        "alice_generation_latency_seconds",
        "Model generation latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("alice_cache_size", "Current number of items in cache").unwrap();
}

// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
