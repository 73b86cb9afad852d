use alice_chat::command::{Command, HELP};
use alice_chat::config::{Args, CacheBackend, CacheConfig, FileConfig};
use alice_chat::error::ChatError;
use alice_chat::metrics;
use alice_chat::models::Prompt;
use alice_chat::state::{MemoryQuery, MemoryReport};
use alice_chat::transcript::Transcript;
use alice_chat::{ChatState, MemoryCache, ModelRegistry, OllamaLoader, ResponseCache, SqliteCache};
use anyhow::Context;
use clap::Parser; // for cli
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Logs go to stderr so stdout only carries the conversation
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_cache(
    backend: CacheBackend,
    config: Option<&CacheConfig>,
) -> Result<Option<Arc<dyn ResponseCache>>, ChatError> {
    match backend {
        CacheBackend::None => Ok(None),
        CacheBackend::Memory => Ok(Some(Arc::new(MemoryCache::new()))),
        CacheBackend::Sqlite => {
            let Some(config) = config else {
                info!("No cache section in config, running without cache");
                return Ok(None);
            };
            match SqliteCache::open(config) {
                Ok(cache) => Ok(Some(Arc::new(cache))),
                Err(ChatError::Cache(e)) => {
                    warn!(error = %e, "Cache unavailable, running without cache");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
    }
}

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(&args.log_level);

    let file_config = FileConfig::load(&args.config)?;
    let registry = ModelRegistry::new(file_config.models.clone());
    if registry.is_empty() {
        anyhow::bail!("no models configured in {}", args.config.display());
    }
    let cache = open_cache(args.cache, file_config.cache.as_ref())?;

    let loader = Arc::new(OllamaLoader::new(reqwest::Client::new(), &args.ollama_url));
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
    let mut state = ChatState::new(registry, loader, cache, completion_tx)
        .with_config_path(args.config.clone());
    let mut transcript = Transcript::new();

    let initial = args
        .model
        .clone()
        .or_else(|| file_config.last_model.clone())
        .or_else(|| state.registry().names().next().map(str::to_string))
        .context("no model to select")?;
    match state.select(&initial).await {
        Ok(()) => println!("{}", transcript.push_info(&format!("Model loaded: {}", initial))),
        Err(e) => println!("{}", transcript.push_info(&e.to_string())),
    }
    println!("Backend: {}", args.ollama_url);
    println!("Cache: {}", if state.has_cache() { "on" } else { "off" });
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let mut pending = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Command::Prompt(text) => match state.submit(&text) {
                        Ok(submission) => {
                            pending += 1;
                            println!("{}", transcript.push_prompt(&submission.prompt));
                            println!("Alice is thinking...");
                        }
                        // blank lines are just ignored
                        Err(ChatError::EmptyPrompt) => {}
                        Err(e) => println!("{}", transcript.push_info(&e.to_string())),
                    },
                    Command::ListModels => {
                        for name in state.registry().names() {
                            let marker = if state.selected_model() == Some(name) { "*" } else { " " };
                            println!("{} {}", marker, name);
                        }
                    }
                    Command::SelectModel(name) => match state.select(&name).await {
                        Ok(()) => println!("{}", transcript.push_info(&format!("Model loaded: {}", name))),
                        Err(e) => println!("{}", transcript.push_info(&e.to_string())),
                    },
                    Command::Memory(limit) => {
                        state.spawn_memory_query(MemoryQuery::Recent(limit), report_tx.clone());
                    }
                    Command::ClearMemory => {
                        state.spawn_memory_query(MemoryQuery::Clear, report_tx.clone());
                    }
                    Command::Forget(text) => match Prompt::new(&text) {
                        Ok(prompt) => {
                            state.spawn_memory_query(MemoryQuery::Forget(prompt), report_tx.clone());
                        }
                        Err(e) => println!("{}", transcript.push_info(&e.to_string())),
                    },
                    Command::History(limit) => {
                        for line in transcript.tail(limit) {
                            println!("{}", line);
                        }
                    }
                    Command::Stats => print!("{}", metrics::render()),
                    Command::Help => println!("{}", HELP),
                    Command::Quit => break,
                    Command::Unknown(input) => println!("Unknown command: {} (try /help)", input),
                }
            }
            Some(completion) = completion_rx.recv() => {
                pending = pending.saturating_sub(1);
                println!("{}", transcript.push_completion(&completion));
                if pending > 0 {
                    println!("Alice is thinking... ({} pending)", pending);
                }
            }
            Some(report) = report_rx.recv() => match report {
                MemoryReport::Entries(entries) if entries.is_empty() => println!("(memory is empty)"),
                MemoryReport::Entries(entries) => {
                    for entry in entries {
                        println!("[{}] You: {}", entry.created_at.format("%Y-%m-%d %H:%M"), entry.prompt);
                        println!("    Alice: {}", entry.response);
                    }
                }
                MemoryReport::Forgotten { prompt, existed: true } => {
                    println!("{}", transcript.push_info(&format!("Forgot: {}", prompt)));
                }
                MemoryReport::Forgotten { prompt, existed: false } => {
                    println!("Nothing cached for: {}", prompt);
                }
                MemoryReport::Cleared(n) => {
                    println!("{}", transcript.push_info(&format!("Memory cleared ({} entries)", n)));
                }
                MemoryReport::NoCache => println!("(cache is off)"),
                MemoryReport::Failed(e) => println!("{}", transcript.push_info(&e)),
            },
        }
    }

    if pending > 0 {
        warn!(pending, "Exiting with unfinished prompts");
    }
    Ok(())
}
