// Test doubles shared by the unit tests

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use crate::cache::{CacheEntry, MemoryCache, ResponseCache};
use crate::error::{CacheError, GenerationError};
use crate::generator::Generator;
use crate::models::Prompt;

pub struct FakeGenerator {
    model: String,
    reply: Result<String, String>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            model: "fake".to_string(),
            reply: Ok(reply.to_string()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    // Blocks in generate() until the gate is notified
    pub fn gated(model: &str, reply: &str, gate: Arc<Notify>) -> Self {
        Self {
            model: model.to_string(),
            gate: Some(gate),
            ..Self::replying(reply)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply.clone().map_err(GenerationError::Request)
    }
}

// Cache that fails reads (lookup and the maintenance queries) or stores,
// and otherwise behaves like MemoryCache
pub struct FailingCache {
    fail_lookup: bool,
    fail_store: bool,
    inner: MemoryCache,
}

impl FailingCache {
    pub fn on_lookup() -> Self {
        Self {
            fail_lookup: true,
            fail_store: false,
            inner: MemoryCache::new(),
        }
    }

    pub fn on_store() -> Self {
        Self {
            fail_lookup: false,
            fail_store: true,
            inner: MemoryCache::new(),
        }
    }
}

#[async_trait]
impl ResponseCache for FailingCache {
    async fn lookup(&self, prompt: &Prompt) -> Result<Option<String>, CacheError> {
        if self.fail_lookup {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        self.inner.lookup(prompt).await
    }

    async fn store(&self, prompt: &Prompt, response: &str) -> Result<(), CacheError> {
        if self.fail_store {
            return Err(CacheError::Unavailable("disk full".to_string()));
        }
        self.inner.store(prompt, response).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CacheEntry>, CacheError> {
        if self.fail_lookup {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        self.inner.recent(limit).await
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.inner.len().await
    }

    async fn forget(&self, prompt: &Prompt) -> Result<bool, CacheError> {
        if self.fail_lookup {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        self.inner.forget(prompt).await
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        if self.fail_lookup {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        self.inner.clear().await
    }
}

pub struct PanickingGenerator;

#[async_trait]
impl Generator for PanickingGenerator {
    fn model(&self) -> &str {
        "panicky"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        panic!("backend blew up");
    }
}
