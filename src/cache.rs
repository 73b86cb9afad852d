use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::CacheError;
use crate::models::Prompt;

// A stored prompt/response pair. Never updated after insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Store of previous responses keyed by exact prompt text.
///
/// Backend failures come back as [`CacheError::Unavailable`], a miss is `Ok(None)`.
/// `store` is insert-if-absent: storing an existing prompt succeeds and keeps the
/// first response, so two workers racing on the same prompt are harmless.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn lookup(&self, prompt: &Prompt) -> Result<Option<String>, CacheError>;

    async fn store(&self, prompt: &Prompt, response: &str) -> Result<(), CacheError>;

    // Newest entries first
    async fn recent(&self, limit: usize) -> Result<Vec<CacheEntry>, CacheError>;

    async fn len(&self) -> Result<usize, CacheError>;

    // Removes one entry, returns whether it existed
    async fn forget(&self, prompt: &Prompt) -> Result<bool, CacheError>;

    // Removes everything, returns how many entries were dropped
    async fn clear(&self) -> Result<usize, CacheError>;
}

// Create a cache key (hash of the prompt)
pub fn make_cache_key(prompt: &Prompt) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_str());
    format!("{:x}", hasher.finalize())
}

struct MemoryRecord {
    entry: CacheEntry,
    seq: u64,
}

// In-process cache, lost on exit
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryRecord>,
    next_seq: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn lookup(&self, prompt: &Prompt) -> Result<Option<String>, CacheError> {
        let key = make_cache_key(prompt);
        Ok(self.entries.get(&key).map(|r| r.entry.response.clone()))
    }

    async fn store(&self, prompt: &Prompt, response: &str) -> Result<(), CacheError> {
        let key = make_cache_key(prompt);
        self.entries.entry(key).or_insert_with(|| MemoryRecord {
            entry: CacheEntry {
                prompt: prompt.as_str().to_string(),
                response: response.to_string(),
                created_at: Utc::now(),
            },
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CacheEntry>, CacheError> {
        let mut records: Vec<(u64, CacheEntry)> = self
            .entries
            .iter()
            .map(|r| (r.seq, r.entry.clone()))
            .collect();
        records.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(records.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }

    async fn forget(&self, prompt: &Prompt) -> Result<bool, CacheError> {
        Ok(self.entries.remove(&make_cache_key(prompt)).is_some())
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }
}
