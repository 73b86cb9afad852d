//! SQLite-backed response cache.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::cache::{CacheEntry, ResponseCache};
use crate::config::CacheConfig;
use crate::error::{CacheError, ChatError};
use crate::models::Prompt;

/// Persistent cache stored in a `memory` table.
///
/// Queries run on the blocking pool; the connection is shared behind a mutex.
#[derive(Clone)]
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Opens the database named by `config.database` and creates the table if needed.
    ///
    /// Only local hosts are accepted. `user` and `password` are not used by SQLite.
    pub fn open(config: &CacheConfig) -> Result<Self, ChatError> {
        if !config.is_local() {
            return Err(ChatError::Config(format!(
                "sqlite cache cannot reach remote host {}",
                config.host
            )));
        }
        let cache = Self::open_path(Path::new(&config.database))?;
        info!(database = %config.database, "Response cache opened");
        Ok(cache)
    }

    pub fn open_path(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS memory (
                prompt TEXT PRIMARY KEY,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CacheError::Unavailable("cache connection poisoned".to_string()))?;
            f(&guard)
        })
        .await?
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CacheError::Unavailable(format!("bad created_at {:?}: {}", raw, e)))
}

#[async_trait]
impl ResponseCache for SqliteCache {
    async fn lookup(&self, prompt: &Prompt) -> Result<Option<String>, CacheError> {
        let prompt = prompt.as_str().to_string();
        self.with_conn(move |conn| {
            let response = conn
                .query_row(
                    "SELECT response FROM memory WHERE prompt = ?1",
                    params![prompt],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(response)
        })
        .await
    }

    async fn store(&self, prompt: &Prompt, response: &str) -> Result<(), CacheError> {
        let prompt = prompt.as_str().to_string();
        let response = response.to_string();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO memory (prompt, response, created_at) VALUES (?1, ?2, ?3)",
                params![prompt, response, created_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CacheEntry>, CacheError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT prompt, response, created_at FROM memory
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut entries = Vec::new();
            for row in rows {
                let (prompt, response, created_at) = row?;
                entries.push(CacheEntry {
                    prompt,
                    response,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }

    async fn forget(&self, prompt: &Prompt) -> Result<bool, CacheError> {
        let prompt = prompt.as_str().to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM memory WHERE prompt = ?1", params![prompt])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM memory", [])?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(s: &str) -> Prompt {
        Prompt::new(s).unwrap()
    }

    #[tokio::test]
    async fn lookup_miss_returns_none() {
        let cache = SqliteCache::open_in_memory().unwrap();
        assert_eq!(cache.lookup(&prompt("hello")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read() {
        let cache = SqliteCache::open_in_memory().unwrap();
        cache.store(&prompt("hello"), "hi there").await.unwrap();
        assert_eq!(
            cache.lookup(&prompt("hello")).await.unwrap().as_deref(),
            Some("hi there")
        );
    }

    #[tokio::test]
    async fn duplicate_store_leaves_one_row() {
        let cache = SqliteCache::open_in_memory().unwrap();
        cache.store(&prompt("hello"), "hi there").await.unwrap();
        cache.store(&prompt("hello"), "hi there").await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_stores_keep_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open_path(&dir.path().join("alice.db")).unwrap();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.store(&prompt("hello"), "hi there").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(
            cache.lookup(&prompt("hello")).await.unwrap().as_deref(),
            Some("hi there")
        );
    }

    #[tokio::test]
    async fn forget_and_clear() {
        let cache = SqliteCache::open_in_memory().unwrap();
        for p in ["one", "two", "three"] {
            cache.store(&prompt(p), "r").await.unwrap();
        }

        assert!(cache.forget(&prompt("two")).await.unwrap());
        assert!(!cache.forget(&prompt("missing")).await.unwrap());
        assert_eq!(cache.lookup(&prompt("two")).await.unwrap(), None);
        assert_eq!(cache.len().await.unwrap(), 2);

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let cache = SqliteCache::open_in_memory().unwrap();
        for p in ["one", "two", "three"] {
            cache.store(&prompt(p), "r").await.unwrap();
        }
        let recent = cache.recent(2).await.unwrap();
        let prompts: Vec<&str> = recent.iter().map(|e| e.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["three", "two"]);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.db");
        {
            let cache = SqliteCache::open_path(&path).unwrap();
            cache.store(&prompt("hello"), "hi there").await.unwrap();
        }
        let cache = SqliteCache::open_path(&path).unwrap();
        assert_eq!(
            cache.lookup(&prompt("hello")).await.unwrap().as_deref(),
            Some("hi there")
        );
    }

    #[test]
    fn remote_host_is_rejected() {
        let config = CacheConfig {
            host: "db.example.com".into(),
            user: "alice".into(),
            password: String::new(),
            database: "alice.db".into(),
        };
        assert!(matches!(SqliteCache::open(&config), Err(ChatError::Config(_))));
    }
}
