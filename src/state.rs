use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use crate::cache::{CacheEntry, ResponseCache};
use crate::config::persist_last_model;
use crate::error::{ChatError, ChatResult};
use crate::generator::Generator;
use crate::metrics::{CACHE_SIZE, REQUEST_TOTAL};
use crate::models::{Completion, GenerationTask, Prompt};
use crate::registry::{ModelLoader, ModelRegistry};
use crate::worker::GenerationWorker;

// Handle for a task that was accepted
pub struct Submission {
    pub task_id: u64,
    pub prompt: Prompt,
    pub handle: JoinHandle<()>,
}

struct SelectedModel {
    name: String,
    generator: Arc<dyn Generator>,
}

/// Session state owned by the interactive loop.
///
/// Each submission takes its own clone of the selected generator, so switching
/// models never touches a task that is already running.
pub struct ChatState {
    registry: ModelRegistry,
    loader: Arc<dyn ModelLoader>,
    selected: Option<SelectedModel>,
    cache: Option<Arc<dyn ResponseCache>>,
    config_path: Option<PathBuf>,
    next_task_id: u64,
    completion_tx: mpsc::UnboundedSender<Completion>,
}

impl ChatState {
    pub fn new(
        registry: ModelRegistry,
        loader: Arc<dyn ModelLoader>,
        cache: Option<Arc<dyn ResponseCache>>,
        completion_tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            registry,
            loader,
            selected: None,
            cache,
            config_path: None,
            next_task_id: 1,
            completion_tx,
        }
    }

    // Remember selections in this config file
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected.as_ref().map(|s| s.name.as_str())
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Loads `name` from the registry and makes it the model for future prompts.
    ///
    /// On failure the previous selection stays in place.
    pub async fn select(&mut self, name: &str) -> ChatResult<()> {
        let path = self
            .registry
            .path(name)
            .ok_or_else(|| ChatError::UnknownModel(name.to_string()))?;
        let generator = self.loader.load(name, path).await?;
        self.selected = Some(SelectedModel {
            name: name.to_string(),
            generator,
        });
        info!(model = %name, "Model selected");

        if let Some(path) = &self.config_path {
            if let Err(e) = persist_last_model(path, name) {
                warn!(error = %e, "Could not remember selected model");
            }
        }
        Ok(())
    }

    /// Starts a worker for `text`. Rejected prompts never reach a worker.
    pub fn submit(&mut self, text: &str) -> ChatResult<Submission> {
        let prompt = Prompt::new(text)?;
        let generator = self
            .selected
            .as_ref()
            .map(|s| Arc::clone(&s.generator))
            .ok_or(ChatError::NoModelSelected)?;

        REQUEST_TOTAL.inc();
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let task = GenerationTask {
            id: task_id,
            prompt: prompt.clone(),
            generator,
            cache: self.cache.clone(),
        };
        let handle = GenerationWorker::new(task, self.completion_tx.clone()).start();
        Ok(Submission {
            task_id,
            prompt,
            handle,
        })
    }

    // Most recent cache entries, empty when running without a cache
    pub async fn recent(&self, limit: usize) -> ChatResult<Vec<CacheEntry>> {
        match &self.cache {
            Some(cache) => Ok(cache.recent(limit).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Runs a cache maintenance query on its own task and reports back on `report_tx`.
    ///
    /// The interactive loop keeps handling completions while the query runs.
    pub fn spawn_memory_query(
        &self,
        query: MemoryQuery,
        report_tx: mpsc::UnboundedSender<MemoryReport>,
    ) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let report = match cache {
                None => MemoryReport::NoCache,
                Some(cache) => run_memory_query(cache.as_ref(), query).await,
            };
            let _ = report_tx.send(report);
        })
    }
}

// Cache maintenance requested from the front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryQuery {
    Recent(usize),
    Forget(Prompt),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryReport {
    Entries(Vec<CacheEntry>),
    Forgotten { prompt: Prompt, existed: bool },
    Cleared(usize),
    NoCache,
    Failed(String),
}

async fn run_memory_query(cache: &dyn ResponseCache, query: MemoryQuery) -> MemoryReport {
    let result = match query {
        MemoryQuery::Recent(limit) => cache.recent(limit).await.map(MemoryReport::Entries),
        MemoryQuery::Forget(prompt) => cache
            .forget(&prompt)
            .await
            .map(|existed| MemoryReport::Forgotten { prompt, existed }),
        MemoryQuery::Clear => cache.clear().await.map(MemoryReport::Cleared),
    };
    match result {
        Ok(report) => {
            if let Ok(size) = cache.len().await {
                CACHE_SIZE.set(size as f64);
            }
            report
        }
        Err(e) => {
            warn!(error = %e, "Memory query failed");
            MemoryReport::Failed(e.to_string())
        }
    }
}
