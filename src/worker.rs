use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use crate::error::{CacheError, GenerationError};
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE, CACHE_STORE_FAILURES, GENERATION_LATENCY};
use crate::models::{Completion, GenerationTask, ResponseSource};

pub const ERROR_PREFIX: &str = "[Error]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Completed,
}

// Failures that end up as an error response instead of a generated one
#[derive(Error, Debug)]
enum TaskFailure {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Runs one task off the interactive loop and reports back exactly once.
///
/// The worker is consumed when it completes, so a second completion for the
/// same task cannot be sent.
pub struct GenerationWorker {
    task: GenerationTask,
    state: WorkerState,
    completion_tx: mpsc::UnboundedSender<Completion>,
}

impl GenerationWorker {
    pub fn new(task: GenerationTask, completion_tx: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            task,
            state: WorkerState::Idle,
            completion_tx,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        self.state = WorkerState::Running;
        debug!(task = self.task.id, model = %self.task.generator.model(), "[Worker] Running");
        // a panicking backend still has to produce its one completion
        let (response, source) = match AssertUnwindSafe(resolve(&self.task)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = self.task.id, panic = %message, "[Worker] Task panicked");
                (format!("{} {}", ERROR_PREFIX, message), ResponseSource::Failed)
            }
        };
        self.state = WorkerState::Completed;
        self.complete(response, source);
    }

    fn complete(self, response: String, source: ResponseSource) {
        debug_assert_eq!(self.state, WorkerState::Completed);
        let completion = Completion {
            task_id: self.task.id,
            prompt: self.task.prompt,
            response,
            source,
        };
        // Receiver gone means the front-end has shut down
        if self.completion_tx.send(completion).is_err() {
            debug!(task = self.task.id, "[Worker] Completion dropped, receiver closed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "model backend panicked".to_string()
    }
}

/// Cache first, then the generator. Every failure becomes an `[Error] ...` response.
pub async fn resolve(task: &GenerationTask) -> (String, ResponseSource) {
    match try_resolve(task).await {
        Ok(result) => result,
        Err(e) => {
            error!(task = task.id, error = %e, "[Worker] Task failed");
            (format!("{} {}", ERROR_PREFIX, e), ResponseSource::Failed)
        }
    }
}

async fn try_resolve(task: &GenerationTask) -> Result<(String, ResponseSource), TaskFailure> {
    // check cache first
    if let Some(cache) = &task.cache {
        if let Some(response) = cache.lookup(&task.prompt).await? {
            CACHE_HITS.inc();
            debug!(task = task.id, "[Worker] Cache HIT");
            return Ok((response, ResponseSource::Cached));
        }
        CACHE_MISSES.inc();
        debug!(task = task.id, "[Worker] Cache MISS - calling model");
    }

    let start_time = Instant::now();
    let response = task.generator.generate(task.prompt.as_str()).await?;
    GENERATION_LATENCY.observe(start_time.elapsed().as_secs_f64());

    // best-effort save, the user still gets the answer
    if let Some(cache) = &task.cache {
        match cache.store(&task.prompt, &response).await {
            Ok(()) => {
                if let Ok(size) = cache.len().await {
                    CACHE_SIZE.set(size as f64);
                }
            }
            Err(e) => {
                CACHE_STORE_FAILURES.inc();
                warn!(task = task.id, error = %e, "[Worker] Could not store response");
            }
        }
    }

    Ok((response, ResponseSource::Generated))
}
