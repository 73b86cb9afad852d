pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod state;
pub mod store;
pub mod transcript;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, MemoryCache, ResponseCache};
pub use error::{CacheError, ChatError, GenerationError};
pub use generator::{Generator, OllamaGenerator};
pub use models::{Completion, Prompt, ResponseSource};
pub use registry::{ModelLoader, ModelRegistry, OllamaLoader};
pub use state::ChatState;
pub use store::SqliteCache;
pub use worker::GenerationWorker;
