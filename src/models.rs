use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use crate::cache::ResponseCache;
use crate::error::ChatError;
use crate::generator::Generator;

// User prompt - trimmed, never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: &str) -> Result<Self, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Ollama API request format
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
    pub options: GenerateOptions,
}

// Sampling options forwarded to the backend
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct GenerateOptions {
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_predict: 400,
            temperature: 0.7,
            top_p: 0.9,
            stop: vec!["\nUser:".to_string(), "\nAlice:".to_string(), "\n".to_string()],
        }
    }
}

// Ollama API response format
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: String,
    pub response: String,
}

// Where a completion's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cached,
    Generated,
    Failed,
}

// The single result delivered for a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub task_id: u64,
    pub prompt: Prompt,
    pub response: String,
    pub source: ResponseSource,
}

// One unit of work - holds a snapshot of the generator taken at submission
pub struct GenerationTask {
    pub id: u64,
    pub prompt: Prompt,
    pub generator: Arc<dyn Generator>,
    pub cache: Option<Arc<dyn ResponseCache>>,
}
