use thiserror::Error;

// Errors raised synchronously by the chat session
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("no model selected")]
    NoModelSelected,

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("failed to load model {name}: {reason}")]
    ModelLoad { name: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

// Any failure talking to the cache store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(e: tokio::task::JoinError) -> Self {
        CacheError::Unavailable(format!("cache task aborted: {}", e))
    }
}

// Failures from the generation backend
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("{0}")]
    Request(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("response too short: {0:?}")]
    TooShort(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GenerationError::Decode(e.to_string())
        } else {
            GenerationError::Request(e.to_string())
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
