use thiserror::Error;

use crate::app::BuildError;
use crate::config::ConfigError;

/// Top-level error for scheduler operations.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("build: {0}")]
    Build(#[from] BuildError),
}

/// Failures of the task storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("tasks table is missing")]
    MissingSchema,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking store call failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a handler gave up on a task.
///
/// The dispatcher stores `to_string()` of this value in `last_error`, so the
/// `Failed` variant renders its message verbatim.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("capability not configured: {0}")]
    MissingCapability(&'static str),

    #[error("unsupported network {0}")]
    UnsupportedNetwork(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::Failed(message.to_string())
    }
}
