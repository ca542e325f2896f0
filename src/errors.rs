// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The interpreter could not be started, or died underneath us.
    #[error("Interpreter session unavailable: {0}")]
    SessionUnavailable(String),

    /// An invocation was attempted outside the session's open lifetime.
    #[error("Interpreter session not ready: {0}")]
    SessionNotReady(String),

    /// The script wrote to its diagnostic stream.
    #[error("Script failed: {0}")]
    ScriptFailed(String),

    #[error("Operation cancelled")]
    OperationCancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Session-level failures are fatal to the engine and must reach the
    /// caller instead of being folded into a task record.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            EngineError::SessionUnavailable(_) | EngineError::SessionNotReady(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EngineError>;
