//! Error types for the story context service

use crate::completion::CompletionError;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Completion service error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Session {0} already has a turn in progress")]
    SessionBusy(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContextError {
    /// Whether retrying the same request later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ContextError::Completion(e) => e.is_transient(),
            ContextError::SessionBusy(_) => true,
            _ => false,
        }
    }
}

impl From<config::ConfigError> for ContextError {
    fn from(e: config::ConfigError) -> Self {
        ContextError::Configuration(e.to_string())
    }
}
