use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VesperError {
    #[error("Invalid input for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Authentication with {endpoint} failed")]
    AuthenticationFailed { endpoint: String },

    #[error("Remote task '{operation}' failed: {message}")]
    RemoteTask { operation: String, message: String },

    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Task already tracked: {task}")]
    AlreadyTracked { task: String },

    #[error("Task watcher is not running")]
    WatcherStopped,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VesperError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VesperError>;
pub type VesperResult<T> = std::result::Result<T, VesperError>;
