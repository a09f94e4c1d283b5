//! Error types for the request batch coordinator

use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Error types for coordinator operations
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request {id} failed with status {status}: {message}")]
    Status {
        id: String,
        status: u16,
        message: String,
    },

    #[error("No response received for request: {id}")]
    NoResponse { id: String },

    #[error("Request timed out: {id}")]
    Timeout { id: String },

    #[error("Request cancelled: {id}")]
    Cancelled { id: String },

    #[error("Batch dispatch failed for request {id}: {message}")]
    BatchFailed { id: String, message: String },

    #[error("Batch transport failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Unrecognized batch response shape (checked: {checked}): {snippet}")]
    UnrecognizedShape { checked: String, snippet: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Create a new per-request status error
    pub fn status<S: Into<String>>(id: S, status: u16, message: S) -> Self {
        Self::Status {
            id: id.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a new no-response error
    pub fn no_response<S: Into<String>>(id: S) -> Self {
        Self::NoResponse { id: id.into() }
    }

    /// Create a new per-request timeout error
    pub fn timeout<S: Into<String>>(id: S) -> Self {
        Self::Timeout { id: id.into() }
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(id: S) -> Self {
        Self::Cancelled { id: id.into() }
    }

    /// Create a new batch failure error for a single caller
    pub fn batch_failed<S: Into<String>>(id: S, message: S) -> Self {
        Self::BatchFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a new retries-exhausted error
    pub fn retries_exhausted<S: Into<String>>(attempts: u32, message: S) -> Self {
        Self::RetriesExhausted {
            attempts,
            message: message.into(),
        }
    }

    /// Create a new invalid-request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a transient transport failure worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Transport(_) | CoordinatorError::Io(_)
        )
    }

    /// Check if this error means the batch transport itself failed,
    /// including after retries were exhausted
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Transport(_)
                | CoordinatorError::Io(_)
                | CoordinatorError::RetriesExhausted { .. }
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidMethod(_) => "validation",
            CoordinatorError::InvalidRequest(_) => "validation",
            CoordinatorError::Config(_) => "config",
            CoordinatorError::Url(_) => "config",
            CoordinatorError::Transport(_) => "transport",
            CoordinatorError::Serialization(_) => "serialization",
            CoordinatorError::Io(_) => "io",
            CoordinatorError::Status { .. } => "status",
            CoordinatorError::NoResponse { .. } => "no_response",
            CoordinatorError::Timeout { .. } => "timeout",
            CoordinatorError::Cancelled { .. } => "cancelled",
            CoordinatorError::BatchFailed { .. } => "transport",
            CoordinatorError::RetriesExhausted { .. } => "transport",
            CoordinatorError::UnrecognizedShape { .. } => "demux",
            CoordinatorError::Internal(_) => "internal",
        }
    }
}
