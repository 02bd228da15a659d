//! Shared error type across promrelay crates.

use thiserror::Error;

/// Failure classes (stable labels for logs and self metrics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unreadable configuration.
    Config,
    /// Upstream request could not be issued or answered.
    Fetch,
    /// Upstream body failed while being streamed.
    Transform,
    /// Writing to the client failed.
    Copy,
    /// The request was cancelled (client went away).
    Cancelled,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// String representation used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Transform => "transform",
            ErrorKind::Copy => "copy",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("config: {0}")]
    Config(String),
    #[error("fetch {exporter}: {reason}")]
    Fetch { exporter: String, reason: String },
    #[error("upstream body {exporter}: {reason}")]
    Transform { exporter: String, reason: String },
    #[error("copy to client failed: {0}")]
    Copy(#[from] std::io::Error),
    #[error("request cancelled")]
    Cancelled,
    #[error("internal: {0}")]
    Internal(String),
}

impl RelayError {
    /// Classify the error for logs and metrics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Config(_) => ErrorKind::Config,
            RelayError::Fetch { .. } => ErrorKind::Fetch,
            RelayError::Transform { .. } => ErrorKind::Transform,
            RelayError::Copy(_) => ErrorKind::Copy,
            RelayError::Cancelled => ErrorKind::Cancelled,
            RelayError::Internal(_) => ErrorKind::Internal,
        }
    }
}
