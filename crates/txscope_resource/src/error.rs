//! Error types for transactional resources.

use thiserror::Error;

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Errors that can occur while operating a transactional resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A write guard refused a native persist.
    #[error("write rejected: {0}")]
    WriteRejected(#[from] WriteRejected),

    /// The operation requires an open transaction.
    #[error("no transaction is open on this resource")]
    NoTransaction,

    /// A transaction is already open on this resource.
    #[error("a transaction is already open on this resource")]
    TransactionAlreadyActive,

    /// The resource has been disposed.
    #[error("resource has been disposed")]
    Disposed,

    /// The underlying backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ResourceError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns true if a write guard vetoed the operation.
    #[must_use]
    pub fn is_write_rejected(&self) -> bool {
        matches!(self, Self::WriteRejected(_))
    }
}

/// Veto returned by a write guard when a native persist is not permitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct WriteRejected {
    /// Why the write was refused.
    pub reason: String,
}

impl WriteRejected {
    /// Creates a new rejection.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
