//! Error types for the page store.

use cpstore_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the compressed page store and its components.
///
/// Nothing in this crate retries or repairs: a `FileAccess` error is handed
/// to the caller to decide on, an `InvariantViolation` means corruption or a
/// broken caller contract and must be treated as fatal.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An I/O failure from the underlying files (open, read, write, map, flush, lock).
    #[error("file access error: {0}")]
    FileAccess(#[from] StorageError),

    /// A structural invariant was breached.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// A mutation was attempted on a store opened read-only.
    #[error("page store is read-only: {operation} not permitted")]
    ReadOnly {
        /// The rejected operation.
        operation: &'static str,
    },

    /// The store has been closed.
    #[error("page store is closed")]
    Closed,
}

impl CoreError {
    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a read-only error for the named operation.
    #[must_use]
    pub const fn read_only(operation: &'static str) -> Self {
        Self::ReadOnly { operation }
    }

    /// Returns `true` for errors that indicate corruption or a contract breach.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::FileAccess(StorageError::Io(err))
    }
}
