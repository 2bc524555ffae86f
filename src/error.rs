//! Error taxonomy shared by every layer of the data-access stack.

use std::fmt;

use crate::validate::ValidationError;

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which write primitive failed at the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteOp::Insert => "insert",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Everything the provider can hand back to a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing database could not be opened, created, or upgraded.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single insert/update/delete was rejected by SQLite.
    #[error("{operation} failed")]
    WriteFailed {
        operation: WriteOp,
        #[source]
        source: rusqlite::Error,
    },

    /// A read was rejected by SQLite, typically a malformed filter clause.
    #[error("query failed")]
    QueryFailed(#[source] rusqlite::Error),

    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),

    #[error("unroutable resource: {0}")]
    UnroutableResource(String),

    #[error("{operation} is not supported for {resource}")]
    UnsupportedOperation {
        operation: WriteOp,
        resource: String,
    },
}

impl Error {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Error::StorageUnavailable {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn unavailable_from<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::StorageUnavailable {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Interface misuse rather than a runtime condition. Callers treat these
    /// as bugs in their own code.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Error::UnroutableResource(_) | Error::UnsupportedOperation { .. }
        )
    }
}
