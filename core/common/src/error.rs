//! Common error types for Polystore.

use thiserror::Error;

/// A single item that failed inside a batch or deep-copy operation.
#[derive(Debug, Error)]
#[error("{path}: {error}")]
pub struct ItemFailure {
    /// Path of the item that failed (source side for transfers).
    pub path: String,
    /// The error reported for this item.
    pub error: Error,
}

impl ItemFailure {
    pub fn new(path: impl Into<String>, error: Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// Top-level error type for Polystore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or empty input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Resource or registration not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A provider name is already registered (or empty).
    #[error("Duplicate provider name: {0}")]
    DuplicateName(String),

    /// More than one registration satisfied a capability lookup.
    #[error("Ambiguous provider for {capability}: {}", .names.join(", "))]
    Ambiguous {
        capability: String,
        names: Vec<String>,
    },

    /// A behavior factory produced no provider.
    #[error("Invalid behavior: {0}")]
    InvalidBehavior(String),

    /// Path-level fault reported by a provider.
    #[error("File system error: {0}")]
    FileSystem(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Temporary back-end failure (network, throttling).
    #[error("Transient error: {0}")]
    Transient(String),

    /// Cooperative cancellation was observed.
    #[error("Operation cancelled after {processed} item(s)")]
    Cancelled { processed: usize },

    /// Some items of a batch failed.
    #[error(
        "{succeeded} of {total} item(s) succeeded; failed: {}",
        .failures.iter().map(|f| f.path.as_str()).collect::<Vec<_>>().join(", ")
    )]
    PartialOperation {
        succeeded: usize,
        total: usize,
        failures: Vec<ItemFailure>,
    },

    /// Copy succeeded but the source could not be removed.
    #[error(
        "Copied '{source_path}' to '{destination_path}' but could not delete the source \
         (the destination may now exist as a duplicate): {reason}"
    )]
    MoveIncomplete {
        source_path: String,
        destination_path: String,
        reason: Box<Error>,
    },

    /// Fault not anticipated by any other variant.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Transient(_))
    }

    /// Paths of the failed items, if this is a partial failure.
    pub fn failed_paths(&self) -> Vec<&str> {
        match self {
            Error::PartialOperation { failures, .. } => {
                failures.iter().map(|f| f.path.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
