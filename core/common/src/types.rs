//! Common types used throughout Polystore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;

/// Metadata for a stored file.
///
/// The derived accessors are pure functions of `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Provider-relative path.
    pub path: String,
    /// Size in bytes.
    pub length: u64,
    /// Last modification time, when the back-end tracks one.
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn new(path: impl Into<String>, length: u64) -> Self {
        Self {
            path: path.into(),
            length,
            last_modified: None,
        }
    }

    /// Set the modification time.
    pub fn with_last_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(modified);
        self
    }

    /// Parent directory path, if the path has a separator.
    pub fn parent(&self) -> Option<&str> {
        path::parent(&self.path)
    }

    /// File name (last path segment).
    pub fn file_name(&self) -> &str {
        path::file_name(&self.path)
    }

    /// Extension of the file name, if any.
    pub fn extension(&self) -> Option<&str> {
        path::extension(&self.path)
    }
}
