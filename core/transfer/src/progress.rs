//! Progress reporting and transfer summaries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Snapshot pushed to a progress sink after each completed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Bytes copied so far.
    pub bytes_processed: u64,
    /// Items completed so far.
    pub files_processed: usize,
    /// Total items, when known ahead of time.
    pub total_files: Option<usize>,
}

/// Fire-and-forget progress callback.
pub type ProgressSink = Arc<dyn Fn(ProgressReport) + Send + Sync>;

/// Outcome of a successful transfer operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    /// Items (files or directories) completed.
    pub items_processed: usize,
    /// Items the operation set out to process.
    pub total_items: usize,
    /// Bytes copied.
    pub bytes_processed: u64,
    /// Items deliberately not transferred (file skipped or filtered out).
    pub skipped: usize,
}

impl TransferSummary {
    pub(crate) fn single(bytes: u64) -> Self {
        Self {
            items_processed: 1,
            total_items: 1,
            bytes_processed: bytes,
            skipped: 0,
        }
    }

    pub(crate) fn skipped() -> Self {
        Self {
            total_items: 1,
            skipped: 1,
            ..Self::default()
        }
    }

    pub(crate) fn with_total(total_items: usize) -> Self {
        Self {
            total_items,
            ..Self::default()
        }
    }

    /// Whether the operation ended without transferring anything because
    /// the item was skipped.
    pub fn was_skipped(&self) -> bool {
        self.skipped > 0 && self.items_processed == 0
    }

    pub(crate) fn progress(&self) -> ProgressReport {
        ProgressReport {
            bytes_processed: self.bytes_processed,
            files_processed: self.items_processed,
            total_files: Some(self.total_items),
        }
    }
}
