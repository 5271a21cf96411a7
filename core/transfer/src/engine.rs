//! Cross-provider transfer engine.
//!
//! Moves files and directory trees between two [`StorageProvider`]s, which
//! may be the same instance or entirely different back-ends. Every loop
//! boundary checks the cancellation token; batch operations keep going after
//! a per-item failure and report every failure together.

use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use polystore_common::{path, Error, ItemFailure, Result};
use polystore_storage::{SearchPattern, StorageProvider};

use crate::guard::guarded;
use crate::progress::{ProgressReport, ProgressSink, TransferSummary};

/// One `(source, destination)` pair of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub source_path: String,
    pub destination_path: String,
}

impl TransferTask {
    pub fn new(source_path: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
        }
    }
}

impl<S: Into<String>, D: Into<String>> From<(S, D)> for TransferTask {
    fn from((source, destination): (S, D)) -> Self {
        Self::new(source, destination)
    }
}

#[derive(Debug, Clone, Copy)]
enum BatchMode {
    Copy,
    Move,
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::Copy => f.write_str("copy"),
            BatchMode::Move => f.write_str("move"),
        }
    }
}

fn require_path(label: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", label)));
    }
    Ok(())
}

fn validate(task: &TransferTask) -> Result<()> {
    require_path("source path", &task.source_path)?;
    require_path("destination path", &task.destination_path)
}

fn same_instance(a: &dyn StorageProvider, b: &dyn StorageProvider) -> bool {
    std::ptr::addr_eq(a, b)
}

fn finish(summary: TransferSummary, failures: Vec<ItemFailure>) -> Result<TransferSummary> {
    if failures.is_empty() {
        return Ok(summary);
    }
    Err(Error::PartialOperation {
        succeeded: summary.items_processed,
        total: summary.total_items,
        failures,
    })
}

/// Copies and moves data between providers.
#[derive(Clone, Default)]
pub struct TransferEngine {
    cancel: CancellationToken,
    progress: Option<ProgressSink>,
}

impl TransferEngine {
    /// Create an engine with its own cancellation token and no progress sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `token` for cooperative cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Push a [`ProgressReport`] to `sink` after every completed item.
    pub fn with_progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(ProgressReport) + Send + Sync + 'static,
    {
        self.progress = Some(std::sync::Arc::new(sink));
        self
    }

    /// Token observed by this engine.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn report(&self, summary: &TransferSummary) {
        if let Some(sink) = &self.progress {
            sink(summary.progress());
        }
    }

    fn check_cancelled(&self, processed: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!(processed, "Transfer cancelled");
            return Err(Error::Cancelled { processed });
        }
        Ok(())
    }

    /// Copy one file from `src` to `dst`.
    ///
    /// Bytes are streamed straight from the source read into the destination
    /// write. Errors from either step are returned unchanged.
    ///
    /// # Errors
    /// - `InvalidArgument` if either path is empty
    /// - `Cancelled` if cancellation was already requested
    pub async fn copy_file(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
    ) -> Result<TransferSummary> {
        let task = TransferTask::new(source_path, destination_path);
        guarded("copy_file", self.run_single(BatchMode::Copy, src, dst, &task)).await
    }

    /// Copy every pair independently, continuing past failures.
    ///
    /// # Errors
    /// - `Cancelled` carrying the number of pairs already copied
    /// - `PartialOperation` with one entry per failed pair
    pub async fn copy_files(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        tasks: &[TransferTask],
    ) -> Result<TransferSummary> {
        guarded("copy_files", self.run_batch(BatchMode::Copy, src, dst, tasks)).await
    }

    /// Copy a file, then delete it at the source.
    ///
    /// A failed delete does not roll the copy back.
    ///
    /// # Errors
    /// - Any `copy_file` error
    /// - `MoveIncomplete` if the source could not be deleted after copying
    pub async fn move_file(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
    ) -> Result<TransferSummary> {
        let task = TransferTask::new(source_path, destination_path);
        guarded("move_file", self.run_single(BatchMode::Move, src, dst, &task)).await
    }

    /// Move every pair independently, continuing past failures.
    pub async fn move_files(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        tasks: &[TransferTask],
    ) -> Result<TransferSummary> {
        guarded("move_files", self.run_batch(BatchMode::Move, src, dst, tasks)).await
    }

    /// Recursively mirror a file or directory from `src` to `dst`.
    ///
    /// For a directory, every subdirectory (empty ones included) is created
    /// at the destination before any file is copied, parents before
    /// children. Files whose name does not match `search_pattern` are left
    /// out; with `skip_files` only the directory structure is copied.
    ///
    /// # Errors
    /// - `InvalidArgument` for empty paths, or when the destination is the
    ///   source or lies inside it on the same provider instance
    /// - `NotFound` if the source is neither a file nor a directory
    /// - `Cancelled` carrying the number of items already processed
    /// - `PartialOperation` naming every path that failed
    pub async fn deep_copy(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
        skip_files: bool,
        search_pattern: &str,
    ) -> Result<TransferSummary> {
        guarded(
            "deep_copy",
            self.run_deep_copy(src, dst, source_path, destination_path, skip_files, search_pattern),
        )
        .await
    }

    async fn run_deep_copy(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
        skip_files: bool,
        search_pattern: &str,
    ) -> Result<TransferSummary> {
        require_path("source path", source_path)?;
        require_path("destination path", destination_path)?;
        if same_instance(src, dst) && path::is_within(destination_path, source_path) {
            return Err(Error::InvalidArgument(format!(
                "Cannot copy '{}' onto itself or into its own subtree '{}'",
                source_path, destination_path
            )));
        }
        self.check_cancelled(0)?;
        let pattern = SearchPattern::new(search_pattern)?;

        let file_probe = src.file_exists(source_path).await;
        let dir_probe = src.directory_exists(source_path).await;
        match (file_probe, dir_probe) {
            (Ok(true), _) => {
                self.deep_copy_file(src, dst, source_path, destination_path, skip_files, &pattern)
                    .await
            }
            (_, Ok(true)) => {
                self.deep_copy_directory(
                    src,
                    dst,
                    source_path,
                    destination_path,
                    skip_files,
                    search_pattern,
                )
                .await
            }
            (file_probe, dir_probe) => Err(Error::NotFound(format!(
                "'{}' is neither a file nor a directory ({}; {})",
                source_path,
                describe_probe("file", file_probe),
                describe_probe("directory", dir_probe),
            ))),
        }
    }

    async fn deep_copy_file(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
        skip_files: bool,
        pattern: &SearchPattern,
    ) -> Result<TransferSummary> {
        if skip_files {
            debug!(source = source_path, "Skipping file: files are excluded");
            return Ok(TransferSummary::skipped());
        }
        if !pattern.matches(path::file_name(source_path)) {
            debug!(source = source_path, "Skipping file: name does not match pattern");
            return Ok(TransferSummary::skipped());
        }

        let bytes = self.stream_file(src, dst, source_path, destination_path).await?;
        let summary = TransferSummary::single(bytes);
        self.report(&summary);
        Ok(summary)
    }

    async fn deep_copy_directory(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
        skip_files: bool,
        search_pattern: &str,
    ) -> Result<TransferSummary> {
        let source_root = path::normalize(source_path);
        let destination_root = path::normalize(destination_path);

        let mut directories = src.list_directories(&source_root, true).await?;
        directories.insert(0, source_root.clone());
        // A parent's path is always shorter than any of its descendants'.
        directories.sort_by_key(|dir| dir.len());

        let files = if skip_files {
            Vec::new()
        } else {
            src.list_files(&source_root, search_pattern, true).await?
        };

        let mut summary = TransferSummary::with_total(directories.len() + files.len());
        let mut failures = Vec::new();
        info!(
            source = %source_root,
            destination = %destination_root,
            directories = directories.len(),
            files = files.len(),
            "Starting deep copy"
        );

        for dir in &directories {
            self.check_cancelled(summary.items_processed)?;
            let created = match translate(dir, &source_root, &destination_root) {
                Ok(target) => dst.create_directory(&target).await,
                Err(err) => Err(err),
            };
            match created {
                Ok(()) => {
                    summary.items_processed += 1;
                    self.report(&summary);
                }
                Err(err) => {
                    warn!(directory = %dir, error = %err, "Failed to create directory");
                    failures.push(ItemFailure::new(dir.clone(), err));
                }
            }
        }

        for file in &files {
            self.check_cancelled(summary.items_processed)?;
            let copied = match translate(file, &source_root, &destination_root) {
                Ok(target) => self.stream_file(src, dst, file, &target).await,
                Err(err) => Err(err),
            };
            match copied {
                Ok(bytes) => {
                    summary.items_processed += 1;
                    summary.bytes_processed += bytes;
                    self.report(&summary);
                }
                Err(err) => {
                    warn!(file = %file, error = %err, "Failed to copy file");
                    failures.push(ItemFailure::new(file.clone(), err));
                }
            }
        }

        info!(
            processed = summary.items_processed,
            total = summary.total_items,
            failed = failures.len(),
            "Deep copy finished"
        );
        finish(summary, failures)
    }

    async fn run_single(
        &self,
        mode: BatchMode,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        task: &TransferTask,
    ) -> Result<TransferSummary> {
        validate(task)?;
        self.check_cancelled(0)?;

        let bytes = self.transfer_task(mode, src, dst, task).await?;
        let summary = TransferSummary::single(bytes);
        self.report(&summary);
        Ok(summary)
    }

    async fn run_batch(
        &self,
        mode: BatchMode,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        tasks: &[TransferTask],
    ) -> Result<TransferSummary> {
        let mut summary = TransferSummary::with_total(tasks.len());
        let mut failures = Vec::new();

        for task in tasks {
            self.check_cancelled(summary.items_processed)?;

            let result = match validate(task) {
                Ok(()) => self.transfer_task(mode, src, dst, task).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(bytes) => {
                    summary.items_processed += 1;
                    summary.bytes_processed += bytes;
                    self.report(&summary);
                }
                Err(err) => {
                    warn!(
                        mode = %mode,
                        source = %task.source_path,
                        destination = %task.destination_path,
                        error = %err,
                        "Transfer pair failed"
                    );
                    failures.push(ItemFailure::new(task.source_path.clone(), err));
                }
            }
        }

        debug!(
            mode = %mode,
            succeeded = summary.items_processed,
            failed = failures.len(),
            "Batch finished"
        );
        finish(summary, failures)
    }

    async fn transfer_task(
        &self,
        mode: BatchMode,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        task: &TransferTask,
    ) -> Result<u64> {
        let (source, destination) = (task.source_path.as_str(), task.destination_path.as_str());
        match mode {
            BatchMode::Copy => self.stream_file(src, dst, source, destination).await,
            BatchMode::Move => self.move_one(src, dst, source, destination).await,
        }
    }

    async fn move_one(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
    ) -> Result<u64> {
        let bytes = self.stream_file(src, dst, source_path, destination_path).await?;

        if let Err(err) = src.delete_file(source_path).await {
            warn!(
                source = source_path,
                destination = destination_path,
                error = %err,
                "Copied file but could not delete source"
            );
            return Err(Error::MoveIncomplete {
                source_path: source_path.to_string(),
                destination_path: destination_path.to_string(),
                reason: Box::new(err),
            });
        }
        Ok(bytes)
    }

    /// Stream one file across providers and return its size.
    async fn stream_file(
        &self,
        src: &dyn StorageProvider,
        dst: &dyn StorageProvider,
        source_path: &str,
        destination_path: &str,
    ) -> Result<u64> {
        let stream = src.read_stream(source_path).await.inspect_err(|err| {
            debug!(source = source_path, error = %err, "Could not open source for reading");
        })?;
        dst.write_stream(destination_path, stream)
            .await
            .inspect_err(|err| {
                debug!(destination = destination_path, error = %err, "Could not write destination");
            })?;

        // Size is only used for progress; a failed lookup counts as zero bytes.
        match src.metadata(source_path).await {
            Ok(metadata) => Ok(metadata.length),
            Err(err) => {
                debug!(source = source_path, error = %err, "Metadata unavailable after copy");
                Ok(0)
            }
        }
    }
}

/// Map a source path below `source_root` onto `destination_root`.
///
/// A listed item outside `source_root` means the provider's listing is
/// inconsistent; it is reported instead of being copied somewhere arbitrary.
fn translate(item: &str, source_root: &str, destination_root: &str) -> Result<String> {
    let relative = path::relative_to(item, source_root).ok_or_else(|| {
        Error::FileSystem(format!(
            "Listed path '{}' is not below '{}'",
            item, source_root
        ))
    })?;
    Ok(path::join(destination_root, relative))
}

fn describe_probe(kind: &str, probe: Result<bool>) -> String {
    match probe {
        Ok(_) => format!("no {} at path", kind),
        Err(err) => format!("{} probe failed: {}", kind, err),
    }
}
