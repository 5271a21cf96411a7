//! Logging decorator.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use polystore_common::{FileMetadata, Result};

use crate::provider::{ByteStream, Capability, StorageProvider};

/// Logs every call made to the inner provider, with its outcome and duration.
pub struct LoggingProvider {
    inner: Arc<dyn StorageProvider>,
    name: String,
}

impl LoggingProvider {
    pub fn new(inner: Arc<dyn StorageProvider>) -> Self {
        let name = format!("logging({})", inner.name());
        Self { inner, name }
    }

    async fn observe<T, F>(&self, operation: &'static str, path: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        debug!(provider = %self.inner.name(), operation, path, "Storage call started");

        let result = call.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(
                provider = %self.inner.name(),
                operation,
                path,
                elapsed_ms,
                "Storage call completed"
            ),
            Err(err) => warn!(
                provider = %self.inner.name(),
                operation,
                path,
                elapsed_ms,
                error = %err,
                "Storage call failed"
            ),
        }
        result
    }
}

#[async_trait]
impl StorageProvider for LoggingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Logging || self.inner.supports(capability)
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.observe("file_exists", path, self.inner.file_exists(path)).await
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        self.observe("directory_exists", path, self.inner.directory_exists(path))
            .await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        self.observe("read_stream", path, self.inner.read_stream(path)).await
    }

    async fn write_stream(&self, path: &str, stream: ByteStream) -> Result<FileMetadata> {
        self.observe("write_stream", path, self.inner.write_stream(path, stream))
            .await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.observe("delete_file", path, self.inner.delete_file(path)).await
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        self.observe("create_directory", path, self.inner.create_directory(path))
            .await
    }

    async fn list_directories(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        self.observe(
            "list_directories",
            path,
            self.inner.list_directories(path, recursive),
        )
        .await
    }

    async fn list_files(&self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>> {
        self.observe(
            "list_files",
            path,
            self.inner.list_files(path, pattern, recursive),
        )
        .await
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata> {
        self.observe("metadata", path, self.inner.metadata(path)).await
    }

    async fn set_metadata(&self, metadata: &FileMetadata) -> Result<()> {
        self.observe("set_metadata", &metadata.path, self.inner.set_metadata(metadata))
            .await
    }
}
