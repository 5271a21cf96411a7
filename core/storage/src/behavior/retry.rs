//! Retry decorator.

use async_trait::async_trait;
use std::sync::Arc;

use polystore_common::{FileMetadata, Result};

use crate::provider::{ByteStream, Capability, StorageProvider};
use crate::retry::{RetryConfig, RetryExecutor};

/// Retries transient failures of the inner provider with exponential backoff.
///
/// `write_stream` is forwarded once: the stream is consumed by the first
/// attempt. `write_file` owns its buffer and is retried.
pub struct RetryProvider {
    inner: Arc<dyn StorageProvider>,
    executor: RetryExecutor,
    name: String,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn StorageProvider>, config: RetryConfig) -> Self {
        let name = format!("retry({})", inner.name());
        Self {
            inner,
            executor: RetryExecutor::new(config),
            name,
        }
    }
}

#[async_trait]
impl StorageProvider for RetryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Retry || self.inner.supports(capability)
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.executor.execute("file_exists", path, || self.inner.file_exists(path)).await
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        self.executor.execute("directory_exists", path, || self.inner.directory_exists(path)).await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        self.executor.execute("read_stream", path, || self.inner.read_stream(path)).await
    }

    async fn write_stream(&self, path: &str, stream: ByteStream) -> Result<FileMetadata> {
        self.inner.write_stream(path, stream).await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.executor.execute("read_file", path, || self.inner.read_file(path)).await
    }

    async fn write_file(&self, path: &str, data: Vec<u8>) -> Result<FileMetadata> {
        self.executor.execute("write_file", path, || self.inner.write_file(path, data.clone()))
            .await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.executor.execute("delete_file", path, || self.inner.delete_file(path)).await
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        self.executor.execute("create_directory", path, || self.inner.create_directory(path)).await
    }

    async fn list_directories(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        self.executor
            .execute(
                "list_directories",
                path,
                || self.inner.list_directories(path, recursive),
            )
            .await
    }

    async fn list_files(&self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>> {
        self.executor
            .execute(
                "list_files",
                path,
                || self.inner.list_files(path, pattern, recursive),
            )
            .await
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata> {
        self.executor.execute("metadata", path, || self.inner.metadata(path)).await
    }

    async fn set_metadata(&self, metadata: &FileMetadata) -> Result<()> {
        self.executor
            .execute(
                "set_metadata",
                &metadata.path,
                || self.inner.set_metadata(metadata),
            )
            .await
    }
}
