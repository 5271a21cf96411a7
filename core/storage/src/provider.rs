//! Storage provider trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;

use polystore_common::{FileMetadata, Result};

/// Byte stream type for read/write operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Build a single-chunk stream from an in-memory buffer.
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a stream into a contiguous buffer.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

/// Runtime capability a provider instance may exhibit.
///
/// Decorators report the capabilities of their inner provider plus the
/// one they add, so a lookup sees through any behavior chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Data lives only for the lifetime of the process.
    InMemory,
    /// Data is persisted on a local filesystem.
    LocalFilesystem,
    /// Data lives on a remote service.
    Remote,
    /// Calls are logged.
    Logging,
    /// Transient failures are retried.
    Retry,
    /// Lookups are served from a cache.
    Caching,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::InMemory => "in-memory",
            Capability::LocalFilesystem => "local-filesystem",
            Capability::Remote => "remote",
            Capability::Logging => "logging",
            Capability::Retry => "retry",
            Capability::Caching => "caching",
        };
        f.write_str(name)
    }
}

/// Storage provider trait for different backends.
///
/// Paths are provider-relative and `/`-separated (see
/// [`polystore_common::path`]). All operations are async; file contents move
/// through [`ByteStream`]s so large files never need to be buffered whole.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Whether this instance exhibits the given capability.
    fn supports(&self, capability: Capability) -> bool;

    /// Check whether a file exists at `path`.
    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Check whether a directory exists at `path`.
    async fn directory_exists(&self, path: &str) -> Result<bool>;

    /// Open a file for reading.
    ///
    /// # Errors
    /// - File not found
    /// - Path is a directory
    async fn read_stream(&self, path: &str) -> Result<ByteStream>;

    /// Write a file from a stream, overwriting any existing file.
    ///
    /// # Preconditions
    /// - Parent directory must exist
    ///
    /// # Postconditions
    /// - File holds exactly the bytes yielded by `stream`
    async fn write_stream(&self, path: &str, stream: ByteStream) -> Result<FileMetadata>;

    /// Read a whole file into memory.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        collect_stream(self.read_stream(path).await?).await
    }

    /// Write a whole buffer as a file.
    async fn write_file(&self, path: &str, data: Vec<u8>) -> Result<FileMetadata> {
        self.write_stream(path, stream_from_bytes(data)).await
    }

    /// Delete a file.
    ///
    /// # Errors
    /// - File not found
    /// - Path is a directory
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Create a directory and any missing parents.
    ///
    /// Succeeds if the directory already exists.
    async fn create_directory(&self, path: &str) -> Result<()>;

    /// List subdirectory paths under `path`.
    ///
    /// With `recursive`, every descendant directory (empty ones included) is
    /// returned.
    async fn list_directories(&self, path: &str, recursive: bool) -> Result<Vec<String>>;

    /// List file paths under `path` whose name matches `pattern`.
    ///
    /// An empty pattern or `*` matches every file.
    async fn list_files(&self, path: &str, pattern: &str, recursive: bool)
        -> Result<Vec<String>>;

    /// Fetch fresh metadata for a file.
    async fn metadata(&self, path: &str) -> Result<FileMetadata>;

    /// Update the mutable parts of a file's metadata (modification time).
    async fn set_metadata(&self, metadata: &FileMetadata) -> Result<()>;
}
