//! In-memory storage provider for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use polystore_common::{path, Error, FileMetadata, Result};

use crate::pattern::SearchPattern;
use crate::provider::{collect_stream, ByteStream, Capability, StorageProvider};

/// Chunk size used when streaming file contents out.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Bytes,
        modified: DateTime<Utc>,
    },
    Directory,
}

/// In-memory storage provider.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Keys are normalized paths; the empty key is the root.
pub struct MemoryProvider {
    storage: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        let mut storage = HashMap::new();
        storage.insert(String::new(), Entry::Directory);

        Self {
            storage: Arc::new(RwLock::new(storage)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.storage.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.storage.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Keys directly or transitively below `dir`, filtered by `keep`.
    fn children<F>(&self, dir: &str, recursive: bool, keep: F) -> Result<Vec<String>>
    where
        F: Fn(&str, &Entry) -> bool,
    {
        let key = path::normalize(dir);
        let storage = self.read();

        match storage.get(&key) {
            Some(Entry::Directory) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::FileSystem(format!("Not a directory: {}", dir)));
            }
            None => return Err(Error::NotFound(format!("Directory not found: {}", dir))),
        }

        let mut results: Vec<String> = storage
            .iter()
            .filter_map(|(entry_key, entry)| {
                let relative = relative_key(entry_key, &key)?;
                if !recursive && relative.contains('/') {
                    return None;
                }
                keep(entry_key, entry).then(|| entry_key.clone())
            })
            .collect();
        results.sort();
        Ok(results)
    }
}

/// Remainder of `entry_key` below `dir_key`, matched case-sensitively like
/// every other key lookup. `None` for `dir_key` itself and for unrelated keys.
fn relative_key<'a>(entry_key: &'a str, dir_key: &str) -> Option<&'a str> {
    if dir_key.is_empty() {
        return (!entry_key.is_empty()).then_some(entry_key);
    }
    entry_key.strip_prefix(dir_key)?.strip_prefix('/')
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::InMemory
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let key = path::normalize(path);
        Ok(matches!(self.read().get(&key), Some(Entry::File { .. })))
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let key = path::normalize(path);
        Ok(matches!(self.read().get(&key), Some(Entry::Directory)))
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let key = path::normalize(path);
        let data = match self.read().get(&key) {
            Some(Entry::File { data, .. }) => data.clone(),
            Some(Entry::Directory) => {
                return Err(Error::FileSystem(format!("Cannot read directory: {}", path)));
            }
            None => return Err(Error::NotFound(format!("File not found: {}", path))),
        };

        let chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(READ_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + READ_CHUNK_SIZE).min(data.len()))))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn write_stream(&self, path: &str, stream: ByteStream) -> Result<FileMetadata> {
        let key = path::normalize(path);
        if key.is_empty() {
            return Err(Error::InvalidArgument("Cannot write to the root".to_string()));
        }

        let parent_key = path::parent(&key).unwrap_or("");
        match self.read().get(parent_key) {
            Some(Entry::Directory) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::FileSystem(format!("Parent is a file: {}", parent_key)));
            }
            None => {
                return Err(Error::NotFound(format!(
                    "Parent directory not found: {}",
                    parent_key
                )));
            }
        }

        let data = collect_stream(stream).await?;
        let modified = Utc::now();
        let metadata = FileMetadata::new(key.clone(), data.len() as u64).with_last_modified(modified);

        let mut storage = self.write();
        if let Some(Entry::Directory) = storage.get(&key) {
            return Err(Error::FileSystem(format!("Path is a directory: {}", path)));
        }
        storage.insert(
            key,
            Entry::File {
                data: Bytes::from(data),
                modified,
            },
        );

        Ok(metadata)
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let key = path::normalize(path);
        let mut storage = self.write();

        match storage.get(&key) {
            Some(Entry::File { .. }) => {
                storage.remove(&key);
                Ok(())
            }
            Some(Entry::Directory) => Err(Error::FileSystem(format!(
                "Cannot delete directory as file: {}",
                path
            ))),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let key = path::normalize(path);
        let mut storage = self.write();

        let mut current = String::new();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            current = path::join(&current, segment);
            match storage.get(&current) {
                Some(Entry::Directory) => {}
                Some(Entry::File { .. }) => {
                    return Err(Error::FileSystem(format!("Path is a file: {}", current)));
                }
                None => {
                    storage.insert(current.clone(), Entry::Directory);
                }
            }
        }
        Ok(())
    }

    async fn list_directories(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        self.children(path, recursive, |_, entry| matches!(entry, Entry::Directory))
    }

    async fn list_files(&self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>> {
        let pattern = SearchPattern::new(pattern)?;
        self.children(path, recursive, |key, entry| {
            matches!(entry, Entry::File { .. }) && pattern.matches(path::file_name(key))
        })
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let key = path::normalize(path);
        match self.read().get(&key) {
            Some(Entry::File { data, modified }) => {
                Ok(FileMetadata::new(key.clone(), data.len() as u64).with_last_modified(*modified))
            }
            Some(Entry::Directory) => Ok(FileMetadata::new(key.clone(), 0)),
            None => Err(Error::NotFound(format!("Path not found: {}", path))),
        }
    }

    async fn set_metadata(&self, metadata: &FileMetadata) -> Result<()> {
        let key = path::normalize(&metadata.path);
        let mut storage = self.write();
        match storage.get_mut(&key) {
            Some(Entry::File { modified, .. }) => {
                if let Some(last_modified) = metadata.last_modified {
                    *modified = last_modified;
                }
                Ok(())
            }
            Some(Entry::Directory) => Err(Error::FileSystem(format!(
                "Cannot set file metadata on directory: {}",
                metadata.path
            ))),
            None => Err(Error::NotFound(format!("File not found: {}", metadata.path))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_write_read() {
        let provider = MemoryProvider::new();
        let data = b"Hello, World!".to_vec();

        provider.write_file("test.txt", data.clone()).await.unwrap();
        let read = provider.read_file("/test.txt").await.unwrap();

        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_large_file_is_chunked() {
        let provider = MemoryProvider::new();
        let data = vec![7u8; READ_CHUNK_SIZE * 2 + 10];
        provider.write_file("big.bin", data.clone()).await.unwrap();

        use futures::StreamExt;
        let chunks: Vec<_> = provider.read_stream("big.bin").await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(provider.read_file("big.bin").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_exists() {
        let provider = MemoryProvider::new();

        assert!(!provider.file_exists("test.txt").await.unwrap());
        provider.write_file("test.txt", vec![1, 2, 3]).await.unwrap();
        assert!(provider.file_exists("test.txt").await.unwrap());
        assert!(!provider.directory_exists("test.txt").await.unwrap());
        assert!(provider.directory_exists("").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let provider = MemoryProvider::new();
        let err = provider.write_file("missing/a.txt", vec![1]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let provider = MemoryProvider::new();
        provider.write_file("test.txt", vec![1, 2, 3]).await.unwrap();

        provider.delete_file("test.txt").await.unwrap();
        assert!(!provider.file_exists("test.txt").await.unwrap());
        assert!(provider.delete_file("test.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_create_directory_creates_parents() {
        let provider = MemoryProvider::new();

        provider.create_directory("a/b/c").await.unwrap();
        provider.create_directory("a/b").await.unwrap();

        assert!(provider.directory_exists("a").await.unwrap());
        assert!(provider.directory_exists("a/b/c").await.unwrap());
    }

    #[tokio::test]
    async fn test_list() {
        let provider = MemoryProvider::new();
        provider.create_directory("dir/sub/deeper").await.unwrap();
        provider.create_directory("dir/empty").await.unwrap();
        provider.write_file("dir/file1.txt", vec![1]).await.unwrap();
        provider.write_file("dir/file2.md", vec![2]).await.unwrap();
        provider.write_file("dir/sub/file3.txt", vec![3]).await.unwrap();

        let dirs = provider.list_directories("dir", false).await.unwrap();
        assert_eq!(dirs, vec!["dir/empty", "dir/sub"]);

        let all_dirs = provider.list_directories("dir", true).await.unwrap();
        assert_eq!(all_dirs, vec!["dir/empty", "dir/sub", "dir/sub/deeper"]);

        let files = provider.list_files("dir", "*.txt", true).await.unwrap();
        assert_eq!(files, vec!["dir/file1.txt", "dir/sub/file3.txt"]);

        let direct = provider.list_files("dir", "", false).await.unwrap();
        assert_eq!(direct, vec!["dir/file1.txt", "dir/file2.md"]);
    }

    #[tokio::test]
    async fn test_list_keeps_case_distinct_siblings_apart() {
        let provider = MemoryProvider::new();
        provider.create_directory("data/inner").await.unwrap();
        provider.create_directory("DATA").await.unwrap();
        provider.write_file("data/mine.txt", vec![1]).await.unwrap();
        provider.write_file("DATA/other.txt", vec![2]).await.unwrap();

        assert_eq!(provider.list_directories("data", true).await.unwrap(), vec!["data/inner"]);
        assert!(provider.list_directories("DATA", false).await.unwrap().is_empty());
        assert_eq!(
            provider.list_files("data", "", true).await.unwrap(),
            vec!["data/mine.txt"]
        );
        assert_eq!(
            provider.list_files("DATA", "", true).await.unwrap(),
            vec!["DATA/other.txt"]
        );
        assert_eq!(provider.list_directories("", false).await.unwrap(), vec!["DATA", "data"]);
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let provider = MemoryProvider::new();
        provider.write_file("a.txt", vec![0; 42]).await.unwrap();

        let mut meta = provider.metadata("a.txt").await.unwrap();
        assert_eq!(meta.length, 42);

        let stamp = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        meta.last_modified = Some(stamp);
        provider.set_metadata(&meta).await.unwrap();

        assert_eq!(provider.metadata("a.txt").await.unwrap().last_modified, Some(stamp));
    }
}
