//! Caching decorator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use polystore_common::{path, FileMetadata, Result};

use crate::provider::{ByteStream, Capability, StorageProvider};

/// Cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// How long an entry stays valid, in milliseconds.
    pub ttl_ms: u64,
    /// Upper bound on cached entries; the cache is cleared when exceeded.
    pub max_entries: usize,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Probe {
    File,
    Directory,
}

#[derive(Default)]
struct CacheState {
    metadata: HashMap<String, (FileMetadata, Instant)>,
    existence: HashMap<(String, Probe), (bool, Instant)>,
    /// Bumped on every invalidation. A lookup started under an older
    /// generation may have raced a write and is not stored.
    generation: u64,
}

impl CacheState {
    fn len(&self) -> usize {
        self.metadata.len() + self.existence.len()
    }

    fn forget(&mut self, key: &str) {
        self.generation += 1;
        self.metadata.remove(key);
        self.existence.retain(|(cached, _), _| cached != key);
    }
}

/// Serves metadata and existence lookups from a TTL cache.
///
/// Writes, deletes and metadata updates made through this provider
/// invalidate the affected path. Listings and contents are never cached.
pub struct CachingProvider {
    inner: Arc<dyn StorageProvider>,
    settings: CacheSettings,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    name: String,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn StorageProvider>, settings: CacheSettings) -> Self {
        let name = format!("caching({})", inner.name());
        Self {
            inner,
            settings,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            name,
        }
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, stored: Instant) -> bool {
        stored.elapsed() < self.settings.ttl()
    }

    fn make_room(&self, state: &mut CacheState) {
        if state.len() >= self.settings.max_entries {
            debug!(provider = %self.name, entries = state.len(), "Cache full, clearing");
            state.metadata.clear();
            state.existence.clear();
        }
    }

    /// Store `insert` unless an invalidation happened since `generation`.
    fn store<F>(&self, path: &str, generation: u64, insert: F)
    where
        F: FnOnce(&mut CacheState),
    {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(provider = %self.name, path, "Lookup raced an invalidation, not caching");
            return;
        }
        self.make_room(&mut state);
        insert(&mut *state);
    }

    async fn probe(&self, path: &str, probe: Probe) -> Result<bool> {
        let key = (path::normalize(path), probe);
        let (cached, generation) = {
            let state = self.lock();
            (state.existence.get(&key).copied(), state.generation)
        };
        if let Some((exists, stored)) = cached {
            if self.is_fresh(stored) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(exists);
            }
        }

        let exists = match probe {
            Probe::File => self.inner.file_exists(path).await?,
            Probe::Directory => self.inner.directory_exists(path).await?,
        };

        self.store(path, generation, |state| {
            state.existence.insert(key, (exists, Instant::now()));
        });
        Ok(exists)
    }

    fn invalidate(&self, path: &str) {
        self.lock().forget(&path::normalize(path));
    }
}

#[async_trait]
impl StorageProvider for CachingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::Caching || self.inner.supports(capability)
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.probe(path, Probe::File).await
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        self.probe(path, Probe::Directory).await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        self.inner.read_stream(path).await
    }

    async fn write_stream(&self, path: &str, stream: ByteStream) -> Result<FileMetadata> {
        self.invalidate(path);
        let result = self.inner.write_stream(path, stream).await;
        self.invalidate(path);
        result
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let result = self.inner.delete_file(path).await;
        self.invalidate(path);
        result
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let result = self.inner.create_directory(path).await;
        // Missing ancestors may have been created as well.
        let mut state = self.lock();
        state.generation += 1;
        state
            .existence
            .retain(|(_, probe), (exists, _)| *probe != Probe::Directory || *exists);
        drop(state);
        result
    }

    async fn list_directories(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        self.inner.list_directories(path, recursive).await
    }

    async fn list_files(&self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>> {
        self.inner.list_files(path, pattern, recursive).await
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let key = path::normalize(path);
        let (cached, generation) = {
            let state = self.lock();
            (state.metadata.get(&key).cloned(), state.generation)
        };
        if let Some((metadata, stored)) = cached {
            if self.is_fresh(stored) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(metadata);
            }
        }

        let metadata = self.inner.metadata(path).await?;

        let stored = metadata.clone();
        self.store(path, generation, |state| {
            state.metadata.insert(key, (stored, Instant::now()));
        });
        Ok(metadata)
    }

    async fn set_metadata(&self, metadata: &FileMetadata) -> Result<()> {
        let result = self.inner.set_metadata(metadata).await;
        self.invalidate(&metadata.path);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    /// Memory provider whose first `file_exists` answer is held back until
    /// `release` is notified.
    struct HeldProbe {
        inner: MemoryProvider,
        armed: AtomicBool,
        answered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl StorageProvider for HeldProbe {
        fn name(&self) -> &str {
            "held-probe"
        }
        fn supports(&self, capability: Capability) -> bool {
            self.inner.supports(capability)
        }
        async fn file_exists(&self, path: &str) -> Result<bool> {
            let exists = self.inner.file_exists(path).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.answered.notify_one();
                self.release.notified().await;
            }
            Ok(exists)
        }
        async fn directory_exists(&self, path: &str) -> Result<bool> {
            self.inner.directory_exists(path).await
        }
        async fn read_stream(&self, path: &str) -> Result<ByteStream> {
            self.inner.read_stream(path).await
        }
        async fn write_stream(&self, path: &str, stream: ByteStream) -> Result<FileMetadata> {
            self.inner.write_stream(path, stream).await
        }
        async fn delete_file(&self, path: &str) -> Result<()> {
            self.inner.delete_file(path).await
        }
        async fn create_directory(&self, path: &str) -> Result<()> {
            self.inner.create_directory(path).await
        }
        async fn list_directories(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
            self.inner.list_directories(path, recursive).await
        }
        async fn list_files(&self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>> {
            self.inner.list_files(path, pattern, recursive).await
        }
        async fn metadata(&self, path: &str) -> Result<FileMetadata> {
            self.inner.metadata(path).await
        }
        async fn set_metadata(&self, metadata: &FileMetadata) -> Result<()> {
            self.inner.set_metadata(metadata).await
        }
    }

    #[tokio::test]
    async fn test_metadata_is_served_from_cache() {
        let memory = Arc::new(MemoryProvider::new());
        let provider = CachingProvider::new(memory.clone(), CacheSettings::default());

        provider.write_file("a.txt", vec![1, 2, 3]).await.unwrap();
        assert_eq!(provider.metadata("a.txt").await.unwrap().length, 3);

        // Bypass the cache: the cached entry stays until invalidated.
        memory.write_file("a.txt", vec![1; 10]).await.unwrap();
        assert_eq!(provider.metadata("a.txt").await.unwrap().length, 3);
        assert_eq!(provider.hits(), 1);

        provider.write_file("a.txt", vec![1; 5]).await.unwrap();
        assert_eq!(provider.metadata("a.txt").await.unwrap().length, 5);
    }

    #[tokio::test]
    async fn test_delete_invalidates_existence() {
        let provider = CachingProvider::new(Arc::new(MemoryProvider::new()), CacheSettings::default());

        provider.write_file("a.txt", vec![1]).await.unwrap();
        assert!(provider.file_exists("a.txt").await.unwrap());
        assert!(provider.file_exists("a.txt").await.unwrap());
        assert_eq!(provider.hits(), 1);

        provider.delete_file("a.txt").await.unwrap();
        assert!(!provider.file_exists("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_directory_invalidates_negative_probe() {
        let provider = CachingProvider::new(Arc::new(MemoryProvider::new()), CacheSettings::default());

        assert!(!provider.directory_exists("a").await.unwrap());
        provider.create_directory("a/b").await.unwrap();
        assert!(provider.directory_exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_overtaken_by_write_is_not_cached() {
        let held = Arc::new(HeldProbe {
            inner: MemoryProvider::new(),
            armed: AtomicBool::new(true),
            answered: Notify::new(),
            release: Notify::new(),
        });
        let provider = CachingProvider::new(held.clone(), CacheSettings::default());

        let lookup = provider.file_exists("a.txt");
        let writer = async {
            held.answered.notified().await;
            provider.write_file("a.txt", vec![1]).await.unwrap();
            held.release.notify_one();
        };
        let (in_flight, ()) = tokio::join!(lookup, writer);

        assert!(!in_flight.unwrap());
        assert!(provider.file_exists("a.txt").await.unwrap());
        assert_eq!(provider.hits(), 0);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let memory = Arc::new(MemoryProvider::new());
        let settings = CacheSettings {
            ttl_ms: 0,
            ..CacheSettings::default()
        };
        let provider = CachingProvider::new(memory.clone(), settings);

        memory.write_file("a.txt", vec![1]).await.unwrap();
        provider.metadata("a.txt").await.unwrap();
        memory.write_file("a.txt", vec![1, 2]).await.unwrap();

        assert_eq!(provider.metadata("a.txt").await.unwrap().length, 2);
        assert_eq!(provider.hits(), 0);
    }
}
