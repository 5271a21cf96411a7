//! Local filesystem storage provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use polystore_common::{path, Error, FileMetadata, Result};

use crate::pattern::SearchPattern;
use crate::provider::{ByteStream, Capability, StorageProvider};

/// Local filesystem storage provider.
///
/// Maps provider-relative paths onto a directory tree below `root`.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Root directory on disk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a provider path to a filesystem path.
    fn to_fs_path(&self, path: &str) -> Result<PathBuf> {
        let mut fs_path = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return Err(Error::InvalidArgument(format!(
                    "Path escapes provider root: {}",
                    path
                )));
            }
            fs_path.push(segment);
        }
        Ok(fs_path)
    }

    /// Collect entries below `dir`, walking subdirectories when `recursive`.
    async fn walk(&self, dir: &str, recursive: bool, want_dirs: bool) -> Result<Vec<String>> {
        let fs_path = self.to_fs_path(dir)?;
        if !fs::metadata(&fs_path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(Error::NotFound(format!("Directory not found: {}", dir)));
        }

        let mut results = Vec::new();
        let mut pending = vec![path::normalize(dir)];

        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(self.to_fs_path(&current)?).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                let child = path::join(&current, &name);
                let is_dir = entry.file_type().await?.is_dir();
                if is_dir && recursive {
                    pending.push(child.clone());
                }
                if is_dir == want_dirs {
                    results.push(child);
                }
            }
        }

        results.sort();
        Ok(results)
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::LocalFilesystem
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let fs_path = self.to_fs_path(path)?;
        Ok(fs::metadata(&fs_path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let fs_path = self.to_fs_path(path)?;
        Ok(fs::metadata(&fs_path).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let fs_path = self.to_fs_path(path)?;

        match fs::metadata(&fs_path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(Error::FileSystem(format!("Cannot read directory: {}", path)));
            }
            Ok(_) => {}
            Err(_) => return Err(Error::NotFound(format!("File not found: {}", path))),
        }

        let file = fs::File::open(&fs_path).await?;
        let stream = ReaderStream::new(file).map_err(Error::from);
        Ok(stream.boxed())
    }

    async fn write_stream(&self, path: &str, mut stream: ByteStream) -> Result<FileMetadata> {
        let normalized = path::normalize(path);
        if normalized.is_empty() {
            return Err(Error::InvalidArgument("Cannot write to the root".to_string()));
        }
        let fs_path = self.to_fs_path(&normalized)?;

        if let Some(parent) = fs_path.parent() {
            if !fs::metadata(parent).await.map(|m| m.is_dir()).unwrap_or(false) {
                return Err(Error::NotFound(format!(
                    "Parent directory not found: {}",
                    path::parent(&normalized).unwrap_or("")
                )));
            }
        }

        let mut file = fs::File::create(&fs_path).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        let fs_meta = fs::metadata(&fs_path).await?;
        let mut metadata = FileMetadata::new(normalized, fs_meta.len());
        metadata.last_modified = to_utc(fs_meta.modified());
        Ok(metadata)
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let fs_path = self.to_fs_path(path)?;

        match fs::metadata(&fs_path).await {
            Ok(meta) if meta.is_dir() => Err(Error::FileSystem(format!(
                "Cannot delete directory as file: {}",
                path
            ))),
            Ok(_) => Ok(fs::remove_file(&fs_path).await?),
            Err(_) => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let fs_path = self.to_fs_path(path)?;
        if fs::metadata(&fs_path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(Error::FileSystem(format!("Path is a file: {}", path)));
        }
        fs::create_dir_all(&fs_path).await?;
        Ok(())
    }

    async fn list_directories(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        self.walk(path, recursive, true).await
    }

    async fn list_files(&self, path: &str, pattern: &str, recursive: bool) -> Result<Vec<String>> {
        let pattern = SearchPattern::new(pattern)?;
        let entries = self.walk(path, recursive, false).await?;
        Ok(entries
            .into_iter()
            .filter(|p| pattern.matches(path::file_name(p)))
            .collect())
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata> {
        let fs_path = self.to_fs_path(path)?;
        let fs_meta = fs::metadata(&fs_path)
            .await
            .map_err(|_| Error::NotFound(format!("Path not found: {}", path)))?;

        let length = if fs_meta.is_file() { fs_meta.len() } else { 0 };
        let mut metadata = FileMetadata::new(path::normalize(path), length);
        metadata.last_modified = to_utc(fs_meta.modified());
        Ok(metadata)
    }

    async fn set_metadata(&self, metadata: &FileMetadata) -> Result<()> {
        let fs_path = self.to_fs_path(&metadata.path)?;
        let Some(modified) = metadata.last_modified else {
            return Ok(());
        };

        let file = fs::OpenOptions::new()
            .write(true)
            .open(&fs_path)
            .await
            .map_err(|_| Error::NotFound(format!("File not found: {}", metadata.path)))?;
        file.into_std().await.set_modified(SystemTime::from(modified))?;
        Ok(())
    }
}
