//! Directory tree walking and rendering.
//!
//! A walk builds a [`DirectoryNode`] accumulator (sizes and file counts
//! summed bottom-up), projects it into an immutable [`TreeNode`] tree and
//! hands that to a [`TreeRenderer`] in pre-order.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use polystore_common::{path, Error, FileMetadata, Result};
use polystore_storage::StorageProvider;

use crate::guard::guarded;
use crate::render::TreeRenderer;

/// Working accumulator for one directory during a walk.
#[derive(Debug, Clone, Default)]
pub struct DirectoryNode {
    pub path: String,
    pub files: Vec<FileMetadata>,
    pub directories: Vec<DirectoryNode>,
    /// Bytes in this directory and every descendant.
    pub total_size: u64,
    /// Files in this directory and every descendant.
    pub file_count: usize,
}

impl DirectoryNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn add_file(&mut self, file: FileMetadata) {
        self.total_size += file.length;
        self.file_count += 1;
        self.files.push(file);
    }

    /// Attach a finished child, folding its totals into this node.
    pub fn add_directory(&mut self, child: DirectoryNode) {
        self.total_size += child.total_size;
        self.file_count += child.file_count;
        self.directories.push(child);
    }

    /// Project into a rendering tree: directories first, then files.
    pub fn into_tree(self) -> TreeNode {
        let name = if path::is_root(&self.path) {
            "/".to_string()
        } else {
            path::file_name(&path::normalize(&self.path)).to_string()
        };
        let mut node = self.into_node(name);
        node.is_last = true;
        node
    }

    fn into_node(self, name: String) -> TreeNode {
        let mut children: Vec<TreeNode> = self
            .directories
            .into_iter()
            .map(|dir| {
                let name = path::file_name(&dir.path).to_string();
                dir.into_node(name)
            })
            .chain(self.files.into_iter().map(|file| TreeNode {
                name: file.file_name().to_string(),
                is_directory: false,
                size: file.length,
                file_count: 1,
                is_last: false,
                children: Vec::new(),
            }))
            .collect();
        if let Some(last) = children.last_mut() {
            last.is_last = true;
        }

        TreeNode {
            name,
            is_directory: true,
            size: self.total_size,
            file_count: self.file_count,
            is_last: false,
            children,
        }
    }
}

/// Rendering-facing view of a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub is_directory: bool,
    /// File size, or the aggregated subtree size for a directory.
    pub size: u64,
    pub file_count: usize,
    /// Last among its siblings.
    pub is_last: bool,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// Walks a provider's directory structure.
#[derive(Debug, Clone, Default)]
pub struct DirectoryTreeWalker {
    cancel: CancellationToken,
}

impl DirectoryTreeWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the accumulated tree below `path`.
    ///
    /// Listing failures at a level are swallowed; that level contributes
    /// nothing. Only cancellation or a panic inside the provider aborts.
    pub async fn walk(
        &self,
        provider: &dyn StorageProvider,
        path: &str,
        skip_files: bool,
    ) -> Result<DirectoryNode> {
        let visited = AtomicUsize::new(0);
        guarded(
            "walk",
            self.build(provider, path::normalize(path), skip_files, &visited),
        )
        .await
    }

    /// Walk `path` and feed the result through `renderer`.
    ///
    /// Totals are rendered after the last node unless `skip_files` is set.
    pub async fn render_directory<R>(
        &self,
        provider: &dyn StorageProvider,
        renderer: &mut R,
        path: &str,
        skip_files: bool,
    ) -> Result<TreeNode>
    where
        R: TreeRenderer + ?Sized,
    {
        let root = self.walk(provider, path, skip_files).await?;
        let tree = root.into_tree();

        render_node(renderer, &tree, 0);
        if !skip_files {
            renderer.render_totals(tree.file_count, tree.size);
        }

        info!(
            provider = provider.name(),
            path,
            files = tree.file_count,
            bytes = tree.size,
            "Rendered directory tree"
        );
        Ok(tree)
    }

    fn build<'a>(
        &'a self,
        provider: &'a dyn StorageProvider,
        dir: String,
        skip_files: bool,
        visited: &'a AtomicUsize,
    ) -> BoxFuture<'a, Result<DirectoryNode>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    processed: visited.load(Ordering::SeqCst),
                });
            }
            let mut node = DirectoryNode::new(dir.clone());

            let listed = match provider.list_directories(&dir, false).await {
                Ok(found) => found,
                Err(err) => {
                    debug!(directory = %dir, error = %err, "Skipping unreadable directory");
                    return Ok(node);
                }
            };
            // Only direct children are descended into, so a listing can never loop.
            let mut subdirectories: Vec<String> = listed
                .iter()
                .map(|child| path::normalize(child))
                .filter(|child| {
                    let direct = !child.is_empty() && path::parent(child).unwrap_or("") == dir;
                    if !direct {
                        warn!(directory = %dir, child = %child, "Ignoring listed directory outside the walked one");
                    }
                    direct
                })
                .collect();
            subdirectories.sort_by_key(|child| path::file_name(child).to_lowercase());

            for child in subdirectories {
                let child_node = self.build(provider, child, skip_files, visited).await?;
                node.add_directory(child_node);
            }

            if !skip_files {
                let mut files = match provider.list_files(&dir, "", false).await {
                    Ok(found) => found,
                    Err(err) => {
                        debug!(directory = %dir, error = %err, "Could not list files");
                        Vec::new()
                    }
                };
                files.sort_by_key(|file| path::file_name(file).to_lowercase());

                for file in files {
                    let length = match provider.metadata(&file).await {
                        Ok(metadata) => metadata.length,
                        Err(err) => {
                            debug!(file = %file, error = %err, "Metadata unavailable, counting as empty");
                            0
                        }
                    };
                    node.add_file(FileMetadata::new(file, length));
                }
            }

            visited.fetch_add(1, Ordering::SeqCst);
            Ok(node)
        }
        .boxed()
    }
}

fn render_node<R>(renderer: &mut R, node: &TreeNode, depth: usize)
where
    R: TreeRenderer + ?Sized,
{
    renderer.render_node(node, depth);
    for child in &node.children {
        render_node(renderer, child, depth + 1);
    }
}
