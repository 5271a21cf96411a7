//! Transfer engine and directory tree rendering for Polystore.
//!
//! Everything here works against `&dyn StorageProvider`, so source and
//! destination may be any pair of providers resolved from a registry.

mod guard;

pub mod engine;
pub mod progress;
pub mod render;
pub mod tree;

pub use engine::{TransferEngine, TransferTask};
pub use progress::{ProgressReport, ProgressSink, TransferSummary};
pub use render::{format_size, HtmlTreeRenderer, TextTreeRenderer, TreeRenderer};
pub use tree::{DirectoryNode, DirectoryTreeWalker, TreeNode};
