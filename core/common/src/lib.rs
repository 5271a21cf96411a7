//! Common utilities and types shared across Polystore crates.
//!
//! This module provides the error taxonomy, file metadata and the path
//! conventions every storage provider follows.

pub mod error;
pub mod path;
pub mod types;

pub use error::{Error, ItemFailure, Result};
pub use types::FileMetadata;
