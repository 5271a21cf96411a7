//! Storage provider abstraction for Polystore.
//!
//! This module provides a trait-based interface for different storage backends
//! (local filesystem, in-memory, cloud), a behavior pipeline for decorating
//! providers with cross-cutting concerns, and a provider registry for named,
//! lifetime-aware provider resolution.
//!
//! # Design Principles
//! - Provider isolation: transfer and rendering code only sees [`StorageProvider`]
//! - Composition over inheritance: behaviors wrap exactly one inner provider
//! - Async operations: all I/O operations are async
//! - Streaming support: file contents move as [`ByteStream`]s
//! - Unified error semantics: every provider reports [`polystore_common::Error`]

pub mod behavior;
pub mod config;
pub mod context;
pub mod local;
pub mod memory;
pub mod pattern;
pub mod provider;
pub mod registry;
pub mod retry;

pub use behavior::{BehaviorFactory, BehaviorKind, CacheSettings};
pub use config::{ProviderKind, ProviderSpec, RegistryConfig};
pub use context::ProviderContext;
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use pattern::SearchPattern;
pub use provider::{ByteStream, Capability, StorageProvider};
pub use registry::{Lifetime, ProviderBuilder, ProviderFactory, ProviderRegistry};
pub use retry::{RetryConfig, RetryExecutor};
