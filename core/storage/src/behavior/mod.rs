//! Behavior pipeline: decorators composed around a provider.
//!
//! A behavior is a factory `(inner, context) -> outer`. Applying a list of
//! behaviors wraps the base provider once per entry, in order, so the last
//! behavior is the outermost layer a caller talks to:
//!
//! ```text
//! caller ─► behaviors[n-1] ─► … ─► behaviors[0] ─► base provider
//! ```

pub mod caching;
pub mod logging;
pub mod retry;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use polystore_common::{Error, Result};

use crate::context::ProviderContext;
use crate::provider::StorageProvider;

pub use caching::{CacheSettings, CachingProvider};
pub use logging::LoggingProvider;
pub use retry::RetryProvider;

/// Factory wrapping one provider in another.
///
/// Returning `None` is a configuration fault; a decorator must produce a
/// provider.
pub type BehaviorFactory = Arc<
    dyn Fn(Arc<dyn StorageProvider>, &ProviderContext) -> Option<Arc<dyn StorageProvider>>
        + Send
        + Sync,
>;

/// Wrap a closure as a behavior factory.
pub fn behavior<F>(factory: F) -> BehaviorFactory
where
    F: Fn(Arc<dyn StorageProvider>, &ProviderContext) -> Option<Arc<dyn StorageProvider>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(factory)
}

/// Behavior logging every capability call.
pub fn logging() -> BehaviorFactory {
    behavior(|inner, _ctx| Some(Arc::new(LoggingProvider::new(inner)) as Arc<dyn StorageProvider>))
}

/// Behavior retrying transient failures with the context's retry policy.
pub fn retry() -> BehaviorFactory {
    behavior(|inner, ctx| {
        Some(Arc::new(RetryProvider::new(inner, ctx.retry.clone())) as Arc<dyn StorageProvider>)
    })
}

/// Behavior caching metadata and existence lookups.
pub fn caching() -> BehaviorFactory {
    behavior(|inner, ctx| {
        Some(Arc::new(CachingProvider::new(inner, ctx.cache.clone())) as Arc<dyn StorageProvider>)
    })
}

/// Built-in behaviors selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Logging,
    Retry,
    Caching,
}

impl BehaviorKind {
    pub fn factory(self) -> BehaviorFactory {
        match self {
            BehaviorKind::Logging => logging(),
            BehaviorKind::Retry => retry(),
            BehaviorKind::Caching => caching(),
        }
    }
}

/// Apply behaviors to a base provider in order.
///
/// # Errors
/// - `InvalidBehavior` if any factory returns no provider
pub fn compose(
    name: &str,
    base: Arc<dyn StorageProvider>,
    behaviors: &[BehaviorFactory],
    ctx: &ProviderContext,
) -> Result<Arc<dyn StorageProvider>> {
    let mut current = base;
    for (index, factory) in behaviors.iter().enumerate() {
        current = factory(current, ctx).ok_or_else(|| {
            Error::InvalidBehavior(format!(
                "Behavior #{} for provider '{}' produced no instance",
                index, name
            ))
        })?;
    }
    if !behaviors.is_empty() {
        debug!(provider = name, layers = behaviors.len(), "Composed provider behaviors");
    }
    Ok(current)
}
