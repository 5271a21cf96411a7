//! Collaborators handed to provider and behavior factories.

use crate::behavior::caching::CacheSettings;
use crate::retry::RetryConfig;

/// Explicit configuration passed to every factory a registry runs.
///
/// Factories never look anything up globally; whatever a base provider or a
/// behavior needs is carried here.
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    /// Retry policy used by the retry behavior.
    pub retry: RetryConfig,
    /// Cache policy used by the caching behavior.
    pub cache: CacheSettings,
}

impl ProviderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }
}
