//! Registry configuration loaded from JSON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polystore_common::{Error, Result};

use crate::behavior::{BehaviorKind, CacheSettings};
use crate::context::ProviderContext;
use crate::local::LocalProvider;
use crate::memory::MemoryProvider;
use crate::provider::StorageProvider;
use crate::registry::{Lifetime, ProviderRegistry};
use crate::retry::RetryConfig;

/// Built-in back-end selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Memory,
    Local,
}

/// One provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Registration name.
    pub name: String,
    /// Back-end type.
    pub kind: ProviderKind,
    /// Root directory (required for `local`).
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub lifetime: Lifetime,
    /// Behaviors, innermost first.
    #[serde(default)]
    pub behaviors: Vec<BehaviorKind>,
}

/// Complete registry configuration.
///
/// ```json
/// {
///   "providers": [
///     { "name": "archive", "kind": "local", "root": "/srv/archive",
///       "behaviors": ["logging", "retry"] },
///     { "name": "scratch", "kind": "memory", "lifetime": "transient" }
///   ],
///   "retry": { "max_retries": 5 },
///   "cache": { "ttl_ms": 10000 }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl RegistryConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::InvalidArgument(format!("Invalid registry configuration: {}", e)))
    }

    /// Read a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&text)
    }
}

impl ProviderRegistry {
    /// Build a registry with every provider named in `config`.
    ///
    /// # Errors
    /// - `DuplicateName` for repeated names
    /// - `InvalidArgument` for a `local` provider without a root
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let context = ProviderContext::new()
            .with_retry(config.retry.clone())
            .with_cache(config.cache.clone());
        let mut registry = ProviderRegistry::with_context(context);

        for spec in &config.providers {
            let kind = spec.kind;
            let root = match (kind, &spec.root) {
                (ProviderKind::Local, None) => {
                    return Err(Error::InvalidArgument(format!(
                        "Local provider '{}' requires 'root' path",
                        spec.name
                    )));
                }
                (_, root) => root.clone(),
            };

            registry.register(spec.name.clone(), |builder| {
                builder
                    .factory(move |_ctx| {
                        let provider: Arc<dyn StorageProvider> = match (kind, &root) {
                            (ProviderKind::Local, Some(root)) => Arc::new(LocalProvider::new(root)?),
                            _ => Arc::new(MemoryProvider::new()),
                        };
                        Ok(provider)
                    })
                    .lifetime(spec.lifetime);
                for behavior in &spec.behaviors {
                    builder.behavior(behavior.factory());
                }
            })?;
        }

        Ok(registry)
    }
}
