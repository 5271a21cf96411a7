//! Provider registry: named configurations, lifetimes and composition.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use polystore_common::{Error, Result};

use crate::behavior::{self, compose, BehaviorFactory};
use crate::context::ProviderContext;
use crate::provider::{Capability, StorageProvider};

/// Factory function type for creating base providers.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderContext) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Caching and reuse policy of a registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// One instance for the whole registry lifetime.
    #[default]
    Singleton,
    /// Fresh instance per resolution; the caller scopes it to a unit of work.
    Scoped,
    /// Fresh instance per resolution.
    Transient,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        };
        f.write_str(name)
    }
}

/// Accumulates a provider configuration during [`ProviderRegistry::register`].
#[derive(Default)]
pub struct ProviderBuilder {
    factory: Option<ProviderFactory>,
    lifetime: Lifetime,
    behaviors: Vec<BehaviorFactory>,
}

impl ProviderBuilder {
    /// Set the base provider factory.
    pub fn factory<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(&ProviderContext) -> Result<Arc<dyn StorageProvider>> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn lifetime(&mut self, lifetime: Lifetime) -> &mut Self {
        self.lifetime = lifetime;
        self
    }

    pub fn singleton(&mut self) -> &mut Self {
        self.lifetime(Lifetime::Singleton)
    }

    pub fn scoped(&mut self) -> &mut Self {
        self.lifetime(Lifetime::Scoped)
    }

    pub fn transient(&mut self) -> &mut Self {
        self.lifetime(Lifetime::Transient)
    }

    /// Append a behavior; behaviors wrap in the order they are added.
    pub fn behavior(&mut self, behavior: BehaviorFactory) -> &mut Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn with_logging(&mut self) -> &mut Self {
        self.behavior(behavior::logging())
    }

    pub fn with_retry(&mut self) -> &mut Self {
        self.behavior(behavior::retry())
    }

    pub fn with_caching(&mut self) -> &mut Self {
        self.behavior(behavior::caching())
    }
}

/// Immutable configuration of one registered provider.
struct ProviderConfig {
    name: String,
    lifetime: Lifetime,
    factory: ProviderFactory,
    behaviors: Vec<BehaviorFactory>,
}

struct Registration {
    config: ProviderConfig,
    /// Published Singleton instance. Initialized under the read lock and
    /// replaced under the write lock by `attach_behavior`.
    singleton: RwLock<OnceCell<Arc<dyn StorageProvider>>>,
}

/// Registry for named storage provider configurations.
///
/// Resolution builds the base provider, wraps it in the configured
/// behaviors and caches the result according to its [`Lifetime`].
pub struct ProviderRegistry {
    context: ProviderContext,
    registrations: BTreeMap<String, Registration>,
}

impl ProviderRegistry {
    /// Create a new empty registry with a default context.
    pub fn new() -> Self {
        Self::with_context(ProviderContext::default())
    }

    /// Create a new empty registry whose factories receive `context`.
    pub fn with_context(context: ProviderContext) -> Self {
        Self {
            context,
            registrations: BTreeMap::new(),
        }
    }

    /// Register a provider configuration.
    ///
    /// Nothing is constructed until the name is resolved.
    ///
    /// # Errors
    /// - `DuplicateName` if `name` is empty or already registered
    /// - `InvalidArgument` if `configure` sets no factory
    pub fn register<F>(&mut self, name: impl Into<String>, configure: F) -> Result<()>
    where
        F: FnOnce(&mut ProviderBuilder),
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::DuplicateName(
                "Provider name must not be empty".to_string(),
            ));
        }
        if self.registrations.contains_key(&name) {
            return Err(Error::DuplicateName(format!(
                "Provider '{}' is already registered",
                name
            )));
        }

        let mut builder = ProviderBuilder::default();
        configure(&mut builder);
        let factory = builder.factory.ok_or_else(|| {
            Error::InvalidArgument(format!("Provider '{}' has no factory", name))
        })?;

        debug!(
            provider = %name,
            lifetime = %builder.lifetime,
            behaviors = builder.behaviors.len(),
            "Registered provider"
        );

        let config = ProviderConfig {
            name: name.clone(),
            lifetime: builder.lifetime,
            factory,
            behaviors: builder.behaviors,
        };
        self.registrations.insert(
            name,
            Registration {
                config,
                singleton: RwLock::new(OnceCell::new()),
            },
        );
        Ok(())
    }

    /// Resolve a provider by name.
    ///
    /// # Errors
    /// - `NotFound` if the name is not registered
    /// - `InvalidBehavior` if a behavior produced no provider
    /// - Any error of the base factory
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn StorageProvider>> {
        let registration = self.registration(name)?;
        self.resolve_registration(registration)
    }

    /// Resolve the single registration whose instance supports `capability`.
    ///
    /// Every registration is resolved, so Scoped and Transient providers are
    /// constructed as a side effect. Registrations that fail to build are
    /// logged and left out of the match.
    ///
    /// # Errors
    /// - `NotFound` if no instance matches
    /// - `Ambiguous` listing every matching name if more than one does
    pub fn resolve_by_capability(&self, capability: Capability) -> Result<Arc<dyn StorageProvider>> {
        let mut matches = Vec::new();
        for (name, registration) in &self.registrations {
            let instance = match self.resolve_registration(registration) {
                Ok(instance) => instance,
                Err(err) => {
                    warn!(provider = %name, error = %err, "Skipping provider that failed to build");
                    continue;
                }
            };
            if instance.supports(capability) {
                matches.push((name.clone(), instance));
            }
        }

        match matches.len() {
            0 => Err(Error::NotFound(format!(
                "No provider supports {}",
                capability
            ))),
            1 => Ok(matches.remove(0).1),
            _ => Err(Error::Ambiguous {
                capability: capability.to_string(),
                names: matches.into_iter().map(|(name, _)| name).collect(),
            }),
        }
    }

    /// Wrap already-resolved Singleton instances in one more behavior.
    ///
    /// With `Some(name)` only that registration is affected, with `None`
    /// every registration is. The cached Singleton is replaced so every
    /// resolution that returns after this call observes the new
    /// composition; a resolution still building the instance finishes
    /// first and its result is the one that gets wrapped. Scoped and Transient
    /// registrations are rebuilt on every resolution and stay unaffected.
    ///
    /// # Errors
    /// - `NotFound` if a specific name is not registered
    /// - `InvalidBehavior` if the behavior produced no provider
    pub fn attach_behavior(&self, name: Option<&str>, behavior: BehaviorFactory) -> Result<()> {
        let targets: Vec<&Registration> = match name {
            Some(name) => vec![self.registration(name)?],
            None => self.registrations.values().collect(),
        };

        for registration in targets {
            let config = &registration.config;
            if config.lifetime != Lifetime::Singleton {
                debug!(
                    provider = %config.name,
                    lifetime = %config.lifetime,
                    "Skipping behavior attachment for non-singleton provider"
                );
                continue;
            }

            let mut slot = registration
                .singleton
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let current = slot.get_or_try_init(|| self.build(config))?.clone();
            let wrapped = behavior(current, &self.context).ok_or_else(|| {
                Error::InvalidBehavior(format!(
                    "Attached behavior for provider '{}' produced no instance",
                    config.name
                ))
            })?;
            *slot = OnceCell::with_value(wrapped);
            info!(provider = %config.name, "Attached behavior to provider");
        }
        Ok(())
    }

    /// Get the registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.registrations.keys().cloned().collect()
    }

    /// Check if a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    /// Lifetime of a registered provider.
    pub fn lifetime_of(&self, name: &str) -> Option<Lifetime> {
        self.registrations.get(name).map(|r| r.config.lifetime)
    }

    /// Context handed to every factory.
    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    fn registration(&self, name: &str) -> Result<&Registration> {
        self.registrations
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Provider '{}' is not registered", name)))
    }

    fn resolve_registration(&self, registration: &Registration) -> Result<Arc<dyn StorageProvider>> {
        match registration.config.lifetime {
            Lifetime::Singleton => {
                let slot = registration
                    .singleton
                    .read()
                    .unwrap_or_else(|e| e.into_inner());
                let instance = slot.get_or_try_init(|| self.build(&registration.config))?;
                Ok(instance.clone())
            }
            Lifetime::Scoped | Lifetime::Transient => self.build(&registration.config),
        }
    }

    fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn StorageProvider>> {
        debug!(provider = %config.name, lifetime = %config.lifetime, "Building provider");
        let base = (config.factory)(&self.context)?;
        compose(&config.name, base, &config.behaviors, &self.context)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::LoggingProvider;
    use crate::memory::MemoryProvider;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn memory(builder: &mut ProviderBuilder) {
        builder.factory(|_| Ok(Arc::new(MemoryProvider::new())));
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProviderRegistry::new();
        registry.register("test", memory).unwrap();

        let provider = registry.resolve("test").unwrap();
        assert_eq!(provider.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ProviderRegistry::new();
        registry.register("test", memory).unwrap();

        let result = registry.register("test", |b| {
            b.factory(|_| Ok(Arc::new(MemoryProvider::new()))).transient();
        });
        assert!(matches!(result, Err(Error::DuplicateName(_))));
    }

    #[test]
    fn test_empty_name_fails() {
        let mut registry = ProviderRegistry::new();
        assert!(matches!(registry.register("  ", memory), Err(Error::DuplicateName(_))));
    }

    #[test]
    fn test_missing_factory_fails() {
        let mut registry = ProviderRegistry::new();
        let result = registry.register("empty", |b| {
            b.transient();
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(!registry.contains("empty"));
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProviderRegistry::new();
        assert!(matches!(registry.resolve("unknown"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_singleton_identity_and_transient_distinctness() {
        let mut registry = ProviderRegistry::new();
        registry.register("single", memory).unwrap();
        registry
            .register("fresh", |b| {
                memory(b);
                b.transient();
            })
            .unwrap();

        let a = registry.resolve("single").unwrap();
        let b = registry.resolve("single").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = registry.resolve("fresh").unwrap();
        let d = registry.resolve("fresh").unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
        assert_eq!(c.name(), d.name());
    }

    #[test]
    fn test_scoped_is_rebuilt_per_resolution() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("scoped", |b| {
                memory(b);
                b.scoped();
            })
            .unwrap();

        let a = registry.resolve("scoped").unwrap();
        let b = registry.resolve("scoped").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.lifetime_of("scoped"), Some(Lifetime::Scoped));
    }

    #[test]
    fn test_concurrent_singleton_is_built_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();

        let mut registry = ProviderRegistry::new();
        registry
            .register("shared", move |b| {
                b.factory(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    Ok(Arc::new(MemoryProvider::new()))
                });
            })
            .unwrap();

        let instances: Vec<Arc<dyn StorageProvider>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.resolve("shared").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_behaviors_wrap_in_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("layered", |b| {
                memory(b);
                b.with_logging().with_retry().with_caching();
            })
            .unwrap();

        let provider = registry.resolve("layered").unwrap();
        assert_eq!(provider.name(), "caching(retry(logging(memory)))");
    }

    #[test]
    fn test_absent_behavior_is_fatal() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("broken", |b| {
                memory(b);
                b.behavior(behavior::behavior(|_, _| None));
            })
            .unwrap();

        assert!(matches!(registry.resolve("broken"), Err(Error::InvalidBehavior(_))));
    }

    #[test]
    fn test_resolve_by_capability() {
        let mut registry = ProviderRegistry::new();
        registry.register("mem", memory).unwrap();
        registry
            .register("logged", |b| {
                memory(b);
                b.with_logging();
            })
            .unwrap();

        let logged = registry.resolve_by_capability(Capability::Logging).unwrap();
        assert_eq!(logged.name(), "logging(memory)");

        let missing = registry.resolve_by_capability(Capability::Remote);
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_resolve_by_capability_lists_every_match() {
        let mut registry = ProviderRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(name, memory).unwrap();
        }

        match registry.resolve_by_capability(Capability::InMemory) {
            Err(Error::Ambiguous { names, .. }) => assert_eq!(names, vec!["a", "b", "c"]),
            other => panic!("expected ambiguity, got {:?}", other.map(|p| p.name().to_string())),
        }
    }

    #[test]
    fn test_attach_behavior_replaces_singleton() {
        let mut registry = ProviderRegistry::new();
        registry.register("single", memory).unwrap();
        registry
            .register("fresh", |b| {
                memory(b);
                b.transient();
            })
            .unwrap();

        let before = registry.resolve("single").unwrap();
        registry
            .attach_behavior(
                None,
                behavior::behavior(|inner, _| {
                    Some(Arc::new(LoggingProvider::new(inner)) as Arc<dyn StorageProvider>)
                }),
            )
            .unwrap();

        let after = registry.resolve("single").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.name(), "logging(memory)");
        assert!(Arc::ptr_eq(&after, &registry.resolve("single").unwrap()));

        assert_eq!(registry.resolve("fresh").unwrap().name(), "memory");
    }

    #[tokio::test]
    async fn test_attach_behavior_keeps_singleton_state() {
        let mut registry = ProviderRegistry::new();
        registry.register("single", memory).unwrap();

        let before = registry.resolve("single").unwrap();
        before.write_file("kept.txt", vec![9]).await.unwrap();

        registry
            .attach_behavior(Some("single"), behavior::logging())
            .unwrap();
        let after = registry.resolve("single").unwrap();
        assert_eq!(after.read_file("kept.txt").await.unwrap(), vec![9]);
    }

    #[test]
    fn test_resolve_by_capability_skips_failing_registrations() {
        let mut registry = ProviderRegistry::new();
        registry.register("mem", memory).unwrap();
        registry
            .register("bad-root", |b| {
                b.factory(|_| Err(Error::FileSystem("Root does not exist".to_string())));
            })
            .unwrap();

        let found = registry.resolve_by_capability(Capability::InMemory).unwrap();
        assert_eq!(found.name(), "memory");

        let missing = registry.resolve_by_capability(Capability::Remote);
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_attach_behavior_waits_for_singleton_in_construction() {
        let builds = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(AtomicBool::new(false));
        let (counter, signal) = (builds.clone(), entered.clone());

        let mut registry = ProviderRegistry::new();
        registry
            .register("slow", move |b| {
                b.factory(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    signal.store(true, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    Ok(Arc::new(MemoryProvider::new()))
                });
            })
            .unwrap();

        let early = std::thread::scope(|scope| {
            let resolver = scope.spawn(|| registry.resolve("slow").unwrap());
            while !entered.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            registry.attach_behavior(Some("slow"), behavior::logging()).unwrap();
            resolver.join().unwrap()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(early.name(), "memory");
        assert_eq!(registry.resolve("slow").unwrap().name(), "logging(memory)");
    }

    #[test]
    fn test_attach_behavior_unknown_name() {
        let registry = ProviderRegistry::new();
        let result = registry.attach_behavior(Some("nope"), behavior::logging());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = ProviderRegistry::new();
        registry.register("b", memory).unwrap();
        registry.register("a", memory).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
