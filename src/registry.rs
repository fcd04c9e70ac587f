//! Named backend registry.

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::proxy::ConfigProxy;
use crate::setting::Setting;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Name policies resolve to when they don't name a backend.
pub const DEFAULT_BACKEND_NAME: &str = "default";

/// Defaults a backend is registered with; the lowest configuration layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendDefaults {
    pub timeout: Setting<Option<Duration>>,
    pub namespace: Setting<Option<String>>,
}

impl BackendDefaults {
    pub fn with_timeout(mut self, timeout: impl Into<Setting<Option<Duration>>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<Setting<Option<String>>>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

struct RegisteredBackend {
    backend: Arc<dyn CacheBackend>,
    defaults: ConfigProxy,
}

/// Table of named backends and their default configuration.
///
/// Shared as `Arc<BackendRegistry>` by every policy built on it. Registration
/// is meant to happen during setup; callers serialize registry changes
/// against live traffic.
///
/// # Example
///
/// ```
/// use cache_intent::backend::InMemoryBackend;
/// use cache_intent::registry::{BackendDefaults, BackendRegistry};
///
/// let registry = BackendRegistry::new();
/// registry
///     .register("default", InMemoryBackend::new(), BackendDefaults::default())
///     .unwrap();
/// assert!(registry.contains("default"));
/// ```
#[derive(Default)]
pub struct BackendRegistry {
    entries: DashMap<String, RegisteredBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under a new name.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateBackend` if `name` is taken.
    pub fn register<B>(
        &self,
        name: impl Into<String>,
        backend: B,
        defaults: BackendDefaults,
    ) -> Result<()>
    where
        B: CacheBackend + 'static,
    {
        let name = name.into();
        match self.entries.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::DuplicateBackend(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Self::registration(&name, Arc::new(backend), defaults));
                info!("✓ Registered cache backend '{}'", name);
                Ok(())
            }
        }
    }

    /// Register a backend, silently replacing any existing one.
    pub fn replace<B>(&self, name: impl Into<String>, backend: B, defaults: BackendDefaults)
    where
        B: CacheBackend + 'static,
    {
        let name = name.into();
        let entry = Self::registration(&name, Arc::new(backend), defaults);
        if self.entries.insert(name.clone(), entry).is_some() {
            info!("✓ Replaced cache backend '{}'", name);
        } else {
            info!("✓ Registered cache backend '{}'", name);
        }
    }

    fn registration(
        name: &str,
        backend: Arc<dyn CacheBackend>,
        defaults: BackendDefaults,
    ) -> RegisteredBackend {
        let defaults = ConfigProxy::new(name)
            .with_timeout(defaults.timeout)
            .with_namespace(defaults.namespace)
            .into_merged();
        RegisteredBackend { backend, defaults }
    }

    /// # Errors
    ///
    /// Returns `Error::UnconfiguredBackend` if `name` isn't registered.
    pub fn deregister(&self, name: &str) -> Result<()> {
        self.entries
            .remove(name)
            .map(|_| info!("✓ Deregistered cache backend '{}'", name))
            .ok_or_else(|| Error::UnconfiguredBackend(name.to_string()))
    }

    /// Names currently registered, in no particular order.
    pub fn registered_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Merged proxy holding the defaults `name` was registered with.
    pub fn get_default_proxy(&self, name: &str) -> Result<ConfigProxy> {
        self.entries
            .get(name)
            .map(|e| e.defaults.clone())
            .ok_or_else(|| Error::UnconfiguredBackend(name.to_string()))
    }

    pub fn backend(&self, name: &str) -> Result<Arc<dyn CacheBackend>> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.backend))
            .ok_or_else(|| Error::UnconfiguredBackend(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registration. Policies built on this registry fail with
    /// `UnconfiguredBackend` afterwards.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        warn!("⚠ Cleared {} cache backend registration(s)", count);
    }
}
