//! Resolved per-operation backend configuration.

use crate::error::{Error, Result};
use crate::registry::BackendRegistry;
use crate::setting::Setting;
use std::time::Duration;

/// Fields an invocation or policy explicitly sets on top of a lower layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub backend: Option<String>,
    pub timeout: Setting<Option<Duration>>,
    pub namespace: Setting<Option<String>>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.backend.is_none() && self.timeout.is_unset() && self.namespace.is_unset()
    }
}

/// Immutable configuration record: which backend, what timeout, which key
/// namespace.
///
/// A proxy starts unmerged; [`merge_with_registry_defaults`] fills its unset
/// fields from the defaults the backend was registered with. Only merged
/// proxies talk to backends.
///
/// [`merge_with_registry_defaults`]: ConfigProxy::merge_with_registry_defaults
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigProxy {
    backend_name: String,
    timeout: Setting<Option<Duration>>,
    namespace: Setting<Option<String>>,
    merged: bool,
}

impl ConfigProxy {
    pub fn new(backend_name: impl Into<String>) -> Self {
        ConfigProxy {
            backend_name: backend_name.into(),
            timeout: Setting::Unset,
            namespace: Setting::Unset,
            merged: false,
        }
    }

    pub fn with_timeout(mut self, timeout: impl Into<Setting<Option<Duration>>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<Setting<Option<String>>>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Registry defaults are built already merged.
    pub(crate) fn into_merged(mut self) -> Self {
        self.merged = true;
        self
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn timeout(&self) -> &Setting<Option<Duration>> {
        &self.timeout
    }

    pub fn namespace(&self) -> &Setting<Option<String>> {
        &self.namespace
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// Timeout passed to `set`: unset means no expiry.
    pub fn resolved_timeout(&self) -> Option<Duration> {
        self.timeout.flatten()
    }

    /// Layer `overrides` on top of this proxy.
    ///
    /// Switching backend drops the merged flag so the result picks up the
    /// new backend's defaults for fields still unset.
    pub fn apply(&self, overrides: &Overrides) -> ConfigProxy {
        let mut proxy = self.clone();
        if let Some(backend) = &overrides.backend {
            if *backend != proxy.backend_name {
                proxy.backend_name = backend.clone();
                proxy.merged = false;
            }
        }
        proxy.timeout = overrides.timeout.or(proxy.timeout);
        proxy.namespace = overrides.namespace.clone().or(proxy.namespace);
        proxy
    }

    /// Fill unset fields from the registry defaults of this proxy's backend.
    /// Idempotent: merged proxies are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnconfiguredBackend` if the backend isn't registered.
    pub fn merge_with_registry_defaults(&self, registry: &BackendRegistry) -> Result<ConfigProxy> {
        if self.merged {
            return Ok(self.clone());
        }

        let defaults = registry.get_default_proxy(&self.backend_name)?;
        Ok(ConfigProxy {
            backend_name: self.backend_name.clone(),
            timeout: self.timeout.or(defaults.timeout),
            namespace: self.namespace.clone().or(defaults.namespace),
            merged: true,
        })
    }

    /// Check that the backend exists.
    pub fn validate(&self, registry: &BackendRegistry) -> Result<()> {
        registry.backend(&self.backend_name).map(|_| ())
    }

    pub async fn get(&self, registry: &BackendRegistry, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_merged()?;
        let backend = registry.backend(&self.backend_name)?;
        backend.get(key).await
    }

    pub async fn set(&self, registry: &BackendRegistry, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_merged()?;
        let backend = registry.backend(&self.backend_name)?;
        backend.set(key, value, self.resolved_timeout()).await
    }

    pub async fn delete(&self, registry: &BackendRegistry, key: &str) -> Result<()> {
        self.ensure_merged()?;
        let backend = registry.backend(&self.backend_name)?;
        backend.delete(key).await
    }

    fn ensure_merged(&self) -> Result<()> {
        if self.merged {
            Ok(())
        } else {
            Err(Error::ConfigError(format!(
                "proxy for cache '{}' used before merging with registry defaults",
                self.backend_name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::registry::BackendDefaults;

    fn registry_with_defaults() -> BackendRegistry {
        let registry = BackendRegistry::new();
        registry
            .register(
                "default",
                InMemoryBackend::new(),
                BackendDefaults {
                    timeout: Setting::Value(Some(Duration::from_secs(60))),
                    namespace: Setting::Value(Some("app".into())),
                },
            )
            .unwrap();
        registry
            .register("other", InMemoryBackend::new(), BackendDefaults::default())
            .unwrap();
        registry
    }

    #[test]
    fn test_merge_fills_only_unset_fields() {
        let registry = registry_with_defaults();
        let proxy = ConfigProxy::new("default")
            .with_timeout(Some(Duration::from_secs(5)))
            .merge_with_registry_defaults(&registry)
            .unwrap();

        assert!(proxy.is_merged());
        assert_eq!(proxy.resolved_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(proxy.namespace(), &Setting::Value(Some("app".to_string())));
    }

    #[test]
    fn test_explicit_none_survives_merge() {
        let registry = registry_with_defaults();
        let proxy = ConfigProxy::new("default")
            .with_timeout(None)
            .with_namespace(None)
            .merge_with_registry_defaults(&registry)
            .unwrap();
        assert_eq!(proxy.timeout(), &Setting::Value(None));
        assert_eq!(proxy.namespace(), &Setting::Value(None));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let registry = registry_with_defaults();
        let once = ConfigProxy::new("default")
            .merge_with_registry_defaults(&registry)
            .unwrap();
        let twice = once.merge_with_registry_defaults(&registry).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_unknown_backend() {
        let registry = registry_with_defaults();
        let err = ConfigProxy::new("missing")
            .merge_with_registry_defaults(&registry)
            .unwrap_err();
        assert_eq!(err, Error::UnconfiguredBackend("missing".into()));
    }

    #[test]
    fn test_backend_override_resets_merge() {
        let registry = registry_with_defaults();
        let merged = ConfigProxy::new("default")
            .merge_with_registry_defaults(&registry)
            .unwrap();

        let switched = merged.apply(&Overrides {
            backend: Some("other".into()),
            ..Default::default()
        });
        assert!(!switched.is_merged());
        assert_eq!(switched.backend_name(), "other");

        let same = merged.apply(&Overrides {
            backend: Some("default".into()),
            timeout: Setting::Value(Some(Duration::from_secs(1))),
            ..Default::default()
        });
        assert!(same.is_merged());
        assert_eq!(same.resolved_timeout(), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_unmerged_proxy_refuses_backend_calls() {
        let registry = registry_with_defaults();
        let err = ConfigProxy::new("default")
            .get(&registry, "k")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_set_applies_resolved_timeout() {
        let registry = BackendRegistry::new();
        let backend = InMemoryBackend::new();
        registry
            .register("default", backend.clone(), BackendDefaults::default())
            .unwrap();

        let proxy = ConfigProxy::new("default")
            .merge_with_registry_defaults(&registry)
            .unwrap();
        proxy.set(&registry, "k", b"v".to_vec()).await.unwrap();
        assert_eq!(backend.timeout_of("k"), Some(None));

        let proxy = proxy.apply(&Overrides {
            timeout: Setting::Value(Some(Duration::from_secs(9))),
            ..Default::default()
        });
        proxy.set(&registry, "k2", b"v".to_vec()).await.unwrap();
        assert_eq!(backend.timeout_of("k2"), Some(Some(Duration::from_secs(9))));
    }
}
