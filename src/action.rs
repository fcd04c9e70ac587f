//! An invocation bound to its resolved configuration.

use crate::args::{Binding, CallArgs, Signature, RECEIVER};
use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::key::KeyGenerator;
use crate::proxy::ConfigProxy;
use crate::registry::BackendRegistry;

/// Executes one [`Invocation`] against its backend.
///
/// The only state an action carries is its resolved proxy and the keys it
/// last rendered.
#[derive(Clone, Debug)]
pub struct CacheAction {
    invocation: Invocation,
    proxy: Option<ConfigProxy>,
    rendered: Option<(CallArgs, Vec<String>)>,
}

impl CacheAction {
    pub fn new(invocation: Invocation) -> Self {
        CacheAction {
            invocation,
            proxy: None,
            rendered: None,
        }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Resolve this action's proxy: its invocation's overrides layered on
    /// `policy_proxy`, then merged with the registry defaults of whichever
    /// backend that names. Drops memoized keys.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnconfiguredBackend` if the resolved backend isn't
    /// registered.
    pub fn bind(&mut self, policy_proxy: &ConfigProxy, registry: &BackendRegistry) -> Result<()> {
        let proxy = policy_proxy
            .apply(&self.invocation.overrides())
            .merge_with_registry_defaults(registry)?;
        self.proxy = Some(proxy);
        self.rendered = None;
        Ok(())
    }

    pub fn proxy(&self) -> Result<&ConfigProxy> {
        self.proxy.as_ref().ok_or_else(|| {
            Error::ConfigError(format!(
                "{} action used before being bound to a cache",
                self.invocation.kind()
            ))
        })
    }

    /// Render this action's keys for `args`, in declaration order.
    ///
    /// Rendering happens once per distinct argument binding.
    pub fn keys(
        &mut self,
        generator: &dyn KeyGenerator,
        signature: &Signature,
        args: &CallArgs,
    ) -> Result<Vec<String>> {
        if let Some((cached_args, keys)) = &self.rendered {
            if cached_args == args {
                return Ok(keys.clone());
            }
        }

        let namespace = self.proxy()?.namespace();
        let keys = self
            .invocation
            .keys()
            .iter()
            .map(|template| generator.generate(namespace, template, signature, args))
            .collect::<Result<Vec<_>>>()?;

        self.rendered = Some((args.clone(), keys.clone()));
        Ok(keys)
    }

    /// Bytes this action writes for a call whose result encoded to `result`.
    ///
    /// Results store the computed value; puts store a bound argument; removes
    /// store nothing.
    pub fn value(&self, args: &CallArgs, result: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        match &self.invocation {
            Invocation::Result(_) => Ok(result.map(<[u8]>::to_vec)),
            Invocation::Put(put) => {
                let binding = match put.value_selector() {
                    Some(name) => args.binding(name).ok_or_else(|| {
                        Error::ConfigError(format!("Put value '{name}' is not a bound argument"))
                    })?,
                    None => infer_put_binding(args)?,
                };
                binding.payload()
            }
            Invocation::Remove(_) => Ok(None),
        }
    }

    /// Write or delete one key.
    ///
    /// Result and put actions skip the write when `value` is `None`; removes
    /// ignore `value`.
    pub async fn apply(
        &self,
        registry: &BackendRegistry,
        key: &str,
        value: Option<Vec<u8>>,
    ) -> Result<()> {
        let proxy = self.proxy()?;
        match (&self.invocation, value) {
            (Invocation::Remove(_), _) => {
                debug!("✓ Cache delete: backend={} key={}", proxy.backend_name(), key);
                proxy.delete(registry, key).await
            }
            (_, None) => {
                debug!(
                    "Ignoring None value: backend={} key={}",
                    proxy.backend_name(),
                    key
                );
                Ok(())
            }
            (_, Some(bytes)) => {
                debug!(
                    "✓ Cache set: backend={} key={} timeout={:?}",
                    proxy.backend_name(),
                    key,
                    proxy.resolved_timeout()
                );
                proxy.set(registry, key, bytes).await
            }
        }
    }
}

fn infer_put_binding(args: &CallArgs) -> Result<&Binding> {
    let mut bindings: Vec<_> = args.iter().collect();
    if bindings.len() == 2 && bindings[0].name == RECEIVER {
        bindings.remove(0);
    }
    match bindings.as_slice() {
        [only] => Ok(*only),
        _ => Err(Error::ConfigError(format!(
            "Put needs a value selector: {} candidate arguments",
            bindings.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CacheBackend, InMemoryBackend};
    use crate::invocation::{CachePut, CacheRemove, CacheResult};
    use crate::key::KeyCodec;
    use crate::registry::BackendDefaults;
    use crate::serialization;
    use crate::setting::Setting;
    use std::time::Duration;

    fn bound(invocation: impl Into<Invocation>, registry: &BackendRegistry) -> CacheAction {
        let mut action = CacheAction::new(invocation.into());
        action.bind(&ConfigProxy::new("default"), registry).unwrap();
        action
    }

    fn registry(backend: &InMemoryBackend) -> BackendRegistry {
        let registry = BackendRegistry::new();
        registry
            .register("default", backend.clone(), BackendDefaults::default())
            .unwrap();
        registry
    }

    #[test]
    fn test_unbound_action_has_no_proxy() {
        let action = CacheAction::new(CacheResult::new(["{id}"]).into());
        assert!(matches!(action.proxy(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_keys_are_memoized_per_binding() {
        let backend = InMemoryBackend::new();
        let registry = registry(&backend);
        let mut action = bound(
            CacheResult::new(["{id}", "by-id:{id}"]).with_namespace(Some("u".to_string())),
            &registry,
        );
        let sig = Signature::new("get").param("id");
        let codec = KeyCodec::default();

        let args = CallArgs::new().bind("id", 7);
        let first = action.keys(&codec, &sig, &args).unwrap();
        assert_eq!(first, vec!["u:7".to_string(), "u:by-id:7".to_string()]);
        assert_eq!(action.keys(&codec, &sig, &args).unwrap(), first);

        let other = CallArgs::new().bind("id", 8);
        assert_eq!(action.keys(&codec, &sig, &other).unwrap()[0], "u:8");
    }

    #[test]
    fn test_bind_layers_invocation_overrides() {
        let backend = InMemoryBackend::new();
        let registry = registry(&backend);
        registry
            .register(
                "other",
                InMemoryBackend::new(),
                BackendDefaults::default().with_timeout(Some(Duration::from_secs(30))),
            )
            .unwrap();
        let policy_proxy = ConfigProxy::new("default").with_namespace(Some("p".to_string()));

        let mut action = CacheAction::new(
            CacheResult::new(["{id}"])
                .with_backend("other")
                .with_namespace(Some("u".to_string()))
                .into(),
        );
        action.bind(&policy_proxy, &registry).unwrap();
        let proxy = action.proxy().unwrap();
        assert_eq!(proxy.backend_name(), "other");
        assert_eq!(proxy.namespace(), &Setting::Value(Some("u".to_string())));
        assert_eq!(proxy.resolved_timeout(), Some(Duration::from_secs(30)));

        let mut plain = CacheAction::new(CacheResult::new(["{id}"]).into());
        plain.bind(&policy_proxy, &registry).unwrap();
        let proxy = plain.proxy().unwrap();
        assert_eq!(proxy.backend_name(), "default");
        assert_eq!(proxy.namespace(), &Setting::Value(Some("p".to_string())));
    }

    #[test]
    fn test_bind_unknown_backend() {
        let backend = InMemoryBackend::new();
        let registry = registry(&backend);
        let mut action =
            CacheAction::new(CacheRemove::new(["{id}"]).with_backend("missing").into());
        assert_eq!(
            action.bind(&ConfigProxy::new("default"), &registry).unwrap_err(),
            Error::UnconfiguredBackend("missing".into())
        );
        assert!(action.proxy().is_err());
    }

    #[test]
    fn test_put_value_inference() {
        let backend = InMemoryBackend::new();
        let registry = registry(&backend);
        let action = bound(CachePut::new(["{id}"]), &registry);

        let single = CallArgs::new().bind("user", "alice");
        let bytes = action.value(&single, None).unwrap().unwrap();
        assert_eq!(serialization::decode::<String>(&bytes).unwrap(), "alice");

        let method = CallArgs::new().bind("self", "repo").bind("user", "bob");
        let bytes = action.value(&method, None).unwrap().unwrap();
        assert_eq!(serialization::decode::<String>(&bytes).unwrap(), "bob");

        let ambiguous = CallArgs::new().bind("id", 1).bind("user", "carol");
        assert!(matches!(
            action.value(&ambiguous, None),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_put_value_selector() {
        let backend = InMemoryBackend::new();
        let registry = registry(&backend);
        let action = bound(CachePut::new(["{id}"]).with_value("user"), &registry);

        let args = CallArgs::new().bind("id", 1).bind("user", "carol");
        let bytes = action.value(&args, None).unwrap().unwrap();
        assert_eq!(serialization::decode::<String>(&bytes).unwrap(), "carol");

        let missing = CallArgs::new().bind("id", 1);
        assert!(matches!(action.value(&missing, None), Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_apply_skips_none() {
        let backend = InMemoryBackend::new();
        let registry = registry(&backend);
        let action = bound(CacheResult::new(["{id}"]), &registry);

        action.apply(&registry, "k", None).await.unwrap();
        assert!(backend.is_empty());

        action
            .apply(&registry, "k", Some(b"v".to_vec()))
            .await
            .unwrap();
        assert!(backend.contains_key("k"));
    }

    #[tokio::test]
    async fn test_remove_ignores_value() {
        let backend = InMemoryBackend::new();
        let registry = registry(&backend);
        backend.set("k", b"v".to_vec(), None).await.unwrap();

        let action = bound(CacheRemove::new(["{id}"]), &registry);
        action
            .apply(&registry, "k", Some(b"ignored".to_vec()))
            .await
            .unwrap();
        assert!(backend.is_empty());
    }
}
