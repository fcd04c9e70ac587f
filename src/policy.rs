//! Policy layer and wrap-and-delegate operations.

use crate::args::{CallArgs, Signature};
use crate::builder::OperationBuilder;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::invocation::{CachePut, CacheRemove, CacheResult, Invocation};
use crate::key::{CodecConfig, KeyCodec, KeyGenerator};
use crate::proxy::{ConfigProxy, Overrides};
use crate::registry::{BackendRegistry, DEFAULT_BACKEND_NAME};
use crate::serialization;
use crate::setting::Setting;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Settings shared by every operation declared through a policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyDefaults {
    /// Backend to target. Naming one discards the policy's other settings.
    pub backend: Option<String>,
    pub timeout: Setting<Option<Duration>>,
    pub namespace: Setting<Option<String>>,
    /// Key length limits for the built-in key codec.
    pub codec: Option<CodecConfig>,
}

/// Entry point for declaring cached operations.
///
/// A policy sits between backend defaults and per-operation settings: its
/// fields win over what the backend was registered with and lose to what
/// an invocation sets.
///
/// # Example
///
/// ```
/// use cache_intent::args::Signature;
/// use cache_intent::backend::InMemoryBackend;
/// use cache_intent::policy::CachePolicy;
/// use cache_intent::registry::{BackendDefaults, BackendRegistry};
/// use std::sync::Arc;
///
/// let registry = Arc::new(BackendRegistry::new());
/// registry
///     .register("default", InMemoryBackend::new(), BackendDefaults::default())
///     .unwrap();
///
/// let policy = CachePolicy::new(registry);
/// let get_user = policy
///     .cache_result(Signature::new("get_user").param("user_id"), ["{user_id}"])
///     .unwrap();
/// assert_eq!(get_user.invocations().len(), 1);
/// ```
#[derive(Clone)]
pub struct CachePolicy {
    registry: Arc<BackendRegistry>,
    proxy: ConfigProxy,
    generator: Arc<dyn KeyGenerator>,
}

impl CachePolicy {
    /// Policy targeting [`DEFAULT_BACKEND_NAME`]. The backend is looked up on
    /// first declaration, not here.
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        CachePolicy {
            registry,
            proxy: ConfigProxy::new(DEFAULT_BACKEND_NAME),
            generator: Arc::new(KeyCodec::default()),
        }
    }

    pub fn with_defaults(mut self, defaults: PolicyDefaults) -> Self {
        let overrides = Overrides {
            backend: None,
            timeout: defaults.timeout,
            namespace: defaults.namespace,
        };
        let base = match defaults.backend {
            Some(name) => ConfigProxy::new(name),
            None => self.proxy,
        };
        self.proxy = base.apply(&overrides);
        if let Some(config) = defaults.codec {
            self.generator = Arc::new(KeyCodec::new(config));
        }
        self
    }

    /// Replace the key scheme.
    pub fn with_key_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Unmerged policy-level proxy.
    pub fn proxy(&self) -> &ConfigProxy {
        &self.proxy
    }

    /// Policy proxy merged with the current registry defaults.
    pub fn resolved_proxy(&self) -> Result<ConfigProxy> {
        self.proxy.merge_with_registry_defaults(&self.registry)
    }

    /// # Errors
    ///
    /// Returns `Error::UnconfiguredBackend` if the policy's backend isn't
    /// registered.
    pub fn validate(&self) -> Result<()> {
        self.proxy.validate(&self.registry)
    }

    /// Read-through caching of an operation's result.
    pub fn cache_result<I, S>(&self, signature: Signature, keys: I) -> Result<CachedOperation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caching(signature).result(CacheResult::new(keys)).build()
    }

    /// Write-through of the operation's single bound value.
    pub fn cache_put<I, S>(&self, signature: Signature, keys: I) -> Result<CachedOperation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caching(signature).put(CachePut::new(keys)).build()
    }

    /// Invalidate keys whenever the operation runs.
    pub fn cache_remove<I, S>(&self, signature: Signature, keys: I) -> Result<CachedOperation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caching(signature).remove(CacheRemove::new(keys)).build()
    }

    /// Declare an operation with several intents.
    pub fn caching(&self, signature: Signature) -> OperationBuilder {
        OperationBuilder::new(self.clone(), signature)
    }

    /// Validate and wrap a list of intents.
    ///
    /// # Errors
    ///
    /// Every configuration error surfaces here, before any call:
    /// - `Error::UnconfiguredBackend`: policy or invocation backend missing
    /// - `Error::ConfigError`: no intents, or intents disagree on precheck
    /// - `Error::KeyFormatError`, `Error::NamespaceError`: bad key or namespace
    pub fn declare(
        &self,
        signature: Signature,
        invocations: Vec<Invocation>,
    ) -> Result<CachedOperation> {
        self.validate()?;
        let operation = CachedOperation {
            policy: self.clone(),
            signature,
            invocations,
        };
        operation.executor()?.validate()?;
        operation.check_namespaces()?;

        info!(
            "✓ Declared cached operation '{}' ({} intent(s))",
            operation.signature.name(),
            operation.invocations.len()
        );
        Ok(operation)
    }
}

/// An operation wrapped with its cache intents.
///
/// Each call builds a fresh [`Executor`] and re-merges the policy against the
/// registry, so registry changes between calls are picked up.
#[derive(Clone)]
pub struct CachedOperation {
    policy: CachePolicy,
    signature: Signature,
    invocations: Vec<Invocation>,
}

impl CachedOperation {
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Executor bound for one call.
    pub fn executor(&self) -> Result<Executor<'_>> {
        let mut executor = Executor::new(
            &self.policy.registry,
            self.policy.generator.as_ref(),
            &self.signature,
            &self.invocations,
        );
        executor.bind(&self.policy.proxy)?;
        Ok(executor)
    }

    /// Probe, compute on miss, populate.
    ///
    /// A hit returns the cached value without running `compute`. On a miss
    /// (or when the intents always write) the computed value is cached and
    /// returned; `None` is returned but never cached.
    ///
    /// # Errors
    ///
    /// Errors from `compute` and from backends are returned unchanged. A
    /// populate failure is reported even though `compute` already ran.
    pub async fn call<T, F, Fut>(&self, args: &CallArgs, compute: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let mut executor = self.executor()?;
        if let Some(cached) = executor.probe::<T>(args).await? {
            return Ok(Some(cached));
        }

        let computed = compute().await?;
        let encoded = computed.as_ref().map(serialization::encode).transpose()?;
        executor.populate(args, encoded.as_deref()).await?;
        Ok(computed)
    }

    /// Wrap `compute` so every invocation goes through [`call`](Self::call).
    ///
    /// # Example
    ///
    /// ```ignore
    /// let get_user = operation.with_caching(move |args: CallArgs| {
    ///     let repo = repo.clone();
    ///     async move { repo.find(args.get("user_id")).await }
    /// });
    /// let user = get_user(CallArgs::new().bind("user_id", "42")).await?;
    /// ```
    pub fn with_caching<T, F, Fut>(
        &self,
        compute: F,
    ) -> impl Fn(CallArgs) -> BoxFuture<'static, Result<Option<T>>> + Send + Sync
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(CallArgs) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let operation = self.clone();
        move |args: CallArgs| {
            let operation = operation.clone();
            let compute = compute.clone();
            async move {
                let owned = args.clone();
                operation.call(&args, move || compute(owned)).await
            }
            .boxed()
        }
    }

    /// Delete every key every intent renders for `args`, on each intent's
    /// backend.
    pub async fn invalidate(&self, args: &CallArgs) -> Result<()> {
        self.executor()?.invalidate(args).await
    }

    fn check_namespaces(&self) -> Result<()> {
        for action in self.executor()?.actions() {
            if let Setting::Value(Some(ns)) = action.proxy()?.namespace() {
                if ns.is_empty() {
                    return Err(Error::NamespaceError(format!(
                        "Namespace must not be empty: operation='{}'",
                        self.signature.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::registry::BackendDefaults;
    use crate::value::KeyValue;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> (Arc<BackendRegistry>, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let registry = Arc::new(BackendRegistry::new());
        registry
            .register(
                "default",
                backend.clone(),
                BackendDefaults::default().with_timeout(Some(Duration::from_secs(60))),
            )
            .unwrap();
        (registry, backend)
    }

    #[test]
    fn test_policy_backend_resolved_lazily() {
        let registry = Arc::new(BackendRegistry::new());
        let policy = CachePolicy::new(Arc::clone(&registry));
        assert_eq!(
            policy.validate().unwrap_err(),
            Error::UnconfiguredBackend("default".into())
        );

        registry.replace("default", InMemoryBackend::new(), BackendDefaults::default());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_with_defaults_layers() {
        let (registry, _) = registry();
        registry
            .register("other", InMemoryBackend::new(), BackendDefaults::default())
            .unwrap();

        let policy = CachePolicy::new(Arc::clone(&registry)).with_defaults(PolicyDefaults {
            timeout: Setting::Value(Some(Duration::from_secs(10))),
            ..Default::default()
        });
        assert_eq!(
            policy.resolved_proxy().unwrap().resolved_timeout(),
            Some(Duration::from_secs(10))
        );

        let switched = policy.with_defaults(PolicyDefaults {
            backend: Some("other".into()),
            ..Default::default()
        });
        let proxy = switched.resolved_proxy().unwrap();
        assert_eq!(proxy.backend_name(), "other");
        assert_eq!(proxy.resolved_timeout(), None);
    }

    #[test]
    fn test_declaration_fails_fast() {
        let (registry, _) = registry();
        let policy = CachePolicy::new(registry);
        let sig = Signature::new("get_user").param("user_id");

        let err = policy.cache_result(sig.clone(), ["{nope}"]).err().unwrap();
        assert!(matches!(err, Error::KeyFormatError(_)));

        let err = policy
            .caching(sig.clone())
            .result(CacheResult::new(["{user_id}"]).with_namespace(Some(String::new())))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::NamespaceError(_)));

        let err = policy
            .caching(sig)
            .remove(CacheRemove::new(["{user_id}"]).with_backend("missing"))
            .build()
            .err()
            .unwrap();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_call_caches_result() {
        let (registry, backend) = registry();
        let operation = CachePolicy::new(registry)
            .caching(Signature::new("get_user").param("user_id"))
            .result(CacheResult::new(["{user_id}"]).with_namespace(Some("u".to_string())))
            .build()
            .unwrap();
        let args = CallArgs::new().bind("user_id", "42");
        let computed = AtomicUsize::new(0);
        let counter = &computed;

        for _ in 0..2 {
            let user = operation
                .call(&args, move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(Some("Alice".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(user.as_deref(), Some("Alice"));
        }
        assert_eq!(computed.load(Ordering::SeqCst), 1);
        assert!(backend.contains_key("u:42"));
    }

    #[tokio::test]
    async fn test_with_caching_wraps_compute() {
        let (registry, backend) = registry();
        let operation = CachePolicy::new(registry)
            .cache_result(Signature::new("square").param("n"), ["{n}"])
            .unwrap();

        let square = operation.with_caching(|args: CallArgs| async move {
            match args.get("n") {
                Some(KeyValue::Int(n)) => Ok::<_, Error>(Some(n * n)),
                _ => Ok(None),
            }
        });

        assert_eq!(square(CallArgs::new().bind("n", 4)).await.unwrap(), Some(16));
        assert_eq!(backend.len(), 1);
        assert_eq!(square(CallArgs::new().bind("n", 4)).await.unwrap(), Some(16));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_with_caching_accepts_non_sync_results() {
        let (registry, backend) = registry();
        let operation = CachePolicy::new(registry)
            .cache_result(Signature::new("counter").param("n"), ["{n}"])
            .unwrap();

        let counter = operation.with_caching(|args: CallArgs| async move {
            match args.get("n") {
                Some(KeyValue::Int(n)) => Ok::<_, Error>(Some(Cell::new(*n))),
                _ => Ok(None),
            }
        });
        let handle = tokio::spawn(counter(CallArgs::new().bind("n", 3)));
        let first = handle.await.unwrap().unwrap();
        assert_eq!(first.map(Cell::into_inner), Some(3));

        let second = counter(CallArgs::new().bind("n", 3)).await.unwrap();
        assert_eq!(second.map(Cell::into_inner), Some(3));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_compute_error_skips_populate() {
        let (registry, backend) = registry();
        let operation = CachePolicy::new(registry)
            .cache_result(Signature::new("get").param("id"), ["{id}"])
            .unwrap();

        let err = operation
            .call::<String, _, _>(&CallArgs::new().bind("id", 1), || async {
                Err::<Option<String>, _>(Error::BackendError("db down".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::BackendError("db down".into()));
        assert!(backend.is_empty());
    }
}
