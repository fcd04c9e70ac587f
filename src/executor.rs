//! Executor - sequences one orchestrated call across its actions.

use crate::action::CacheAction;
use crate::args::{CallArgs, Signature};
use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::key::KeyGenerator;
use crate::proxy::ConfigProxy;
use crate::registry::BackendRegistry;
use crate::serialization;
use serde::de::DeserializeOwned;

/// Per-call state machine: bind, validate, probe, populate.
///
/// An executor lives for one call. It holds the actions built from the
/// operation's invocations, in declaration order, and never outlives the
/// registry it reads from.
///
/// # Example
///
/// ```ignore
/// let mut executor = Executor::new(&registry, &codec, &signature, &invocations);
/// executor.bind(&policy_proxy)?;
/// executor.validate()?;
///
/// let cached: Option<User> = executor.probe(&args).await?;
/// let user = match cached {
///     Some(user) => Some(user),
///     None => {
///         let user = repo.fetch(&id).await?;
///         let encoded = user.as_ref().map(serialization::encode).transpose()?;
///         executor.populate(&args, encoded.as_deref()).await?;
///         user
///     }
/// };
/// ```
pub struct Executor<'a> {
    registry: &'a BackendRegistry,
    generator: &'a dyn KeyGenerator,
    signature: &'a Signature,
    actions: Vec<CacheAction>,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a BackendRegistry,
        generator: &'a dyn KeyGenerator,
        signature: &'a Signature,
        invocations: &[Invocation],
    ) -> Self {
        Executor {
            registry,
            generator,
            signature,
            actions: invocations.iter().cloned().map(CacheAction::new).collect(),
        }
    }

    pub fn actions(&self) -> &[CacheAction] {
        &self.actions
    }

    /// Attach a resolved proxy to every action.
    ///
    /// Each action layers its own overrides on `policy_proxy` before the
    /// result is merged with registry defaults, so operation settings win over
    /// policy settings, which win over backend defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnconfiguredBackend` if an action resolves to a backend
    /// that isn't registered.
    pub fn bind(&mut self, policy_proxy: &ConfigProxy) -> Result<()> {
        for action in &mut self.actions {
            action.bind(policy_proxy, self.registry)?;
        }
        Ok(())
    }

    /// Check cross-action invariants and every key template.
    ///
    /// # Errors
    ///
    /// - `Error::ConfigError`: no actions, or actions disagree on skip_precheck
    /// - `Error::KeyFormatError`: a template can't render for this signature
    /// - `Error::UnconfiguredBackend`: an action's backend isn't registered
    pub fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(Error::ConfigError(format!(
                "operation '{}' declares no cache intents",
                self.signature.name()
            )));
        }
        self.skip_precheck()?;

        for action in &self.actions {
            let invocation = action.invocation();
            invocation.validate()?;
            for template in invocation.keys() {
                self.generator.validate(Some(template), self.signature)?;
            }
            action.proxy()?.validate(self.registry)?;
        }
        Ok(())
    }

    /// Whether this call skips the probe. All actions must agree.
    pub fn skip_precheck(&self) -> Result<bool> {
        let mut flags = self.actions.iter().map(|a| a.invocation().skip_precheck());
        let Some(first) = flags.next() else {
            return Ok(true);
        };
        if flags.any(|flag| flag != first) {
            return Err(Error::ConfigError(format!(
                "Mixing cache intents that read and always-write in operation '{}'",
                self.signature.name()
            )));
        }
        Ok(first)
    }

    /// Look for a cached value.
    ///
    /// Tries every key of every action in declaration order and returns the
    /// first hit. Returns `Ok(None)` on a full miss or when the probe is
    /// skipped.
    ///
    /// # Errors
    ///
    /// - `Error::BackendError`: forwarded from the backend
    /// - `Error::InvalidCacheEntry`, `Error::VersionMismatch`,
    ///   `Error::DeserializationError`: the hit couldn't be decoded as `T`
    pub async fn probe<T: DeserializeOwned>(&mut self, args: &CallArgs) -> Result<Option<T>> {
        if self.skip_precheck()? {
            return Ok(None);
        }

        for action in &mut self.actions {
            let keys = action.keys(self.generator, self.signature, args)?;
            let proxy = action.proxy()?;
            for key in &keys {
                if let Some(bytes) = proxy.get(self.registry, key).await? {
                    debug!(
                        "✓ Cache hit: backend={} key={} operation={}",
                        proxy.backend_name(),
                        key,
                        self.signature.name()
                    );
                    return serialization::decode(&bytes).map(Some);
                }
                debug!(
                    "Cache miss: backend={} key={} operation={}",
                    proxy.backend_name(),
                    key,
                    self.signature.name()
                );
            }
        }
        Ok(None)
    }

    /// Store or invalidate after the caller computed a result, passed here
    /// already encoded with [`serialization::encode`].
    ///
    /// Every action runs in declaration order, each over its keys in
    /// declaration order. A `None` result is never cached. The first backend
    /// error stops the pass and is returned unchanged.
    pub async fn populate(&mut self, args: &CallArgs, result: Option<&[u8]>) -> Result<()> {
        for action in &mut self.actions {
            let keys = action.keys(self.generator, self.signature, args)?;
            let value = action.value(args, result)?;
            for key in &keys {
                action.apply(self.registry, key, value.clone()).await?;
            }
        }
        Ok(())
    }

    /// Delete every key of every action, whatever the action's kind.
    pub async fn invalidate(&mut self, args: &CallArgs) -> Result<()> {
        for action in &mut self.actions {
            let keys = action.keys(self.generator, self.signature, args)?;
            let proxy = action.proxy()?;
            for key in &keys {
                debug!(
                    "✓ Cache invalidate: backend={} key={} operation={}",
                    proxy.backend_name(),
                    key,
                    self.signature.name()
                );
                proxy.delete(self.registry, key).await?;
            }
        }
        Ok(())
    }
}
