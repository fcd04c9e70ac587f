//! Builder pattern for multi-intent operations.

use crate::args::Signature;
use crate::error::Result;
use crate::invocation::{CachePut, CacheRemove, CacheResult, Invocation};
use crate::policy::{CachePolicy, CachedOperation};

/// Fluent builder collecting the intents of one operation.
///
/// Intents keep their declaration order within each kind; the operation runs
/// results first, then puts, then removes.
///
/// # Example
///
/// ```ignore
/// use cache_intent::invocation::{CachePut, CacheResult};
///
/// let save_user = policy
///     .caching(Signature::method("save_user").param("user"))
///     .put(CachePut::new(["{user.id}"]).with_value("user"))
///     .put(CachePut::new(["{user.id}"]).with_backend("replica"))
///     .build()?;
/// ```
pub struct OperationBuilder {
    policy: CachePolicy,
    signature: Signature,
    results: Vec<CacheResult>,
    puts: Vec<CachePut>,
    removes: Vec<CacheRemove>,
}

impl OperationBuilder {
    pub(crate) fn new(policy: CachePolicy, signature: Signature) -> Self {
        Self {
            policy,
            signature,
            results: Vec::new(),
            puts: Vec::new(),
            removes: Vec::new(),
        }
    }

    /// Add a read-through intent.
    pub fn result(mut self, result: CacheResult) -> Self {
        self.results.push(result);
        self
    }

    /// Add a write-through intent.
    pub fn put(mut self, put: CachePut) -> Self {
        self.puts.push(put);
        self
    }

    /// Add an invalidation intent.
    pub fn remove(mut self, remove: CacheRemove) -> Self {
        self.removes.push(remove);
        self
    }

    /// Intents in execution order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.results
            .iter()
            .cloned()
            .map(Invocation::from)
            .chain(self.puts.iter().cloned().map(Invocation::from))
            .chain(self.removes.iter().cloned().map(Invocation::from))
            .collect()
    }

    /// Validate the intents and wrap them into an operation.
    ///
    /// # Errors
    ///
    /// See [`CachePolicy::declare`].
    pub fn build(self) -> Result<CachedOperation> {
        let invocations = self.invocations();
        self.policy.declare(self.signature, invocations)
    }
}
