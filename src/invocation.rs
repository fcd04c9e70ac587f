//! Declared cache intents.
//!
//! An invocation is the immutable description of one intent attached to an
//! operation: read-through ([`CacheResult`]), write-through ([`CachePut`]) or
//! invalidation ([`CacheRemove`]). Each carries only the configuration it sets
//! explicitly; everything else comes from the policy and the backend.

use crate::error::{Error, Result};
use crate::proxy::Overrides;
use crate::setting::Setting;
use std::time::Duration;

/// Populate-on-read: probe before computing, store the computed result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheResult {
    keys: Vec<String>,
    backend: Option<String>,
    namespace: Setting<Option<String>>,
    timeout: Setting<Option<Duration>>,
    skip_precheck: bool,
}

impl CacheResult {
    /// # Example
    ///
    /// ```
    /// use cache_intent::invocation::CacheResult;
    /// use std::time::Duration;
    ///
    /// let intent = CacheResult::new(["{user_id}"])
    ///     .with_namespace(Some("u".to_string()))
    ///     .with_timeout(Some(Duration::from_secs(300)));
    /// assert_eq!(intent.keys(), ["{user_id}"]);
    /// ```
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CacheResult {
            keys: keys.into_iter().map(Into::into).collect(),
            backend: None,
            namespace: Setting::Unset,
            timeout: Setting::Unset,
            skip_precheck: false,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<Setting<Option<String>>>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<Setting<Option<Duration>>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Always compute, then store. Results are the only intent where this is
    /// configurable.
    pub fn with_skip_precheck(mut self, skip: bool) -> Self {
        self.skip_precheck = skip;
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Populate-on-write: always compute, then store a bound argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePut {
    keys: Vec<String>,
    backend: Option<String>,
    namespace: Setting<Option<String>>,
    timeout: Setting<Option<Duration>>,
    value_selector: Option<String>,
}

impl CachePut {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CachePut {
            keys: keys.into_iter().map(Into::into).collect(),
            backend: None,
            namespace: Setting::Unset,
            timeout: Setting::Unset,
            value_selector: None,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<Setting<Option<String>>>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<Setting<Option<Duration>>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Name of the bound argument to store.
    ///
    /// Without a selector the value is inferred: the only bound argument, or
    /// the second of two when the first is the receiver.
    pub fn with_value(mut self, name: impl Into<String>) -> Self {
        self.value_selector = Some(name.into());
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn value_selector(&self) -> Option<&str> {
        self.value_selector.as_deref()
    }
}

/// Invalidation: always compute, then delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheRemove {
    keys: Vec<String>,
    backend: Option<String>,
    namespace: Setting<Option<String>>,
}

impl CacheRemove {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CacheRemove {
            keys: keys.into_iter().map(Into::into).collect(),
            backend: None,
            namespace: Setting::Unset,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<Setting<Option<String>>>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// One declared intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    Result(CacheResult),
    Put(CachePut),
    Remove(CacheRemove),
}

impl Invocation {
    pub fn kind(&self) -> &'static str {
        match self {
            Invocation::Result(_) => "result",
            Invocation::Put(_) => "put",
            Invocation::Remove(_) => "remove",
        }
    }

    pub fn keys(&self) -> &[String] {
        match self {
            Invocation::Result(i) => &i.keys,
            Invocation::Put(i) => &i.keys,
            Invocation::Remove(i) => &i.keys,
        }
    }

    pub fn backend(&self) -> Option<&str> {
        match self {
            Invocation::Result(i) => i.backend.as_deref(),
            Invocation::Put(i) => i.backend.as_deref(),
            Invocation::Remove(i) => i.backend.as_deref(),
        }
    }

    /// Puts and removes never read.
    pub fn skip_precheck(&self) -> bool {
        match self {
            Invocation::Result(i) => i.skip_precheck,
            Invocation::Put(_) | Invocation::Remove(_) => true,
        }
    }

    /// Only the fields this invocation set explicitly.
    pub fn overrides(&self) -> Overrides {
        match self {
            Invocation::Result(i) => Overrides {
                backend: i.backend.clone(),
                timeout: i.timeout,
                namespace: i.namespace.clone(),
            },
            Invocation::Put(i) => Overrides {
                backend: i.backend.clone(),
                timeout: i.timeout,
                namespace: i.namespace.clone(),
            },
            Invocation::Remove(i) => Overrides {
                backend: i.backend.clone(),
                timeout: Setting::Unset,
                namespace: i.namespace.clone(),
            },
        }
    }

    /// Reject empty key lists and empty templates.
    pub fn validate(&self) -> Result<()> {
        if self.keys().is_empty() {
            return Err(Error::ConfigError(format!(
                "{} intent declares no keys",
                self.kind()
            )));
        }
        if self.keys().iter().any(String::is_empty) {
            return Err(Error::KeyFormatError(format!(
                "{} intent declares an empty key",
                self.kind()
            )));
        }
        Ok(())
    }
}

impl From<CacheResult> for Invocation {
    fn from(invocation: CacheResult) -> Self {
        Invocation::Result(invocation)
    }
}

impl From<CachePut> for Invocation {
    fn from(invocation: CachePut) -> Self {
        Invocation::Put(invocation)
    }
}

impl From<CacheRemove> for Invocation {
    fn from(invocation: CacheRemove) -> Self {
        Invocation::Remove(invocation)
    }
}
