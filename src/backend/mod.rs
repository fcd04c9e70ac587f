//! Cache backend contract.
//!
//! The engine never stores anything itself; every read, write and delete is
//! delegated to a [`CacheBackend`] registered under a name in the
//! [`BackendRegistry`](crate::registry::BackendRegistry).

mod inmemory;

pub use inmemory::InMemoryBackend;

use crate::error::Result;
use futures::future::BoxFuture;
use std::time::Duration;

/// Key/value store capability the engine delegates to.
///
/// Methods return boxed futures so that backends of different types can sit
/// behind `Arc<dyn CacheBackend>` in one registry.
///
/// # Contract
///
/// - `get` of a missing key returns `Ok(None)`, never an error
/// - `delete` of a missing key is a no-op
/// - `timeout` is an expiry hint; `None` means no expiry
///
/// # Example
///
/// ```
/// use cache_intent::backend::CacheBackend;
/// use cache_intent::error::Result;
/// use futures::future::{BoxFuture, FutureExt};
/// use std::time::Duration;
///
/// struct NullBackend;
///
/// impl CacheBackend for NullBackend {
///     fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
///         async { Ok(None) }.boxed()
///     }
///
///     fn set<'a>(
///         &'a self,
///         _key: &'a str,
///         _value: Vec<u8>,
///         _timeout: Option<Duration>,
///     ) -> BoxFuture<'a, Result<()>> {
///         async { Ok(()) }.boxed()
///     }
///
///     fn delete<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<()>> {
///         async { Ok(()) }.boxed()
///     }
/// }
/// ```
pub trait CacheBackend: Send + Sync {
    /// Fetch the bytes stored under `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    /// Store `value` under `key`.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Remove `key`.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;
}

impl<T: CacheBackend + ?Sized> CacheBackend for std::sync::Arc<T> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        (**self).get(key)
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        (**self).set(key, value, timeout)
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        (**self).delete(key)
    }
}
