//! In-process reference backend.

use super::CacheBackend;
use crate::error::Result;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    timeout: Option<Duration>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// `DashMap`-backed backend for tests, demos and single-process use.
///
/// Expired entries read as missing and are dropped on access; there is no
/// background eviction. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, Entry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.store.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Timeout hint the entry was written with.
    pub fn timeout_of(&self, key: &str) -> Option<Option<Duration>> {
        self.store.get(key).map(|e| e.timeout)
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.iter().map(|e| e.key().clone()).collect()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let entry = self.store.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.store.remove(key);
            debug!("InMemory GET {} -> EXPIRED", key);
            return None;
        }
        Some(entry.value.clone())
    }
}

impl CacheBackend for InMemoryBackend {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        async move {
            let value = self.read(key);
            debug!(
                "InMemory GET {} -> {}",
                key,
                if value.is_some() { "HIT" } else { "MISS" }
            );
            Ok(value)
        }
        .boxed()
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        timeout: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let entry = Entry {
                value,
                timeout,
                expires_at: timeout.map(|t| Instant::now() + t),
            };
            self.store.insert(key.to_string(), entry);
            debug!("✓ InMemory SET {} (timeout: {:?})", key, timeout);
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.store.remove(key);
            debug!("✓ InMemory DELETE {}", key);
            Ok(())
        }
        .boxed()
    }
}
