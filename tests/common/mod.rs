//! Shared fixtures for integration tests.

#![allow(dead_code)]

use cache_intent::backend::{CacheBackend, InMemoryBackend};
use cache_intent::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One backend call as seen by [`RecordingBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Set(String, Option<Duration>),
    Delete(String),
}

/// In-memory backend that logs every call, and can be told to fail.
///
/// Siblings share one call log, so ordering across backends is observable.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    label: String,
    inner: InMemoryBackend,
    log: Arc<Mutex<Vec<(String, Call)>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingBackend {
    pub fn new(label: &str) -> Self {
        RecordingBackend {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Separate store and failure switch, shared call log.
    pub fn sibling(&self, label: &str) -> Self {
        RecordingBackend {
            label: label.to_string(),
            inner: InMemoryBackend::new(),
            log: Arc::clone(&self.log),
            failing: Arc::default(),
        }
    }

    /// Every call on this backend and its siblings, in order.
    pub fn log(&self) -> Vec<(String, Call)> {
        self.log.lock().expect("log lock poisoned").clone()
    }

    /// Calls on this backend only.
    pub fn calls(&self) -> Vec<Call> {
        self.log()
            .into_iter()
            .filter(|(label, _)| *label == self.label)
            .map(|(_, call)| call)
            .collect()
    }

    pub fn sets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Set(key, _) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn gets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Get(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.log.lock().expect("log lock poisoned").clear();
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().expect("failing lock poisoned") = failing;
    }

    pub fn store(&self) -> &InMemoryBackend {
        &self.inner
    }

    fn record(&self, call: Call) -> Result<()> {
        self.log
            .lock()
            .expect("log lock poisoned")
            .push((self.label.clone(), call));
        if *self.failing.lock().expect("failing lock poisoned") {
            return Err(Error::BackendError("connection refused".to_string()));
        }
        Ok(())
    }
}

impl CacheBackend for RecordingBackend {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        async move {
            self.record(Call::Get(key.to_string()))?;
            self.inner.get(key).await
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
            self.record(Call::Set(key.to_string(), timeout))?;
            self.inner.set(key, value, timeout).await
        }
        .boxed()
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.record(Call::Delete(key.to_string()))?;
            self.inner.delete(key).await
        }
        .boxed()
    }
}
