//! In-process backend for local runs and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::backend::{BackendError, KvBackend};

/// DashMap-backed hash store.
///
/// Each upsert replaces the touched fields of one entry atomically. Under the
/// `test-utils` feature the backend can be told to fail a number of pings in
/// a row to simulate an outage.
pub struct MemoryBackend {
    entries: DashMap<String, HashMap<String, String>>,
    closed: AtomicBool,
    failing_pings: AtomicUsize,
    pings: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
            failing_pings: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("backend closed".to_string()));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryBackend {
    /// Make the next `count` pings fail.
    pub fn fail_next_pings(&self, count: usize) {
        self.failing_pings.store(count, Ordering::SeqCst);
    }

    /// Total pings received so far.
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check_open()?;

        let failing = self
            .failing_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(BackendError::Connection("simulated outage".to_string()));
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        self.check_open()?;
        Ok(self
            .entries
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn hset(&self, key: &str, fields: &[(&'static str, String)]) -> Result<(), BackendError> {
        self.check_open()?;
        let mut entry = self.entries.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        self.check_open()?;
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn del(&self, key: &str) -> Result<(), BackendError> {
        self.check_open()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
