//! Storage backend abstraction.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The connection is down or could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend is reachable but rejected the command.
    #[error("command failed: {0}")]
    Command(String),
}

impl BackendError {
    /// Check if the error means the connection itself is gone.
    pub fn is_connection(&self) -> bool {
        matches!(self, BackendError::Connection(_))
    }
}

/// Hash-per-key storage as used by the rate store.
///
/// Implementations must be safe for concurrent use; the rate store does not
/// serialize calls.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Probe connection health.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Read every field of a hash. A missing key yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BackendError>;

    /// Set the given fields of a hash, creating it if needed.
    async fn hset(&self, key: &str, fields: &[(&'static str, String)]) -> Result<(), BackendError>;

    /// List keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), BackendError>;

    /// Release the underlying connection.
    async fn close(&self) -> Result<(), BackendError>;
}
