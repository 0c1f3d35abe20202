//! Redis backend.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{BackendError, KvBackend};

/// Redis hashes over a multiplexed async connection.
///
/// The connection is dialed lazily and shared by all callers. A connection
/// level failure drops it, so the next ping dials again.
pub struct RedisBackend {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Create a backend for a `redis://` or `rediss://` URL without dialing.
    pub fn open(url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)
            .map_err(|e| BackendError::Connection(format!("invalid redis url: {}", e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BackendError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        debug!("Dialing redis");
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn classify(&self, err: RedisError) -> BackendError {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            *self.connection.lock().await = None;
            BackendError::Connection(err.to_string())
        } else {
            BackendError::Command(err.to_string())
        }
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let reply: Result<String, RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        match reply {
            Ok(_) => Ok(()),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        let mut conn = self.connection().await?;
        let reply: Result<HashMap<String, String>, RedisError> = conn.hgetall(key).await;
        match reply {
            Ok(fields) => Ok(fields),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn hset(&self, key: &str, fields: &[(&'static str, String)]) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(field, value)| (*field, value.as_str()))
            .collect();
        let reply: Result<(), RedisError> = conn.hset_multiple(key, &items[..]).await;
        match reply {
            Ok(()) => Ok(()),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let mut conn = self.connection().await?;
        let reply: Result<Vec<String>, RedisError> = conn.keys(format!("{}*", prefix)).await;
        match reply {
            Ok(keys) => Ok(keys),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn del(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let reply: Result<(), RedisError> = conn.del(key).await;
        match reply {
            Ok(()) => Ok(()),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        *self.connection.lock().await = None;
        Ok(())
    }
}
