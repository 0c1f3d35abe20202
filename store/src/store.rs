//! Rate store over a [`KvBackend`].

use chrono::{DateTime, Utc};
use fxbridge_common::{storage_key, RateRecord, RatesError, RatesResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, KvBackend};
use crate::memory::MemoryBackend;
use crate::redis_backend::RedisBackend;
use crate::retry::{ReconnectPolicy, RetryError};

/// Last known reachability of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// No probe has run yet.
    Unknown,
    /// The last probe succeeded.
    Healthy,
    /// Probing has been failing since the given instant.
    Lost { since: DateTime<Utc> },
    /// `close` was called. Terminal.
    Closed,
}

/// Persistence of rate records and unsupported markers.
///
/// Every operation first verifies the connection. When the probe fails the
/// calling operation blocks in the reconnect loop until the backend answers,
/// the probe budget is spent (`StoreUnavailable`), or the shared
/// cancellation token fires during a wait (`Cancelled`). A healthy backend
/// keeps serving after cancellation.
pub struct RateStore {
    backend: Arc<dyn KvBackend>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    health: RwLock<ConnectionHealth>,
}

impl RateStore {
    /// Create a store over an existing backend.
    pub fn new(backend: Arc<dyn KvBackend>, policy: ReconnectPolicy, cancel: CancellationToken) -> Self {
        Self {
            backend,
            policy,
            cancel,
            health: RwLock::new(ConnectionHealth::Unknown),
        }
    }

    /// Create a store from a URL: `memory://` or `redis://…` / `rediss://…`.
    pub fn connect(url: &str, policy: ReconnectPolicy, cancel: CancellationToken) -> RatesResult<Self> {
        let backend: Arc<dyn KvBackend> = if url.starts_with("memory://") {
            Arc::new(MemoryBackend::new())
        } else if url.starts_with("redis://") || url.starts_with("rediss://") {
            Arc::new(RedisBackend::open(url).map_err(|e| RatesError::Configuration(e.to_string()))?)
        } else {
            return Err(RatesError::Configuration(format!("unsupported store url {:?}", url)));
        };

        info!(backend = backend.name(), max_retries = policy.max_retries, "Rate store configured");
        Ok(Self::new(backend, policy, cancel))
    }

    /// Current connection health.
    pub fn health(&self) -> ConnectionHealth {
        *self.health.read()
    }

    /// Probe the backend, reconnecting within the policy budget if needed.
    pub async fn ensure_connected(&self) -> RatesResult<()> {
        if self.health() == ConnectionHealth::Closed {
            return Err(RatesError::StoreUnavailable("store is closed".to_string()));
        }

        let backend = self.backend.clone();
        let health = &self.health;
        let result = self
            .policy
            .run(&self.cancel, |attempt| {
                let backend = backend.clone();
                async move {
                    let outcome = backend.ping().await;
                    if outcome.is_err() && attempt == 0 {
                        let mut guard = health.write();
                        if !matches!(*guard, ConnectionHealth::Lost { .. } | ConnectionHealth::Closed) {
                            *guard = ConnectionHealth::Lost { since: Utc::now() };
                        }
                    }
                    outcome
                }
            })
            .await;

        match result {
            Ok(probes) => {
                let mut guard = self.health.write();
                if matches!(*guard, ConnectionHealth::Lost { .. }) {
                    info!(probes, "Store connection restored");
                }
                if *guard != ConnectionHealth::Closed {
                    *guard = ConnectionHealth::Healthy;
                }
                Ok(())
            }
            Err(RetryError::Exhausted { attempts }) => {
                warn!(attempts, backend = self.backend.name(), "Store unreachable");
                Err(RatesError::StoreUnavailable(format!(
                    "no connection after {} attempts",
                    attempts
                )))
            }
            Err(RetryError::Cancelled) => Err(RatesError::Cancelled),
        }
    }

    /// Fetch one record. A missing key yields the zero record.
    #[instrument(skip(self))]
    pub async fn get_by_source_and_key(&self, source: &str, code: &str) -> RatesResult<RateRecord> {
        self.ensure_connected().await?;
        let fields = self
            .backend
            .hgetall(&storage_key(source, code))
            .await
            .map_err(map_backend_error)?;
        Ok(RateRecord::from_fields(&fields))
    }

    /// Fetch every record stored under a source prefix, in no particular order.
    #[instrument(skip(self))]
    pub async fn get_all_by_source(&self, source: &str) -> RatesResult<Vec<RateRecord>> {
        self.ensure_connected().await?;
        let keys = self
            .backend
            .keys(&format!("{}:", source))
            .await
            .map_err(map_backend_error)?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let fields = self.backend.hgetall(&key).await.map_err(map_backend_error)?;
            // Deleted between listing and reading.
            if fields.is_empty() {
                continue;
            }
            records.push(RateRecord::from_fields(&fields));
        }

        debug!(count = records.len(), "Loaded records");
        Ok(records)
    }

    /// Upsert a record under its `(source, code)` key, overwriting every field.
    pub async fn store(&self, record: &RateRecord) -> RatesResult<()> {
        self.ensure_connected().await?;
        self.backend
            .hset(&record.key(), &record.to_fields())
            .await
            .map_err(map_backend_error)?;
        debug!(key = %record.key(), date = %record.date, "Stored record");
        Ok(())
    }

    /// Delete one key. Removing a missing key succeeds.
    pub async fn remove(&self, source: &str, code: &str) -> RatesResult<()> {
        self.ensure_connected().await?;
        self.backend
            .del(&storage_key(source, code))
            .await
            .map_err(map_backend_error)
    }

    /// Release the backend connection. Calling it again is a no-op.
    pub async fn close(&self) -> RatesResult<()> {
        {
            let mut guard = self.health.write();
            if *guard == ConnectionHealth::Closed {
                return Ok(());
            }
            *guard = ConnectionHealth::Closed;
        }

        info!(backend = self.backend.name(), "Closing rate store");
        self.backend.close().await.map_err(map_backend_error)
    }
}

fn map_backend_error(err: BackendError) -> RatesError {
    match err {
        BackendError::Connection(message) => RatesError::StoreUnavailable(message),
        BackendError::Command(message) => RatesError::Storage(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store_with(backend: Arc<MemoryBackend>, max_retries: usize) -> RateStore {
        RateStore::new(
            backend,
            ReconnectPolicy::new(max_retries, Duration::from_secs(1)),
            CancellationToken::new(),
        )
    }

    fn usd(rate: &str) -> RateRecord {
        RateRecord::new("2024-01-10", "RU", "USD", "Доллар США", rate, rate)
    }

    #[tokio::test]
    async fn test_missing_key_is_zero_record() {
        let store = store_with(Arc::new(MemoryBackend::new()), 5);
        let record = store.get_by_source_and_key("RU", "USD").await.unwrap();

        assert!(!record.is_found());
        assert_eq!(store.health(), ConnectionHealth::Healthy);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = store_with(Arc::new(MemoryBackend::new()), 5);
        store.store(&usd("89.1")).await.unwrap();
        store.store(&usd("90.2")).await.unwrap();

        let record = store.get_by_source_and_key("RU", "USD").await.unwrap();
        assert_eq!(record, usd("90.2"));
        assert_eq!(store.get_all_by_source("RU").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_all_by_source_ignores_other_prefixes() {
        let store = store_with(Arc::new(MemoryBackend::new()), 5);
        store.store(&usd("89.1")).await.unwrap();
        store
            .store(&RateRecord::new("2024-01-10", "RU", "EUR", "Евро", "97.4", "97.4"))
            .await
            .unwrap();
        store
            .store(&RateRecord::new("2024-01-10", "TH", "USD", "US Dollar", "35.1", "35.4"))
            .await
            .unwrap();
        store
            .store(&RateRecord::new("2024-01-10", "UNSUPRU", "XAU", "Unsupported", "", ""))
            .await
            .unwrap();

        let mut codes: Vec<String> = store
            .get_all_by_source("RU")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.code)
            .collect();
        codes.sort();
        assert_eq!(codes, vec!["EUR".to_string(), "USD".to_string()]);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = store_with(Arc::new(MemoryBackend::new()), 5);
        store.store(&usd("89.1")).await.unwrap();
        store.remove("RU", "USD").await.unwrap();
        store.remove("RU", "USD").await.unwrap();

        assert!(!store.get_by_source_and_key("RU", "USD").await.unwrap().is_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_shorter_than_budget_is_invisible() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), 5);
        store.store(&usd("89.1")).await.unwrap();

        backend.fail_next_pings(4);
        let record = store.get_by_source_and_key("RU", "USD").await.unwrap();

        assert_eq!(record.ratio_buy, "89.1");
        assert_eq!(store.health(), ConnectionHealth::Healthy);
        // One probe for the store call, five for the lookup.
        assert_eq!(backend.ping_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_at_budget_is_store_unavailable() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), 5);

        backend.fail_next_pings(5);
        let err = store.get_by_source_and_key("RU", "USD").await.unwrap_err();

        assert!(matches!(err, RatesError::StoreUnavailable(_)));
        assert!(matches!(store.health(), ConnectionHealth::Lost { .. }));
        assert_eq!(backend.ping_count(), 5);

        // The outage is over; the next call reconnects.
        store.get_by_source_and_key("RU", "USD").await.unwrap();
        assert_eq!(store.health(), ConnectionHealth::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_reconnect() {
        let backend = Arc::new(MemoryBackend::new());
        let cancel = CancellationToken::new();
        let store = RateStore::new(
            backend.clone(),
            ReconnectPolicy::new(100, Duration::from_secs(1)),
            cancel.clone(),
        );
        backend.fail_next_pings(100);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        });

        let err = store.store(&usd("89.1")).await.unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err, RatesError::Cancelled);
        assert_eq!(backend.ping_count(), 3);
    }

    #[tokio::test]
    async fn test_healthy_store_serves_after_cancel() {
        let backend = Arc::new(MemoryBackend::new());
        let cancel = CancellationToken::new();
        let store = RateStore::new(backend.clone(), ReconnectPolicy::default(), cancel.clone());
        store.store(&usd("89.1")).await.unwrap();

        cancel.cancel();

        let record = store.get_by_source_and_key("RU", "USD").await.unwrap();
        assert_eq!(record.ratio_buy, "89.1");
        store.store(&usd("90.2")).await.unwrap();
        assert_eq!(store.get_all_by_source("RU").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), 5);

        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(backend.is_closed());
        assert_eq!(store.health(), ConnectionHealth::Closed);
        assert!(matches!(
            store.get_all_by_source("RU").await,
            Err(RatesError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_connect_rejects_unknown_scheme() {
        let result = RateStore::connect(
            "postgres://localhost/rates",
            ReconnectPolicy::default(),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(RatesError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let store = RateStore::connect("memory://", ReconnectPolicy::default(), CancellationToken::new()).unwrap();
        store.store(&usd("89.1")).await.unwrap();
        assert!(store.get_by_source_and_key("RU", "USD").await.unwrap().is_found());
    }
}
