//! Service facade wiring the store, ingestion, conversion and scheduler.

use chrono_tz::Tz;
use fxbridge_common::{RateRecord, RatesError, RatesResult, Source};
use fxbridge_fx::{ConversionResult, ConversionService};
use fxbridge_ingest::{HttpFetcher, Ingestor, SourceFetcher};
use fxbridge_store::{ConnectionHealth, RateStore};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServiceConfig;
use crate::metrics::{IngestMetrics, MetricsSnapshot, SharedMetrics};
use crate::scheduler::{Scheduler, SchedulerExit};
use crate::state::SourceUpdateState;

/// The rates service.
///
/// Built once from a [`ServiceConfig`]. Conversion and query calls may run
/// concurrently with the scheduler; every component shares one store and one
/// cancellation token.
pub struct RatesService {
    store: Arc<RateStore>,
    ingestor: Arc<Ingestor>,
    conversion: ConversionService,
    metrics: SharedMetrics,
    cancel: CancellationToken,
    schedule: Vec<SourceUpdateState>,
    update_interval: Duration,
    time_zone: Tz,
}

impl RatesService {
    /// Build the service with the HTTP fetcher.
    pub fn from_config(config: &ServiceConfig, cancel: CancellationToken) -> RatesResult<Self> {
        config.validate().map_err(RatesError::Configuration)?;
        let fetcher = Arc::new(HttpFetcher::new(config.fetcher_config()?)?);
        Self::with_fetcher(config, fetcher, cancel)
    }

    /// Build the service around an arbitrary fetcher.
    pub fn with_fetcher(
        config: &ServiceConfig,
        fetcher: Arc<dyn SourceFetcher>,
        cancel: CancellationToken,
    ) -> RatesResult<Self> {
        config.validate().map_err(RatesError::Configuration)?;

        let store = Arc::new(RateStore::connect(
            &config.store.url,
            config.reconnect_policy(),
            cancel.clone(),
        )?);
        let ingestor = Arc::new(Ingestor::new(fetcher, store.clone()));
        let conversion =
            ConversionService::new(store.clone(), ingestor.clone(), config.conversion_config()?);

        let mut schedule = Vec::new();
        for source in config.enabled_sources()? {
            schedule.push(SourceUpdateState::new(source, config.cutoff(source)?));
        }

        info!(
            store_url = %config.store.url,
            sources = ?config.sources,
            "Rates service initialized"
        );

        Ok(Self {
            store,
            ingestor,
            conversion,
            metrics: Arc::new(IngestMetrics::new()),
            cancel,
            schedule,
            update_interval: config.update_interval,
            time_zone: config.time_zone()?,
        })
    }

    /// Convert `amount` of `first` into `second`.
    pub async fn convert(
        &self,
        source: &str,
        first: &str,
        second: &str,
        amount: &str,
        direction: &str,
    ) -> RatesResult<ConversionResult> {
        let result = self
            .conversion
            .convert(source, first, second, amount, direction)
            .await;
        self.metrics.set_conversion_stats(self.conversion.stats());
        result
    }

    /// Every stored record of `source`; an empty name means RU.
    pub async fn get_all(&self, source: &str) -> RatesResult<Vec<RateRecord>> {
        self.conversion.get_all(source).await
    }

    /// Drop the unsupported marker of `code` so the next lookup refetches it.
    pub async fn forget_unsupported(&self, source: &str, code: &str) -> RatesResult<()> {
        let source = Source::from_str(source)?;
        self.conversion.forget_unsupported(source, code).await
    }

    /// A scheduler over the enabled sources, starting from a clean state.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.ingestor.clone(),
            self.schedule.clone(),
            self.update_interval,
            self.time_zone,
            self.metrics.clone(),
        )
    }

    /// Run the update scheduler until the service token is cancelled.
    pub async fn run_scheduler(&self) -> SchedulerExit {
        self.scheduler().run(self.cancel.clone()).await
    }

    /// Cancel background work and close the store.
    ///
    /// Await the scheduler task before calling this.
    pub async fn shutdown(&self) -> RatesResult<()> {
        self.cancel.cancel();
        self.store.close().await?;
        info!("Rates service shut down");
        Ok(())
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.set_conversion_stats(self.conversion.stats());
        self.metrics.snapshot()
    }

    /// Current metrics in Prometheus text format.
    pub fn metrics_text(&self) -> String {
        self.metrics.set_conversion_stats(self.conversion.stats());
        self.metrics.to_prometheus()
    }

    /// Store connection health.
    pub fn store_health(&self) -> ConnectionHealth {
        self.store.health()
    }

    /// The token that stops the scheduler and store retries.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxbridge_ingest::ScriptedFetcher;
    use std::collections::HashMap;

    const RU_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ValCurs Date="10.01.2024" name="Foreign Currency Market">
<Valute ID="R01235"><CharCode>USD</CharCode><Nominal>1</Nominal><Name>US Dollar</Name><Value>89,6883</Value><VunitRate>89,6883</VunitRate></Valute>
<Valute ID="R01239"><CharCode>EUR</CharCode><Nominal>1</Nominal><Name>Euro</Name><Value>98,1961</Value><VunitRate>98,1961</VunitRate></Valute>
</ValCurs>"#;

    fn config(vars: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    fn setup() -> (Arc<ScriptedFetcher>, RatesService) {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(Source::Ru, None, Ok(RU_XML.as_bytes().to_vec()));
        let service = RatesService::with_fetcher(
            &config(&[("SOURCE_KEY_TH", "client-id"), ("DB_RETRY_MS", "10")]),
            fetcher.clone(),
            CancellationToken::new(),
        )
        .unwrap();
        (fetcher, service)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = RatesService::from_config(&config(&[]), CancellationToken::new());
        assert!(matches!(result, Err(RatesError::Configuration(_))));

        let result = RatesService::from_config(
            &config(&[("SOURCES", "RU"), ("DB_URL", "postgres://localhost/rates")]),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(RatesError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_convert_and_query() {
        let (fetcher, service) = setup();

        let result = service.convert("RU", "USD", "RUB", "10", "buy").await.unwrap();
        assert_eq!(result.converted_amount, "896.883");
        assert_eq!(service.get_all("RU").await.unwrap().len(), 2);
        assert_eq!(service.store_health(), ConnectionHealth::Healthy);

        let metrics = service.metrics();
        assert_eq!(metrics.conversions, 1);
        assert_eq!(metrics.on_demand_fetches, 1);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_forget_unsupported_validates_source() {
        let (_, service) = setup();
        assert!(matches!(
            service.forget_unsupported("XX", "XAU").await,
            Err(RatesError::InvalidInput(_))
        ));
        service.forget_unsupported("RU", "XAU").await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_store() {
        let (_, service) = setup();
        service.shutdown().await.unwrap();
        service.shutdown().await.unwrap();

        assert!(service.cancellation_token().is_cancelled());
        assert_eq!(service.store_health(), ConnectionHealth::Closed);
        let err = service.convert("RU", "USD", "RUB", "1", "buy").await.unwrap_err();
        assert!(matches!(err, RatesError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_run_scheduler_stops_on_shutdown() {
        let (fetcher, service) = setup();
        let service = Arc::new(service);

        let task = {
            let service = service.clone();
            tokio::spawn(async move { service.run_scheduler().await })
        };
        while fetcher.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        service.cancellation_token().cancel();
        assert_eq!(task.await.unwrap(), SchedulerExit::Stopped);
        service.shutdown().await.unwrap();
        assert!(service.metrics().refresh_attempts >= 1);
        assert!(service.metrics_text().contains("fxbridge_refresh_successes 1"));
    }
}
