//! Conversion service over the rate store.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use fxbridge_common::{RateRecord, RatesError, RatesResult, Source};
use fxbridge_ingest::Ingestor;
use fxbridge_store::RateStore;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::conversion::{convert_amount, format_amount, ConversionRequest, ConversionResult};
use crate::negative::NegativeCachePolicy;

/// Configuration for the conversion service.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Expiry of unsupported-currency markers.
    pub negative_cache: NegativeCachePolicy,
    /// Zone that decides "today" for synthesized base-currency records.
    pub time_zone: Tz,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            negative_cache: NegativeCachePolicy::default(),
            time_zone: Tz::UTC,
        }
    }
}

/// Counters kept by the conversion service.
#[derive(Debug, Default)]
struct Counters {
    conversions: AtomicU64,
    on_demand_fetches: AtomicU64,
    markers_written: AtomicU64,
}

/// Point-in-time copy of the service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub conversions: u64,
    pub on_demand_fetches: u64,
    pub markers_written: u64,
}

/// Validates conversion queries, resolves both currencies and converts.
///
/// A currency missing from the store is fetched once on demand. When the
/// source confirms it does not carry the currency, an unsupported marker is
/// stored and later lookups fail fast until the marker expires.
pub struct ConversionService {
    store: Arc<RateStore>,
    ingestor: Arc<Ingestor>,
    config: ConversionConfig,
    counters: Counters,
}

impl ConversionService {
    /// Create a new conversion service.
    pub fn new(store: Arc<RateStore>, ingestor: Arc<Ingestor>, config: ConversionConfig) -> Self {
        Self {
            store,
            ingestor,
            config,
            counters: Counters::default(),
        }
    }

    /// Convert `amount` of `first` into `second` at the `direction` rates of
    /// `source`.
    #[instrument(skip(self))]
    pub async fn convert(
        &self,
        source: &str,
        first: &str,
        second: &str,
        amount: &str,
        direction: &str,
    ) -> RatesResult<ConversionResult> {
        let request = ConversionRequest::parse(source, first, second, amount, direction)?;
        let today = self.today();

        let first_record = self.resolve(request.source, &request.first, today).await?;
        let second_record = self.resolve(request.source, &request.second, today).await?;

        let converted = convert_amount(
            request.amount,
            request.direction.ratio(&first_record),
            request.direction.ratio(&second_record),
        )?;

        self.counters.conversions.fetch_add(1, Ordering::Relaxed);
        let result = ConversionResult {
            date: first_record.date,
            source: request.source.code().to_string(),
            first: request.first,
            second: request.second,
            exchange: request.direction.to_string(),
            amount: request.amount_text,
            converted_amount: format_amount(converted),
        };

        debug!(converted = %result.converted_amount, "Conversion completed");
        Ok(result)
    }

    /// Every stored record of `source`. An empty source name means RU.
    #[instrument(skip(self))]
    pub async fn get_all(&self, source: &str) -> RatesResult<Vec<RateRecord>> {
        let source = if source.is_empty() {
            Source::Ru
        } else {
            Source::from_str(source)?
        };

        let records = self.store.get_all_by_source(source.code()).await?;
        if records.is_empty() {
            return Err(RatesError::InvalidInput(format!(
                "no rates stored for source {}",
                source
            )));
        }
        Ok(records)
    }

    /// Find the record for `code`, fetching it on demand when not stored.
    pub async fn resolve(&self, source: Source, code: &str, today: NaiveDate) -> RatesResult<RateRecord> {
        if source.is_base_currency(code) {
            return Ok(RateRecord::unit(source, today));
        }

        let marker = self
            .store
            .get_by_source_and_key(&source.unsupported_key(), code)
            .await?;
        if marker.is_found() {
            if self.config.negative_cache.is_live(&marker, today) {
                return Err(unsupported(source, code));
            }
            info!(source = %source, code, marked_on = %marker.date, "Unsupported marker expired");
            self.store.remove(&source.unsupported_key(), code).await?;
        }

        let record = self.store.get_by_source_and_key(source.code(), code).await?;
        if record.is_found() {
            return Ok(record);
        }

        self.counters.on_demand_fetches.fetch_add(1, Ordering::Relaxed);
        debug!(source = %source, code, "Currency not stored, fetching on demand");
        match self.ingestor.ingest(source, Some(code)).await {
            Ok(_) => {}
            Err(RatesError::CurrencyNotOffered { .. }) => {
                return self.mark_unsupported(source, code, today).await;
            }
            Err(e) => {
                warn!(source = %source, code, error = %e, "On-demand fetch failed");
                return Err(e);
            }
        }

        let record = self.store.get_by_source_and_key(source.code(), code).await?;
        if record.is_found() {
            Ok(record)
        } else {
            self.mark_unsupported(source, code, today).await
        }
    }

    /// Drop the unsupported marker for `code`, if any.
    pub async fn forget_unsupported(&self, source: Source, code: &str) -> RatesResult<()> {
        self.store.remove(&source.unsupported_key(), code).await?;
        info!(source = %source, code, "Unsupported marker removed");
        Ok(())
    }

    /// Current counter values.
    pub fn stats(&self) -> ConversionStats {
        ConversionStats {
            conversions: self.counters.conversions.load(Ordering::Relaxed),
            on_demand_fetches: self.counters.on_demand_fetches.load(Ordering::Relaxed),
            markers_written: self.counters.markers_written.load(Ordering::Relaxed),
        }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.time_zone).date_naive()
    }

    async fn mark_unsupported(&self, source: Source, code: &str, today: NaiveDate) -> RatesResult<RateRecord> {
        self.store
            .store(&RateRecord::unsupported_marker(source, code, today))
            .await?;
        self.counters.markers_written.fetch_add(1, Ordering::Relaxed);
        info!(source = %source, code, "Currency marked unsupported");
        Err(unsupported(source, code))
    }
}

fn unsupported(source: Source, code: &str) -> RatesError {
    RatesError::UnsupportedCurrency {
        source_code: source.code().to_string(),
        code: code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxbridge_ingest::ScriptedFetcher;
    use fxbridge_store::{MemoryBackend, ReconnectPolicy};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use tokio_util::sync::CancellationToken;

    const RU_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ValCurs Date="10.01.2024" name="Foreign Currency Market">
<Valute ID="R01235"><CharCode>USD</CharCode><Nominal>1</Nominal><Name>US Dollar</Name><Value>89,6883</Value><VunitRate>89,6883</VunitRate></Valute>
<Valute ID="R01239"><CharCode>EUR</CharCode><Nominal>1</Nominal><Name>Euro</Name><Value>98,1961</Value><VunitRate>98,1961</VunitRate></Valute>
</ValCurs>"#;

    fn th_body(period: &str, id: &str, name: &str, buy: &str, sell: &str) -> Vec<u8> {
        format!(
            r#"{{"result":{{"data":{{"data_detail":[{{"period":"{}","currency_id":"{}","currency_name_eng":"{}","buying_transfer":"{}","selling":"{}"}}]}}}}}}"#,
            period, id, name, buy, sell
        )
        .into_bytes()
    }

    fn not_offered(code: &str) -> RatesError {
        RatesError::CurrencyNotOffered {
            source_code: "TH".into(),
            code: code.into(),
        }
    }

    fn setup(policy: NegativeCachePolicy) -> (Arc<ScriptedFetcher>, Arc<MemoryBackend>, ConversionService) {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(RateStore::new(
            backend.clone(),
            ReconnectPolicy::default(),
            CancellationToken::new(),
        ));
        let ingestor = Arc::new(Ingestor::new(fetcher.clone(), store.clone()));
        let service = ConversionService::new(
            store,
            ingestor,
            ConversionConfig {
                negative_cache: policy,
                ..ConversionConfig::default()
            },
        );
        (fetcher, backend, service)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_convert_via_base_currency() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::default());
        fetcher.respond(Source::Ru, None, Ok(RU_XML.as_bytes().to_vec()));

        let result = service.convert("RU", "USD", "RUB", "10", "buy").await.unwrap();

        assert_eq!(result.date, "2024-01-10");
        assert_eq!(result.source, "RU");
        assert_eq!(result.exchange, "buy");
        assert_eq!(result.amount, "10");
        assert_eq!(result.converted_amount, "896.883");
        assert_eq!(service.stats().on_demand_fetches, 1);

        // EUR arrived with the same snapshot; no further fetch.
        let result = service.convert("RU", "USD", "EUR", "100", "sell").await.unwrap();
        assert_eq!(result.converted_amount, "91.336");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_self_conversion_returns_amount() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::default());
        fetcher.respond(
            Source::Th,
            Some("USD"),
            Ok(th_body("2024-01-10", "USD", "US Dollar", "35.0880", "35.4133")),
        );

        for direction in ["buy", "sell"] {
            let result = service.convert("TH", "USD", "USD", "12,5", direction).await.unwrap();
            assert_eq!(result.converted_amount, "12.500");
        }
        let result = service.convert("TH", "THB", "THB", "7", "buy").await.unwrap();
        assert_eq!(result.converted_amount, "7.000");
    }

    #[tokio::test]
    async fn test_invalid_input_touches_nothing() {
        let (fetcher, backend, service) = setup(NegativeCachePolicy::default());

        for (source, first, second, amount, direction) in [
            ("TH", "USD", "EUR", "abc", "buy"),
            ("TH", "usd", "EUR", "1", "buy"),
            ("TH", "USD", "EUR", "1", "swap"),
            ("US", "USD", "EUR", "1", "buy"),
        ] {
            let err = service
                .convert(source, first, second, amount, direction)
                .await
                .unwrap_err();
            assert!(matches!(err, RatesError::InvalidInput(_)));
        }

        assert_eq!(backend.ping_count(), 0);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_currency_is_remembered() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::default());
        fetcher.respond(Source::Th, Some("XAU"), Err(not_offered("XAU")));

        for _ in 0..3 {
            let err = service.convert("TH", "XAU", "THB", "1", "buy").await.unwrap_err();
            assert!(matches!(err, RatesError::UnsupportedCurrency { .. }));
        }

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(service.stats().markers_written, 1);
    }

    #[tokio::test]
    async fn test_snapshot_without_currency_marks_unsupported() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::default());
        fetcher.respond(Source::Ru, None, Ok(RU_XML.as_bytes().to_vec()));

        let err = service.convert("RU", "XAU", "RUB", "1", "buy").await.unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_CURRENCY");

        let err = service.convert("RU", "XAU", "USD", "1", "buy").await.unwrap_err();
        assert!(matches!(err, RatesError::UnsupportedCurrency { .. }));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_marked() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::default());
        fetcher.respond(Source::Th, Some("USD"), Err(RatesError::unavailable("TH", "timeout")));

        for _ in 0..2 {
            let err = service.convert("TH", "USD", "THB", "1", "buy").await.unwrap_err();
            assert!(matches!(err, RatesError::SourceUnavailable { .. }));
        }
        assert_eq!(fetcher.call_count(), 2);
        assert_eq!(service.stats().markers_written, 0);
    }

    #[tokio::test]
    async fn test_expired_marker_is_refetched() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::new(7));
        fetcher.respond(Source::Th, Some("VND"), Err(not_offered("VND")));

        assert!(service.resolve(Source::Th, "VND", day(1)).await.is_err());
        assert!(service.resolve(Source::Th, "VND", day(5)).await.is_err());
        assert_eq!(fetcher.call_count(), 1);

        // The source has started publishing the currency.
        fetcher.respond(
            Source::Th,
            Some("VND"),
            Ok(th_body("2024-01-09", "VND", "1000 Dong", "1.40", "1.50")),
        );
        let record = service.resolve(Source::Th, "VND", day(9)).await.unwrap();

        assert_eq!(record.ratio_buy, "0.0014");
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_forget_unsupported() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::permanent());
        fetcher.respond(Source::Th, Some("XAU"), Err(not_offered("XAU")));
        assert!(service.resolve(Source::Th, "XAU", day(1)).await.is_err());

        service.forget_unsupported(Source::Th, "XAU").await.unwrap();
        assert!(service.resolve(Source::Th, "XAU", day(1)).await.is_err());
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_second_ratio_is_conversion_error() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::default());
        fetcher.respond(
            Source::Th,
            None,
            Ok(th_body("2024-01-10", "ZZZ", "Broken", "0", "0")),
        );

        let err = service.convert("TH", "THB", "ZZZ", "1", "buy").await.unwrap_err();
        assert!(matches!(err, RatesError::ConversionError(_)));
    }

    #[tokio::test]
    async fn test_get_all() {
        let (fetcher, _, service) = setup(NegativeCachePolicy::default());

        let err = service.get_all("").await.unwrap_err();
        assert!(matches!(err, RatesError::InvalidInput(_)));
        assert!(matches!(
            service.get_all("XX").await,
            Err(RatesError::InvalidInput(_))
        ));

        fetcher.respond(Source::Ru, None, Ok(RU_XML.as_bytes().to_vec()));
        service.convert("RU", "USD", "RUB", "1", "buy").await.unwrap();

        assert_eq!(service.get_all("").await.unwrap().len(), 2);
        assert_eq!(service.get_all("RU").await.unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn prop_ratio_cancels(units in 0i64..1_000_000_000_000, ratio in 1i64..10_000_000_000) {
            let amount = Decimal::new(units, 3);
            let ratio = Decimal::new(ratio, 4).to_string();

            let converted = convert_amount(amount, &ratio, &ratio).unwrap();
            prop_assert_eq!(format_amount(converted), format_amount(amount));
        }
    }
}
