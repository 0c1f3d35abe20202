//! Outbound requests to the upstream feeds.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use fxbridge_common::{format_date, RatesError, RatesResult, Source};
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use crate::config::FetcherConfig;

/// Browser user agent; the RU feed rejects bare HTTP clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_7_5) \
     AppleWebKit/537.11 (KHTML, like Gecko) Chrome/23.0.1271.64 Safari/537.11";

/// Header carrying the TH access credential.
pub const TH_CLIENT_ID_HEADER: &str = "X-IBM-Client-Id";

/// Message the TH API uses for a currency it does not publish.
pub const TH_INVALID_CURRENCY: &str = "Invalid Currency";

/// Source of raw response bodies.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetcher name for logs.
    fn name(&self) -> &str;

    /// Fetch the raw body for `source`, optionally filtered to one currency.
    ///
    /// Sources that always return a full snapshot ignore `currency`.
    async fn fetch(&self, source: Source, currency: Option<&str>) -> RatesResult<Vec<u8>>;
}

/// A fully resolved outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub query: Vec<(&'static str, String)>,
}

/// HTTP implementation of [`SourceFetcher`].
///
/// Tracks the instant of the last successful fetch per source to build the
/// incremental TH query window.
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
    last_success: Mutex<HashMap<Source, DateTime<Utc>>>,
}

impl HttpFetcher {
    /// Create a fetcher with the configured request timeout.
    pub fn new(config: FetcherConfig) -> RatesResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RatesError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            last_success: Mutex::new(HashMap::new()),
        })
    }

    /// Last successful fetch of `source`, if any.
    pub fn last_success(&self, source: Source) -> Option<DateTime<Utc>> {
        self.last_success.lock().get(&source).copied()
    }

    /// Compute the `[start, end]` TH window for a fetch at `now`.
    pub fn query_window(&self, source: Source, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        let tz = self.config.time_zone;
        let today = now.with_timezone(&tz).date_naive();
        let floor = today
            .checked_sub_days(Days::new(u64::from(self.config.min_window_days)))
            .unwrap_or(today);

        let start = match self.last_success(source) {
            Some(last) => last.with_timezone(&tz).date_naive().min(floor),
            None => floor,
        };
        (start, today)
    }

    /// Record a fetch of `source` started at `started` as successful.
    ///
    /// Fetches finishing out of order never move the timestamp backwards.
    pub fn record_success(&self, source: Source, started: DateTime<Utc>) {
        self.last_success
            .lock()
            .entry(source)
            .and_modify(|last| *last = (*last).max(started))
            .or_insert(started);
    }

    /// Build the request for `source` without sending it.
    pub fn plan(&self, source: Source, currency: Option<&str>, now: DateTime<Utc>) -> RatesResult<RequestPlan> {
        let endpoint = self.config.endpoint(source);

        match source {
            Source::Ru => Ok(RequestPlan {
                url: endpoint.url,
                headers: vec![
                    ("Accept", source.wire_format().media_type().to_string()),
                    ("User-Agent", BROWSER_USER_AGENT.to_string()),
                ],
                query: Vec::new(),
            }),
            Source::Th => {
                let key = endpoint.key.ok_or_else(|| {
                    RatesError::Configuration("no key provided for source TH".to_string())
                })?;

                let (start, end) = self.query_window(source, now);
                let mut query = vec![
                    ("start_period", format_date(start)),
                    ("end_period", format_date(end)),
                ];
                if let Some(code) = currency {
                    query.push(("currency", code.to_string()));
                }

                Ok(RequestPlan {
                    url: endpoint.url,
                    headers: vec![
                        ("Accept", source.wire_format().media_type().to_string()),
                        (TH_CLIENT_ID_HEADER, key),
                    ],
                    query,
                })
            }
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn fetch(&self, source: Source, currency: Option<&str>) -> RatesResult<Vec<u8>> {
        let started = Utc::now();
        let plan = self.plan(source, currency, started)?;

        let mut request = self.client.get(&plan.url).query(&plan.query);
        for (name, value) in &plan.headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            warn!(source = %source, error = %e, "Source unavailable");
            let reason = if e.is_timeout() { "request timed out" } else { "request failed" };
            RatesError::unavailable(source.code(), reason)
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RatesError::unavailable(source.code(), format!("failed to read body: {}", e)))?
            .to_vec();

        if !status.is_success() {
            let message = error_message(source, &body);
            warn!(source = %source, status = status.as_u16(), message = %message, "Source rejected request");

            if source == Source::Th && message == TH_INVALID_CURRENCY {
                return Err(RatesError::CurrencyNotOffered {
                    source_code: source.code().to_string(),
                    code: currency.unwrap_or_default().to_string(),
                });
            }
            return Err(RatesError::unavailable(source.code(), message));
        }

        self.record_success(source, started);
        debug!(source = %source, bytes = body.len(), "Fetched source");
        Ok(body)
    }
}

/// Extract a readable error message from a rejected response body.
pub fn error_message(source: Source, body: &[u8]) -> String {
    match source {
        Source::Th => serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/moreInformation/0/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "error while decoding error body from source TH".to_string()),
        Source::Ru => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Scripted fetcher for testing.
///
/// Responses are keyed by source and currency; a response registered with
/// `None` answers every currency of that source not scripted explicitly.
#[cfg(any(test, feature = "test-utils"))]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<(Source, Option<String>), RatesResult<Vec<u8>>>>,
    calls: Mutex<Vec<(Source, Option<String>)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ScriptedFetcher {
    /// Create a fetcher with no scripted responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the answer for `source` and `currency`.
    pub fn respond(&self, source: Source, currency: Option<&str>, response: RatesResult<Vec<u8>>) {
        self.responses
            .lock()
            .insert((source, currency.map(str::to_string)), response);
    }

    /// Number of fetches issued.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every fetch issued, in order.
    pub fn calls(&self) -> Vec<(Source, Option<String>)> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, source: Source, currency: Option<&str>) -> RatesResult<Vec<u8>> {
        let currency = currency.map(str::to_string);
        self.calls.lock().push((source, currency.clone()));

        let responses = self.responses.lock();
        responses
            .get(&(source, currency))
            .or_else(|| responses.get(&(source, None)))
            .cloned()
            .unwrap_or_else(|| Err(RatesError::unavailable(source.code(), "no scripted response")))
    }
}

/// Log the configured endpoints once at startup.
pub fn log_endpoints(config: &FetcherConfig) {
    for (source, endpoint) in &config.endpoints {
        info!(
            source = %source,
            url = %endpoint.url,
            has_key = endpoint.key.is_some(),
            "Source endpoint configured"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceEndpoint;
    use chrono::TimeZone;

    fn config_with_th_key(key: &str) -> FetcherConfig {
        let mut config = FetcherConfig::default();
        config.endpoints.insert(
            Source::Th,
            SourceEndpoint::new("https://bot.example/rates").with_key(key),
        );
        config
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_ru_plan_has_browser_headers() {
        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let plan = fetcher.plan(Source::Ru, Some("USD"), noon(2024, 1, 10)).unwrap();

        assert!(plan.query.is_empty());
        assert!(plan.headers.contains(&("Accept", "application/xml".to_string())));
        assert!(plan
            .headers
            .iter()
            .any(|(name, value)| *name == "User-Agent" && value.starts_with("Mozilla")));
    }

    #[test]
    fn test_th_plan_requires_key() {
        let fetcher = HttpFetcher::new(config_with_th_key("")).unwrap();
        let err = fetcher.plan(Source::Th, None, noon(2024, 1, 10)).unwrap_err();
        assert!(matches!(err, RatesError::Configuration(_)));
    }

    #[test]
    fn test_th_plan_window_and_currency() {
        let fetcher = HttpFetcher::new(config_with_th_key("secret")).unwrap();
        let plan = fetcher.plan(Source::Th, Some("USD"), noon(2024, 1, 10)).unwrap();

        assert_eq!(plan.url, "https://bot.example/rates");
        assert!(plan.headers.contains(&(TH_CLIENT_ID_HEADER, "secret".to_string())));
        assert_eq!(
            plan.query,
            vec![
                ("start_period", "2024-01-03".to_string()),
                ("end_period", "2024-01-10".to_string()),
                ("currency", "USD".to_string()),
            ]
        );
    }

    #[test]
    fn test_th_window_reaches_back_to_last_success() {
        let fetcher = HttpFetcher::new(config_with_th_key("secret")).unwrap();
        fetcher.last_success.lock().insert(Source::Th, noon(2023, 12, 20));

        let (start, end) = fetcher.query_window(Source::Th, noon(2024, 1, 10));
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 12, 20).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());

        // A recent success never narrows the window below the minimum.
        fetcher.last_success.lock().insert(Source::Th, noon(2024, 1, 10));
        let (start, _) = fetcher.query_window(Source::Th, noon(2024, 1, 10));
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn test_last_success_never_moves_backwards() {
        let fetcher = HttpFetcher::new(config_with_th_key("secret")).unwrap();
        assert_eq!(fetcher.last_success(Source::Th), None);

        fetcher.record_success(Source::Th, noon(2024, 1, 10));
        fetcher.record_success(Source::Th, noon(2024, 1, 8));
        assert_eq!(fetcher.last_success(Source::Th), Some(noon(2024, 1, 10)));

        fetcher.record_success(Source::Th, noon(2024, 1, 11));
        assert_eq!(fetcher.last_success(Source::Th), Some(noon(2024, 1, 11)));
        assert_eq!(fetcher.last_success(Source::Ru), None);
    }

    #[test]
    fn test_window_uses_configured_zone() {
        let mut config = config_with_th_key("secret");
        config.time_zone = chrono_tz::Asia::Bangkok;
        let fetcher = HttpFetcher::new(config).unwrap();

        // 20:00 UTC is already the next day in Bangkok.
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 20, 0, 0).unwrap();
        let (_, end) = fetcher.query_window(Source::Th, now);
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());
    }

    #[test]
    fn test_error_message_extraction() {
        let body = br#"{"httpCode":"400","moreInformation":[{"message":"Invalid Currency"}]}"#;
        assert_eq!(error_message(Source::Th, body), TH_INVALID_CURRENCY);
        assert!(error_message(Source::Th, b"<html>").contains("decoding"));
        assert_eq!(error_message(Source::Ru, b" Service Unavailable \n"), "Service Unavailable");
    }

    #[tokio::test]
    async fn test_scripted_fetcher_falls_back_to_wildcard() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond(Source::Th, None, Ok(b"any".to_vec()));
        fetcher.respond(Source::Th, Some("XAU"), Err(RatesError::unavailable("TH", "down")));

        assert_eq!(fetcher.fetch(Source::Th, Some("USD")).await.unwrap(), b"any".to_vec());
        assert!(fetcher.fetch(Source::Th, Some("XAU")).await.is_err());
        assert!(fetcher.fetch(Source::Ru, None).await.is_err());
        assert_eq!(fetcher.call_count(), 3);
    }
}
