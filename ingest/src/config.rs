//! Fetcher configuration.

use chrono_tz::Tz;
use fxbridge_common::Source;
use std::collections::HashMap;
use std::time::Duration;

/// Default Central Bank of Russia daily feed.
pub const DEFAULT_RU_URL: &str = "https://www.cbr.ru/scripts/XML_daily.asp";

/// Default Bank of Thailand daily average exchange rate endpoint.
pub const DEFAULT_TH_URL: &str =
    "https://apigw1.bot.or.th/bot/public/Stat-ExchangeRate/v2/DAILY_AVG_EXG_RATE/";

/// Where and how to reach one upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoint {
    /// Request URL, without query string.
    pub url: String,
    /// Access credential, if the source requires one.
    pub key: Option<String>,
}

impl SourceEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.key = if key.is_empty() { None } else { Some(key) };
        self
    }

    /// Built-in endpoint for a source.
    pub fn default_for(source: Source) -> Self {
        match source {
            Source::Ru => Self::new(DEFAULT_RU_URL),
            Source::Th => Self::new(DEFAULT_TH_URL),
        }
    }
}

/// Configuration for [`HttpFetcher`](crate::HttpFetcher).
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Endpoint per enabled source.
    pub endpoints: HashMap<Source, SourceEndpoint>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Zone in which query windows are computed.
    pub time_zone: Tz,
    /// The TH query window always reaches at least this many days back.
    pub min_window_days: u32,
}

impl FetcherConfig {
    /// Endpoint for `source`, or the built-in default.
    pub fn endpoint(&self, source: Source) -> SourceEndpoint {
        self.endpoints
            .get(&source)
            .cloned()
            .unwrap_or_else(|| SourceEndpoint::default_for(source))
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            endpoints: Source::ALL
                .iter()
                .map(|s| (*s, SourceEndpoint::default_for(*s)))
                .collect(),
            timeout: Duration::from_secs(20),
            time_zone: Tz::UTC,
            min_window_days: 7,
        }
    }
}
