//! Service configuration.

use chrono::NaiveTime;
use chrono_tz::Tz;
use fxbridge_common::{parse_time_of_day, RatesError, RatesResult, Source};
use fxbridge_fx::{ConversionConfig, NegativeCachePolicy};
use fxbridge_ingest::{FetcherConfig, SourceEndpoint};
use fxbridge_store::ReconnectPolicy;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Rate store connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store URL, `redis://...` or `memory://`.
    pub url: String,
    /// Probe budget for one reconnect loop.
    pub attempts: usize,
    /// Wait between reconnect probes.
    pub retry_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            attempts: 5,
            retry_interval: Duration::from_millis(1000),
        }
    }
}

/// Per-source settings as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub endpoint: SourceEndpoint,
    /// Daily cutoff, `hh:mm:ss`.
    pub cutoff: String,
}

impl SourceSettings {
    fn default_for(source: Source) -> Self {
        let cutoff = match source {
            Source::Ru => "00:00:00",
            Source::Th => "18:00:00",
        };
        Self {
            endpoint: SourceEndpoint::default_for(source),
            cutoff: cutoff.to_string(),
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Rate store connection.
    pub store: StoreConfig,
    /// Enabled source codes, in configured order.
    pub sources: Vec<String>,
    /// Settings of every known source, enabled or not.
    pub source_settings: HashMap<Source, SourceSettings>,
    /// Scheduler tick.
    pub update_interval: Duration,
    /// Upstream request timeout.
    pub request_timeout: Duration,
    /// IANA zone name for cutoffs and query windows.
    pub time_zone: String,
    /// Minimum TH query window in days.
    pub th_min_window_days: u32,
    /// Unsupported marker lifetime in days, `0` never expires.
    pub unsupported_ttl_days: u32,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            sources: Source::ALL.iter().map(|s| s.code().to_string()).collect(),
            source_settings: Source::ALL
                .iter()
                .map(|s| (*s, SourceSettings::default_for(*s)))
                .collect(),
            update_interval: Duration::from_secs(600),
            request_timeout: Duration::from_secs(20),
            time_zone: "UTC".to_string(),
            th_min_window_days: 7,
            unsupported_ttl_days: 7,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset variables and numbers that do not parse keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DB_URL") {
            config.store.url = url;
        }

        if let Some(attempts) = lookup("DB_ATT") {
            if let Ok(attempts) = attempts.trim().parse() {
                config.store.attempts = attempts;
            }
        }

        if let Some(millis) = lookup("DB_RETRY_MS") {
            if let Ok(millis) = millis.trim().parse() {
                config.store.retry_interval = Duration::from_millis(millis);
            }
        }

        if let Some(sources) = lookup("SOURCES") {
            config.sources = sources
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        for source in Source::ALL {
            let settings = config
                .source_settings
                .entry(source)
                .or_insert_with(|| SourceSettings::default_for(source));

            if let Some(link) = lookup(&format!("SOURCE_LINK_{}", source.code())) {
                settings.endpoint.url = link;
            }
            if let Some(key) = lookup(&format!("SOURCE_KEY_{}", source.code())) {
                settings.endpoint = settings.endpoint.clone().with_key(key);
            }
            if let Some(cutoff) = lookup(&format!("SOURCE_TIMES_{}", source.code())) {
                settings.cutoff = cutoff;
            }
        }

        if let Some(secs) = lookup("TIMEOUT_UP") {
            if let Ok(secs) = secs.trim().parse() {
                config.update_interval = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = lookup("TIMEOUT_REQ") {
            if let Ok(secs) = secs.trim().parse() {
                config.request_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(zone) = lookup("LOC") {
            config.time_zone = zone;
        }

        if let Some(days) = lookup("TH_MIN_WINDOW_DAYS") {
            if let Ok(days) = days.trim().parse() {
                config.th_min_window_days = days;
            }
        }

        if let Some(days) = lookup("UNSUP_TTL_DAYS") {
            if let Ok(days) = days.trim().parse() {
                config.unsupported_ttl_days = days;
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.store.url.is_empty() {
            return Err("Store URL cannot be empty".to_string());
        }

        if self.store.attempts == 0 {
            return Err("Store reconnect attempts cannot be 0".to_string());
        }

        if self.store.retry_interval.is_zero() {
            return Err("Store retry interval cannot be 0".to_string());
        }

        if self.update_interval.is_zero() {
            return Err("Update interval cannot be 0".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be 0".to_string());
        }

        self.time_zone().map_err(|e| e.to_string())?;

        let sources = self.enabled_sources().map_err(|e| e.to_string())?;
        for source in sources {
            self.cutoff(source).map_err(|e| e.to_string())?;

            let endpoint = self.endpoint(source);
            if endpoint.url.is_empty() {
                return Err(format!("Endpoint URL for {} cannot be empty", source));
            }
            if source == Source::Th && endpoint.key.is_none() {
                return Err("Source TH requires SOURCE_KEY_TH".to_string());
            }
        }

        Ok(())
    }

    /// Enabled sources, parsed and deduplicated in configured order.
    pub fn enabled_sources(&self) -> RatesResult<Vec<Source>> {
        let mut sources = Vec::new();
        for code in &self.sources {
            let source = Source::from_str(code)
                .map_err(|_| RatesError::Configuration(format!("unknown source {:?}", code)))?;
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        if sources.is_empty() {
            return Err(RatesError::Configuration("no sources enabled".to_string()));
        }
        Ok(sources)
    }

    /// Parsed daily cutoff of `source`.
    pub fn cutoff(&self, source: Source) -> RatesResult<NaiveTime> {
        let settings = self
            .source_settings
            .get(&source)
            .cloned()
            .unwrap_or_else(|| SourceSettings::default_for(source));
        parse_time_of_day(&settings.cutoff)
    }

    /// Endpoint of `source`.
    pub fn endpoint(&self, source: Source) -> SourceEndpoint {
        self.source_settings
            .get(&source)
            .map(|s| s.endpoint.clone())
            .unwrap_or_else(|| SourceEndpoint::default_for(source))
    }

    /// Parsed time zone.
    pub fn time_zone(&self) -> RatesResult<Tz> {
        Tz::from_str(self.time_zone.trim()).map_err(|_| {
            RatesError::Configuration(format!("unknown time zone {:?}", self.time_zone))
        })
    }

    /// Reconnect policy for the rate store.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.store.attempts, self.store.retry_interval)
    }

    /// Fetcher settings for the enabled sources.
    pub fn fetcher_config(&self) -> RatesResult<FetcherConfig> {
        Ok(FetcherConfig {
            endpoints: self
                .enabled_sources()?
                .into_iter()
                .map(|source| (source, self.endpoint(source)))
                .collect(),
            timeout: self.request_timeout,
            time_zone: self.time_zone()?,
            min_window_days: self.th_min_window_days,
        })
    }

    /// Conversion service settings.
    pub fn conversion_config(&self) -> RatesResult<ConversionConfig> {
        Ok(ConversionConfig {
            negative_cache: NegativeCachePolicy::new(self.unsupported_ttl_days),
            time_zone: self.time_zone()?,
        })
    }
}
