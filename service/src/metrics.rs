//! Metrics collection for ingestion and conversion monitoring.

use fxbridge_fx::ConversionStats;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Service metrics.
pub struct IngestMetrics {
    /// Scheduled refreshes started.
    pub refresh_attempts: AtomicU64,
    /// Scheduled refreshes that stored their records.
    pub refresh_successes: AtomicU64,
    /// Scheduled refreshes that failed.
    pub refresh_failures: AtomicU64,
    /// Records written by scheduled refreshes.
    pub records_stored: AtomicU64,
    /// Successful conversions.
    pub conversions: AtomicU64,
    /// Fetches triggered by a conversion cache miss.
    pub on_demand_fetches: AtomicU64,
    /// Unsupported-currency markers written.
    pub markers_written: AtomicU64,
}

impl IngestMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            refresh_attempts: AtomicU64::new(0),
            refresh_successes: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
            records_stored: AtomicU64::new(0),
            conversions: AtomicU64::new(0),
            on_demand_fetches: AtomicU64::new(0),
            markers_written: AtomicU64::new(0),
        }
    }

    /// Record a refresh being started.
    pub fn refresh_started(&self) {
        self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refresh that stored `records` records.
    pub fn refresh_succeeded(&self, records: usize) {
        self.refresh_successes.fetch_add(1, Ordering::Relaxed);
        self.records_stored.fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Record refresh failure.
    pub fn refresh_failed(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror the conversion service counters.
    pub fn set_conversion_stats(&self, stats: ConversionStats) {
        self.conversions.store(stats.conversions, Ordering::Relaxed);
        self.on_demand_fetches.store(stats.on_demand_fetches, Ordering::Relaxed);
        self.markers_written.store(stats.markers_written, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refresh_attempts: self.refresh_attempts.load(Ordering::Relaxed),
            refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            conversions: self.conversions.load(Ordering::Relaxed),
            on_demand_fetches: self.on_demand_fetches.load(Ordering::Relaxed),
            markers_written: self.markers_written.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP fxbridge_refresh_attempts Total scheduled refreshes started
# TYPE fxbridge_refresh_attempts counter
fxbridge_refresh_attempts {}

# HELP fxbridge_refresh_successes Total scheduled refreshes completed
# TYPE fxbridge_refresh_successes counter
fxbridge_refresh_successes {}

# HELP fxbridge_refresh_failures Total scheduled refreshes failed
# TYPE fxbridge_refresh_failures counter
fxbridge_refresh_failures {}

# HELP fxbridge_records_stored Total records stored by scheduled refreshes
# TYPE fxbridge_records_stored counter
fxbridge_records_stored {}

# HELP fxbridge_conversions Total successful conversions
# TYPE fxbridge_conversions counter
fxbridge_conversions {}

# HELP fxbridge_on_demand_fetches Total fetches triggered by conversions
# TYPE fxbridge_on_demand_fetches counter
fxbridge_on_demand_fetches {}

# HELP fxbridge_markers_written Total unsupported currency markers written
# TYPE fxbridge_markers_written counter
fxbridge_markers_written {}
"#,
            snapshot.refresh_attempts,
            snapshot.refresh_successes,
            snapshot.refresh_failures,
            snapshot.records_stored,
            snapshot.conversions,
            snapshot.on_demand_fetches,
            snapshot.markers_written,
        )
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub refresh_attempts: u64,
    pub refresh_successes: u64,
    pub refresh_failures: u64,
    pub records_stored: u64,
    pub conversions: u64,
    pub on_demand_fetches: u64,
    pub markers_written: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<IngestMetrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = IngestMetrics::new();

        metrics.refresh_started();
        metrics.refresh_started();
        metrics.refresh_succeeded(34);
        metrics.refresh_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.refresh_attempts, 2);
        assert_eq!(snapshot.refresh_successes, 1);
        assert_eq!(snapshot.refresh_failures, 1);
        assert_eq!(snapshot.records_stored, 34);
    }

    #[test]
    fn test_conversion_stats_are_mirrored() {
        let metrics = IngestMetrics::new();
        metrics.set_conversion_stats(ConversionStats {
            conversions: 5,
            on_demand_fetches: 2,
            markers_written: 1,
        });
        metrics.set_conversion_stats(ConversionStats {
            conversions: 6,
            on_demand_fetches: 2,
            markers_written: 1,
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.conversions, 6);
        assert_eq!(snapshot.markers_written, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = IngestMetrics::new();
        metrics.refresh_started();

        let output = metrics.to_prometheus();
        assert!(output.contains("fxbridge_refresh_attempts 1"));
        assert!(output.contains("fxbridge_markers_written 0"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = IngestMetrics::new();
        metrics.refresh_succeeded(3);

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["records_stored"], 3);
        assert_eq!(json["refresh_attempts"], 0);
    }
}
