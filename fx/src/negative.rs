//! Expiry policy for unsupported-currency markers.

use chrono::NaiveDate;
use fxbridge_common::RateRecord;

/// How long an unsupported marker short-circuits lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegativeCachePolicy {
    /// Marker lifetime in days. Zero keeps markers forever.
    pub ttl_days: u32,
}

impl NegativeCachePolicy {
    pub fn new(ttl_days: u32) -> Self {
        Self { ttl_days }
    }

    /// Markers never expire.
    pub fn permanent() -> Self {
        Self { ttl_days: 0 }
    }

    /// Whether `marker` still blocks lookups on `today`.
    ///
    /// A marker whose date cannot be read is treated as live.
    pub fn is_live(&self, marker: &RateRecord, today: NaiveDate) -> bool {
        if !marker.is_found() {
            return false;
        }
        if self.ttl_days == 0 {
            return true;
        }

        match marker.parsed_date() {
            Some(marked_on) => (today - marked_on).num_days() < i64::from(self.ttl_days),
            None => true,
        }
    }
}

impl Default for NegativeCachePolicy {
    fn default() -> Self {
        Self::new(7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxbridge_common::Source;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_marker_expires_after_ttl() {
        let policy = NegativeCachePolicy::new(7);
        let marker = RateRecord::unsupported_marker(Source::Th, "XAU", day(1));

        assert!(policy.is_live(&marker, day(1)));
        assert!(policy.is_live(&marker, day(7)));
        assert!(!policy.is_live(&marker, day(8)));
    }

    #[test]
    fn test_permanent_policy() {
        let policy = NegativeCachePolicy::permanent();
        let marker = RateRecord::unsupported_marker(Source::Ru, "XAU", day(1));
        assert!(policy.is_live(&marker, day(31)));
    }

    #[test]
    fn test_missing_or_undated_marker() {
        let policy = NegativeCachePolicy::default();
        assert!(!policy.is_live(&RateRecord::default(), day(1)));

        let mut marker = RateRecord::unsupported_marker(Source::Ru, "XAU", day(1));
        marker.date.clear();
        assert!(policy.is_live(&marker, day(31)));
    }
}
