//! The normalized rate record persisted by the rate store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::source::Source;

/// Storage field names, in the order they are written.
pub const RECORD_FIELDS: [&str; 6] = ["Date", "Source", "Code", "Name", "RatioBuy", "RatioSell"];

/// Name written into unsupported-currency markers.
pub const UNSUPPORTED_NAME: &str = "Unsupported";

/// Rate of the base currency against itself.
pub const UNIT_RATIO: &str = "1.0";

/// One currency's rate from one source.
///
/// The zero value (empty `name`) is what the store hands back for a missing
/// key; callers check [`RateRecord::is_found`] rather than expecting an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRecord {
    /// Publication date, `YYYY-MM-DD`.
    #[serde(rename = "Date")]
    pub date: String,
    /// Source code, or the marker prefix for unsupported markers.
    #[serde(skip_serializing, default)]
    pub source: String,
    /// Three-letter currency code.
    #[serde(rename = "Code")]
    pub code: String,
    /// Currency name as the source spells it.
    #[serde(rename = "Name")]
    pub name: String,
    /// Buy rate of one unit, in the source's base currency.
    #[serde(rename = "RatioBuy")]
    pub ratio_buy: String,
    /// Sell rate of one unit, in the source's base currency.
    #[serde(rename = "RatioSell")]
    pub ratio_sell: String,
}

impl RateRecord {
    /// Create a new rate record.
    pub fn new(
        date: impl Into<String>,
        source: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        ratio_buy: impl Into<String>,
        ratio_sell: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            source: source.into(),
            code: code.into(),
            name: name.into(),
            ratio_buy: ratio_buy.into(),
            ratio_sell: ratio_sell.into(),
        }
    }

    /// Unit record for a source's own base currency.
    pub fn unit(source: Source, date: NaiveDate) -> Self {
        let code = source.base_currency();
        Self::new(
            date.format("%Y-%m-%d").to_string(),
            source.code(),
            code,
            code,
            UNIT_RATIO,
            UNIT_RATIO,
        )
    }

    /// Marker recording that `source` does not carry `code`.
    pub fn unsupported_marker(source: Source, code: impl Into<String>, marked_on: NaiveDate) -> Self {
        Self::new(
            marked_on.format("%Y-%m-%d").to_string(),
            source.unsupported_key(),
            code,
            UNSUPPORTED_NAME,
            "",
            "",
        )
    }

    /// Whether this record came from an existing key.
    pub fn is_found(&self) -> bool {
        !self.name.is_empty()
    }

    /// Storage key, `"<SOURCE>:<CODE>"`.
    pub fn key(&self) -> String {
        storage_key(&self.source, &self.code)
    }

    /// Parsed publication date, if the field holds one.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }

    /// Flatten into the field map written to the store.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (RECORD_FIELDS[0], self.date.clone()),
            (RECORD_FIELDS[1], self.source.clone()),
            (RECORD_FIELDS[2], self.code.clone()),
            (RECORD_FIELDS[3], self.name.clone()),
            (RECORD_FIELDS[4], self.ratio_buy.clone()),
            (RECORD_FIELDS[5], self.ratio_sell.clone()),
        ]
    }

    /// Rebuild from a stored field map. Missing fields stay empty.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Self {
            date: field(RECORD_FIELDS[0]),
            source: field(RECORD_FIELDS[1]),
            code: field(RECORD_FIELDS[2]),
            name: field(RECORD_FIELDS[3]),
            ratio_buy: field(RECORD_FIELDS[4]),
            ratio_sell: field(RECORD_FIELDS[5]),
        }
    }
}

/// Build the storage key for a source prefix and currency code.
pub fn storage_key(source: &str, code: &str) -> String {
    format!("{}:{}", source, code)
}
