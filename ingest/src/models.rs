//! Typed wire models of the upstream feeds.

use fxbridge_common::Source;
use serde::Deserialize;

/// Root of the RU daily XML document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RuDocument {
    /// Publication date, `dd.mm.yyyy`.
    #[serde(rename = "@Date")]
    pub date: String,
    #[serde(rename = "Valute", default)]
    pub valutes: Vec<RuValute>,
}

/// One currency entry of the RU document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RuValute {
    #[serde(rename = "CharCode")]
    pub char_code: String,
    #[serde(rename = "Name")]
    pub name: String,
    /// Units the `value` is quoted for.
    #[serde(rename = "Nominal")]
    pub nominal: String,
    #[serde(rename = "Value")]
    pub value: String,
    /// Rate of one unit. Absent from older documents.
    #[serde(rename = "VunitRate", default)]
    pub vunit_rate: Option<String>,
}

/// TH JSON envelope.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ThEnvelope {
    pub result: Option<ThResult>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ThResult {
    pub data: Option<ThData>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ThData {
    #[serde(default)]
    pub data_detail: Vec<ThDetail>,
}

/// One currency for one period in the TH feed.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ThDetail {
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub currency_id: String,
    #[serde(default)]
    pub currency_name_eng: String,
    #[serde(default)]
    pub buying_transfer: String,
    #[serde(default)]
    pub selling: String,
}

/// Decoded response body, tagged by source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    Ru(RuDocument),
    Th(Vec<ThDetail>),
}

impl SourcePayload {
    /// Source the payload was decoded for.
    pub fn source(&self) -> Source {
        match self {
            SourcePayload::Ru(_) => Source::Ru,
            SourcePayload::Th(_) => Source::Th,
        }
    }
}
