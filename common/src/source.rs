//! Rate source identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RatesError;

/// Prefix prepended to a source code to address unsupported-currency markers.
pub const UNSUPPORTED_PREFIX: &str = "UNSUP";

/// Wire format an upstream source answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// XML document with a declared charset.
    Xml,
    /// JSON envelope.
    Json,
}

impl WireFormat {
    /// Media type to request in the `Accept` header.
    pub fn media_type(&self) -> &'static str {
        match self {
            WireFormat::Xml => "application/xml",
            WireFormat::Json => "application/json",
        }
    }
}

/// An upstream rate publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    /// Central Bank of Russia daily XML feed. Base currency RUB.
    #[serde(rename = "RU")]
    Ru,
    /// Bank of Thailand JSON API. Base currency THB.
    #[serde(rename = "TH")]
    Th,
}

impl Source {
    /// All known sources, in a stable order.
    pub const ALL: [Source; 2] = [Source::Ru, Source::Th];

    /// Two-letter source code used in storage keys.
    pub fn code(&self) -> &'static str {
        match self {
            Source::Ru => "RU",
            Source::Th => "TH",
        }
    }

    /// Currency the source quotes every rate in.
    pub fn base_currency(&self) -> &'static str {
        match self {
            Source::Ru => "RUB",
            Source::Th => "THB",
        }
    }

    /// Format of the upstream response body.
    pub fn wire_format(&self) -> WireFormat {
        match self {
            Source::Ru => WireFormat::Xml,
            Source::Th => WireFormat::Json,
        }
    }

    /// Storage prefix for unsupported-currency markers of this source.
    pub fn unsupported_key(&self) -> String {
        format!("{}{}", UNSUPPORTED_PREFIX, self.code())
    }

    /// Whether `code` is this source's own base currency.
    pub fn is_base_currency(&self, code: &str) -> bool {
        code == self.base_currency()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Source {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RU" => Ok(Source::Ru),
            "TH" => Ok(Source::Th),
            other => Err(RatesError::InvalidInput(format!(
                "wrong source provided: {}",
                other
            ))),
        }
    }
}
