//! Conversion requests, results and arithmetic.

use fxbridge_common::{format_fixed, parse_flexible, RateRecord, RatesError, RatesResult, Source, RESULT_SCALE};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    /// Decimal amount: integer part, fractional part, or both; `.` or `,`.
    static ref AMOUNT_REGEX: Regex =
        Regex::new(r"^(\d+([.,]\d*)?|[.,]\d+)$").expect("Invalid regex pattern");

    /// Three uppercase ASCII letters.
    static ref CURRENCY_CODE_REGEX: Regex =
        Regex::new(r"^[A-Z]{3}$").expect("Invalid regex pattern");
}

/// Which of the two stored rates a conversion uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// The ratio string this direction reads from a record.
    pub fn ratio<'a>(&self, record: &'a RateRecord) -> &'a str {
        match self {
            Direction::Buy => &record.ratio_buy,
            Direction::Sell => &record.ratio_sell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            _ => Err(RatesError::InvalidInput("exchange type is wrong".to_string())),
        }
    }
}

/// A validated conversion query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: Source,
    pub first: String,
    pub second: String,
    /// Amount as the caller wrote it.
    pub amount_text: String,
    pub amount: Decimal,
    pub direction: Direction,
}

impl ConversionRequest {
    /// Validate raw query parameters.
    ///
    /// Touches nothing outside its arguments; every failure is `InvalidInput`.
    pub fn parse(
        source: &str,
        first: &str,
        second: &str,
        amount: &str,
        direction: &str,
    ) -> RatesResult<Self> {
        let source = Source::from_str(source)?;
        let direction = Direction::from_str(direction)?;

        if !CURRENCY_CODE_REGEX.is_match(first) {
            return Err(RatesError::InvalidInput(format!(
                "wrong first curr provided: {}",
                first
            )));
        }
        if !CURRENCY_CODE_REGEX.is_match(second) {
            return Err(RatesError::InvalidInput(format!(
                "wrong second curr provided: {}",
                second
            )));
        }
        if !AMOUNT_REGEX.is_match(amount) {
            return Err(RatesError::InvalidInput("wrong amount provided".to_string()));
        }
        let parsed = parse_flexible(amount)
            .map_err(|_| RatesError::InvalidInput("wrong amount provided".to_string()))?;

        Ok(Self {
            source,
            first: first.to_string(),
            second: second.to_string(),
            amount_text: amount.to_string(),
            amount: parsed,
            direction,
        })
    }
}

/// Outcome of a conversion, in the shape callers serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Publication date of the first currency's rate.
    pub date: String,
    pub source: String,
    #[serde(rename = "first_curr")]
    pub first: String,
    #[serde(rename = "second_curr")]
    pub second: String,
    pub exchange: String,
    pub amount: String,
    pub converted_amount: String,
}

/// `amount * first / second`, each ratio parsed with either decimal separator.
pub fn convert_amount(amount: Decimal, first_ratio: &str, second_ratio: &str) -> RatesResult<Decimal> {
    let first = parse_flexible(first_ratio)
        .map_err(|_| RatesError::ConversionError(format!("invalid stored ratio {:?}", first_ratio)))?;
    let second = parse_flexible(second_ratio)
        .map_err(|_| RatesError::ConversionError(format!("invalid stored ratio {:?}", second_ratio)))?;

    if second.is_zero() {
        return Err(RatesError::ConversionError(
            "second currency has a zero rate".to_string(),
        ));
    }

    amount
        .checked_mul(first)
        .and_then(|product| product.checked_div(second))
        .ok_or_else(|| RatesError::ConversionError("amount out of range".to_string()))
}

/// Render a converted amount with the fixed result precision.
pub fn format_amount(value: Decimal) -> String {
    format_fixed(value, RESULT_SCALE)
}
