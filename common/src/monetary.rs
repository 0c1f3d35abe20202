//! Decimal helpers for rate strings.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Fractional digits in a formatted conversion result.
pub const RESULT_SCALE: u32 = 3;

/// Parse a decimal string, accepting `,` as the decimal separator.
///
/// Upstream feeds and callers disagree on the separator; both are read the
/// same way. Surrounding whitespace is ignored.
pub fn parse_flexible(value: &str) -> Result<Decimal, rust_decimal::Error> {
    let normalized = value.trim().replacen(',', ".", 1);
    let normalized = if normalized.starts_with('.') {
        format!("0{}", normalized)
    } else if normalized.ends_with('.') {
        format!("{}0", normalized)
    } else {
        normalized
    };
    Decimal::from_str(&normalized)
}

/// Render a value with exactly `scale` fractional digits, rounding half away
/// from zero.
pub fn format_fixed(value: Decimal, scale: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded.to_string()
}
