//! Decimal conversion helpers shared by the wire layer and the engine.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a decimal from an exchange string, accepting scientific notation.
///
/// Returns `None` for empty or unparsable input instead of failing, so callers
/// can decide whether a missing value is fatal.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Convert an `f64` into a `Decimal`. Non-finite input yields `None`.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
}

/// Lossy conversion to `f64` for analytics (scoring, stats).
pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}
