//! Decimal money helpers.
//!
//! The commerce source sends amounts as decimal strings (`"10.00"`), sometimes
//! as JSON numbers, and sometimes as empty strings. Everything is summed as
//! [`Decimal`] so totals never pick up binary floating point noise.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

/// Parse an amount string. Empty or malformed input counts as zero.
#[must_use]
pub fn parse_amount(s: &str) -> Decimal {
    s.trim().parse().unwrap_or_default()
}

/// Parse an amount from a JSON value that may be a string, a number, or absent.
#[must_use]
pub fn parse_amount_value(value: Option<&Value>) -> Decimal {
    match value {
        Some(Value::String(s)) => parse_amount(s),
        Some(Value::Number(n)) => parse_amount(&n.to_string()),
        _ => Decimal::ZERO,
    }
}

/// Round to cents, with midpoints rounded away from zero.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Render an amount with exactly two fraction digits (`"25.00"`).
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = round_cents(amount);
    rounded.rescale(2);
    rounded.to_string()
}

/// Convert to `f64` for JSON responses that expose plain numbers.
#[must_use]
pub fn amount_to_f64(amount: Decimal) -> f64 {
    round_cents(amount).to_f64().unwrap_or_default()
}
