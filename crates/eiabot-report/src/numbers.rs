//! Number formatting for report lines.
//!
//! All arithmetic stays in `Decimal`; rounding is half away from zero.

use crate::error::{FormatError, FormatResult};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places shown for a figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision(pub u32);

impl Precision {
    /// Thousand-barrel volumes.
    pub const VOLUME: Self = Self(0);
    pub const CENTS: Self = Self(2);
    pub const TENTH_CENTS: Self = Self(3);
    pub const PERCENT: Self = Self(2);

    #[inline]
    pub fn places(&self) -> u32 {
        self.0
    }
}

/// Round to `precision` and pad to exactly that many places.
///
/// A value that rounds to zero loses its sign, so `-0.004` at two places
/// is `0.00`, never `-0.00`.
pub fn round_to(value: Decimal, precision: Precision) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(precision.places(), RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(precision.places());
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

/// Insert `,` between groups of three integer digits.
///
/// `421354` → `421,354`, `-1234567.5` → `-1,234,567.5`.
pub fn group_thousands(value: Decimal) -> String {
    let text = value.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Rounded, grouped, unsigned rendering of a level.
pub fn format_level(value: Decimal, precision: Precision) -> String {
    group_thousands(round_to(value, precision))
}

fn signed(value: Decimal, precision: Precision, currency: &str) -> String {
    let rounded = round_to(value, precision);
    let sign = if rounded.is_sign_negative() { '-' } else { '+' };
    format!("{sign}{currency}{}", group_thousands(rounded.abs()))
}

fn checked_delta(current: Decimal, previous: Decimal) -> FormatResult<Decimal> {
    current
        .checked_sub(previous)
        .ok_or_else(|| FormatError::Overflow(format!("{current} - {previous}")))
}

/// `current - previous` with an explicit sign.
///
/// Zero renders as `+0`.
pub fn format_delta(current: Decimal, previous: Decimal, precision: Precision) -> FormatResult<String> {
    Ok(signed(checked_delta(current, previous)?, precision, ""))
}

/// Like `format_delta`, with the currency symbol after the sign (`-$0.125`).
pub fn format_money_delta(
    current: Decimal,
    previous: Decimal,
    precision: Precision,
    currency: &str,
) -> FormatResult<String> {
    Ok(signed(checked_delta(current, previous)?, precision, currency))
}

/// `(current - previous) / previous * 100`, unrounded.
pub fn percent_change(current: Decimal, previous: Decimal) -> FormatResult<Decimal> {
    if previous.is_zero() {
        return Err(FormatError::ZeroBaseline);
    }
    checked_delta(current, previous)?
        .checked_div(previous)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or_else(|| FormatError::Overflow(format!("({current} - {previous}) / {previous}")))
}

/// Percentage change rounded to two places, e.g. `+0.49%`.
pub fn format_percent_change(current: Decimal, previous: Decimal) -> FormatResult<String> {
    let pct = percent_change(current, previous)?;
    Ok(format!("{}%", signed(pct, Precision::PERCENT, "")))
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
