//! Canonical period tokens.
//!
//! The EIA APIs label observations in several shapes depending on the
//! endpoint generation:
//! - legacy series API: `"20220610"` (sometimes as a bare JSON integer)
//! - v2 data API: `"2022-06-10"`
//!
//! Every token is normalized to a calendar date at ingestion so that the
//! posting log only ever sees one representation.

use crate::error::{CoreError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized observation period (ISO-8601 calendar date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(NaiveDate);

impl Period {
    #[inline]
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Parse any upstream period token into its canonical form.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();

        let format = if token.len() == 8 && token.bytes().all(|b| b.is_ascii_digit()) {
            "%Y%m%d"
        } else if token.len() == 10 && token.as_bytes()[4] == b'-' {
            "%Y-%m-%d"
        } else {
            return Err(CoreError::InvalidPeriod(token.to_string()));
        };

        NaiveDate::parse_from_str(token, format)
            .map(Self)
            .map_err(|e| CoreError::InvalidPeriod(format!("{token}: {e}")))
    }

    /// Parse a period given as a JSON integer (legacy `end` field).
    pub fn from_compact(value: u64) -> Result<Self> {
        Self::parse(&value.to_string())
    }

    /// Canonical ISO-8601 form, used as the posting-log key.
    pub fn to_iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Human-readable form for message titles (e.g. "June 10, 2022").
    pub fn to_long_string(&self) -> String {
        self.0.format("%B %d, %Y").to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<NaiveDate> for Period {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_and_iso_tokens_are_equal() {
        let compact = Period::parse("20220610").unwrap();
        let iso = Period::parse("2022-06-10").unwrap();
        assert_eq!(compact, iso);
        assert_eq!(compact.to_iso(), "2022-06-10");
    }

    #[test]
    fn test_slash_token_is_rejected() {
        assert!(matches!(
            Period::parse("06/10/22"),
            Err(CoreError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn test_integer_token() {
        let p = Period::from_compact(20220610).unwrap();
        assert_eq!(p, Period::parse("2022-06-10").unwrap());
    }

    #[test]
    fn test_different_periods_stay_distinct() {
        let a = Period::parse("20220610").unwrap();
        let b = Period::parse("2022-06-17").unwrap();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        assert!(Period::parse("2022-06").is_err());
        assert!(Period::parse("2022").is_err());
        assert!(Period::parse("").is_err());
        assert!(Period::parse("20221340").is_err());
    }

    #[test]
    fn test_long_string() {
        let p = Period::parse("2022-06-03").unwrap();
        assert_eq!(p.to_long_string(), "June 03, 2022");
    }

    #[test]
    fn test_serde_is_iso_string() {
        let p = Period::parse("20220610").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), r#""2022-06-10""#);
        let back: Period = serde_json::from_str(r#""2022-06-10""#).unwrap();
        assert_eq!(back, p);
    }
}
