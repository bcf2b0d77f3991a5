//! Report kinds.

use crate::error::CoreError;
use crate::posting::Dataset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which notification the bot produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Weekly petroleum product stocks (WPSR).
    #[default]
    CrudeStocks,
    /// Daily NYMEX prompt-month futures closes.
    Futures,
}

impl ReportKind {
    pub const ALL: [ReportKind; 2] = [ReportKind::CrudeStocks, ReportKind::Futures];

    /// Posting-log dataset name. Matches the names already present in
    /// deployed logs, so it must not change.
    pub fn dataset(&self) -> Dataset {
        Dataset::new(self.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::CrudeStocks => "crude_stocks",
            ReportKind::Futures => "futures",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "crude_stocks" | "stocks" => Ok(ReportKind::CrudeStocks),
            "futures" | "prices" => Ok(ReportKind::Futures),
            other => Err(CoreError::UnknownReport(other.to_string())),
        }
    }
}
