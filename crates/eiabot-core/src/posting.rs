//! Posting log domain types.

use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named report category; one row family in the posting log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset(String);

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One announced (dataset, period) pair.
///
/// Written only after the channel acknowledged delivery and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRecord {
    pub dataset: Dataset,
    pub period: Period,
    pub posted: bool,
    pub recorded_at: DateTime<Utc>,
}

impl PostingRecord {
    pub fn posted_now(dataset: Dataset, period: Period) -> Self {
        Self {
            dataset,
            period,
            posted: true,
            recorded_at: Utc::now(),
        }
    }
}
