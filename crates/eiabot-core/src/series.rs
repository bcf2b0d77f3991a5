//! Upstream series data.

use crate::error::{CoreError, Result};
use crate::period::Period;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bare EIA series code (e.g. `WCESTUS1`, `RCLC1`).
///
/// Legacy `PET.WCESTUS1.W` ids are reduced to the bare code so the rest of
/// the system does not care which endpoint produced the data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Reduce a legacy `CATEGORY.CODE.FREQ` id to its bare code.
    pub fn from_legacy(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.split('.').collect();
        match parts.as_slice() {
            [code] if !code.is_empty() => Ok(Self::new(*code)),
            [_, code, _] if !code.is_empty() => Ok(Self::new(*code)),
            _ => Err(CoreError::InvalidSeriesId(id.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeriesId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One observation of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub series_id: SeriesId,
    pub period: Period,
    pub value: Decimal,
}

/// A series with its points ordered most-recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub id: SeriesId,
    points: Vec<SeriesPoint>,
}

impl Series {
    /// Build a series, sorting points newest first and dropping repeated periods.
    pub fn new(id: SeriesId, mut points: Vec<SeriesPoint>) -> Self {
        // Stable sort keeps the first occurrence of a repeated period in front.
        points.sort_by(|a, b| b.period.cmp(&a.period));
        points.dedup_by(|later, earlier| later.period == earlier.period);
        Self { id, points }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn previous(&self) -> Option<&SeriesPoint> {
        self.points.get(1)
    }
}

/// All series returned for one or more upstream queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesSet {
    series: Vec<Series>,
}

impl SeriesSet {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    pub fn get(&self, id: &SeriesId) -> Option<&Series> {
        self.series.iter().find(|s| &s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.iter()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Merge another set into this one (used when a report spans two routes).
    pub fn extend(&mut self, other: SeriesSet) {
        self.series.extend(other.series);
    }
}
