//! Upstream query parameters.

use eiabot_core::SeriesId;
use serde::{Deserialize, Serialize};

/// Which generation of the EIA API serves a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Endpoint {
    /// v2 data API, e.g. route `petroleum/pri/fut`.
    Data { route: String },
    /// Retired v1 `series/` API, still answered by some mirrors.
    /// `category` is the id prefix (`PET`, `NG`).
    LegacySeries { category: String },
}

/// Observation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    /// Suffix used in legacy series ids (`PET.WCESTUS1.W`).
    pub fn legacy_suffix(&self) -> &'static str {
        match self {
            Frequency::Daily => "D",
            Frequency::Weekly => "W",
        }
    }
}

/// One upstream request: a fixed set of series and a lookback window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub endpoint: Endpoint,
    pub frequency: Frequency,
    pub series: Vec<SeriesId>,
    /// Points requested per series.
    pub lookback: usize,
    /// Points each series must have for the report to be computable.
    pub min_points: usize,
}

impl SeriesQuery {
    pub fn data(route: impl Into<String>, frequency: Frequency, series: Vec<SeriesId>) -> Self {
        Self {
            endpoint: Endpoint::Data {
                route: route.into(),
            },
            frequency,
            series,
            lookback: 2,
            min_points: 2,
        }
    }

    pub fn legacy(category: impl Into<String>, frequency: Frequency, series: Vec<SeriesId>) -> Self {
        Self {
            endpoint: Endpoint::LegacySeries {
                category: category.into(),
            },
            frequency,
            series,
            lookback: 2,
            min_points: 2,
        }
    }

    #[must_use]
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback.max(self.min_points);
        self
    }

    /// Semicolon-delimited legacy `series_id` parameter.
    pub fn legacy_series_param(&self) -> String {
        let category = match &self.endpoint {
            Endpoint::LegacySeries { category } => category.as_str(),
            Endpoint::Data { .. } => "PET",
        };
        let suffix = self.frequency.legacy_suffix();
        self.series
            .iter()
            .map(|id| format!("{category}.{id}.{suffix}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Facet document sent in the `X-Params` header of v2 requests.
    pub fn x_params(&self) -> XParams {
        XParams {
            frequency: self.frequency,
            data: vec!["value".to_string()],
            facets: Facets {
                series: self.series.iter().map(|s| s.as_str().to_string()).collect(),
            },
            start: None,
            end: None,
            sort: vec![SortSpec {
                column: "period".to_string(),
                direction: "desc".to_string(),
            }],
            offset: 0,
            // Rows are sorted across all series, so request a window per series.
            length: self.series.len() * self.lookback,
        }
    }
}

/// v2 `X-Params` header body.
#[derive(Debug, Clone, Serialize)]
pub struct XParams {
    pub frequency: Frequency,
    pub data: Vec<String>,
    pub facets: Facets,
    pub start: Option<String>,
    pub end: Option<String>,
    pub sort: Vec<SortSpec>,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Facets {
    pub series: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn futures_query() -> SeriesQuery {
        SeriesQuery::data(
            "petroleum/pri/fut",
            Frequency::Daily,
            vec!["RCLC1".into(), "EER_EPMRR_PE1_Y35NY_DPG".into()],
        )
    }

    #[test]
    fn test_x_params_serialization() {
        let json = serde_json::to_string(&futures_query().x_params()).unwrap();
        assert_eq!(
            json,
            r#"{"frequency":"daily","data":["value"],"facets":{"series":["RCLC1","EER_EPMRR_PE1_Y35NY_DPG"]},"start":null,"end":null,"sort":[{"column":"period","direction":"desc"}],"offset":0,"length":4}"#
        );
    }

    #[test]
    fn test_lookback_scales_length() {
        let params = futures_query().with_lookback(5).x_params();
        assert_eq!(params.length, 10);
    }

    #[test]
    fn test_lookback_never_below_min_points() {
        let q = futures_query().with_lookback(1);
        assert_eq!(q.lookback, 2);
    }

    #[test]
    fn test_legacy_series_param() {
        let q = SeriesQuery::legacy(
            "PET",
            Frequency::Weekly,
            vec!["WCRSTUS1".into(), "WCESTUS1".into()],
        );
        assert_eq!(q.legacy_series_param(), "PET.WCRSTUS1.W;PET.WCESTUS1.W");
    }
}
