//! EIA response parsing.
//!
//! Supports both response shapes:
//! 1. v2 data API: `{"response": {"data": [{"period", "series", "value"}]}}`
//! 2. legacy series API: `{"series": [{"series_id", "data": [[period, value]]}]}`
//!
//! Periods are normalized here, before anything downstream sees them.

use crate::error::{FeedError, FeedResult};
use crate::query::SeriesQuery;
use eiabot_core::{Period, Series, SeriesId, SeriesPoint, SeriesSet};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RawDataEnvelope {
    response: RawDataResponse,
}

#[derive(Debug, Deserialize)]
struct RawDataResponse {
    data: Vec<RawDataRow>,
}

/// v2 row. Other columns (units, descriptions) are ignored.
#[derive(Debug, Deserialize)]
struct RawDataRow {
    period: String,
    series: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct RawLegacyEnvelope {
    #[serde(default)]
    series: Option<Vec<RawLegacySeries>>,
    /// Legacy errors come back as 200 with `{"data": {"error": "..."}}`.
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawLegacySeries {
    series_id: String,
    #[serde(default)]
    data: Vec<(Value, Value)>,
}

/// Convert a JSON number or numeric string into an exact decimal.
pub fn parse_value(raw: &Value) -> FeedResult<Decimal> {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        Value::Null => {
            return Err(FeedError::UpstreamFormat("null value".to_string()));
        }
        other => {
            return Err(FeedError::UpstreamFormat(format!(
                "non-numeric value: {other}"
            )));
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| FeedError::UpstreamFormat(format!("bad value {text:?}: {e}")))
}

/// Convert a JSON string or integer period token into a `Period`.
pub fn parse_period(raw: &Value) -> FeedResult<Period> {
    match raw {
        Value::String(s) => Ok(Period::parse(s)?),
        Value::Number(n) => {
            let compact = n.as_u64().ok_or_else(|| {
                FeedError::UpstreamFormat(format!("bad period number: {n}"))
            })?;
            Ok(Period::from_compact(compact)?)
        }
        other => Err(FeedError::UpstreamFormat(format!("bad period: {other}"))),
    }
}

/// Parse a v2 data API body.
pub fn parse_data_response(body: &str, query: &SeriesQuery) -> FeedResult<SeriesSet> {
    let envelope: RawDataEnvelope = serde_json::from_str(body)?;
    let mut grouped: HashMap<SeriesId, Vec<SeriesPoint>> = HashMap::new();

    for row in envelope.response.data {
        let series_id = SeriesId::new(row.series);
        if !query.series.contains(&series_id) {
            debug!(series = %series_id, "Ignoring unrequested series row");
            continue;
        }
        let point = SeriesPoint {
            period: Period::parse(&row.period)?,
            value: parse_value(&row.value)?,
            series_id: series_id.clone(),
        };
        grouped.entry(series_id).or_default().push(point);
    }

    Ok(assemble(query, grouped))
}

/// Parse a legacy series API body.
pub fn parse_legacy_response(body: &str, query: &SeriesQuery) -> FeedResult<SeriesSet> {
    let envelope: RawLegacyEnvelope = serde_json::from_str(body)?;

    let Some(raw_series) = envelope.series else {
        let detail = envelope
            .data
            .map(|d| d.to_string())
            .unwrap_or_else(|| "missing `series`".to_string());
        return Err(FeedError::UpstreamFormat(detail));
    };

    let mut grouped: HashMap<SeriesId, Vec<SeriesPoint>> = HashMap::new();
    for raw in raw_series {
        let series_id = SeriesId::from_legacy(&raw.series_id)?;
        let mut points = Vec::with_capacity(raw.data.len());
        for (period, value) in &raw.data {
            points.push(SeriesPoint {
                series_id: series_id.clone(),
                period: parse_period(period)?,
                value: parse_value(value)?,
            });
        }
        grouped.entry(series_id).or_default().extend(points);
    }

    Ok(assemble(query, grouped))
}

/// Order series as requested; missing ones are caught by `validate`.
fn assemble(query: &SeriesQuery, mut grouped: HashMap<SeriesId, Vec<SeriesPoint>>) -> SeriesSet {
    let series = query
        .series
        .iter()
        .filter_map(|id| grouped.remove(id).map(|points| Series::new(id.clone(), points)))
        .collect();
    SeriesSet::new(series)
}

/// Shape checks: every requested series present with enough history.
pub fn validate(query: &SeriesQuery, set: &SeriesSet) -> FeedResult<()> {
    let missing: Vec<String> = query
        .series
        .iter()
        .filter(|id| set.get(id).is_none())
        .map(|id| id.to_string())
        .collect();

    if !missing.is_empty() {
        warn!(
            requested = query.series.len(),
            returned = set.len(),
            missing = ?missing,
            "Upstream response is missing series"
        );
        return Err(FeedError::UpstreamFormat(format!(
            "missing series {} ({} of {} returned)",
            missing.join(", "),
            set.len(),
            query.series.len()
        )));
    }

    for series in set.iter() {
        if series.len() < query.min_points {
            return Err(FeedError::InsufficientHistory {
                series: series.id.to_string(),
                got: series.len(),
                need: query.min_points,
            });
        }
    }

    Ok(())
}
