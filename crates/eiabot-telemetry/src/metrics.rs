//! Prometheus metrics for eiabot.
//!
//! The bot runs once and exits, so there is no scrape endpoint. The
//! registry is written to a node-exporter textfile at the end of each
//! invocation instead (`write_textfile`).
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means a duplicate metric
//! name, which is a programming error and surfaces on first use.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::fs;
use std::path::Path;

/// Values of the `outcome` label on `eiabot_invocations_total`.
pub const OUTCOME_LABELS: &[&str] = &[
    "posted",
    "duplicate",
    "delivery_failed",
    "unrecorded",
    "config_error",
    "upstream_unavailable",
    "upstream_format",
    "insufficient_history",
    "storage_unavailable",
    "format_error",
    "internal_error",
];

/// Invocations by report and outcome; see `OUTCOME_LABELS`.
pub static INVOCATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "eiabot_invocations_total",
        "Bot invocations by report and outcome",
        &["report", "outcome"]
    )
    .unwrap()
});

/// Upstream fetch duration in seconds.
pub static UPSTREAM_FETCH_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "eiabot_upstream_fetch_seconds",
        "EIA fetch duration in seconds",
        &["report"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

/// Delivery attempts by result (`ok`, `rejected`, `transport`).
pub static DELIVERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "eiabot_deliveries_total",
        "Notification delivery attempts by result",
        &["report", "result"]
    )
    .unwrap()
});

/// Deliveries whose posting record was already written by an overlapping run.
pub static DUPLICATE_DELIVERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "eiabot_duplicate_deliveries_total",
        "Messages delivered for a period another invocation had already recorded",
        &["report"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn invocation(report: &str, outcome: &str) {
        INVOCATIONS_TOTAL.with_label_values(&[report, outcome]).inc();
    }

    pub fn upstream_fetch(report: &str, seconds: f64) {
        UPSTREAM_FETCH_SECONDS
            .with_label_values(&[report])
            .observe(seconds);
    }

    pub fn delivery(report: &str, result: &str) {
        DELIVERIES_TOTAL.with_label_values(&[report, result]).inc();
    }

    pub fn duplicate_delivery(report: &str) {
        DUPLICATE_DELIVERIES_TOTAL.with_label_values(&[report]).inc();
    }
}

/// Render the default registry in text exposition format.
pub fn render_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Write the registry to `path` for the textfile collector.
///
/// Writes a sibling temp file and renames it, so the collector never reads
/// a partial file.
pub fn write_textfile(path: &Path) -> TelemetryResult<()> {
    let text = render_text()?;
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
