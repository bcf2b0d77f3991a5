//! Invocation pipeline.
//!
//! One pass per invocation:
//! `FETCHED -> {DUPLICATE | NEW -> FORMATTED -> {DELIVERED -> RECORDED | DELIVERY_FAILED}}`.
//!
//! A posting record is written only after the channel acknowledged the
//! message. Nothing is retried; the next scheduled invocation is the retry.

use crate::error::{AppError, AppResult};
use eiabot_core::{Period, PostingRecord, ReportKind, SeriesId, SeriesSet};
use eiabot_detector::{report_period, ChangeDetector, Detection, DetectorConfig};
use eiabot_feed::SeriesSource;
use eiabot_notify::{ChannelAck, DeliveryError, Notifier, OutboundMessage, CAPTION_LIMIT};
use eiabot_persistence::{PostingLog, RecordOutcome};
use eiabot_report::{render, FetchOptions, FormatError, RenderedReport, ReportDefinition};
use eiabot_telemetry::Metrics;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pipeline stage reached by an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetched,
    Duplicate,
    New,
    Formatted,
    Delivered,
    Recorded,
    DeliveryFailed,
    /// Stopped by an error before a terminal stage.
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetched => "FETCHED",
            Stage::Duplicate => "DUPLICATE",
            Stage::New => "NEW",
            Stage::Formatted => "FORMATTED",
            Stage::Delivered => "DELIVERED",
            Stage::Recorded => "RECORDED",
            Stage::DeliveryFailed => "DELIVERY_FAILED",
            Stage::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// Body of the printed invocation outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeBody {
    pub post_made: bool,
    pub new_data: bool,
    pub channel_ack: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one invocation, printed as JSON by the binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationOutcome {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: OutcomeBody,
    #[serde(skip)]
    pub stage: Stage,
    #[serde(skip)]
    pub period: Option<Period>,
}

impl InvocationOutcome {
    fn no_new_data(period: Period) -> Self {
        Self {
            status_code: 200,
            body: OutcomeBody {
                post_made: false,
                new_data: false,
                channel_ack: None,
                error: None,
            },
            stage: Stage::Duplicate,
            period: Some(period),
        }
    }

    fn posted(period: Period, ack: ChannelAck) -> Self {
        Self {
            status_code: 200,
            body: OutcomeBody {
                post_made: true,
                new_data: true,
                channel_ack: Some(ack.detail),
                error: None,
            },
            stage: Stage::Recorded,
            period: Some(period),
        }
    }

    fn delivery_failed(period: Period, err: &DeliveryError) -> Self {
        Self {
            status_code: 502,
            body: OutcomeBody {
                post_made: false,
                new_data: true,
                channel_ack: err.ack().map(|a| a.detail.clone()),
                error: Some(err.to_string()),
            },
            stage: Stage::DeliveryFailed,
            period: Some(period),
        }
    }

    /// Delivered, but the posting record could not be written.
    fn unrecorded(period: Period, ack: ChannelAck, err: &AppError) -> Self {
        Self {
            status_code: 500,
            body: OutcomeBody {
                post_made: true,
                new_data: true,
                channel_ack: Some(ack.detail),
                error: Some(format!("delivered but not recorded: {err}")),
            },
            stage: Stage::Delivered,
            period: Some(period),
        }
    }

    /// Failure outside delivery (config, upstream, storage, formatting).
    pub fn failed(err: &AppError) -> Self {
        Self {
            status_code: 500,
            body: OutcomeBody {
                post_made: false,
                new_data: false,
                channel_ack: None,
                error: Some(err.to_string()),
            },
            stage: Stage::Aborted,
            period: None,
        }
    }

    /// Process exit code: 0 only for status 200.
    pub fn exit_code(&self) -> u8 {
        if self.status_code == 200 {
            0
        } else {
            1
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self.stage {
            Stage::Recorded => "posted",
            Stage::Duplicate => "duplicate",
            Stage::DeliveryFailed => "delivery_failed",
            Stage::Delivered => "unrecorded",
            _ => "error",
        }
    }
}

/// Result of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub kind: ReportKind,
    pub period: Period,
    pub new_data: bool,
    pub text: String,
    pub omitted: Vec<(SeriesId, FormatError)>,
}

/// Photo with the text as caption when the report has an image and the
/// text fits in a caption; plain text otherwise.
fn outbound_message(rendered: RenderedReport) -> OutboundMessage {
    match rendered.image {
        Some(image) if rendered.text.chars().count() <= CAPTION_LIMIT => {
            OutboundMessage::text(rendered.text).with_image(image.png, image.filename)
        }
        Some(_) => {
            warn!(
                report = %rendered.kind,
                len = rendered.text.chars().count(),
                "Message too long for a caption, sending text only"
            );
            OutboundMessage::text(rendered.text)
        }
        None => OutboundMessage::text(rendered.text),
    }
}

/// Fetch, detect, format, deliver, record.
pub struct Pipeline {
    source: Arc<dyn SeriesSource>,
    log: Arc<dyn PostingLog>,
    detector: ChangeDetector,
    notifier: Arc<dyn Notifier>,
    fetch_options: FetchOptions,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        log: Arc<dyn PostingLog>,
        notifier: Arc<dyn Notifier>,
        detector_config: DetectorConfig,
        fetch_options: FetchOptions,
    ) -> Self {
        let detector = ChangeDetector::new(log.clone(), detector_config);
        Self {
            source,
            log,
            detector,
            notifier,
            fetch_options,
        }
    }

    pub fn definition(&self, kind: ReportKind) -> ReportDefinition {
        ReportDefinition::for_kind(kind, &self.fetch_options)
    }

    /// One check-and-maybe-post cycle. Never panics on upstream, storage
    /// or channel failures; they are reported in the outcome.
    pub async fn run(&self, kind: ReportKind) -> InvocationOutcome {
        let definition = self.definition(kind);
        let outcome = match self.cycle(&definition).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(report = %kind, error = %e, "Invocation failed");
                Metrics::invocation(kind.as_str(), e.outcome_label());
                return InvocationOutcome::failed(&e);
            }
        };

        info!(
            report = %kind,
            stage = %outcome.stage,
            status = outcome.status_code,
            post_made = outcome.body.post_made,
            "Invocation finished"
        );
        Metrics::invocation(kind.as_str(), outcome.outcome_label());
        outcome
    }

    async fn cycle(&self, definition: &ReportDefinition) -> AppResult<InvocationOutcome> {
        let report = definition.kind.as_str();
        let set = self.fetch(definition).await?;
        let period = report_period(&set, &definition.primary)?;
        debug!(report, period = %period, stage = %Stage::Fetched, "Fetched");

        let detection = self.detector.detect(&definition.dataset, period)?;
        if !detection.is_new() {
            info!(report, period = %period, stage = %Stage::Duplicate, "Already posted, nothing to do");
            return Ok(InvocationOutcome::no_new_data(period));
        }
        info!(report, period = %period, stage = %Stage::New, "New data");

        let rendered = match render(definition, &set, period) {
            Ok(rendered) => rendered,
            Err(e) => {
                self.abandon(&detection);
                return Err(e.into());
            }
        };
        debug!(report, chars = rendered.text.len(), stage = %Stage::Formatted, "Formatted message");

        let message = outbound_message(rendered);
        let ack = match self.notifier.deliver(&message).await {
            Ok(ack) => ack,
            Err(e) => {
                let result = match &e {
                    DeliveryError::Rejected { .. } => "rejected",
                    DeliveryError::Transport(_) | DeliveryError::HttpClient(_) => "transport",
                };
                Metrics::delivery(report, result);
                warn!(report, period = %period, stage = %Stage::DeliveryFailed, error = %e, "Delivery failed, not recording");
                self.abandon(&detection);
                return Ok(InvocationOutcome::delivery_failed(period, &e));
            }
        };
        Metrics::delivery(report, "ok");
        info!(report, period = %period, stage = %Stage::Delivered, "Delivered");

        match self.detector.commit(&detection) {
            Ok(RecordOutcome::Inserted) => {}
            Ok(RecordOutcome::AlreadyRecorded) => Metrics::duplicate_delivery(report),
            Err(e) => {
                let e = AppError::from(e);
                error!(report, period = %period, error = %e, "Delivered but failed to write posting record");
                return Ok(InvocationOutcome::unrecorded(period, ack, &e));
            }
        }
        info!(report, period = %period, stage = %Stage::Recorded, "Recorded posting");

        Ok(InvocationOutcome::posted(period, ack))
    }

    /// Run every query of the report and merge the results.
    async fn fetch(&self, definition: &ReportDefinition) -> AppResult<SeriesSet> {
        let started = Instant::now();
        let mut merged = SeriesSet::default();
        for query in &definition.queries {
            let set = self.source.fetch(query).await;
            match set {
                Ok(set) => merged.extend(set),
                Err(e) => {
                    Metrics::upstream_fetch(definition.kind.as_str(), started.elapsed().as_secs_f64());
                    return Err(e.into());
                }
            }
        }
        Metrics::upstream_fetch(definition.kind.as_str(), started.elapsed().as_secs_f64());
        Ok(merged)
    }

    fn abandon(&self, detection: &Detection) {
        if let Err(e) = self.detector.abandon(detection) {
            warn!(
                dataset = %detection.dataset,
                period = %detection.period,
                error = %e,
                "Failed to release reservation; it will expire"
            );
        }
    }

    /// Dry run: fetch, detect and format without delivering or writing.
    pub async fn check(&self, kind: ReportKind) -> AppResult<CheckReport> {
        let definition = self.definition(kind);
        let set = self.fetch(&definition).await?;
        let period = report_period(&set, &definition.primary)?;
        let new_data = self.detector.is_new(&definition.dataset, period)?;
        let rendered = render(&definition, &set, period)?;

        Ok(CheckReport {
            kind,
            period,
            new_data,
            text: rendered.text,
            omitted: rendered.omitted,
        })
    }

    /// Most recent posting records for a report.
    pub fn history(&self, kind: ReportKind, limit: usize) -> AppResult<Vec<PostingRecord>> {
        Ok(self.log.records(&kind.dataset(), limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eiabot_core::{Series, SeriesPoint};
    use eiabot_detector::DedupMode;
    use eiabot_feed::StaticSeriesSource;
    use eiabot_notify::RecordingNotifier;
    use eiabot_persistence::MemoryPostingLog;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Harness {
        source: Arc<StaticSeriesSource>,
        log: Arc<MemoryPostingLog>,
        notifier: Arc<RecordingNotifier>,
        pipeline: Pipeline,
    }

    fn harness_with(mode: DedupMode, data: SeriesSet) -> Harness {
        let source = Arc::new(StaticSeriesSource::new(data));
        let log = Arc::new(MemoryPostingLog::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let pipeline = Pipeline::new(
            source.clone(),
            log.clone(),
            notifier.clone(),
            DetectorConfig {
                mode,
                ..Default::default()
            },
            FetchOptions::default(),
        );
        Harness {
            source,
            log,
            notifier,
            pipeline,
        }
    }

    fn series(id: &str, points: &[(&str, Decimal)]) -> Series {
        let sid = SeriesId::new(id);
        Series::new(
            sid.clone(),
            points
                .iter()
                .map(|(period, value)| SeriesPoint {
                    series_id: sid.clone(),
                    period: Period::parse(period).unwrap(),
                    value: *value,
                })
                .collect(),
        )
    }

    fn stocks_week(latest: &str, previous: &str, commercial: Decimal) -> SeriesSet {
        let row = |id: &str, current: Decimal, prior: Decimal| {
            series(id, &[(latest, current), (previous, prior)])
        };
        SeriesSet::new(vec![
            row("WCESTUS1", commercial, dec!(900)),
            row("WCSSTUS1", dec!(511997), dec!(519144)),
            row("WCRSTUS1", dec!(930698), dec!(935820)),
            row("WGTSTUS1", dec!(218239), dec!(217529)),
            row("WDISTUS1", dec!(105202), dec!(106041)),
        ])
    }

    fn period(s: &str) -> Period {
        Period::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_new_data_posts_and_records() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );

        let outcome = h.pipeline.run(ReportKind::CrudeStocks).await;

        assert_eq!(outcome.status_code, 200);
        assert!(outcome.body.post_made);
        assert!(outcome.body.new_data);
        assert_eq!(outcome.stage, Stage::Recorded);
        assert_eq!(outcome.period, Some(period("2022-06-10")));
        assert_eq!(h.notifier.delivery_count(), 1);
        assert!(h.notifier.deliveries()[0].text.contains("+100"));
        assert!(h.log.has_posted(&ReportKind::CrudeStocks.dataset(), period("2022-06-10")).unwrap());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );

        let first = h.pipeline.run(ReportKind::CrudeStocks).await;
        let second = h.pipeline.run(ReportKind::CrudeStocks).await;

        assert!(first.body.post_made);
        assert_eq!(second.status_code, 200);
        assert!(!second.body.post_made);
        assert!(!second.body.new_data);
        assert_eq!(second.stage, Stage::Duplicate);
        assert_eq!(h.notifier.delivery_count(), 1);
        assert_eq!(h.log.write_count(), 1);
        assert_eq!(h.source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_next_week_posts_again() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );
        h.pipeline.run(ReportKind::CrudeStocks).await;

        h.source
            .set_data(stocks_week("2022-06-17", "2022-06-10", dec!(950)));
        let outcome = h.pipeline.run(ReportKind::CrudeStocks).await;

        assert!(outcome.body.post_made);
        assert_eq!(h.log.write_count(), 2);
        assert!(h.notifier.deliveries()[1].text.contains("June 17, 2022"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_502_without_record() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );
        h.notifier.reject_next(400, "Bad Request: chat not found");

        let failed = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert_eq!(failed.status_code, 502);
        assert!(!failed.body.post_made);
        assert!(failed.body.new_data);
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(
            failed.body.channel_ack.as_ref().and_then(|a| a.get("description")).and_then(Value::as_str),
            Some("Bad Request: chat not found")
        );
        assert_eq!(h.log.write_count(), 0);

        // Same data, channel back: the retry posts.
        let retry = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert_eq!(retry.status_code, 200);
        assert!(retry.body.post_made);
        assert_eq!(h.log.write_count(), 1);
        assert_eq!(h.notifier.delivery_count(), 2);
    }

    #[tokio::test]
    async fn test_record_failure_after_delivery_is_500_with_post_made() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );
        h.log.set_writes_failing(true);

        let outcome = h.pipeline.run(ReportKind::CrudeStocks).await;

        assert_eq!(outcome.status_code, 500);
        assert_eq!(outcome.stage, Stage::Delivered);
        assert_eq!(outcome.outcome_label(), "unrecorded");
        assert!(outcome.body.post_made);
        assert!(outcome.body.new_data);
        assert!(outcome.body.channel_ack.is_some());
        assert!(outcome
            .body
            .error
            .as_deref()
            .is_some_and(|e| e.contains("delivered but not recorded")));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(h.notifier.delivery_count(), 1);
        assert_eq!(h.log.write_count(), 0);
    }

    #[tokio::test]
    async fn test_stocks_are_sent_as_photo() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );

        h.pipeline.run(ReportKind::CrudeStocks).await;

        let deliveries = h.notifier.deliveries();
        let delivered = &deliveries[0];
        let image = delivered.image.as_ref().expect("photo attachment");
        assert_eq!(image.filename, "crude_stocks_2022-06-10.png");
        assert_eq!(&image.bytes[1..4], b"PNG");
        assert!(delivered.text.chars().count() <= CAPTION_LIMIT);
    }

    #[test]
    fn test_long_text_drops_image() {
        let rendered = RenderedReport {
            kind: ReportKind::CrudeStocks,
            period: period("2022-06-10"),
            text: "x".repeat(CAPTION_LIMIT + 1),
            image: Some(eiabot_report::ReportImage {
                filename: "crude_stocks_2022-06-10.png".to_string(),
                png: vec![0x89, b'P', b'N', b'G'],
            }),
            omitted: Vec::new(),
        };
        let message = outbound_message(rendered);
        assert!(message.image.is_none());
        assert_eq!(message.text.len(), CAPTION_LIMIT + 1);
    }

    #[tokio::test]
    async fn test_missing_series_aborts_before_delivery() {
        let mut set = stocks_week("2022-06-10", "2022-06-03", dec!(1000));
        set = SeriesSet::new(set.iter().filter(|s| s.id.as_str() != "WDISTUS1").cloned().collect());
        let h = harness_with(DedupMode::ConditionalInsert, set);

        let outcome = h.pipeline.run(ReportKind::CrudeStocks).await;

        assert_eq!(outcome.status_code, 500);
        assert_eq!(outcome.stage, Stage::Aborted);
        assert!(outcome.body.error.as_deref().unwrap_or_default().contains("WDISTUS1"));
        assert_eq!(h.notifier.delivery_count(), 0);
        assert_eq!(h.log.write_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_unavailable_aborts() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );
        h.source.fail_with("connection refused");

        let outcome = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert_eq!(outcome.status_code, 500);
        assert_eq!(h.notifier.delivery_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_unavailable_aborts_before_delivery() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );
        h.log.set_unavailable(true);

        let outcome = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert_eq!(outcome.status_code, 500);
        assert_eq!(h.notifier.delivery_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_baseline_still_posts() {
        let set = SeriesSet::new(
            stocks_week("2022-06-10", "2022-06-03", dec!(1000))
                .iter()
                .map(|s| {
                    if s.id.as_str() == "WCSSTUS1" {
                        series("WCSSTUS1", &[("2022-06-10", dec!(100)), ("2022-06-03", dec!(0))])
                    } else {
                        s.clone()
                    }
                })
                .collect(),
        );
        let h = harness_with(DedupMode::ConditionalInsert, set);

        let outcome = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert!(outcome.body.post_made);
        let deliveries = h.notifier.deliveries();
        let text = &deliveries[0].text;
        assert!(text.contains("SPR"));
        assert!(text.contains("+100"));
    }

    #[tokio::test]
    async fn test_reserve_mode_posts_once_and_releases_on_failure() {
        let h = harness_with(
            DedupMode::ReserveThenFinalize,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );
        h.notifier.reject_next(502, "Bad Gateway");

        let failed = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert_eq!(failed.status_code, 502);
        assert_eq!(h.log.reservation_count(), 0);

        let posted = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert!(posted.body.post_made);
        assert_eq!(h.log.reservation_count(), 0);

        let again = h.pipeline.run(ReportKind::CrudeStocks).await;
        assert!(!again.body.new_data);
        assert_eq!(h.log.write_count(), 1);
    }

    #[tokio::test]
    async fn test_check_does_not_deliver_or_record() {
        let h = harness_with(
            DedupMode::ReserveThenFinalize,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );

        let report = h.pipeline.check(ReportKind::CrudeStocks).await.unwrap();
        assert!(report.new_data);
        assert_eq!(report.period, period("2022-06-10"));
        assert!(report.text.contains("Commercial crude"));
        assert_eq!(h.notifier.delivery_count(), 0);
        assert_eq!(h.log.write_count(), 0);
        assert_eq!(h.log.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_history_lists_records() {
        let h = harness_with(
            DedupMode::ConditionalInsert,
            stocks_week("2022-06-10", "2022-06-03", dec!(1000)),
        );
        h.pipeline.run(ReportKind::CrudeStocks).await;

        let records = h.pipeline.history(ReportKind::CrudeStocks, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].period, period("2022-06-10"));
        assert!(h.pipeline.history(ReportKind::Futures, 10).unwrap().is_empty());
    }

    #[test]
    fn test_stage_labels_are_documented() {
        let ack = eiabot_notify::ChannelAck::from_body(r#"{"ok":true}"#);
        let day = period("2022-06-10");
        let outcomes = [
            InvocationOutcome::no_new_data(day),
            InvocationOutcome::posted(day, ack.clone()),
            InvocationOutcome::delivery_failed(day, &DeliveryError::Transport("reset".to_string())),
            InvocationOutcome::unrecorded(day, ack, &AppError::Config("x".to_string())),
        ];
        for outcome in &outcomes {
            assert!(eiabot_telemetry::OUTCOME_LABELS.contains(&outcome.outcome_label()));
        }
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = InvocationOutcome::no_new_data(period("2022-06-10"));
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            json,
            r#"{"statusCode":200,"body":{"post_made":false,"new_data":false,"channel_ack":null}}"#
        );
        assert_eq!(outcome.exit_code(), 0);
    }
}
