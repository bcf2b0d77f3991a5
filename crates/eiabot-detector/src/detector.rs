//! Change detector.
//!
//! Decides whether the latest period of a dataset still needs announcing,
//! and writes the posting record once the channel has acknowledged.

use crate::config::{DedupMode, DetectorConfig};
use crate::error::{DetectorError, DetectorResult};
use eiabot_core::{Dataset, Period, SeriesId, SeriesSet};
use eiabot_persistence::{PostingLog, RecordOutcome, ReservationToken, ReserveOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether the fetched period still needs announcing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    New,
    Duplicate,
}

/// Result of checking one (dataset, period) against the posting log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub dataset: Dataset,
    pub period: Period,
    pub verdict: Verdict,
    /// Held slot when running in reserve-then-finalize mode.
    pub reservation: Option<ReservationToken>,
}

impl Detection {
    pub fn is_new(&self) -> bool {
        self.verdict == Verdict::New
    }
}

/// The dataset's current period: the latest period of its primary series.
pub fn report_period(set: &SeriesSet, primary: &SeriesId) -> DetectorResult<Period> {
    set.get(primary)
        .and_then(|s| s.latest())
        .map(|p| p.period)
        .ok_or_else(|| DetectorError::EmptyPrimary(primary.to_string()))
}

/// New-data detector backed by the posting log.
pub struct ChangeDetector {
    log: Arc<dyn PostingLog>,
    config: DetectorConfig,
}

impl ChangeDetector {
    pub fn new(log: Arc<dyn PostingLog>, config: DetectorConfig) -> Self {
        Self { log, config }
    }

    pub fn mode(&self) -> DedupMode {
        self.config.mode
    }

    /// True unless a posted record exists for exactly (dataset, period).
    pub fn is_new(&self, dataset: &Dataset, period: Period) -> DetectorResult<bool> {
        Ok(!self.log.has_posted(dataset, period)?)
    }

    /// Check (and in reserve mode, claim) the slot for this period.
    pub fn detect(&self, dataset: &Dataset, period: Period) -> DetectorResult<Detection> {
        let (verdict, reservation) = match self.config.mode {
            DedupMode::ConditionalInsert => {
                if self.is_new(dataset, period)? {
                    (Verdict::New, None)
                } else {
                    (Verdict::Duplicate, None)
                }
            }
            DedupMode::ReserveThenFinalize => {
                match self
                    .log
                    .reserve(dataset, period, self.config.reservation_ttl())?
                {
                    ReserveOutcome::Reserved(token) => (Verdict::New, Some(token)),
                    ReserveOutcome::AlreadyPosted => (Verdict::Duplicate, None),
                    ReserveOutcome::Held { reserved_at } => {
                        info!(
                            dataset = %dataset,
                            period = %period,
                            reserved_at = %reserved_at,
                            "Period is being delivered by another invocation"
                        );
                        (Verdict::Duplicate, None)
                    }
                }
            }
        };

        debug!(dataset = %dataset, period = %period, ?verdict, mode = ?self.config.mode, "Detection");

        Ok(Detection {
            dataset: dataset.clone(),
            period,
            verdict,
            reservation,
        })
    }

    /// Record a confirmed delivery.
    ///
    /// Only call after the channel acknowledged the message.
    pub fn commit(&self, detection: &Detection) -> DetectorResult<RecordOutcome> {
        let outcome = match detection.reservation {
            Some(token) => self
                .log
                .finalize(&detection.dataset, detection.period, token)?,
            None => self
                .log
                .record_posted(&detection.dataset, detection.period)?,
        };

        if outcome == RecordOutcome::AlreadyRecorded {
            // Another invocation delivered and recorded the same period
            // between our lookup and this write.
            warn!(
                dataset = %detection.dataset,
                period = %detection.period,
                "Posting already recorded by an overlapping invocation; duplicate message delivered"
            );
        }

        Ok(outcome)
    }

    /// Give up the slot after a failed delivery so a later run can retry.
    pub fn abandon(&self, detection: &Detection) -> DetectorResult<()> {
        if let Some(token) = detection.reservation {
            self.log
                .release(&detection.dataset, detection.period, token)?;
        }
        Ok(())
    }
}
