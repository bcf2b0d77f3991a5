//! Posting log contract.

use crate::error::PersistenceResult;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eiabot_core::{Dataset, Period, PostingRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// This call created the record.
    Inserted,
    /// A record for (dataset, period) already existed; nothing was written.
    AlreadyRecorded,
}

/// Identifies the invocation holding a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationToken(Uuid);

impl ReservationToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for ReservationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of trying to reserve a (dataset, period) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Slot is ours until finalize/release or until the TTL runs out.
    Reserved(ReservationToken),
    /// A posted record already exists.
    AlreadyPosted,
    /// Another invocation holds a live reservation.
    Held { reserved_at: DateTime<Utc> },
}

/// Whether a reservation taken at `reserved_at` has outlived `ttl`.
pub fn reservation_expired(reserved_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(36_500));
    now.signed_duration_since(reserved_at) >= ttl
}

/// Durable record of announced (dataset, period) pairs.
///
/// `has_posted` + `record_posted` is the check-then-act pair used by the
/// default pipeline. `record_posted` is an insert-if-absent, so racing
/// invocations leave exactly one record even though both may already have
/// delivered.
///
/// `reserve` / `finalize` / `release` close that window: the slot is
/// claimed before delivery and only one invocation can hold it.
pub trait PostingLog: Send + Sync {
    /// Whether a posted record exists for exactly (dataset, period).
    fn has_posted(&self, dataset: &Dataset, period: Period) -> PersistenceResult<bool>;

    /// Append a posted record unless one already exists.
    fn record_posted(&self, dataset: &Dataset, period: Period) -> PersistenceResult<RecordOutcome>;

    /// Claim the slot before delivery. Reservations older than `ttl` are taken over.
    fn reserve(
        &self,
        dataset: &Dataset,
        period: Period,
        ttl: Duration,
    ) -> PersistenceResult<ReserveOutcome>;

    /// Record the posting and drop the caller's reservation, atomically.
    fn finalize(
        &self,
        dataset: &Dataset,
        period: Period,
        token: ReservationToken,
    ) -> PersistenceResult<RecordOutcome>;

    /// Drop the caller's reservation after a failed delivery.
    fn release(
        &self,
        dataset: &Dataset,
        period: Period,
        token: ReservationToken,
    ) -> PersistenceResult<()>;

    /// Most recent records for a dataset, newest period first.
    fn records(&self, dataset: &Dataset, limit: usize) -> PersistenceResult<Vec<PostingRecord>>;
}
