//! In-process posting log.
//!
//! Used by tests and dry runs. Lives only as long as the process, so it
//! gives no protection across invocations.

use crate::error::{PersistenceError, PersistenceResult};
use crate::log::{reservation_expired, PostingLog, RecordOutcome, ReservationToken, ReserveOutcome};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use eiabot_core::{Dataset, Period, PostingRecord};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

type Key = (Dataset, Period);

/// Posting log held in memory.
#[derive(Debug, Default)]
pub struct MemoryPostingLog {
    postings: DashMap<Key, PostingRecord>,
    reservations: DashMap<Key, (ReservationToken, DateTime<Utc>)>,
    /// Simulates an unreachable store.
    unavailable: AtomicBool,
    /// Simulates a store that answers reads but rejects posting writes.
    writes_failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryPostingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StorageUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `record_posted` and `finalize` fail with `StorageUnavailable`
    /// while lookups and reservations keep working.
    pub fn set_writes_failing(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of posting records written through this log.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of live reservations.
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    fn check_available(&self) -> PersistenceResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PersistenceError::StorageUnavailable(
                "memory log marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn check_writable(&self) -> PersistenceResult<()> {
        self.check_available()?;
        if self.writes_failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::StorageUnavailable(
                "memory log rejecting writes".to_string(),
            ));
        }
        Ok(())
    }

    fn insert_if_absent(&self, dataset: &Dataset, period: Period) -> RecordOutcome {
        match self.postings.entry((dataset.clone(), period)) {
            Entry::Occupied(_) => RecordOutcome::AlreadyRecorded,
            Entry::Vacant(slot) => {
                slot.insert(PostingRecord::posted_now(dataset.clone(), period));
                self.writes.fetch_add(1, Ordering::SeqCst);
                RecordOutcome::Inserted
            }
        }
    }
}

impl PostingLog for MemoryPostingLog {
    fn has_posted(&self, dataset: &Dataset, period: Period) -> PersistenceResult<bool> {
        self.check_available()?;
        Ok(self
            .postings
            .get(&(dataset.clone(), period))
            .map(|r| r.posted)
            .unwrap_or(false))
    }

    fn record_posted(&self, dataset: &Dataset, period: Period) -> PersistenceResult<RecordOutcome> {
        self.check_writable()?;
        Ok(self.insert_if_absent(dataset, period))
    }

    fn reserve(
        &self,
        dataset: &Dataset,
        period: Period,
        ttl: Duration,
    ) -> PersistenceResult<ReserveOutcome> {
        self.check_available()?;
        // Lock order is reservations then postings, same as finalize.
        let now = Utc::now();
        let key = (dataset.clone(), period);
        let slot = self.reservations.entry(key.clone());
        if self.postings.contains_key(&key) {
            return Ok(ReserveOutcome::AlreadyPosted);
        }
        match slot {
            Entry::Occupied(mut held) => {
                let (_, reserved_at) = *held.get();
                if !reservation_expired(reserved_at, ttl, now) {
                    return Ok(ReserveOutcome::Held { reserved_at });
                }
                let token = ReservationToken::generate();
                held.insert((token, now));
                Ok(ReserveOutcome::Reserved(token))
            }
            Entry::Vacant(slot) => {
                let token = ReservationToken::generate();
                slot.insert((token, now));
                Ok(ReserveOutcome::Reserved(token))
            }
        }
    }

    fn finalize(
        &self,
        dataset: &Dataset,
        period: Period,
        token: ReservationToken,
    ) -> PersistenceResult<RecordOutcome> {
        self.check_writable()?;
        let key = (dataset.clone(), period);
        let held = self.reservations.entry(key);
        let outcome = self.insert_if_absent(dataset, period);
        if let Entry::Occupied(held) = held {
            if held.get().0 == token {
                held.remove();
            }
        }
        Ok(outcome)
    }

    fn release(
        &self,
        dataset: &Dataset,
        period: Period,
        token: ReservationToken,
    ) -> PersistenceResult<()> {
        self.check_available()?;
        self.reservations
            .remove_if(&(dataset.clone(), period), |_, (held, _)| *held == token);
        Ok(())
    }

    fn records(&self, dataset: &Dataset, limit: usize) -> PersistenceResult<Vec<PostingRecord>> {
        self.check_available()?;
        let mut records: Vec<PostingRecord> = self
            .postings
            .iter()
            .filter(|entry| &entry.key().0 == dataset)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.period.cmp(&a.period));
        records.truncate(limit);
        Ok(records)
    }
}
