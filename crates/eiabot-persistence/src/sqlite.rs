//! SQLite-backed posting log.
//!
//! The composite primary key `(dataset, period)` is what makes
//! `record_posted` an insert-if-absent: `INSERT OR IGNORE` either creates
//! the row or changes nothing. Overlapping processes serialize on the file
//! through WAL mode and the busy timeout.

use crate::error::{PersistenceError, PersistenceResult};
use crate::log::{reservation_expired, PostingLog, RecordOutcome, ReservationToken, ReserveOutcome};
use chrono::{DateTime, Utc};
use eiabot_core::{Dataset, Period, PostingRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default wait for a lock held by another process.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Posting log stored in a SQLite file.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so it sits behind a mutex.
pub struct SqlitePostingLog {
    conn: Mutex<Connection>,
}

impl SqlitePostingLog {
    /// Open (or create) the log at `path`.
    ///
    /// Use `:memory:` for a throwaway database.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            PersistenceError::StorageUnavailable(format!("open {}: {e}", path.display()))
        })?;
        conn.busy_timeout(busy_timeout)?;

        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(include_str!("schema.sql"))?;

        info!(path = %path.display(), journal = %journal, "Opened posting log");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        Self::open(":memory:", DEFAULT_BUSY_TIMEOUT)
    }

    fn parse_timestamp(raw: &str) -> PersistenceResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| PersistenceError::Corrupt(format!("timestamp {raw:?}: {e}")))
    }

    fn parse_period(raw: &str) -> PersistenceResult<Period> {
        Period::parse(raw).map_err(|e| PersistenceError::Corrupt(e.to_string()))
    }
}

impl PostingLog for SqlitePostingLog {
    fn has_posted(&self, dataset: &Dataset, period: Period) -> PersistenceResult<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM postings WHERE dataset = ?1 AND period = ?2 AND posted = 1",
                params![dataset.as_str(), period.to_iso()],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        debug!(dataset = %dataset, period = %period, found, "Posting log lookup");
        Ok(found)
    }

    fn record_posted(&self, dataset: &Dataset, period: Period) -> PersistenceResult<RecordOutcome> {
        let record = PostingRecord::posted_now(dataset.clone(), period);
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO postings (dataset, period, posted, recorded_at)
             VALUES (?1, ?2, 1, ?3)",
            params![
                record.dataset.as_str(),
                record.period.to_iso(),
                record.recorded_at.to_rfc3339()
            ],
        )?;

        Ok(if changed == 1 {
            RecordOutcome::Inserted
        } else {
            RecordOutcome::AlreadyRecorded
        })
    }

    fn reserve(
        &self,
        dataset: &Dataset,
        period: Period,
        ttl: Duration,
    ) -> PersistenceResult<ReserveOutcome> {
        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front so two processes cannot
        // both pass the checks below.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let period_key = period.to_iso();
        let key = params![dataset.as_str(), period_key];

        let posted = tx
            .query_row(
                "SELECT 1 FROM postings WHERE dataset = ?1 AND period = ?2 AND posted = 1",
                key,
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if posted {
            return Ok(ReserveOutcome::AlreadyPosted);
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT reserved_at FROM reservations WHERE dataset = ?1 AND period = ?2",
                key,
                |row| row.get(0),
            )
            .optional()?;

        let now = Utc::now();
        if let Some(raw) = existing {
            let reserved_at = Self::parse_timestamp(&raw)?;
            if !reservation_expired(reserved_at, ttl, now) {
                return Ok(ReserveOutcome::Held { reserved_at });
            }
            warn!(
                dataset = %dataset,
                period = %period,
                reserved_at = %reserved_at,
                "Taking over expired reservation"
            );
            tx.execute(
                "DELETE FROM reservations WHERE dataset = ?1 AND period = ?2",
                key,
            )?;
        }

        let token = ReservationToken::generate();
        tx.execute(
            "INSERT INTO reservations (dataset, period, token, reserved_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                dataset.as_str(),
                period_key,
                token.to_string(),
                now.to_rfc3339()
            ],
        )?;
        tx.commit()?;

        debug!(dataset = %dataset, period = %period, token = %token, "Reserved slot");
        Ok(ReserveOutcome::Reserved(token))
    }

    fn finalize(
        &self,
        dataset: &Dataset,
        period: Period,
        token: ReservationToken,
    ) -> PersistenceResult<RecordOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO postings (dataset, period, posted, recorded_at)
             VALUES (?1, ?2, 1, ?3)",
            params![dataset.as_str(), period.to_iso(), Utc::now().to_rfc3339()],
        )?;
        let released = tx.execute(
            "DELETE FROM reservations WHERE dataset = ?1 AND period = ?2 AND token = ?3",
            params![dataset.as_str(), period.to_iso(), token.to_string()],
        )?;
        tx.commit()?;

        if released == 0 {
            warn!(
                dataset = %dataset,
                period = %period,
                token = %token,
                "Reservation was no longer held at finalize"
            );
        }

        Ok(if inserted == 1 {
            RecordOutcome::Inserted
        } else {
            RecordOutcome::AlreadyRecorded
        })
    }

    fn release(
        &self,
        dataset: &Dataset,
        period: Period,
        token: ReservationToken,
    ) -> PersistenceResult<()> {
        let conn = self.conn.lock();
        let released = conn.execute(
            "DELETE FROM reservations WHERE dataset = ?1 AND period = ?2 AND token = ?3",
            params![dataset.as_str(), period.to_iso(), token.to_string()],
        )?;
        debug!(dataset = %dataset, period = %period, released, "Released reservation");
        Ok(())
    }

    fn records(&self, dataset: &Dataset, limit: usize) -> PersistenceResult<Vec<PostingRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT period, posted, recorded_at FROM postings
             WHERE dataset = ?1 ORDER BY period DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![dataset.as_str(), limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (period, posted, recorded_at) = row?;
            records.push(PostingRecord {
                dataset: dataset.clone(),
                period: Self::parse_period(&period)?,
                posted,
                recorded_at: Self::parse_timestamp(&recorded_at)?,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stocks() -> Dataset {
        Dataset::new("crude_stocks")
    }

    fn period(s: &str) -> Period {
        Period::parse(s).unwrap()
    }

    #[test]
    fn test_record_then_lookup() {
        let log = SqlitePostingLog::in_memory().unwrap();
        assert!(!log.has_posted(&stocks(), period("2022-06-10")).unwrap());

        let outcome = log.record_posted(&stocks(), period("2022-06-10")).unwrap();
        assert_eq!(outcome, RecordOutcome::Inserted);
        assert!(log.has_posted(&stocks(), period("2022-06-10")).unwrap());
        // Other periods and datasets are unaffected.
        assert!(!log.has_posted(&stocks(), period("2022-06-17")).unwrap());
        assert!(!log
            .has_posted(&Dataset::new("futures"), period("2022-06-10"))
            .unwrap());
    }

    #[test]
    fn test_conditional_insert_keeps_one_record() {
        let log = SqlitePostingLog::in_memory().unwrap();
        assert_eq!(
            log.record_posted(&stocks(), period("20220610")).unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            log.record_posted(&stocks(), period("2022-06-10")).unwrap(),
            RecordOutcome::AlreadyRecorded
        );
        assert_eq!(log.records(&stocks(), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_two_handles_on_one_file_race_to_one_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("postings.db");
        let a = SqlitePostingLog::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        let b = SqlitePostingLog::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();

        // Both observe "not posted" before either writes.
        assert!(!a.has_posted(&stocks(), period("2022-06-10")).unwrap());
        assert!(!b.has_posted(&stocks(), period("2022-06-10")).unwrap());

        let first = a.record_posted(&stocks(), period("2022-06-10")).unwrap();
        let second = b.record_posted(&stocks(), period("2022-06-10")).unwrap();
        assert_eq!(first, RecordOutcome::Inserted);
        assert_eq!(second, RecordOutcome::AlreadyRecorded);
        assert_eq!(a.records(&stocks(), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("postings.db");
        {
            let log = SqlitePostingLog::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
            log.record_posted(&stocks(), period("2022-06-03")).unwrap();
            log.record_posted(&stocks(), period("2022-06-10")).unwrap();
        }

        let log = SqlitePostingLog::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        let records = log.records(&stocks(), 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].period, period("2022-06-10"));
        assert!(records.iter().all(|r| r.posted));
        assert_eq!(log.records(&stocks(), 1).unwrap().len(), 1);
    }

    #[test]
    fn test_unreachable_path_is_storage_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("postings.db");
        let result = SqlitePostingLog::open(&path, DEFAULT_BUSY_TIMEOUT);
        assert!(matches!(result, Err(PersistenceError::StorageUnavailable(_))));
    }

    #[test]
    fn test_reserve_finalize() {
        let log = SqlitePostingLog::in_memory().unwrap();
        let ttl = Duration::from_secs(300);

        let token = match log.reserve(&stocks(), period("2022-06-10"), ttl).unwrap() {
            ReserveOutcome::Reserved(token) => token,
            other => panic!("expected reservation, got {other:?}"),
        };
        // A second invocation sees the slot as held.
        assert!(matches!(
            log.reserve(&stocks(), period("2022-06-10"), ttl).unwrap(),
            ReserveOutcome::Held { .. }
        ));

        let outcome = log.finalize(&stocks(), period("2022-06-10"), token).unwrap();
        assert_eq!(outcome, RecordOutcome::Inserted);
        assert!(log.has_posted(&stocks(), period("2022-06-10")).unwrap());
        assert_eq!(
            log.reserve(&stocks(), period("2022-06-10"), ttl).unwrap(),
            ReserveOutcome::AlreadyPosted
        );
    }

    #[test]
    fn test_release_frees_slot() {
        let log = SqlitePostingLog::in_memory().unwrap();
        let ttl = Duration::from_secs(300);

        let ReserveOutcome::Reserved(token) = log.reserve(&stocks(), period("2022-06-10"), ttl).unwrap() else {
            panic!("expected reservation");
        };
        log.release(&stocks(), period("2022-06-10"), token).unwrap();

        assert!(!log.has_posted(&stocks(), period("2022-06-10")).unwrap());
        assert!(matches!(
            log.reserve(&stocks(), period("2022-06-10"), ttl).unwrap(),
            ReserveOutcome::Reserved(_)
        ));
    }

    #[test]
    fn test_expired_reservation_is_taken_over() {
        let log = SqlitePostingLog::in_memory().unwrap();

        let ReserveOutcome::Reserved(stale) = log
            .reserve(&stocks(), period("2022-06-10"), Duration::from_secs(300))
            .unwrap()
        else {
            panic!("expected reservation");
        };

        // Zero TTL: any existing reservation counts as abandoned.
        let ReserveOutcome::Reserved(fresh) = log
            .reserve(&stocks(), period("2022-06-10"), Duration::ZERO)
            .unwrap()
        else {
            panic!("expected takeover");
        };
        assert_ne!(stale, fresh);

        // The stale holder can no longer release the new reservation.
        log.release(&stocks(), period("2022-06-10"), stale).unwrap();
        assert!(matches!(
            log.reserve(&stocks(), period("2022-06-10"), Duration::from_secs(300))
                .unwrap(),
            ReserveOutcome::Held { .. }
        ));
    }

    #[test]
    fn test_late_finalize_after_takeover_blocks_reserve() {
        let log = SqlitePostingLog::in_memory().unwrap();
        let day = period("2022-06-10");

        let ReserveOutcome::Reserved(first) = log.reserve(&stocks(), day, Duration::from_secs(300)).unwrap() else {
            panic!("expected reservation");
        };
        assert!(matches!(
            log.reserve(&stocks(), day, Duration::ZERO).unwrap(),
            ReserveOutcome::Reserved(_)
        ));

        assert_eq!(log.finalize(&stocks(), day, first).unwrap(), RecordOutcome::Inserted);
        assert_eq!(
            log.reserve(&stocks(), day, Duration::ZERO).unwrap(),
            ReserveOutcome::AlreadyPosted
        );
    }
}
