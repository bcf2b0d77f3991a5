//! Posting log for the EIA bot.
//!
//! Records which (dataset, period) pairs have been announced so a period is
//! never posted twice. Backed by SQLite in production; an in-memory log
//! serves tests and dry runs.

pub mod error;
pub mod log;
pub mod memory;
pub mod sqlite;

pub use error::{PersistenceError, PersistenceResult};
pub use log::{PostingLog, RecordOutcome, ReservationToken, ReserveOutcome};
pub use memory::MemoryPostingLog;
pub use sqlite::{SqlitePostingLog, DEFAULT_BUSY_TIMEOUT};
