//! New-data detection for the EIA bot.
//!
//! Compares the latest fetched period of a dataset against the posting log
//! and decides whether it still needs announcing. Also owns the write that
//! follows a confirmed delivery, in either dedup mode.

pub mod config;
pub mod detector;
pub mod error;

pub use config::{DedupMode, DetectorConfig};
pub use detector::{report_period, ChangeDetector, Detection, Verdict};
pub use error::{DetectorError, DetectorResult};
