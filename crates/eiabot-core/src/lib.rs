//! Core domain types for the EIA energy-statistics bot.
//!
//! - `Period`: normalized observation date shared by every upstream format
//! - `SeriesId`, `SeriesPoint`, `Series`, `SeriesSet`: fetched data
//! - `Dataset`, `PostingRecord`: posting log rows
//! - `ReportKind`: which notification a run produces

pub mod error;
pub mod period;
pub mod posting;
pub mod report;
pub mod series;

pub use error::{CoreError, Result};
pub use period::Period;
pub use posting::{Dataset, PostingRecord};
pub use report::ReportKind;
pub use series::{Series, SeriesId, SeriesPoint, SeriesSet};

use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
