//! EIA series fetcher.
//!
//! Queries the EIA open-data API (v2 data routes or the legacy series
//! endpoint), normalizes periods, and shape-checks the result:
//! every requested series present, each with enough history for a delta.

pub mod client;
pub mod error;
pub mod parser;
pub mod query;

pub use client::{EiaClient, SeriesSource, StaticSeriesSource, DEFAULT_TIMEOUT};
pub use error::{FeedError, FeedResult};
pub use parser::{parse_data_response, parse_legacy_response, validate};
pub use query::{Endpoint, Frequency, SeriesQuery};
