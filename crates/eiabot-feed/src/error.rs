//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport failure, timeout or non-2xx status.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Response body does not match the expected schema.
    #[error("Upstream format error: {0}")]
    UpstreamFormat(String),

    /// Too few points to compute a period-over-period change.
    #[error("Insufficient history for {series}: got {got} points, need {need}")]
    InsufficientHistory {
        series: String,
        got: usize,
        need: usize,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::UpstreamFormat(e.to_string())
    }
}

impl From<eiabot_core::CoreError> for FeedError {
    fn from(e: eiabot_core::CoreError) -> Self {
        FeedError::UpstreamFormat(e.to_string())
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
