//! Error types for eiabot-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid period token: {0}")]
    InvalidPeriod(String),

    #[error("Invalid series id: {0}")]
    InvalidSeriesId(String),

    #[error("Unknown report kind: {0}")]
    UnknownReport(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
