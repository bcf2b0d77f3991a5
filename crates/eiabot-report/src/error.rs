//! Formatter error types.

use thiserror::Error;

/// Non-fatal: the affected figure is left out and the message still renders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Previous value is zero, percentage change undefined")]
    ZeroBaseline,

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Image rendering failed: {0}")]
    Image(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    /// The set lacks a series the template needs, or it has fewer than two points.
    #[error("Series {0} has no current/previous pair")]
    MissingSeries(String),
}

pub type FormatResult<T> = Result<T, FormatError>;
pub type ReportResult<T> = Result<T, ReportError>;
