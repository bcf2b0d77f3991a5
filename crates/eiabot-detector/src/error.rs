//! Detector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Posting log error: {0}")]
    Storage(#[from] eiabot_persistence::PersistenceError),

    #[error("Primary series {0} has no points")]
    EmptyPrimary(String),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
