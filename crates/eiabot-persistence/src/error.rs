//! Persistence error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backing store cannot be opened or queried.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        PersistenceError::StorageUnavailable(e.to_string())
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
