//! Storage Layer
//!
//! Alarm and alarm-history persistence behind the [`AlarmRepository`]
//! trait, with in-memory and SQLite backends.

mod memory;
mod repository;
mod sqlite;

pub use memory::MemoryRepository;
pub use repository::{AlarmFilter, AlarmRepository, ChangeFilter, TimeBound};
pub use sqlite::SqliteRepository;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The backend does not support this operation
    #[error("Not implemented by this backend: {0}")]
    NotImplemented(&'static str),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(db.message().to_string())
            }
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
