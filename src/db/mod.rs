pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Duplicate value for unique column {0}")]
    Duplicate(String),

    #[error("Corrupted JSON column: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatabaseError {
    /// Classify a failed write: a UNIQUE violation on `column`
    /// (e.g. `users.email`) becomes `Duplicate`, anything else stays raw.
    pub fn from_write(err: rusqlite::Error, column: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, Some(msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.contains("UNIQUE")
                    && msg.contains(column) =>
            {
                DatabaseError::Duplicate(column.to_string())
            }
            _ => DatabaseError::Sqlite(err),
        }
    }

    pub fn is_duplicate(&self, column: &str) -> bool {
        matches!(self, DatabaseError::Duplicate(c) if c == column)
    }
}

pub(crate) fn parse_uuid(value: &str) -> Result<uuid::Uuid, DatabaseError> {
    uuid::Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
