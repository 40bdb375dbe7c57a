//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection` so callers decide the
//! transaction boundary. Owned entities are always looked up by
//! `(id, user_id)`; another user's row reads as absent.

mod emergency;
mod health_id;
mod otp;
mod record;
mod reminder;
mod user;

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{parse_uuid, DatabaseError};

pub use emergency::*;
pub use health_id::*;
pub use otp::*;
pub use record::*;
pub use reminder::*;
pub use user::*;

fn conversion_failure(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    parse_uuid(&raw).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = DatabaseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn optional_enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = DatabaseError>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| T::from_str(&s).map_err(|e| conversion_failure(idx, e)))
        .transpose()
}

/// Decode a TEXT column holding JSON (list and metadata columns).
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_failure(idx, e))
}
