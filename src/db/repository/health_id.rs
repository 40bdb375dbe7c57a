use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::uuid_column;
use crate::db::DatabaseError;
use crate::models::*;

/// Column named in the UNIQUE violation raised for a colliding code.
pub const HEALTH_IDS_CODE: &str = "health_ids.health_code";
/// Column named in the UNIQUE violation raised for a second identifier per user.
pub const HEALTH_IDS_USER: &str = "health_ids.user_id";

fn health_id_from_row(row: &Row<'_>) -> rusqlite::Result<HealthIdentifier> {
    Ok(HealthIdentifier {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        health_code: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Insert an identifier. Collisions are reported as `Duplicate` on either
/// `HEALTH_IDS_CODE` or `HEALTH_IDS_USER` so callers can tell them apart.
pub fn insert_health_id(
    conn: &Connection,
    user_id: &Uuid,
    health_code: &str,
    now: DateTime<Utc>,
) -> Result<HealthIdentifier, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO health_ids (id, user_id, health_code, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id.to_string(), user_id.to_string(), health_code, now],
    )
    .map_err(|e| match DatabaseError::from_write(e, HEALTH_IDS_CODE) {
        DatabaseError::Sqlite(e) => DatabaseError::from_write(e, HEALTH_IDS_USER),
        other => other,
    })?;

    Ok(HealthIdentifier {
        id,
        user_id: *user_id,
        health_code: health_code.to_string(),
        created_at: now,
    })
}

pub fn get_health_id_by_user(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<HealthIdentifier>, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT id, user_id, health_code, created_at FROM health_ids WHERE user_id = ?1",
            params![user_id.to_string()],
            health_id_from_row,
        )
        .optional()?;
    Ok(found)
}

pub fn get_health_id_by_code(
    conn: &Connection,
    health_code: &str,
) -> Result<Option<HealthIdentifier>, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT id, user_id, health_code, created_at FROM health_ids WHERE health_code = ?1",
            params![health_code],
            health_id_from_row,
        )
        .optional()?;
    Ok(found)
}

pub fn count_health_ids_for_user(conn: &Connection, user_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM health_ids WHERE user_id = ?1",
        params![user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}
