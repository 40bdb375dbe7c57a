use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{enum_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::enums::OtpPurpose;
use crate::models::*;

fn otp_from_row(row: &Row<'_>) -> rusqlite::Result<OneTimeCode> {
    Ok(OneTimeCode {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        code: row.get(2)?,
        purpose: enum_column(row, 3)?,
        expires_at: row.get(4)?,
        is_used: row.get::<_, i32>(5)? != 0,
        created_at: row.get(6)?,
    })
}

pub fn insert_otp(conn: &Connection, otp: &OneTimeCode) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO otp_codes (id, user_id, code, purpose, expires_at, is_used, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            otp.id.to_string(),
            otp.user_id.to_string(),
            otp.code,
            otp.purpose.as_str(),
            otp.expires_at,
            otp.is_used as i32,
            otp.created_at,
        ],
    )?;
    Ok(())
}

/// Find a code matching (user, code, purpose) that is unused and unexpired at `now`.
/// Used, expired and unknown codes all come back as `None`.
pub fn find_acceptable_otp(
    conn: &Connection,
    user_id: &Uuid,
    code: &str,
    purpose: OtpPurpose,
    now: DateTime<Utc>,
) -> Result<Option<OneTimeCode>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, code, purpose, expires_at, is_used, created_at
         FROM otp_codes
         WHERE user_id = ?1 AND code = ?2 AND purpose = ?3 AND is_used = 0
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(
        params![user_id.to_string(), code, purpose.as_str()],
        otp_from_row,
    )?;

    for row in rows {
        let otp = row?;
        if otp.is_acceptable(now) {
            return Ok(Some(otp));
        }
    }
    Ok(None)
}

/// Consume a code. The `is_used = 0` guard makes this the single-use
/// check: returns `false` when another caller already consumed it.
pub fn mark_otp_used(conn: &Connection, otp_id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE otp_codes SET is_used = 1 WHERE id = ?1 AND is_used = 0",
        params![otp_id.to_string()],
    )?;
    Ok(changed == 1)
}

/// Retire every outstanding code of one purpose for a user. Returns how many.
pub fn invalidate_otps(
    conn: &Connection,
    user_id: &Uuid,
    purpose: OtpPurpose,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE otp_codes SET is_used = 1 WHERE user_id = ?1 AND purpose = ?2 AND is_used = 0",
        params![user_id.to_string(), purpose.as_str()],
    )?;
    Ok(changed)
}

/// Count codes of a purpose that would still be accepted at `now`.
pub fn count_acceptable_otps(
    conn: &Connection,
    user_id: &Uuid,
    purpose: OtpPurpose,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT expires_at FROM otp_codes
         WHERE user_id = ?1 AND purpose = ?2 AND is_used = 0",
    )?;
    let expiries = stmt
        .query_map(params![user_id.to_string(), purpose.as_str()], |row| {
            row.get::<_, DateTime<Utc>>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(expiries.into_iter().filter(|exp| now < *exp).count())
}
