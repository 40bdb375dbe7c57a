use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::uuid_column;
use crate::db::DatabaseError;
use crate::models::*;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, is_verified,
     date_of_birth, gender, profile_image, created_at, updated_at";

/// Column named in the UNIQUE violation raised for a taken email.
pub const USERS_EMAIL: &str = "users.email";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_column(row, 0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        phone: row.get(5)?,
        is_verified: row.get::<_, i32>(6)? != 0,
        date_of_birth: row.get(7)?,
        gender: row.get(8)?,
        profile_image: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Insert a new, unverified user. A taken email surfaces as
/// `DatabaseError::Duplicate(USERS_EMAIL)`.
pub fn insert_user(
    conn: &Connection,
    new_user: &NewUser,
    now: DateTime<Utc>,
) -> Result<User, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, phone,
                            is_verified, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
        params![
            id.to_string(),
            new_user.email,
            new_user.password_hash,
            new_user.first_name,
            new_user.last_name,
            new_user.phone,
            now,
        ],
    )
    .map_err(|e| DatabaseError::from_write(e, USERS_EMAIL))?;

    Ok(User {
        id,
        email: new_user.email.clone(),
        password_hash: new_user.password_hash.clone(),
        first_name: new_user.first_name.clone(),
        last_name: new_user.last_name.clone(),
        phone: new_user.phone.clone(),
        is_verified: false,
        date_of_birth: None,
        gender: None,
        profile_image: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Lookup by an already-normalised (trimmed, lowercased) email.
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn user_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Flip the verification flag. Returns `true` only on the false→true transition.
pub fn mark_user_verified(
    conn: &Connection,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET is_verified = 1, updated_at = ?1 WHERE id = ?2 AND is_verified = 0",
        params![now, id.to_string()],
    )?;
    Ok(changed == 1)
}
