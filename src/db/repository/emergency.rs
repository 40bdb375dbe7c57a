use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{json_column, optional_enum_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::*;

fn emergency_from_row(row: &Row<'_>) -> rusqlite::Result<EmergencyInfo> {
    Ok(EmergencyInfo {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        blood_group: optional_enum_column(row, 2)?,
        allergies: json_column(row, 3)?,
        chronic_diseases: json_column(row, 4)?,
        medications: json_column(row, 5)?,
        emergency_contacts: json_column(row, 6)?,
        organ_donor: row.get::<_, i32>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn get_emergency_info(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<EmergencyInfo>, DatabaseError> {
    let info = conn
        .query_row(
            "SELECT id, user_id, blood_group, allergies, chronic_diseases, medications,
                    emergency_contacts, organ_donor, created_at, updated_at
             FROM emergency_info WHERE user_id = ?1",
            params![user_id.to_string()],
            emergency_from_row,
        )
        .optional()?;
    Ok(info)
}

/// Insert `info` unless the user already has a row. Returns whether it was inserted.
pub fn insert_emergency_info_if_absent(
    conn: &Connection,
    info: &EmergencyInfo,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT INTO emergency_info (id, user_id, blood_group, allergies, chronic_diseases,
                                     medications, emergency_contacts, organ_donor,
                                     created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(user_id) DO NOTHING",
        params![
            info.id.to_string(),
            info.user_id.to_string(),
            info.blood_group.map(|g| g.as_str()),
            serde_json::to_string(&info.allergies)?,
            serde_json::to_string(&info.chronic_diseases)?,
            serde_json::to_string(&info.medications)?,
            serde_json::to_string(&info.emergency_contacts)?,
            info.organ_donor as i32,
            info.created_at,
            info.updated_at,
        ],
    )?;
    Ok(inserted == 1)
}

/// Insert or fully overwrite the row for `info.user_id`.
/// The row id and `created_at` of an existing row are preserved.
pub fn upsert_emergency_info(conn: &Connection, info: &EmergencyInfo) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO emergency_info (id, user_id, blood_group, allergies, chronic_diseases,
                                     medications, emergency_contacts, organ_donor,
                                     created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(user_id) DO UPDATE SET
             blood_group = excluded.blood_group,
             allergies = excluded.allergies,
             chronic_diseases = excluded.chronic_diseases,
             medications = excluded.medications,
             emergency_contacts = excluded.emergency_contacts,
             organ_donor = excluded.organ_donor,
             updated_at = excluded.updated_at",
        params![
            info.id.to_string(),
            info.user_id.to_string(),
            info.blood_group.map(|g| g.as_str()),
            serde_json::to_string(&info.allergies)?,
            serde_json::to_string(&info.chronic_diseases)?,
            serde_json::to_string(&info.medications)?,
            serde_json::to_string(&info.emergency_contacts)?,
            info.organ_donor as i32,
            info.created_at,
            info.updated_at,
        ],
    )?;
    Ok(())
}
