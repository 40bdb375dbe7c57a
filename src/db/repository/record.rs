use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{enum_column, json_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::*;

const RECORD_COLUMNS: &str = "id, user_id, type, title, description, file_url, file_name,
     file_size, mime_type, metadata, tags, created_at, updated_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MedicalRecord> {
    Ok(MedicalRecord {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        record_type: enum_column(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        file_url: row.get(5)?,
        file_name: row.get(6)?,
        file_size: row.get::<_, i64>(7)?.max(0) as u64,
        mime_type: row.get(8)?,
        metadata: json_column(row, 9)?,
        tags: json_column(row, 10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub fn insert_record(conn: &Connection, record: &MedicalRecord) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO medical_records ({RECORD_COLUMNS})
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
        params![
            record.id.to_string(),
            record.user_id.to_string(),
            record.record_type.as_str(),
            record.title,
            record.description,
            record.file_url,
            record.file_name,
            record.file_size as i64,
            record.mime_type,
            serde_json::to_string(&record.metadata)?,
            serde_json::to_string(&record.tags)?,
            record.created_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

/// Records owned by `user_id`, newest first.
/// `search` matches title or description, ignoring ASCII case.
pub fn list_records(
    conn: &Connection,
    user_id: &Uuid,
    filter: &RecordFilter,
) -> Result<Vec<MedicalRecord>, DatabaseError> {
    let mut sql = format!("SELECT {RECORD_COLUMNS} FROM medical_records WHERE user_id = ?1");
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(user_id.to_string())];
    if let Some(record_type) = filter.record_type {
        values.push(Box::new(record_type.as_str()));
        sql.push_str(&format!(" AND type = ?{}", values.len()));
    }
    if let Some(needle) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        values.push(Box::new(format!("%{}%", escape_like(needle))));
        let n = values.len();
        sql.push_str(&format!(
            " AND (title LIKE ?{n} ESCAPE '\\' OR description LIKE ?{n} ESCAPE '\\')"
        ));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let records = stmt
        .query_map(refs.as_slice(), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Fetch a record only if `user_id` owns it.
pub fn get_record(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<MedicalRecord>, DatabaseError> {
    let record = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM medical_records WHERE id = ?1 AND user_id = ?2"),
            params![id.to_string(), user_id.to_string()],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Persist the editable fields of an owned record. Returns `false` when
/// no row matched (missing, or owned by someone else).
pub fn update_record(conn: &Connection, record: &MedicalRecord) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medical_records
         SET type = ?1, title = ?2, description = ?3, metadata = ?4, tags = ?5, updated_at = ?6
         WHERE id = ?7 AND user_id = ?8",
        params![
            record.record_type.as_str(),
            record.title,
            record.description,
            serde_json::to_string(&record.metadata)?,
            serde_json::to_string(&record.tags)?,
            record.updated_at,
            record.id.to_string(),
            record.user_id.to_string(),
        ],
    )?;
    Ok(changed == 1)
}

pub fn delete_record(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM medical_records WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    Ok(changed == 1)
}

/// Number of records per type, only for types the user actually has.
pub fn count_records_by_type(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Vec<RecordTypeCount>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT type, COUNT(*) FROM medical_records WHERE user_id = ?1
         GROUP BY type ORDER BY type",
    )?;
    let counts = stmt
        .query_map(params![user_id.to_string()], |row| {
            Ok(RecordTypeCount {
                record_type: enum_column(row, 0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}
