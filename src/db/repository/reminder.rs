use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{enum_column, optional_enum_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::*;

const REMINDER_COLUMNS: &str = "id, user_id, type, title, description, scheduled_at, recurring,
     frequency, end_date, is_active, completed_at, created_at, updated_at";

fn reminder_from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: uuid_column(row, 0)?,
        user_id: uuid_column(row, 1)?,
        reminder_type: enum_column(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        scheduled_at: row.get(5)?,
        recurring: row.get::<_, i32>(6)? != 0,
        frequency: optional_enum_column(row, 7)?,
        end_date: row.get(8)?,
        is_active: row.get::<_, i32>(9)? != 0,
        completed_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub fn insert_reminder(conn: &Connection, reminder: &Reminder) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO reminders ({REMINDER_COLUMNS})
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
        params![
            reminder.id.to_string(),
            reminder.user_id.to_string(),
            reminder.reminder_type.as_str(),
            reminder.title,
            reminder.description,
            reminder.scheduled_at,
            reminder.recurring as i32,
            reminder.frequency.map(|f| f.as_str()),
            reminder.end_date,
            reminder.is_active as i32,
            reminder.completed_at,
            reminder.created_at,
            reminder.updated_at,
        ],
    )?;
    Ok(())
}

/// Reminders owned by `user_id`, earliest scheduled first.
pub fn list_reminders(
    conn: &Connection,
    user_id: &Uuid,
    filter: &ReminderFilter,
) -> Result<Vec<Reminder>, DatabaseError> {
    let mut sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE user_id = ?1");
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(user_id.to_string())];
    if let Some(reminder_type) = filter.reminder_type {
        values.push(Box::new(reminder_type.as_str()));
        sql.push_str(&format!(" AND type = ?{}", values.len()));
    }
    if let Some(active) = filter.active {
        values.push(Box::new(active as i32));
        sql.push_str(&format!(" AND is_active = ?{}", values.len()));
    }
    sql.push_str(" ORDER BY scheduled_at ASC, rowid ASC");

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let reminders = stmt
        .query_map(refs.as_slice(), reminder_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reminders)
}

/// Active reminders scheduled within `[from, until]`, earliest first.
pub fn list_reminders_between(
    conn: &Connection,
    user_id: &Uuid,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<Reminder>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders
         WHERE user_id = ?1 AND is_active = 1 AND scheduled_at >= ?2 AND scheduled_at <= ?3
         ORDER BY scheduled_at ASC, rowid ASC"
    ))?;
    let reminders = stmt
        .query_map(params![user_id.to_string(), from, until], reminder_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reminders)
}

pub fn get_reminder(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Reminder>, DatabaseError> {
    let reminder = conn
        .query_row(
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1 AND user_id = ?2"),
            params![id.to_string(), user_id.to_string()],
            reminder_from_row,
        )
        .optional()?;
    Ok(reminder)
}

/// Persist the editable fields of an owned reminder.
pub fn update_reminder(conn: &Connection, reminder: &Reminder) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE reminders
         SET type = ?1, title = ?2, description = ?3, scheduled_at = ?4, recurring = ?5,
             frequency = ?6, end_date = ?7, is_active = ?8, updated_at = ?9
         WHERE id = ?10 AND user_id = ?11",
        params![
            reminder.reminder_type.as_str(),
            reminder.title,
            reminder.description,
            reminder.scheduled_at,
            reminder.recurring as i32,
            reminder.frequency.map(|f| f.as_str()),
            reminder.end_date,
            reminder.is_active as i32,
            reminder.updated_at,
            reminder.id.to_string(),
            reminder.user_id.to_string(),
        ],
    )?;
    Ok(changed == 1)
}

pub fn complete_reminder(
    conn: &Connection,
    user_id: &Uuid,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE reminders SET completed_at = ?1, updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
        params![now, id.to_string(), user_id.to_string()],
    )?;
    Ok(changed == 1)
}

pub fn delete_reminder(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM reminders WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    Ok(changed == 1)
}
