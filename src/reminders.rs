//! Reminder scheduler-of-record: timestamped, owner-scoped rows.
//! Nothing here fires reminders; clients poll `upcoming`.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::enums::{ReminderFrequency, ReminderType};
use crate::models::{Patch, Reminder};

/// Window covered by [`upcoming`].
pub const UPCOMING_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    #[serde(rename = "type", default)]
    pub reminder_type: Option<ReminderType>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub frequency: Option<ReminderFrequency>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl NewReminder {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        if let Some(end) = self.end_date {
            if end < self.scheduled_at {
                return Err("endDate must not precede scheduledAt".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderUpdate {
    #[serde(rename = "type")]
    pub reminder_type: Patch<ReminderType>,
    pub title: Patch<String>,
    pub description: Patch<Option<String>>,
    pub scheduled_at: Patch<DateTime<Utc>>,
    pub recurring: Patch<bool>,
    pub frequency: Patch<Option<ReminderFrequency>>,
    pub end_date: Patch<Option<DateTime<Utc>>>,
    pub is_active: Patch<bool>,
}

impl ReminderUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_set().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".into());
        }
        Ok(())
    }
}

pub fn create_reminder(
    conn: &Connection,
    user_id: &Uuid,
    new: NewReminder,
    now: DateTime<Utc>,
) -> Result<Reminder, DatabaseError> {
    let reminder = Reminder {
        id: Uuid::new_v4(),
        user_id: *user_id,
        reminder_type: new.reminder_type.unwrap_or(ReminderType::Other),
        title: new.title.trim().to_string(),
        description: new.description,
        scheduled_at: new.scheduled_at,
        recurring: new.recurring,
        frequency: new.frequency,
        end_date: new.end_date,
        is_active: true,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_reminder(conn, &reminder)?;
    Ok(reminder)
}

/// Apply a partial update to an owned reminder. `None` if not found.
pub fn update_reminder(
    conn: &mut Connection,
    user_id: &Uuid,
    id: &Uuid,
    changes: ReminderUpdate,
    now: DateTime<Utc>,
) -> Result<Option<Reminder>, DatabaseError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let Some(mut reminder) = repository::get_reminder(&tx, user_id, id)? else {
        return Ok(None);
    };
    changes.reminder_type.apply_to(&mut reminder.reminder_type);
    changes.title.apply_to(&mut reminder.title);
    changes.description.apply_to(&mut reminder.description);
    changes.scheduled_at.apply_to(&mut reminder.scheduled_at);
    changes.recurring.apply_to(&mut reminder.recurring);
    changes.frequency.apply_to(&mut reminder.frequency);
    changes.end_date.apply_to(&mut reminder.end_date);
    changes.is_active.apply_to(&mut reminder.is_active);
    reminder.updated_at = now;

    if !repository::update_reminder(&tx, &reminder)? {
        return Ok(None);
    }
    tx.commit()?;
    Ok(Some(reminder))
}

/// Active reminders due within the next [`UPCOMING_WINDOW_HOURS`].
pub fn upcoming(
    conn: &Connection,
    user_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<Reminder>, DatabaseError> {
    repository::list_reminders_between(
        conn,
        user_id,
        now,
        now + Duration::hours(UPCOMING_WINDOW_HOURS),
    )
}
