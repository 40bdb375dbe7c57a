use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ReminderFrequency, ReminderType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub reminder_type: ReminderType,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub recurring: bool,
    pub frequency: Option<ReminderFrequency>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderFilter {
    pub reminder_type: Option<ReminderType>,
    pub active: Option<bool>,
}
