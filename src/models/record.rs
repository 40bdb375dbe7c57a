use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RecordType;

/// Uploaded medical document and its catalog metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub title: String,
    pub description: Option<String>,
    pub file_url: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub metadata: serde_json::Value,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub record_type: Option<RecordType>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordTypeCount {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub count: u32,
}
