use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::BloodGroup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relation: String,
}

/// Stored medical summary. List fields are never absent, only empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub blood_group: Option<BloodGroup>,
    pub allergies: Vec<String>,
    pub chronic_diseases: Vec<String>,
    pub medications: Vec<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub organ_donor: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmergencyInfo {
    pub fn empty(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            blood_group: None,
            allergies: Vec::new(),
            chronic_diseases: Vec::new(),
            medications: Vec::new(),
            emergency_contacts: Vec::new(),
            organ_donor: false,
            created_at: now,
            updated_at: now,
        }
    }
}
