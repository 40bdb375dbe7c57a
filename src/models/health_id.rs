use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthIdentifier {
    pub id: Uuid,
    pub user_id: Uuid,
    pub health_code: String,
    pub created_at: DateTime<Utc>,
}
