use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::enums::OtpPurpose;

/// Short-lived, single-use numeric code scoped to a user and a purpose.
#[derive(Debug, Clone)]
pub struct OneTimeCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    /// Acceptable only while unused and strictly before expiry.
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && now < self.expires_at
    }
}
