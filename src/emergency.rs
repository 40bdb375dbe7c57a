//! Emergency profile: lazy creation, partial updates, and the two card
//! projections (authenticated full card, anonymous public card).

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository;
use crate::db::DatabaseError;
use crate::health_id::QR_PAYLOAD_TYPE;
use crate::models::enums::BloodGroup;
use crate::models::{EmergencyContact, EmergencyInfo, Patch, User};

/// Contacts disclosed to anyone holding the health code.
pub const PUBLIC_CONTACT_LIMIT: usize = 2;

/// Partial update: only fields present in the request body change.
/// `bloodGroup: null` clears the stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmergencyUpdate {
    pub blood_group: Patch<Option<BloodGroup>>,
    pub allergies: Patch<Vec<String>>,
    pub chronic_diseases: Patch<Vec<String>>,
    pub medications: Patch<Vec<String>>,
    pub emergency_contacts: Patch<Vec<EmergencyContact>>,
    pub organ_donor: Patch<bool>,
}

impl EmergencyUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(contacts) = self.emergency_contacts.as_set() {
            for (i, contact) in contacts.iter().enumerate() {
                if contact.name.trim().is_empty()
                    || contact.phone.trim().is_empty()
                    || contact.relation.trim().is_empty()
                {
                    return Err(format!(
                        "emergencyContacts[{i}] requires name, phone and relation"
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply(self, info: &mut EmergencyInfo) {
        self.blood_group.apply_to(&mut info.blood_group);
        self.allergies.apply_to(&mut info.allergies);
        self.chronic_diseases.apply_to(&mut info.chronic_diseases);
        self.medications.apply_to(&mut info.medications);
        self.emergency_contacts.apply_to(&mut info.emergency_contacts);
        self.organ_donor.apply_to(&mut info.organ_donor);
    }
}

/// Authenticated view: everything stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullCard {
    pub name: String,
    pub health_code: Option<String>,
    pub blood_group: Option<BloodGroup>,
    pub allergies: Vec<String>,
    pub chronic_diseases: Vec<String>,
    pub medications: Vec<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub organ_donor: bool,
}

/// Anonymous view. Carries no chronic diseases or medications and at most
/// [`PUBLIC_CONTACT_LIMIT`] contacts, taken in stored order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCard {
    pub name: String,
    pub blood_group: Option<BloodGroup>,
    pub allergies: Vec<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
}

impl PublicCard {
    fn project(user: &User, info: Option<EmergencyInfo>) -> Self {
        let info = info.unwrap_or_else(|| EmergencyInfo::empty(user.id, user.created_at));
        let mut contacts = info.emergency_contacts;
        contacts.truncate(PUBLIC_CONTACT_LIMIT);
        Self {
            name: user.full_name(),
            blood_group: info.blood_group,
            allergies: info.allergies,
            emergency_contacts: contacts,
        }
    }
}

/// JSON encoded in the emergency QR code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub health_id: String,
    #[serde(rename = "type")]
    pub payload_type: &'static str,
    pub name: String,
    pub blood_group: Option<BloodGroup>,
    pub allergies: Vec<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub timestamp: DateTime<Utc>,
}

impl QrPayload {
    pub fn new(health_code: &str, card: PublicCard, now: DateTime<Utc>) -> Self {
        Self {
            health_id: health_code.to_string(),
            payload_type: QR_PAYLOAD_TYPE,
            name: card.name,
            blood_group: card.blood_group,
            allergies: card.allergies,
            emergency_contacts: card.emergency_contacts,
            timestamp: now,
        }
    }
}

/// Stored profile, created with empty defaults on first access.
pub fn get_or_create(
    conn: &Connection,
    user_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<EmergencyInfo, DatabaseError> {
    if let Some(info) = repository::get_emergency_info(conn, user_id)? {
        return Ok(info);
    }
    // Never overwrites: a profile written concurrently wins over the defaults.
    repository::insert_emergency_info_if_absent(conn, &EmergencyInfo::empty(*user_id, now))?;
    repository::get_emergency_info(conn, user_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "EmergencyInfo".into(),
        id: user_id.to_string(),
    })
}

/// Apply a partial update, creating the profile if it does not exist yet.
/// The read and the write hold the write lock together.
pub fn update(
    conn: &mut Connection,
    user_id: &Uuid,
    changes: EmergencyUpdate,
    now: DateTime<Utc>,
) -> Result<EmergencyInfo, DatabaseError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut info = repository::get_emergency_info(&tx, user_id)?
        .unwrap_or_else(|| EmergencyInfo::empty(*user_id, now));
    changes.apply(&mut info);
    info.updated_at = now;
    repository::upsert_emergency_info(&tx, &info)?;
    tx.commit()?;
    Ok(info)
}

/// Full card for an authenticated user. `None` if the user does not exist.
pub fn full_card(conn: &Connection, user_id: &Uuid) -> Result<Option<FullCard>, DatabaseError> {
    let Some(user) = repository::get_user(conn, user_id)? else {
        return Ok(None);
    };
    let health_code = repository::get_health_id_by_user(conn, user_id)?.map(|h| h.health_code);
    let info = repository::get_emergency_info(conn, user_id)?
        .unwrap_or_else(|| EmergencyInfo::empty(user.id, user.created_at));

    Ok(Some(FullCard {
        name: user.full_name(),
        health_code,
        blood_group: info.blood_group,
        allergies: info.allergies,
        chronic_diseases: info.chronic_diseases,
        medications: info.medications,
        emergency_contacts: info.emergency_contacts,
        organ_donor: info.organ_donor,
    }))
}

/// Public card for a health code. `None` if the code is unknown.
/// Read-only: never creates a profile.
pub fn public_card(conn: &Connection, health_code: &str) -> Result<Option<PublicCard>, DatabaseError> {
    let Some(health_id) = repository::get_health_id_by_code(conn, health_code)? else {
        return Ok(None);
    };
    let Some(user) = repository::get_user(conn, &health_id.user_id)? else {
        return Ok(None);
    };
    let info = repository::get_emergency_info(conn, &user.id)?;
    Ok(Some(PublicCard::project(&user, info)))
}

/// Public card of an authenticated user, for embedding in their QR code.
pub fn public_card_for_user(
    conn: &Connection,
    user: &User,
) -> Result<PublicCard, DatabaseError> {
    let info = repository::get_emergency_info(conn, &user.id)?;
    Ok(PublicCard::project(user, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    use crate::core_state::test_support::test_state;
    use crate::db::sqlite::open_memory_database;
    use crate::models::NewUser;

    fn setup() -> (Connection, User) {
        let conn = open_memory_database().unwrap();
        let user = repository::insert_user(
            &conn,
            &NewUser {
                email: "jo@example.com".into(),
                password_hash: "x".into(),
                first_name: "Jo".into(),
                last_name: "Do".into(),
                phone: None,
            },
            Utc::now(),
        )
        .unwrap();
        repository::insert_health_id(&conn, &user.id, "HV-2025-ABCD-EFGH", Utc::now()).unwrap();
        (conn, user)
    }

    fn contact(name: &str) -> EmergencyContact {
        EmergencyContact {
            name: name.into(),
            phone: "+15550100".into(),
            relation: "Friend".into(),
        }
    }

    fn full_update() -> EmergencyUpdate {
        serde_json::from_value(serde_json::json!({
            "bloodGroup": "AB-",
            "allergies": ["Peanuts", "Latex"],
            "chronicDiseases": ["Asthma"],
            "medications": ["Salbutamol"],
            "emergencyContacts": [
                {"name": "A", "phone": "1", "relation": "Mother"},
                {"name": "B", "phone": "2", "relation": "Father"},
                {"name": "C", "phone": "3", "relation": "Sister"}
            ],
            "organDonor": true
        }))
        .unwrap()
    }

    #[test]
    fn first_read_creates_empty_profile_once() {
        let (conn, user) = setup();
        let first = get_or_create(&conn, &user.id, Utc::now()).unwrap();
        assert!(first.allergies.is_empty());
        assert!(first.emergency_contacts.is_empty());
        assert!(!first.organ_donor);
        assert_eq!(first.blood_group, None);

        let second = get_or_create(&conn, &user.id, Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn partial_update_leaves_unset_fields() {
        let (mut conn, user) = setup();
        update(&mut conn, &user.id, full_update(), Utc::now()).unwrap();

        let only_allergies: EmergencyUpdate =
            serde_json::from_str(r#"{"allergies": ["Shellfish"]}"#).unwrap();
        let info = update(&mut conn, &user.id, only_allergies, Utc::now()).unwrap();
        assert_eq!(info.allergies, vec!["Shellfish".to_string()]);
        assert_eq!(info.blood_group, Some(BloodGroup::AbNegative));
        assert_eq!(info.chronic_diseases, vec!["Asthma".to_string()]);
        assert!(info.organ_donor);
    }

    #[test]
    fn explicit_null_clears_blood_group() {
        let (mut conn, user) = setup();
        update(&mut conn, &user.id, full_update(), Utc::now()).unwrap();
        let clear: EmergencyUpdate = serde_json::from_str(r#"{"bloodGroup": null}"#).unwrap();
        let info = update(&mut conn, &user.id, clear, Utc::now()).unwrap();
        assert_eq!(info.blood_group, None);
        assert_eq!(info.allergies.len(), 2);
    }

    #[test]
    fn invalid_blood_group_is_rejected_at_parse() {
        let parsed = serde_json::from_str::<EmergencyUpdate>(r#"{"bloodGroup": "C+"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn blank_contact_fields_fail_validation() {
        let update = EmergencyUpdate {
            emergency_contacts: Patch::Set(vec![contact("A"), contact(" ")]),
            ..Default::default()
        };
        assert!(update.validate().unwrap_err().contains("emergencyContacts[1]"));
        assert!(EmergencyUpdate::default().validate().is_ok());
    }

    #[test]
    fn public_card_redacts_private_fields() {
        let (mut conn, user) = setup();
        update(&mut conn, &user.id, full_update(), Utc::now()).unwrap();

        let full = full_card(&conn, &user.id).unwrap().unwrap();
        assert_eq!(full.emergency_contacts.len(), 3);
        assert_eq!(full.medications, vec!["Salbutamol".to_string()]);
        assert_eq!(full.health_code.as_deref(), Some("HV-2025-ABCD-EFGH"));

        let public = public_card(&conn, "HV-2025-ABCD-EFGH").unwrap().unwrap();
        assert_eq!(public.name, "Jo Do");
        assert_eq!(public.allergies.len(), 2);
        let names: Vec<_> = public.emergency_contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);

        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("chronicDiseases").is_none());
        assert!(json.get("medications").is_none());
        assert!(json.get("organDonor").is_none());
    }

    #[test]
    fn public_card_without_profile_is_empty_and_read_only() {
        let (conn, user) = setup();
        let public = public_card(&conn, "HV-2025-ABCD-EFGH").unwrap().unwrap();
        assert!(public.allergies.is_empty());
        assert!(public.blood_group.is_none());
        assert!(repository::get_emergency_info(&conn, &user.id).unwrap().is_none());
    }

    #[test]
    fn unknown_code_has_no_card() {
        let (conn, _) = setup();
        assert!(public_card(&conn, "HV-2025-ZZZZ-ZZZZ").unwrap().is_none());
    }

    #[test]
    fn qr_payload_uses_public_projection() {
        let (mut conn, user) = setup();
        update(&mut conn, &user.id, full_update(), Utc::now()).unwrap();
        let card = public_card_for_user(&conn, &user).unwrap();
        let payload = QrPayload::new("HV-2025-ABCD-EFGH", card, Utc::now());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "HEALTHVAULT_EMERGENCY");
        assert_eq!(json["healthId"], "HV-2025-ABCD-EFGH");
        assert_eq!(json["emergencyContacts"].as_array().unwrap().len(), 2);
        assert!(json.get("medications").is_none());
    }

    fn file_backed_user(state: &crate::core_state::CoreState, email: &str) -> Uuid {
        let conn = state.open_db().unwrap();
        repository::insert_user(
            &conn,
            &NewUser {
                email: email.into(),
                password_hash: "x".into(),
                first_name: "Jo".into(),
                last_name: "Do".into(),
                phone: None,
            },
            Utc::now(),
        )
        .unwrap()
        .id
    }

    fn race<A, B>(state: &Arc<crate::core_state::CoreState>, a: A, b: B)
    where
        A: FnOnce(&mut Connection) + Send + 'static,
        B: FnOnce(&mut Connection) + Send + 'static,
    {
        let barrier = Arc::new(Barrier::new(2));
        let spawn = |work: Box<dyn FnOnce(&mut Connection) + Send>| {
            let state = state.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let mut conn = state.open_db().unwrap();
                barrier.wait();
                work(&mut conn);
            })
        };
        let first = spawn(Box::new(a));
        let second = spawn(Box::new(b));
        first.join().unwrap();
        second.join().unwrap();
    }

    #[test]
    fn lazy_creation_never_overwrites_a_concurrent_update() {
        let test = test_state();
        for i in 0..40 {
            let user_id = file_backed_user(&test.state, &format!("u{i}@example.com"));
            race(
                &test.state,
                move |conn| {
                    get_or_create(conn, &user_id, Utc::now()).unwrap();
                },
                move |conn| {
                    let changes = serde_json::from_str(r#"{"allergies": ["Peanuts"]}"#).unwrap();
                    update(conn, &user_id, changes, Utc::now()).unwrap();
                },
            );

            let conn = test.state.open_db().unwrap();
            let stored = repository::get_emergency_info(&conn, &user_id).unwrap().unwrap();
            assert_eq!(stored.allergies, ["Peanuts"], "iteration {i}");
        }
    }

    #[test]
    fn concurrent_disjoint_updates_both_persist() {
        let test = test_state();
        for i in 0..40 {
            let user_id = file_backed_user(&test.state, &format!("u{i}@example.com"));
            race(
                &test.state,
                move |conn| {
                    let changes = serde_json::from_str(r#"{"allergies": ["Latex"]}"#).unwrap();
                    update(conn, &user_id, changes, Utc::now()).unwrap();
                },
                move |conn| {
                    let changes = serde_json::from_str(r#"{"medications": ["Insulin"]}"#).unwrap();
                    update(conn, &user_id, changes, Utc::now()).unwrap();
                },
            );

            let conn = test.state.open_db().unwrap();
            let stored = repository::get_emergency_info(&conn, &user_id).unwrap().unwrap();
            assert_eq!(stored.allergies, ["Latex"], "iteration {i}");
            assert_eq!(stored.medications, ["Insulin"], "iteration {i}");
        }
    }
}
