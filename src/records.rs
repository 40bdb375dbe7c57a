//! Medical record catalog: uploaded files plus their metadata rows.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::enums::RecordType;
use crate::models::{MedicalRecord, Patch};

/// Public URL prefix under which stored files are addressed.
pub const UPLOAD_URL_PREFIX: &str = "/uploads/";
const MAX_FILENAME_CHARS: usize = 100;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("{0}")]
    Validation(String),

    #[error("Upload storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Strip path components and anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let sanitized: String = base
        .chars()
        .filter(|&c| c != '\0')
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    let sanitized = sanitized.replace("..", "");
    if sanitized.trim_matches('.').is_empty() {
        "document".into()
    } else {
        sanitized
    }
}

/// Flat directory of uploaded files, each stored as `<uuid>_<sanitised name>`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` and return the stored file name.
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> std::io::Result<String> {
        std::fs::create_dir_all(&self.dir)?;
        let stored = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_name));
        std::fs::write(self.dir.join(&stored), bytes)?;
        Ok(stored)
    }

    /// Resolve a record's `fileUrl` to a path inside the store.
    /// Anything that does not name a plain file in the store is rejected.
    pub fn resolve(&self, file_url: &str) -> Option<PathBuf> {
        let stored = file_url.strip_prefix(UPLOAD_URL_PREFIX)?;
        if stored.is_empty() || stored.contains(['/', '\\']) || stored.contains("..") {
            return None;
        }
        Some(self.dir.join(stored))
    }

    fn remove(&self, file_url: &str) {
        if let Some(path) = self.resolve(file_url) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove stored upload");
            }
        }
    }
}

/// The file part of an upload, as received.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Declared content type, else a guess from the file extension.
    pub fn mime_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_or_octet_stream()
                    .to_string()
            })
    }
}

/// Descriptive fields accompanying an upload. Absent fields take defaults:
/// type OTHER, title = original file name, empty metadata and tags.
#[derive(Debug, Clone, Default)]
pub struct NewRecordFields {
    pub record_type: Option<RecordType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordUpdate {
    pub title: Patch<String>,
    pub description: Patch<Option<String>>,
    #[serde(rename = "type")]
    pub record_type: Patch<RecordType>,
    pub metadata: Patch<serde_json::Value>,
    pub tags: Patch<Vec<String>>,
}

impl RecordUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_set().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".into());
        }
        if self.metadata.as_set().is_some_and(|m| !m.is_object()) {
            return Err("metadata must be a JSON object".into());
        }
        Ok(())
    }
}

/// Store the file, then catalog it. The stored file is removed again if
/// the row cannot be written.
pub fn create_record(
    conn: &Connection,
    store: &UploadStore,
    user_id: &Uuid,
    file: UploadedFile,
    fields: NewRecordFields,
    now: DateTime<Utc>,
) -> Result<MedicalRecord, RecordError> {
    let metadata = fields.metadata.unwrap_or_else(|| serde_json::json!({}));
    if !metadata.is_object() {
        return Err(RecordError::Validation("metadata must be a JSON object".into()));
    }
    let title = fields
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file.file_name.clone());

    let stored = store.save(&file.file_name, &file.bytes)?;
    let record = MedicalRecord {
        id: Uuid::new_v4(),
        user_id: *user_id,
        record_type: fields.record_type.unwrap_or(RecordType::Other),
        title,
        description: fields.description,
        file_url: format!("{UPLOAD_URL_PREFIX}{stored}"),
        mime_type: file.mime_type(),
        file_name: file.file_name,
        file_size: file.bytes.len() as u64,
        metadata,
        tags: fields.tags.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = repository::insert_record(conn, &record) {
        store.remove(&record.file_url);
        return Err(e.into());
    }
    tracing::info!(record_id = %record.id, user_id = %user_id, size = record.file_size, "Record uploaded");
    Ok(record)
}

/// Apply a partial update to an owned record. `None` if not found.
pub fn update_record(
    conn: &mut Connection,
    user_id: &Uuid,
    id: &Uuid,
    changes: RecordUpdate,
    now: DateTime<Utc>,
) -> Result<Option<MedicalRecord>, DatabaseError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let Some(mut record) = repository::get_record(&tx, user_id, id)? else {
        return Ok(None);
    };
    changes.title.apply_to(&mut record.title);
    changes.description.apply_to(&mut record.description);
    changes.record_type.apply_to(&mut record.record_type);
    changes.metadata.apply_to(&mut record.metadata);
    changes.tags.apply_to(&mut record.tags);
    record.updated_at = now;

    if !repository::update_record(&tx, &record)? {
        return Ok(None);
    }
    tx.commit()?;
    Ok(Some(record))
}

/// Delete an owned record and, best effort, its stored file.
pub fn delete_record(
    conn: &Connection,
    store: &UploadStore,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<bool, DatabaseError> {
    let Some(record) = repository::get_record(conn, user_id, id)? else {
        return Ok(false);
    };
    if !repository::delete_record(conn, user_id, id)? {
        return Ok(false);
    }
    store.remove(&record.file_url);
    Ok(true)
}

/// Locate the stored bytes of an owned record.
pub fn record_file(
    conn: &Connection,
    store: &UploadStore,
    user_id: &Uuid,
    id: &Uuid,
) -> Result<Option<(MedicalRecord, PathBuf)>, DatabaseError> {
    let Some(record) = repository::get_record(conn, user_id, id)? else {
        return Ok(None);
    };
    Ok(store.resolve(&record.file_url).map(|path| (record, path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::NewUser;

    fn setup() -> (Connection, Uuid, tempfile::TempDir) {
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
        (conn, user.id, tempfile::tempdir().unwrap())
    }

    fn pdf(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: None,
            bytes: b"%PDF-1.4 test".to_vec(),
        }
    }

    #[test]
    fn sanitize_strips_paths_and_specials() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\scan 1.pdf"), "scan_1.pdf");
        assert_eq!(sanitize_filename("lab report (march).pdf"), "lab_report__march_.pdf");
        assert_eq!(sanitize_filename(".."), "document");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), 100);
    }

    #[test]
    fn resolve_rejects_escapes() {
        let store = UploadStore::new("/data/uploads");
        assert_eq!(
            store.resolve("/uploads/abc_x.pdf"),
            Some(PathBuf::from("/data/uploads/abc_x.pdf"))
        );
        assert!(store.resolve("/uploads/../secret").is_none());
        assert!(store.resolve("/uploads/a/b").is_none());
        assert!(store.resolve("/elsewhere/x").is_none());
        assert!(store.resolve("/uploads/").is_none());
    }

    #[test]
    fn mime_type_falls_back_to_extension() {
        assert_eq!(pdf("x.pdf").mime_type(), "application/pdf");
        let declared = UploadedFile {
            content_type: Some("image/png".into()),
            ..pdf("x.pdf")
        };
        assert_eq!(declared.mime_type(), "image/png");
        assert_eq!(pdf("noext").mime_type(), "application/octet-stream");
    }

    #[test]
    fn upload_applies_defaults_and_stores_file() {
        let (conn, user_id, dir) = setup();
        let store = UploadStore::new(dir.path());
        let record = create_record(&conn, &store, &user_id, pdf("blood test.pdf"), NewRecordFields::default(), Utc::now()).unwrap();

        assert_eq!(record.record_type, RecordType::Other);
        assert_eq!(record.title, "blood test.pdf");
        assert_eq!(record.file_name, "blood test.pdf");
        assert_eq!(record.file_size, 13);
        assert_eq!(record.mime_type, "application/pdf");
        assert!(record.file_url.starts_with("/uploads/"));
        assert!(record.file_url.ends_with("_blood_test.pdf"));
        assert!(record.metadata.is_object());

        let path = store.resolve(&record.file_url).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4 test");
    }

    #[test]
    fn upload_rejects_non_object_metadata() {
        let (conn, user_id, dir) = setup();
        let store = UploadStore::new(dir.path());
        let fields = NewRecordFields {
            metadata: Some(serde_json::json!([1, 2])),
            ..Default::default()
        };
        let err = create_record(&conn, &store, &user_id, pdf("x.pdf"), fields, Utc::now()).unwrap_err();
        assert!(matches!(err, RecordError::Validation(_)));
    }

    #[test]
    fn partial_update_and_delete_remove_file() {
        let (mut conn, user_id, dir) = setup();
        let store = UploadStore::new(dir.path());
        let record = create_record(&conn, &store, &user_id, pdf("x.pdf"), NewRecordFields::default(), Utc::now()).unwrap();

        let changes: RecordUpdate =
            serde_json::from_str(r#"{"type": "LAB_REPORT", "tags": ["blood"]}"#).unwrap();
        let updated = update_record(&mut conn, &user_id, &record.id, changes, Utc::now()).unwrap().unwrap();
        assert_eq!(updated.record_type, RecordType::LabReport);
        assert_eq!(updated.tags, vec!["blood".to_string()]);
        assert_eq!(updated.title, "x.pdf");

        let (_, path) = record_file(&conn, &store, &user_id, &record.id).unwrap().unwrap();
        assert!(path.exists());
        assert!(delete_record(&conn, &store, &user_id, &record.id).unwrap());
        assert!(!path.exists());
        assert!(!delete_record(&conn, &store, &user_id, &record.id).unwrap());
    }

    #[test]
    fn update_of_foreign_record_is_not_found() {
        let (mut conn, user_id, dir) = setup();
        let store = UploadStore::new(dir.path());
        let record = create_record(&conn, &store, &user_id, pdf("x.pdf"), NewRecordFields::default(), Utc::now()).unwrap();
        let stranger = Uuid::new_v4();
        assert!(update_record(&mut conn, &stranger, &record.id, RecordUpdate::default(), Utc::now()).unwrap().is_none());
        assert!(record_file(&conn, &store, &stranger, &record.id).unwrap().is_none());
    }

    #[test]
    fn update_validation() {
        let blank: RecordUpdate = serde_json::from_str(r#"{"title": "  "}"#).unwrap();
        assert!(blank.validate().is_err());
        let bad_meta: RecordUpdate = serde_json::from_str(r#"{"metadata": "x"}"#).unwrap();
        assert!(bad_meta.validate().is_err());
        assert!(RecordUpdate::default().validate().is_ok());
    }
}
