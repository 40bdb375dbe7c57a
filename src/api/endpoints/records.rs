//! Medical record endpoints.
//!
//! - `GET /api/records?type=&search=` / `POST /api/records` (multipart)
//! - `GET /api/records/by-type`
//! - `GET|PUT|DELETE /api/records/:id`
//! - `GET /api/records/:id/file`

use std::str::FromStr;

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MessageResponse;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::db::repository;
use crate::models::enums::RecordType;
use crate::models::{MedicalRecord, RecordFilter, RecordTypeCount};
use crate::records::{self, NewRecordFields, RecordUpdate, UploadedFile};

const NOT_FOUND: &str = "Record not found";

#[derive(Deserialize)]
pub struct RecordQuery {
    #[serde(rename = "type")]
    pub record_type: Option<RecordType>,
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct RecordUpdated {
    pub message: &'static str,
    pub record: MedicalRecord,
}

/// `GET /api/records`: the caller's records, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<RecordQuery>,
) -> Result<Json<Vec<MedicalRecord>>, ApiError> {
    let filter = RecordFilter {
        record_type: query.record_type,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let records = ctx
        .with_db(move |_, conn| Ok(repository::list_records(conn, &auth.user_id, &filter)?))
        .await?;
    Ok(Json(records))
}

/// `GET /api/records/by-type`
pub async fn by_type(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<RecordTypeCount>>, ApiError> {
    let counts = ctx
        .with_db(move |_, conn| Ok(repository::count_records_by_type(conn, &auth.user_id)?))
        .await?;
    Ok(Json(counts))
}

/// `GET /api/records/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MedicalRecord>, ApiError> {
    let record = ctx
        .with_db(move |_, conn| Ok(repository::get_record(conn, &auth.user_id, &id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.into()))?;
    Ok(Json(record))
}

/// `GET /api/records/:id/file`: the stored document bytes.
pub async fn file(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, ApiError> {
    let (record, path) = ctx
        .with_db(move |core, conn| {
            Ok(records::record_file(conn, core.uploads(), &auth.user_id, &id)?)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.into()))?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(record_id = %record.id, "Stored file missing");
            return Err(ApiError::NotFound("File not found".into()));
        }
        Err(e) => return Err(ApiError::Internal(format!("read upload: {e}"))),
    };

    let disposition = format!(
        "inline; filename=\"{}\"",
        records::sanitize_filename(&record.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, record.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `POST /api/records`: upload a document with its catalog fields.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MedicalRecord>), ApiError> {
    let limit = ctx.core.config.max_upload_bytes;
    let mut file: Option<UploadedFile> = None;
    let mut fields = NewRecordFields::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                if bytes.len() > limit {
                    return Err(ApiError::PayloadTooLarge { limit });
                }
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "type" => {
                let text = field_text(field).await?;
                let record_type = RecordType::from_str(text.trim())
                    .map_err(|_| ApiError::Validation(format!("Unknown record type: {text}")))?;
                fields.record_type = Some(record_type);
            }
            "title" => fields.title = Some(field_text(field).await?),
            "description" => {
                let text = field_text(field).await?;
                fields.description = Some(text).filter(|d| !d.trim().is_empty());
            }
            "metadata" => {
                let text = field_text(field).await?;
                let value = serde_json::from_str(&text)
                    .map_err(|e| ApiError::Validation(format!("metadata is not valid JSON: {e}")))?;
                fields.metadata = Some(value);
            }
            "tags" => {
                let text = field_text(field).await?;
                let tags = serde_json::from_str::<Vec<String>>(&text).map_err(|e| {
                    ApiError::Validation(format!("tags must be a JSON array of strings: {e}"))
                })?;
                fields.tags = Some(tags);
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let file = file.ok_or_else(|| ApiError::Validation("No file uploaded".into()))?;
    let record = ctx
        .with_db(move |core, conn| {
            Ok(records::create_record(
                conn,
                core.uploads(),
                &auth.user_id,
                file,
                fields,
                Utc::now(),
            )?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `PUT /api/records/:id`: partial update of the catalog fields.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(changes): ApiJson<RecordUpdate>,
) -> Result<Json<RecordUpdated>, ApiError> {
    changes.validate().map_err(ApiError::Validation)?;
    let record = ctx
        .with_db(move |_, conn| {
            Ok(records::update_record(conn, &auth.user_id, &id, changes, Utc::now())?)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.into()))?;
    Ok(Json(RecordUpdated {
        message: "Record updated successfully",
        record,
    }))
}

/// `DELETE /api/records/:id`: removes the row and the stored file.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = ctx
        .with_db(move |core, conn| {
            Ok(records::delete_record(conn, core.uploads(), &auth.user_id, &id)?)
        })
        .await?;
    if !deleted {
        return Err(ApiError::NotFound(NOT_FOUND.into()));
    }
    tracing::info!(record_id = %id, user_id = %auth.user_id, "Record deleted");
    Ok(MessageResponse::new("Record deleted successfully"))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid form field: {e}")))
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::Validation(err.body_text())
    }
}
