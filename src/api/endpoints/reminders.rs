//! Reminder endpoints.
//!
//! - `GET /api/reminders?type=&active=` / `POST /api/reminders`
//! - `GET /api/reminders/upcoming`
//! - `GET|PUT|DELETE /api/reminders/:id`
//! - `POST /api/reminders/:id/complete`

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MessageResponse;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::db::repository;
use crate::models::enums::ReminderType;
use crate::models::{Reminder, ReminderFilter};
use crate::reminders::{self, NewReminder, ReminderUpdate};

const NOT_FOUND: &str = "Reminder not found";

#[derive(Deserialize)]
pub struct ReminderQuery {
    #[serde(rename = "type")]
    pub reminder_type: Option<ReminderType>,
    pub active: Option<bool>,
}

#[derive(Serialize)]
pub struct ReminderUpdated {
    pub message: &'static str,
    pub reminder: Reminder,
}

/// `GET /api/reminders`: ordered by scheduled time.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<ReminderQuery>,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let filter = ReminderFilter {
        reminder_type: query.reminder_type,
        active: query.active,
    };
    let list = ctx
        .with_db(move |_, conn| Ok(repository::list_reminders(conn, &auth.user_id, &filter)?))
        .await?;
    Ok(Json(list))
}

/// `GET /api/reminders/upcoming`: active reminders due in the next 24 hours.
pub async fn upcoming(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let list = ctx
        .with_db(move |_, conn| Ok(reminders::upcoming(conn, &auth.user_id, Utc::now())?))
        .await?;
    Ok(Json(list))
}

/// `GET /api/reminders/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Reminder>, ApiError> {
    let reminder = ctx
        .with_db(move |_, conn| Ok(repository::get_reminder(conn, &auth.user_id, &id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.into()))?;
    Ok(Json(reminder))
}

/// `POST /api/reminders`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(new): ApiJson<NewReminder>,
) -> Result<(StatusCode, Json<Reminder>), ApiError> {
    new.validate().map_err(ApiError::Validation)?;
    let reminder = ctx
        .with_db(move |_, conn| {
            Ok(reminders::create_reminder(conn, &auth.user_id, new, Utc::now())?)
        })
        .await?;
    tracing::info!(reminder_id = %reminder.id, user_id = %auth.user_id, "Reminder created");
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// `PUT /api/reminders/:id`: partial update.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(changes): ApiJson<ReminderUpdate>,
) -> Result<Json<ReminderUpdated>, ApiError> {
    changes.validate().map_err(ApiError::Validation)?;
    let reminder = ctx
        .with_db(move |_, conn| {
            Ok(reminders::update_reminder(conn, &auth.user_id, &id, changes, Utc::now())?)
        })
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.into()))?;
    Ok(Json(ReminderUpdated {
        message: "Reminder updated successfully",
        reminder,
    }))
}

/// `POST /api/reminders/:id/complete`
pub async fn complete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let completed = ctx
        .with_db(move |_, conn| {
            Ok(repository::complete_reminder(conn, &auth.user_id, &id, Utc::now())?)
        })
        .await?;
    if !completed {
        return Err(ApiError::NotFound(NOT_FOUND.into()));
    }
    Ok(MessageResponse::new("Reminder marked as completed"))
}

/// `DELETE /api/reminders/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = ctx
        .with_db(move |_, conn| Ok(repository::delete_reminder(conn, &auth.user_id, &id)?))
        .await?;
    if !deleted {
        return Err(ApiError::NotFound(NOT_FOUND.into()));
    }
    Ok(MessageResponse::new("Reminder deleted successfully"))
}
