//! Emergency profile endpoints.
//!
//! - `GET /api/emergency` / `PUT /api/emergency`
//! - `GET /api/emergency/card`
//! - `GET /api/emergency/public/:health_code` (no authentication)

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, ApiPath, AuthUser};
use crate::emergency::{self, EmergencyUpdate, FullCard, PublicCard};
use crate::health_id::is_valid_health_code;
use crate::models::EmergencyInfo;

/// `GET /api/emergency`: stored profile, created with defaults on first read.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<EmergencyInfo>, ApiError> {
    let info = ctx
        .with_db(move |_, conn| Ok(emergency::get_or_create(conn, &auth.user_id, Utc::now())?))
        .await?;
    Ok(Json(info))
}

/// `PUT /api/emergency`: partial update; omitted fields keep their value.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(changes): ApiJson<EmergencyUpdate>,
) -> Result<Json<EmergencyInfo>, ApiError> {
    changes.validate().map_err(ApiError::Validation)?;
    let info = ctx
        .with_db(move |_, conn| {
            Ok(emergency::update(conn, &auth.user_id, changes, Utc::now())?)
        })
        .await?;
    tracing::info!(user_id = %auth.user_id, "Emergency profile updated");
    Ok(Json(info))
}

/// `GET /api/emergency/card`: the owner's full card.
pub async fn card(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<FullCard>, ApiError> {
    let card = ctx
        .with_db(move |_, conn| Ok(emergency::full_card(conn, &auth.user_id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(card))
}

/// `GET /api/emergency/public/:health_code`: redacted card for responders.
pub async fn public(
    State(ctx): State<ApiContext>,
    ApiPath(health_code): ApiPath<String>,
) -> Result<Json<PublicCard>, ApiError> {
    if !is_valid_health_code(&health_code) {
        return Err(ApiError::Validation("Invalid Health ID format".into()));
    }
    let card = ctx
        .with_db(move |_, conn| Ok(emergency::public_card(conn, &health_code)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("Health ID not found".into()))?;
    Ok(Json(card))
}
