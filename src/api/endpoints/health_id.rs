//! Health identifier endpoints.
//!
//! - `GET /api/health-id`
//! - `GET /api/health-id/qr`

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::repository;
use crate::emergency::{self, QrPayload};
use crate::health_id::render_qr_data_url;
use crate::models::enums::BloodGroup;
use crate::models::HealthIdentifier;

const NOT_ASSIGNED: &str = "Health ID not found. Please verify your email first.";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrUser {
    pub first_name: String,
    pub last_name: String,
    pub blood_group: Option<BloodGroup>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    pub health_code: String,
    /// SVG data URL.
    pub qr_code: String,
    pub user: QrUser,
}

/// `GET /api/health-id`: the caller's identifier; 404 until verified.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<HealthIdentifier>, ApiError> {
    let health_id = ctx
        .with_db(move |_, conn| Ok(repository::get_health_id_by_user(conn, &auth.user_id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_ASSIGNED.into()))?;
    Ok(Json(health_id))
}

/// `GET /api/health-id/qr`: QR code carrying the public emergency card.
pub async fn qr(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<QrResponse>, ApiError> {
    let response = ctx
        .with_db(move |_, conn| {
            let user = repository::get_user(conn, &auth.user_id)?
                .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
            let health_id = repository::get_health_id_by_user(conn, &user.id)?
                .ok_or_else(|| ApiError::NotFound(NOT_ASSIGNED.into()))?;

            let card = emergency::public_card_for_user(conn, &user)?;
            let blood_group = card.blood_group;
            let payload = QrPayload::new(&health_id.health_code, card, Utc::now());
            let qr_code = render_qr_data_url(&payload)?;

            Ok(QrResponse {
                health_code: health_id.health_code,
                qr_code,
                user: QrUser {
                    first_name: user.first_name,
                    last_name: user.last_name,
                    blood_group,
                },
            })
        })
        .await?;
    Ok(Json(response))
}
