//! Account endpoints.
//!
//! - `POST /api/auth/register`
//! - `POST /api/auth/verify-otp`
//! - `POST /api/auth/resend-otp`
//! - `POST /api/auth/login`
//! - `GET /api/auth/profile` (authenticated)

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use super::MessageResponse;
use crate::account::{
    self, Credentials, LoginOutcome, Profile, Registration, ResendRequest, Session, Verification,
};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiJson, AuthUser};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub session: Session,
}

/// `POST /api/auth/register`: create an unverified account and email a code.
pub async fn register(
    State(ctx): State<ApiContext>,
    ApiJson(body): ApiJson<Registration>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user_id = ctx
        .with_db(move |core, conn| Ok(account::register(core, conn, body)?))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please verify your email.",
            user_id,
        }),
    ))
}

/// `POST /api/auth/verify-otp`: consume a code, returning a session.
pub async fn verify_otp(
    State(ctx): State<ApiContext>,
    ApiJson(body): ApiJson<Verification>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let session = ctx
        .with_db(move |core, conn| Ok(account::verify_code(core, conn, body)?))
        .await?;

    Ok(Json(VerifyResponse {
        message: "Verification successful",
        session,
    }))
}

/// `POST /api/auth/resend-otp`
pub async fn resend_otp(
    State(ctx): State<ApiContext>,
    ApiJson(body): ApiJson<ResendRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    ctx.with_db(move |core, conn| Ok(account::resend_code(core, conn, body)?))
        .await?;
    Ok(MessageResponse::new("OTP sent successfully"))
}

/// `POST /api/auth/login`: a session, or 403 `VERIFICATION_REQUIRED`
/// with the user id when the email is not verified yet.
pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(body): ApiJson<Credentials>,
) -> Result<Json<Session>, ApiError> {
    let outcome = ctx
        .with_db(move |core, conn| Ok(account::login(core, conn, body)?))
        .await?;

    match outcome {
        LoginOutcome::Authenticated(session) => Ok(Json(session)),
        LoginOutcome::NeedsVerification { user_id } => {
            Err(ApiError::VerificationRequired { user_id })
        }
    }
}

/// `GET /api/auth/profile`
pub async fn profile(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Profile>, ApiError> {
    let profile = ctx
        .with_db(move |_, conn| Ok(account::get_profile(conn, &auth.user_id)?))
        .await?;
    Ok(Json(profile))
}
