//! API error types with structured JSON responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::account::AccountError;
use crate::core_state::CoreError;
use crate::crypto::CryptoError;
use crate::health_id::QrError;
use crate::records::RecordError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
    /// Only present on `VERIFICATION_REQUIRED`.
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Token expired")]
    TokenExpired,
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired code")]
    InvalidCode,
    #[error("Email verification required")]
    VerificationRequired { user_id: Uuid },
    #[error("Payload too large")]
    PayloadTooLarge { limit: usize },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::TokenExpired | ApiError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::EmailTaken => StatusCode::CONFLICT,
            ApiError::InvalidCode | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::VerificationRequired { .. } => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "AUTH_REQUIRED",
            ApiError::TokenExpired => "TOKEN_EXPIRED",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::EmailTaken => "EMAIL_TAKEN",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::InvalidCode => "INVALID_CODE",
            ApiError::VerificationRequired { .. } => "VERIFICATION_REQUIRED",
            ApiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Authentication required".into(),
            ApiError::TokenExpired => "Token expired, log in again".into(),
            ApiError::RateLimited { retry_after } => {
                format!("Rate limit exceeded. Retry after {retry_after}s")
            }
            ApiError::EmailTaken => "Email already registered".into(),
            ApiError::InvalidCredentials => "Invalid email or password".into(),
            ApiError::InvalidCode => "Invalid or expired OTP".into(),
            ApiError::VerificationRequired { .. } => {
                "Please verify your email. A new verification code has been sent to your email"
                    .into()
            }
            ApiError::PayloadTooLarge { limit } => {
                format!("File exceeds the {limit} byte upload limit")
            }
            ApiError::NotFound(detail) | ApiError::Validation(detail) => detail.clone(),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                "An internal error occurred".into()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let user_id = match &self {
            ApiError::VerificationRequired { user_id } => Some(*user_id),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.client_message(),
            },
            user_id,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::EmailTaken => ApiError::EmailTaken,
            AccountError::InvalidCredentials => ApiError::InvalidCredentials,
            AccountError::InvalidOrExpiredCode => ApiError::InvalidCode,
            AccountError::UserNotFound => ApiError::NotFound("User not found".into()),
            AccountError::Validation(msg) => ApiError::Validation(msg),
            AccountError::Database(e) => ApiError::Internal(e.to_string()),
            AccountError::Crypto(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<QrError> for ApiError {
    fn from(err: QrError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
        assert!(json.get("userId").is_none());
    }

    #[tokio::test]
    async fn rate_limited_returns_429_with_retry_after() {
        let response = ApiError::RateLimited { retry_after: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "60");
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn email_taken_returns_409() {
        let response = ApiError::EmailTaken.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "EMAIL_TAKEN");
    }

    #[tokio::test]
    async fn verification_required_carries_user_id() {
        let user_id = Uuid::new_v4();
        let response = ApiError::VerificationRequired { user_id }.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "VERIFICATION_REQUIRED");
        assert_eq!(json["userId"], user_id.to_string());
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("UNIQUE constraint failed: users.email".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn payload_too_large_returns_413() {
        let response = ApiError::PayloadTooLarge { limit: 10 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn account_errors_map_to_distinct_codes() {
        let cases = [
            (AccountError::EmailTaken, "EMAIL_TAKEN"),
            (AccountError::InvalidCredentials, "INVALID_CREDENTIALS"),
            (AccountError::InvalidOrExpiredCode, "INVALID_CODE"),
            (AccountError::UserNotFound, "NOT_FOUND"),
            (AccountError::Validation("x".into()), "VALIDATION"),
            (AccountError::Crypto(CryptoError::MalformedHash), "INTERNAL"),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).code(), code);
        }
    }
}
