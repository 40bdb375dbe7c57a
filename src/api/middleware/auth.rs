//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies it with the token
//! service, confirms the user still exists, and injects `AuthUser` into
//! request extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::crypto::CryptoError;
use crate::db::repository;

/// Require a valid session token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `AuthUser` and adds `Cache-Control: no-store`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let user_id = ctx.core.tokens().verify(token).map_err(|e| match e {
        CryptoError::TokenExpired => ApiError::TokenExpired,
        other => {
            tracing::debug!(error = %other, "Rejected bearer token");
            ApiError::Unauthorized
        }
    })?;

    let exists = ctx
        .with_db(move |_, conn| Ok(repository::user_exists(conn, &user_id)?))
        .await?;
    if !exists {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(AuthUser { user_id });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}
