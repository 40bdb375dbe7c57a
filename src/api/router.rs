//! HTTP router.
//!
//! Returns a composable `Router` with every route under `/api/`.
//!
//! Three groups:
//! 1. Public: health check, public emergency card
//! 2. Account: rate limited, unauthenticated
//! 3. Protected: bearer token required

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Room for multipart framing and text fields around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.core.config.max_upload_bytes + MULTIPART_OVERHEAD;
    let cors = cors_layer(ctx.core.config.cors_origin.as_deref());

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/profile", get(endpoints::auth::profile))
        .route("/health-id", get(endpoints::health_id::get))
        .route("/health-id/qr", get(endpoints::health_id::qr))
        .route(
            "/emergency",
            get(endpoints::emergency::get).put(endpoints::emergency::update),
        )
        .route("/emergency/card", get(endpoints::emergency::card))
        .route(
            "/records",
            get(endpoints::records::list).post(endpoints::records::upload),
        )
        .route("/records/by-type", get(endpoints::records::by_type))
        .route(
            "/records/:id",
            get(endpoints::records::detail)
                .put(endpoints::records::update)
                .delete(endpoints::records::delete),
        )
        .route("/records/:id/file", get(endpoints::records::file))
        .route(
            "/reminders",
            get(endpoints::reminders::list).post(endpoints::reminders::create),
        )
        .route("/reminders/upcoming", get(endpoints::reminders::upcoming))
        .route(
            "/reminders/:id",
            get(endpoints::reminders::detail)
                .put(endpoints::reminders::update)
                .delete(endpoints::reminders::delete),
        )
        .route(
            "/reminders/:id/complete",
            post(endpoints::reminders::complete),
        )
        .with_state(ctx.clone())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let account = Router::new()
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/verify-otp", post(endpoints::auth::verify_otp))
        .route("/auth/resend-otp", post(endpoints::auth::resend_otp))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx.clone()));

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/emergency/public/:health_code",
            get(endpoints::emergency::public),
        )
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .nest("/api", account)
        .nest("/api", public)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}
