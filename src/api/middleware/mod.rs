//! API middleware.
//!
//! - `rate::limit` guards the unauthenticated account routes.
//! - `auth::require_auth` validates the bearer token and injects `AuthUser`.

pub mod auth;
pub mod rate;
