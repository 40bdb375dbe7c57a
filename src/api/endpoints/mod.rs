//! API endpoint handlers, one module per resource.
//!
//! Handlers validate the request shape, then hand a unit of work to the
//! domain modules through `ApiContext::with_db`.

pub mod auth;
pub mod emergency;
pub mod health;
pub mod health_id;
pub mod records;
pub mod reminders;

use serde::Serialize;

/// `{ "message": ... }` acknowledgement body.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn new(message: &'static str) -> axum::Json<Self> {
        axum::Json(Self { message })
    }
}
