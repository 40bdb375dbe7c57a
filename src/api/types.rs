//! Shared types for the HTTP layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{FromRequest, FromRequestParts};
use rusqlite::Connection;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::config::RateLimitConfig;
use crate::core_state::CoreState;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes and middleware.
/// Wraps `CoreState` plus the per-client rate limiter.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        let limiter = RateLimiter::new(&core.config.rate_limit);
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(limiter)),
        }
    }

    /// Run a unit of work on a fresh connection, off the async runtime.
    pub async fn with_db<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        F: FnOnce(&CoreState, &mut Connection) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let core = self.core.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = core.open_db()?;
            work(&core, &mut conn)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
    }
}

// ═══════════════════════════════════════════════════════════
// Caller identity: injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, inserted into request extensions by
/// `middleware::auth::require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

// ═══════════════════════════════════════════════════════════
// Extractors that reject with the JSON error body
// ═══════════════════════════════════════════════════════════

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// ═══════════════════════════════════════════════════════════
// Rate limiter: sliding window per client
// ═══════════════════════════════════════════════════════════

const WINDOW: Duration = Duration::from_secs(3600);
/// Sweep idle clients at most this often.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by client.
/// Clients with no request in the last hour are dropped from the map.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
    per_hour: u32,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new(limits: &RateLimitConfig) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute: limits.per_minute,
            per_hour: limits.per_hour,
            last_sweep: Instant::now(),
        }
    }

    /// Check if a client is within rate limits. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &str, now: Instant) -> Result<(), u64> {
        if now.duration_since(self.last_sweep) >= SWEEP_INTERVAL {
            self.sweep(now);
        }

        let entries = self.windows.entry(key.to_string()).or_default();
        entries.retain(|ts| now.duration_since(*ts) < WINDOW);

        let last_minute = entries
            .iter()
            .filter(|ts| now.duration_since(**ts) < Duration::from_secs(60))
            .count() as u32;
        let limited = if last_minute >= self.per_minute {
            Some(60)
        } else if entries.len() as u32 >= self.per_hour {
            Some(3600)
        } else {
            None
        };

        match limited {
            Some(retry_after) => {
                if entries.is_empty() {
                    self.windows.remove(key);
                }
                Err(retry_after)
            }
            None => {
                entries.push(now);
                Ok(())
            }
        }
    }

    fn sweep(&mut self, now: Instant) {
        self.windows.retain(|_, entries| {
            entries.retain(|ts| now.duration_since(*ts) < WINDOW);
            !entries.is_empty()
        });
        self.last_sweep = now;
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
