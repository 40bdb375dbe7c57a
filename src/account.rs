//! Account lifecycle: registration, one-time-code verification, login,
//! code resend and profile reads.
//!
//! Functions are synchronous and take the connection they should run on;
//! the HTTP layer calls them from a blocking task.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core_state::CoreState;
use crate::crypto::CryptoError;
use crate::db::repository::{self, HEALTH_IDS_CODE, USERS_EMAIL};
use crate::db::DatabaseError;
use crate::models::enums::OtpPurpose;
use crate::models::{EmergencyInfo, NewUser, OneTimeCode, User};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const CODE_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]*$").expect("valid phone regex"));

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Email already registered")]
    EmailTaken,

    /// Unknown email and wrong password are deliberately indistinguishable.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Wrong, expired and already-used codes are deliberately indistinguishable.
    #[error("Invalid or expired code")]
    InvalidOrExpiredCode,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<rusqlite::Error> for AccountError {
    fn from(err: rusqlite::Error) -> Self {
        AccountError::Database(err.into())
    }
}

// ── Request and response shapes ─────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub user_id: Uuid,
    pub code: String,
    #[serde(rename = "type")]
    pub purpose: OtpPurpose,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    pub user_id: Uuid,
    #[serde(rename = "type", default)]
    pub purpose: Option<OtpPurpose>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// User projection returned with a session token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub health_code: Option<String>,
}

impl AccountUser {
    fn new(user: &User, health_code: Option<String>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            health_code,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: AccountUser,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Session),
    /// Credentials were right but the email is unverified; a new code was sent.
    NeedsVerification { user_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub gender: Option<String>,
    pub profile_image: Option<String>,
    pub health_code: Option<String>,
    pub emergency_info: Option<EmergencyInfo>,
}

// ── Boundary validation ─────────────────────────────────

pub fn normalize_email(email: &str) -> Result<String, AccountError> {
    let email = email.trim().to_lowercase();
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(AccountError::Validation("A valid email is required".into()));
    }
    Ok(email)
}

fn validate_phone(phone: &str) -> Result<(), AccountError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !PHONE_PATTERN.is_match(phone) || !(7..=15).contains(&digits) {
        return Err(AccountError::Validation("Phone number is not valid".into()));
    }
    Ok(())
}

fn required(value: &str, field: &str) -> Result<String, AccountError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccountError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

impl Registration {
    /// Trimmed, email lowercased, blank phone dropped.
    pub fn normalized(self) -> Result<Self, AccountError> {
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if let Some(phone) = &phone {
            validate_phone(phone)?;
        }
        Ok(Self {
            email: normalize_email(&self.email)?,
            password: self.password,
            first_name: required(&self.first_name, "firstName")?,
            last_name: required(&self.last_name, "lastName")?,
            phone,
        })
    }
}

impl Verification {
    pub fn validate(&self) -> Result<(), AccountError> {
        if self.code.len() != CODE_LEN || !self.code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AccountError::Validation(format!(
                "code must be exactly {CODE_LEN} digits"
            )));
        }
        Ok(())
    }
}

// ── One-time codes ──────────────────────────────────────

fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..999_999).to_string()
}

fn issue_code(
    state: &CoreState,
    conn: &Connection,
    user_id: &Uuid,
    purpose: OtpPurpose,
    now: DateTime<Utc>,
) -> Result<OneTimeCode, AccountError> {
    if state.config.invalidate_previous_codes {
        let retired = repository::invalidate_otps(conn, user_id, purpose)?;
        tracing::debug!(user_id = %user_id, %purpose, retired, "Retired outstanding codes");
    }
    let otp = OneTimeCode {
        id: Uuid::new_v4(),
        user_id: *user_id,
        code: generate_code(),
        purpose,
        expires_at: now + state.otp_ttl(),
        is_used: false,
        created_at: now,
    };
    repository::insert_otp(conn, &otp)?;
    Ok(otp)
}

/// Delivery failure never fails the caller. Outside production the code is
/// logged instead so development accounts can still be verified.
fn dispatch_code(state: &CoreState, address: &str, otp: &OneTimeCode) {
    match state.mailer().send_code(address, &otp.code) {
        Ok(()) => tracing::info!(user_id = %otp.user_id, purpose = %otp.purpose, "Verification code sent"),
        Err(e) => {
            tracing::warn!(user_id = %otp.user_id, error = %e, "Failed to send verification code");
            if !state.config.is_production() {
                tracing::info!(email = %address, code = %otp.code, "Verification code (email fallback)");
            }
        }
    }
}

// ── Health identifier ───────────────────────────────────

/// Existing identifier, or a new one. A collision on the code is retried
/// once with a fresh code; a second collision is an error.
fn ensure_health_id(
    state: &CoreState,
    conn: &Connection,
    user_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<String, AccountError> {
    if let Some(existing) = repository::get_health_id_by_user(conn, user_id)? {
        return Ok(existing.health_code);
    }

    let mut retried = false;
    loop {
        let candidate = state.health_codes().generate();
        match repository::insert_health_id(conn, user_id, &candidate, now) {
            Ok(created) => return Ok(created.health_code),
            Err(e) if e.is_duplicate(HEALTH_IDS_CODE) && !retried => {
                tracing::warn!(user_id = %user_id, "Health code collision, regenerating");
                retried = true;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

// ── Operations ──────────────────────────────────────────

/// Create an unverified user and send an email-verification code.
pub fn register(
    state: &CoreState,
    conn: &Connection,
    input: Registration,
) -> Result<Uuid, AccountError> {
    let input = input.normalized()?;
    if repository::get_user_by_email(conn, &input.email)?.is_some() {
        return Err(AccountError::EmailTaken);
    }

    let password_hash = state.passwords().hash(&input.password)?;
    let now = Utc::now();

    let tx = conn.unchecked_transaction()?;
    let user = repository::insert_user(
        &tx,
        &NewUser {
            email: input.email,
            password_hash,
            first_name: input.first_name,
            last_name: input.last_name,
            phone: input.phone,
        },
        now,
    )
    .map_err(|e| {
        if e.is_duplicate(USERS_EMAIL) {
            AccountError::EmailTaken
        } else {
            e.into()
        }
    })?;
    let otp = issue_code(state, &tx, &user.id, OtpPurpose::EmailVerification, now)?;
    tx.commit()?;

    tracing::info!(user_id = %user.id, "User registered");
    dispatch_code(state, &user.email, &otp);
    Ok(user.id)
}

/// Consume a code and start a session. For email verification this also
/// marks the user verified and assigns their health identifier.
///
/// Code lookup, consumption, the verification flag and identifier creation
/// commit together. Concurrent attempts with the same code serialize on the
/// write lock; the losers find the code used.
pub fn verify_code(
    state: &CoreState,
    conn: &mut Connection,
    input: Verification,
) -> Result<Session, AccountError> {
    input.validate()?;
    let now = Utc::now();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let otp = repository::find_acceptable_otp(&tx, &input.user_id, &input.code, input.purpose, now)?
        .ok_or(AccountError::InvalidOrExpiredCode)?;
    if !repository::mark_otp_used(&tx, &otp.id)? {
        return Err(AccountError::InvalidOrExpiredCode);
    }
    let mut user = repository::get_user(&tx, &input.user_id)?
        .ok_or(AccountError::InvalidOrExpiredCode)?;

    let health_code = if input.purpose == OtpPurpose::EmailVerification {
        if repository::mark_user_verified(&tx, &user.id, now)? {
            tracing::info!(user_id = %user.id, "Email verified");
        }
        user.is_verified = true;
        Some(ensure_health_id(state, &tx, &user.id, now)?)
    } else {
        repository::get_health_id_by_user(&tx, &user.id)?.map(|h| h.health_code)
    };
    tx.commit()?;

    let token = state.tokens().issue(&user.id, state.token_ttl())?;
    Ok(Session {
        token,
        user: AccountUser::new(&user, health_code),
    })
}

pub fn login(
    state: &CoreState,
    conn: &Connection,
    credentials: Credentials,
) -> Result<LoginOutcome, AccountError> {
    let email = normalize_email(&credentials.email).map_err(|_| AccountError::InvalidCredentials)?;
    let user = repository::get_user_by_email(conn, &email)?
        .ok_or(AccountError::InvalidCredentials)?;
    if !state.passwords().verify(&credentials.password, &user.password_hash)? {
        return Err(AccountError::InvalidCredentials);
    }

    if !user.is_verified {
        let otp = issue_code(state, conn, &user.id, OtpPurpose::EmailVerification, Utc::now())?;
        dispatch_code(state, &user.email, &otp);
        return Ok(LoginOutcome::NeedsVerification { user_id: user.id });
    }

    let health_code = repository::get_health_id_by_user(conn, &user.id)?.map(|h| h.health_code);
    let token = state.tokens().issue(&user.id, state.token_ttl())?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(LoginOutcome::Authenticated(Session {
        token,
        user: AccountUser::new(&user, health_code),
    }))
}

/// Issue and send a fresh code. Earlier codes stay valid unless
/// `invalidate_previous_codes` is configured.
pub fn resend_code(
    state: &CoreState,
    conn: &Connection,
    request: ResendRequest,
) -> Result<(), AccountError> {
    let user = repository::get_user(conn, &request.user_id)?.ok_or(AccountError::UserNotFound)?;
    let purpose = request.purpose.unwrap_or_default();
    let otp = issue_code(state, conn, &user.id, purpose, Utc::now())?;
    dispatch_code(state, &user.email, &otp);
    Ok(())
}

pub fn get_profile(conn: &Connection, user_id: &Uuid) -> Result<Profile, AccountError> {
    let user = repository::get_user(conn, user_id)?.ok_or(AccountError::UserNotFound)?;
    let health_code = repository::get_health_id_by_user(conn, user_id)?.map(|h| h.health_code);
    let emergency_info = repository::get_emergency_info(conn, user_id)?;

    Ok(Profile {
        id: user.id,
        email: user.email,
        phone: user.phone,
        first_name: user.first_name,
        last_name: user.last_name,
        is_verified: user.is_verified,
        date_of_birth: user.date_of_birth,
        gender: user.gender,
        profile_image: user.profile_image,
        health_code,
        emergency_info,
    })
}
