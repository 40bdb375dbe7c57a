//! Shared application state: configuration, storage locations, and the
//! collaborators the account flow calls through narrow traits.
//!
//! Built once at startup, wrapped in `Arc`, and handed to every request.
//! Nothing in here is mutated after construction; the database is the only
//! shared mutable state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::Duration;
use rand::RngCore;

use crate::config::AppConfig;
use crate::crypto::{JwtTokenService, PasswordHasher, Pbkdf2PasswordHasher, TokenService};
use crate::db;
use crate::health_id::{HealthCodeGenerator, RandomHealthCodes};
use crate::notifier::{DisabledDispatcher, EmailDispatcher, NotifyError, SmtpDispatcher};
use crate::records::UploadStore;

/// Errors from CoreState construction and access.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Email setup failed: {0}")]
    Notify(#[from] NotifyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The swappable services behind the account lifecycle.
#[derive(Clone)]
pub struct Collaborators {
    pub passwords: Arc<dyn PasswordHasher>,
    pub tokens: Arc<dyn TokenService>,
    pub mailer: Arc<dyn EmailDispatcher>,
    pub health_codes: Arc<dyn HealthCodeGenerator>,
}

impl Collaborators {
    /// Production wiring: PBKDF2, HS256 JWT, SMTP when configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let secret = resolve_jwt_secret(config)?;
        let mailer: Arc<dyn EmailDispatcher> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpDispatcher::new(smtp, config.otp_ttl_secs)?),
            None => {
                tracing::warn!("No SMTP server configured; verification codes will not be emailed");
                Arc::new(DisabledDispatcher)
            }
        };

        Ok(Self {
            passwords: Arc::new(Pbkdf2PasswordHasher::new(config.password_iterations)),
            tokens: Arc::new(JwtTokenService::new(secret.as_bytes())),
            mailer,
            health_codes: Arc::new(RandomHealthCodes),
        })
    }
}

fn resolve_jwt_secret(config: &AppConfig) -> Result<String, CoreError> {
    if !config.jwt_secret.is_empty() {
        return Ok(config.jwt_secret.clone());
    }
    if config.is_production() {
        return Err(CoreError::Config(
            "HEALTHVAULT_JWT_SECRET must be set in production".into(),
        ));
    }
    tracing::warn!("No JWT secret configured; using a random secret, sessions end on restart");
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Ok(STANDARD_NO_PAD.encode(bytes))
}

pub struct CoreState {
    pub config: AppConfig,
    db_path: PathBuf,
    uploads: UploadStore,
    collaborators: Collaborators,
}

impl CoreState {
    /// Open (and migrate) the database under `config.data_dir` and prepare
    /// the upload directory.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Result<Self, CoreError> {
        let db_path = config.database_path();
        drop(db::open_database(&db_path)?);

        let uploads = UploadStore::new(config.uploads_dir());
        std::fs::create_dir_all(uploads.dir())?;

        tracing::info!(
            db = %db_path.display(),
            uploads = %uploads.dir().display(),
            environment = %config.environment,
            "Core state ready"
        );

        Ok(Self {
            config,
            db_path,
            uploads,
            collaborators,
        })
    }

    /// Open a connection for one unit of work.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::connect(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub fn passwords(&self) -> &dyn PasswordHasher {
        self.collaborators.passwords.as_ref()
    }

    pub fn tokens(&self) -> &dyn TokenService {
        self.collaborators.tokens.as_ref()
    }

    pub fn mailer(&self) -> &dyn EmailDispatcher {
        self.collaborators.mailer.as_ref()
    }

    pub fn health_codes(&self) -> &dyn HealthCodeGenerator {
        self.collaborators.health_codes.as_ref()
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::seconds(self.config.token_ttl_secs)
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.config.otp_ttl_secs)
    }
}

/// Test doubles shared by the unit and router tests.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Records every code it is asked to send; optionally fails each send.
    #[derive(Default)]
    pub struct RecordingDispatcher {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingDispatcher {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn last_code_for(&self, address: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == address)
                .map(|(_, code)| code.clone())
        }

        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl EmailDispatcher for RecordingDispatcher {
        fn send_code(&self, address: &str, code: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((address.to_string(), code.to_string()));
            if self.fail {
                Err(NotifyError::NotConfigured)
            } else {
                Ok(())
            }
        }
    }

    /// Hands out the queued codes in order, then random ones.
    #[derive(Default)]
    pub struct ScriptedHealthCodes {
        pub queue: Mutex<Vec<String>>,
    }

    impl ScriptedHealthCodes {
        pub fn new(codes: &[&str]) -> Self {
            Self {
                queue: Mutex::new(codes.iter().rev().map(|c| c.to_string()).collect()),
            }
        }
    }

    impl HealthCodeGenerator for ScriptedHealthCodes {
        fn generate(&self) -> String {
            self.queue
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| RandomHealthCodes.generate())
        }
    }

    pub struct TestState {
        pub state: Arc<CoreState>,
        pub mailer: Arc<RecordingDispatcher>,
        pub _dir: tempfile::TempDir,
    }

    pub fn test_config(dir: &Path) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            jwt_secret: "test-secret".into(),
            password_iterations: 1_000,
            ..AppConfig::default()
        }
    }

    pub fn build(
        config: impl FnOnce(AppConfig) -> AppConfig,
        mailer: RecordingDispatcher,
        health_codes: Arc<dyn HealthCodeGenerator>,
    ) -> TestState {
        let dir = tempfile::tempdir().unwrap();
        let config = config(test_config(dir.path()));
        let mailer = Arc::new(mailer);
        let collaborators = Collaborators {
            passwords: Arc::new(Pbkdf2PasswordHasher::new(config.password_iterations)),
            tokens: Arc::new(JwtTokenService::new(config.jwt_secret.as_bytes())),
            mailer: mailer.clone(),
            health_codes,
        };
        TestState {
            state: Arc::new(CoreState::new(config, collaborators).unwrap()),
            mailer,
            _dir: dir,
        }
    }

    pub fn test_state() -> TestState {
        build(|c| c, RecordingDispatcher::default(), Arc::new(RandomHealthCodes))
    }
}
