use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use config_rs::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Application-level constants
pub const APP_NAME: &str = "HealthVault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of every environment variable read by [`AppConfig::load`].
pub const ENV_PREFIX: &str = "HEALTHVAULT";

/// Used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "healthvault=info,healthvault_lib=info,tower_http=info"
}

/// Get the application data directory: ~/HealthVault/, or the working
/// directory when no home directory can be determined.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunningEnvironment {
    #[default]
    Development,
    Production,
}

impl Display for RunningEnvironment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunningEnvironment::Development => "development",
            RunningEnvironment::Production => "production",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 20,
            per_hour: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Falls back to `username` when unset.
    #[serde(default)]
    pub from: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

/// Runtime settings, built once at startup and owned by `CoreState`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: RunningEnvironment,
    pub bind_address: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    /// Retire outstanding codes of the same purpose whenever a new one is issued.
    pub invalidate_previous_codes: bool,
    pub password_iterations: u32,
    pub max_upload_bytes: usize,
    pub cors_origin: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub smtp: Option<SmtpConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: RunningEnvironment::Development,
            bind_address: "0.0.0.0".into(),
            port: 3000,
            data_dir: default_data_dir(),
            jwt_secret: String::new(),
            token_ttl_secs: 7 * 24 * 60 * 60,
            otp_ttl_secs: 10 * 60,
            invalidate_previous_codes: false,
            password_iterations: crate::crypto::PBKDF2_ITERATIONS,
            max_upload_bytes: 10 * 1024 * 1024,
            cors_origin: None,
            rate_limit: RateLimitConfig::default(),
            smtp: None,
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with `HEALTHVAULT_*` environment variables.
    /// Nested keys use a double underscore: `HEALTHVAULT_SMTP__HOST`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_source(source: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.environment == RunningEnvironment::Production
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("healthvault.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_from(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(map)),
        )
        .unwrap()
    }

    #[test]
    fn defaults_without_environment() {
        let config = load_from(&[]);
        assert_eq!(config.environment, RunningEnvironment::Development);
        assert_eq!(config.port, 3000);
        assert_eq!(config.token_ttl_secs, 604_800);
        assert_eq!(config.otp_ttl_secs, 600);
        assert!(!config.invalidate_previous_codes);
        assert!(config.smtp.is_none());
        assert!(config.jwt_secret.is_empty());
    }

    #[test]
    fn environment_overrides_and_nesting() {
        let config = load_from(&[
            ("HEALTHVAULT_ENVIRONMENT", "production"),
            ("HEALTHVAULT_PORT", "8080"),
            ("HEALTHVAULT_JWT_SECRET", "s3cret"),
            ("HEALTHVAULT_INVALIDATE_PREVIOUS_CODES", "true"),
            ("HEALTHVAULT_RATE_LIMIT__PER_MINUTE", "5"),
            ("HEALTHVAULT_SMTP__HOST", "smtp.example.com"),
            ("HEALTHVAULT_SMTP__USERNAME", "vault@example.com"),
        ]);
        assert!(config.is_production());
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_secret, "s3cret");
        assert!(config.invalidate_previous_codes);
        assert_eq!(config.rate_limit.per_minute, 5);
        assert_eq!(config.rate_limit.per_hour, 200);
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let config = AppConfig {
            data_dir: PathBuf::from("/var/lib/hv"),
            ..AppConfig::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/hv/healthvault.db"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/var/lib/hv/uploads"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
