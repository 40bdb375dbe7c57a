pub mod account; // Registration, verification, login
pub mod api; // HTTP router, middleware, server
pub mod config;
pub mod core_state; // Shared state + collaborators
pub mod crypto;
pub mod db;
pub mod emergency; // Emergency profile + public card
pub mod health_id; // Health code generation + QR
pub mod models;
pub mod notifier; // Verification email
pub mod records; // Medical record catalog + uploads
pub mod reminders;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core_state::{Collaborators, CoreError, CoreState};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] config_rs::ConfigError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Load configuration, open the store and serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        environment = %config.environment,
        data_dir = %config.data_dir.display(),
        "{} starting v{}",
        config::APP_NAME,
        config::APP_VERSION
    );

    let collaborators = Collaborators::from_config(&config)?;
    let addr = config.socket_address();
    let core = Arc::new(CoreState::new(config, collaborators)?);

    let bound = api::start_server(core, addr.as_str()).await;
    let mut server = bound.map_err(|source| StartupError::Bind { addr, source })?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}
