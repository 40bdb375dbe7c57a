//! API server lifecycle: bind, spawn a background task, return a handle
//! with a shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::core_state::CoreState;

/// Handle to a running API server.
pub struct ApiServer {
    pub local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ApiServer {
    /// Signal a graceful shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait for in-flight requests to drain after `shutdown`.
    pub async fn stopped(self) {
        if let Err(e) = self.task.await {
            tracing::error!("API server task failed: {e}");
        }
    }
}

/// Bind `addr`, mount `api_router` and serve it in a background task.
/// Handlers see the peer address through `ConnectInfo`.
pub async fn start_server(
    core: Arc<CoreState>,
    addr: impl ToSocketAddrs,
) -> std::io::Result<ApiServer> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let app = api_router(core);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%local_addr, "API server started");

        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_state::test_support::*;

    #[tokio::test]
    async fn start_and_stop_server() {
        let test = test_state();
        let mut server = start_server(test.state.clone(), "127.0.0.1:0")
            .await
            .expect("server should start");
        assert!(server.local_addr.port() > 0);

        let url = format!("http://{}/api/health", server.local_addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        server.shutdown();
        server.shutdown();
        server.stopped().await;
        assert!(reqwest::get(&url).await.is_err());
    }

    #[tokio::test]
    async fn rate_limit_keys_on_peer_address() {
        let test = build(
            |c| crate::config::AppConfig {
                rate_limit: crate::config::RateLimitConfig {
                    per_minute: 1,
                    per_hour: 10,
                },
                ..c
            },
            RecordingDispatcher::default(),
            Arc::new(crate::health_id::RandomHealthCodes),
        );
        let mut server = start_server(test.state.clone(), "127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api/auth/login", server.local_addr);
        let client = reqwest::Client::new();
        let body = serde_json::json!({"email": "a@x.com", "password": "password123"});

        let first = client.post(&url).json(&body).send().await.unwrap();
        assert_eq!(first.status(), 401);
        let second = client.post(&url).json(&body).send().await.unwrap();
        assert_eq!(second.status(), 429);
        assert!(second.headers().contains_key("retry-after"));

        server.shutdown();
        server.stopped().await;
    }
}
