use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use ttyrelay_terminal::SessionRegistry;

use crate::web::routes::{self, AppState};

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub bind_addr: SocketAddr,
}

/// Web server instance
pub struct WebServer {
    config: WebServerConfig,
    registry: Arc<SessionRegistry>,
}

impl WebServer {
    pub fn new(config: WebServerConfig, registry: Arc<SessionRegistry>) -> Self {
        Self { config, registry }
    }

    /// The full application: routes plus CORS and request tracing.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
        };

        // Allow renderers served from any origin
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        routes::create_router(state)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until Ctrl-C, then close every session.
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_addr))?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("listening on http://{addr}");
        info!("   polling: POST http://{addr}/open, /io-<key>, /close-<key>");
        info!("   WebSocket: ws://{addr}/ws");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        let registry = Arc::clone(&self.registry);
        info!(sessions = registry.len(), "shutting down");
        tokio::task::spawn_blocking(move || registry.close_all()).await?;
        Ok(())
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
