// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Main server implementation

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, routing::get};
use kasca_recorder::FinalizeReason;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handlers;
use crate::state::AppState;
use crate::transport;
use crate::watchdog;

/// WebSocket recording server
pub struct Server {
    config: ServerConfig,
    state: AppState,
    app: Router,
}

impl Server {
    /// Create a new server instance
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let state = AppState::new(config.clone());
        Self::with_state(config, state).await
    }

    /// Construct a server from an already-built app state
    pub async fn with_state(config: ServerConfig, state: AppState) -> ServerResult<Self> {
        state.recordings.store().ensure_dir().await?;
        let app = Self::build_app(state.clone());
        Ok(Self { config, state, app })
    }

    /// Build the Axum application with routes and middleware
    fn build_app(state: AppState) -> Router {
        Router::new()
            .route("/ws/keyboard", get(transport::keyboard_ws))
            .route("/ws/control", get(transport::control_ws))
            .route("/healthz", get(handlers::health::health_check))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until Ctrl-C
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ctrl_c()).await
    }

    /// Run the server until `shutdown` resolves, then finalize every active
    /// recording.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %listener.local_addr()?,
            recordings_dir = %self.config.recordings_dir.display(),
            audio_finalizer = %self.config.audio_finalizer,
            "Starting server"
        );

        let watchdog = watchdog::spawn_idle_watchdog(self.state.clone());

        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Internal(format!("WebSocket server error: {err}")));

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let finalized = self.state.recordings.finalize_all(FinalizeReason::Shutdown).await;
        for done in &finalized {
            self.state.announce_stopped(done).await;
        }
        info!(finalized = finalized.len(), "Server stopped");

        served
    }

    /// Get the bind address
    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(err) => {
            warn!(error = %err, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
