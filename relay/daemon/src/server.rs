//! Daemon Server Implementation
//!
//! This module provides the HTTP side of the relay daemon:
//! - Builds the router, CORS and request tracing layers
//! - Runs the registry sweeper next to the listener
//! - Shuts down gracefully when the relay's shutdown token fires
//!
//! ```text
//!            RelayServer
//!                 │
//!      ┌──────────┼──────────────┐
//!      │          │              │
//!   axum::serve  sweeper    signal task
//!      │          │              │
//!      └──── Relay (registry, catalog, shutdown token)
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use relay_core::{ProviderCatalog, Relay, RelayConfig, RunRegistry};

use crate::handlers;

/// Shared state handed to every handler
#[derive(Clone, Debug)]
pub struct AppState {
    /// The relay sessions are opened on
    pub relay: Relay,
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/test/run", post(handlers::submit_run))
        .route("/api/test/stream/{run_id}", get(handlers::stream_run))
        .route("/api/models", get(handlers::list_models))
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Permissive CORS for browser clients on any origin
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Periodically evict unclaimed runs until `shutdown` fires
pub fn spawn_registry_sweeper(
    registry: RunRegistry,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.sweep_expired();
                    if evicted > 0 {
                        info!(evicted, pending = registry.len(), "Evicted expired runs");
                    }
                }
            }
        }
        debug!("Registry sweeper stopped");
    })
}

/// Resolves on SIGINT, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// The relay daemon: configuration plus the relay it serves
pub struct RelayServer {
    config: RelayConfig,
    relay: Relay,
}

impl RelayServer {
    /// Build registry, providers and relay from configuration
    ///
    /// # Errors
    ///
    /// Fails if a provider client cannot be constructed.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let catalog =
            ProviderCatalog::from_config(&config).context("Failed to set up provider clients")?;
        let registry = RunRegistry::new(config.run_ttl);
        let relay = Relay::new(registry, catalog, config.relay.clone());
        Ok(Self { config, relay })
    }

    /// The relay handlers open sessions on
    #[must_use]
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Bind the configured listen address
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr();
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))
    }

    /// Serve HTTP on `listener` until the relay shuts down
    ///
    /// # Errors
    ///
    /// Fails if the server stops for any reason other than shutdown.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let shutdown = self.relay.shutdown_token();
        let sweeper = spawn_registry_sweeper(
            self.relay.registry().clone(),
            self.config.sweep_interval,
            shutdown.clone(),
        );

        let addr = listener.local_addr().context("Listener has no local address")?;
        info!(%addr, ttl_secs = self.config.run_ttl.as_secs(), "Relay daemon listening");

        let app = router(AppState { relay: self.relay });
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("HTTP server failed")?;

        if let Err(e) = sweeper.await {
            warn!(error = %e, "Registry sweeper panicked");
        }
        info!("Relay daemon stopped");
        Ok(())
    }
}
