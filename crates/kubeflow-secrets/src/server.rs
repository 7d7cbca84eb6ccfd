//! HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::audit::audit_requests;
use crate::handlers::{
    create_secret, delete_secret, get_secret, healthz, list_namespaces, list_secrets,
    method_not_allowed, not_found, secret_events, secret_yaml, update_secret,
};
use crate::scope::RequestScoper;
use crate::secret::SecretTypePolicy;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Largest accepted request body
    pub max_payload_bytes: usize,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Identity, namespace and impersonation pipeline
    pub scoper: Arc<RequestScoper>,
    /// Secret types callers may create
    pub policy: Arc<SecretTypePolicy>,
}

impl FromRef<AppState> for Arc<RequestScoper> {
    fn from_ref(state: &AppState) -> Self {
        state.scoper.clone()
    }
}

impl FromRef<AppState> for Arc<SecretTypePolicy> {
    fn from_ref(state: &AppState) -> Self {
        state.policy.clone()
    }
}

/// Build the gateway router
pub fn router(state: AppState, max_payload_bytes: usize) -> Router {
    let user_header = state.scoper.extractor().user_header().clone();

    Router::new()
        .route("/healthz", get(healthz).fallback(method_not_allowed))
        .route(
            "/api/namespaces",
            get(list_namespaces).fallback(method_not_allowed),
        )
        .route(
            "/api/secrets",
            get(list_secrets)
                .post(create_secret)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/secrets/{name}",
            get(get_secret)
                .put(update_secret)
                .delete(delete_secret)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/secrets/{name}/events",
            get(secret_events).fallback(method_not_allowed),
        )
        .route(
            "/api/secrets/{name}/yaml",
            get(secret_yaml).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_payload_bytes))
        .layer(middleware::from_fn_with_state(user_header, audit_requests))
        .with_state(state)
}

/// Serve until SIGTERM or Ctrl-C
pub async fn start_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state, config.max_payload_bytes);

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(addr = %config.addr, "Starting secrets gateway");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("Secrets gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(?err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
