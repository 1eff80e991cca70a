//! Webhook and metrics servers
//!
//! The admission webhook is served over TLS (the API server refuses plain
//! HTTP webhooks); Prometheus metrics are served over plain HTTP on a separate
//! port. Both shut down gracefully on SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;
use crate::metrics::WebhookMetrics;
use crate::webhook::{webhook_router, WebhookState};
use crate::{Error, Result};

/// Time in-flight requests get to finish after a shutdown signal
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address of the TLS admission webhook
    pub webhook_addr: SocketAddr,
    /// Address of the plain HTTP metrics endpoint
    pub metrics_addr: SocketAddr,
    /// PEM certificate chain
    pub tls_cert_path: PathBuf,
    /// PEM private key
    pub tls_key_path: PathBuf,
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            webhook_addr: SocketAddr::from(([0, 0, 0, 0], config.port)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], config.metrics_port)),
            tls_cert_path: config.tls_cert_path.clone(),
            tls_key_path: config.tls_key_path.clone(),
        }
    }
}

/// Create the metrics router
pub fn metrics_router(metrics: Arc<WebhookMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<WebhookMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => ([(CONTENT_TYPE, metrics.content_type())], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Run both servers until a shutdown signal arrives
pub async fn run(config: ServerConfig, state: Arc<WebhookState>) -> Result<()> {
    let tls_config = RustlsConfig::from_pem_file(&config.tls_cert_path, &config.tls_key_path)
        .await
        .map_err(|e| {
            Error::server(
                "tls",
                format!(
                    "failed to load {} / {}: {e}",
                    config.tls_cert_path.display(),
                    config.tls_key_path.display()
                ),
            )
        })?;

    let metrics_app = metrics_router(state.metrics.clone());
    let webhook_app = webhook_router(state);

    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_addr)
        .await
        .map_err(|e| {
            Error::server(
                "metrics",
                format!("failed to bind {}: {e}", config.metrics_addr),
            )
        })?;

    let handle = Handle::new();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutting down servers...");
        signal_handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
        let _ = shutdown_tx.send(true);
    });

    info!(addr = %config.metrics_addr, "starting metrics server");
    let metrics_server = async move {
        axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await
            .map_err(|e| Error::server("metrics", e.to_string()))
    };

    info!(addr = %config.webhook_addr, "starting webhook server");
    let webhook_server = async move {
        axum_server::bind_rustls(config.webhook_addr, tls_config)
            .handle(handle)
            .serve(webhook_app.into_make_service())
            .await
            .map_err(|e| Error::server("webhook", e.to_string()))
    };

    tokio::try_join!(webhook_server, metrics_server)?;
    info!("servers stopped");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
