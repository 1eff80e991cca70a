//! Mutating Admission Webhook for Pod DNS options
//!
//! Receives Pod admission reviews from the API server and answers with the
//! JSON Patch chosen by the [`MutationEngine`]. Health endpoints are served
//! from the same router so that kubelet probes exercise the TLS listener.

pub mod pod;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::metrics::WebhookMetrics;
use crate::mutation::{MutationEngine, NamespaceLookup};

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Policy deciding what to patch
    pub engine: Arc<MutationEngine>,
    /// Source of namespace annotations
    pub lookup: Arc<dyn NamespaceLookup>,
    /// Request metrics
    pub metrics: Arc<WebhookMetrics>,
}

impl WebhookState {
    /// Create a new webhook state
    pub fn new(
        engine: MutationEngine,
        lookup: Arc<dyn NamespaceLookup>,
        metrics: Arc<WebhookMetrics>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            lookup,
            metrics,
        }
    }
}

/// Create the webhook router
///
/// - POST /mutate - Pod admission reviews
/// - GET /healthz, /readyz - probes
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(pod::mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .with_state(state)
}
