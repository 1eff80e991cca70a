//! Prometheus metrics for the admission webhook
//!
//! Every [`WebhookMetrics`] owns its own [`Registry`], so tests and multiple
//! servers in one process never see each other's numbers.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
    DEFAULT_BUCKETS,
};

use crate::{Error, Result};

/// Prefix of every metric name
const NAMESPACE: &str = "ndots_webhook";

/// Outcome of an admitted Pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationAction {
    /// A patch was returned
    Mutated,
    /// The Pod was admitted unchanged
    Skipped,
}

impl MutationAction {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Mutated => "mutated",
            MutationAction::Skipped => "skipped",
        }
    }
}

/// Failure categories of the admission path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request body missing or unreadable
    Read,
    /// Admission review or Pod failed to decode
    Decode,
    /// The patch failed to serialize
    Marshal,
}

impl ErrorKind {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Read => "read",
            ErrorKind::Decode => "decode",
            ErrorKind::Marshal => "marshal",
        }
    }
}

/// Webhook request metrics
///
/// - `ndots_webhook_mutations_total{namespace, action}`
/// - `ndots_webhook_errors_total{type}`
/// - `ndots_webhook_request_duration_seconds` (default Prometheus buckets)
#[derive(Debug, Clone)]
pub struct WebhookMetrics {
    registry: Registry,
    mutations: IntCounterVec,
    errors: IntCounterVec,
    duration: Histogram,
}

impl WebhookMetrics {
    /// Create the collectors and register them with a fresh registry
    pub fn new() -> Result<Self> {
        let mutations = IntCounterVec::new(
            Opts::new("mutations_total", "Total number of pod mutations processed")
                .namespace(NAMESPACE),
            &["namespace", "action"],
        )
        .map_err(metrics_error)?;

        let errors = IntCounterVec::new(
            Opts::new(
                "errors_total",
                "Total number of errors during admission processing",
            )
            .namespace(NAMESPACE),
            &["type"],
        )
        .map_err(metrics_error)?;

        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "request_duration_seconds",
                "Duration of admission requests in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(DEFAULT_BUCKETS.to_vec()),
        )
        .map_err(metrics_error)?;

        let registry = Registry::new();
        registry
            .register(Box::new(mutations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(errors.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            mutations,
            errors,
            duration,
        })
    }

    /// Record the outcome for a Pod in `namespace`
    pub fn record_mutation(&self, namespace: &str, action: MutationAction) {
        self.mutations
            .with_label_values(&[namespace, action.as_str()])
            .inc();
    }

    /// Record an admission path failure
    pub fn record_error(&self, kind: ErrorKind) {
        self.errors.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record how long a request took
    pub fn observe_request_duration(&self, elapsed: Duration) {
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Number of outcomes recorded for `namespace` and `action`
    pub fn mutations(&self, namespace: &str, action: MutationAction) -> u64 {
        self.mutations
            .with_label_values(&[namespace, action.as_str()])
            .get()
    }

    /// Number of failures recorded for `kind`
    pub fn errors(&self, kind: ErrorKind) -> u64 {
        self.errors.with_label_values(&[kind.as_str()]).get()
    }

    /// Number of requests whose duration was observed
    pub fn requests(&self) -> u64 {
        self.duration.get_sample_count()
    }

    /// Content type of [`WebhookMetrics::render`] output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Encode all metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::serialization(format!("metrics are not valid UTF-8: {e}")))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::serialization(format!("metrics: {e}"))
}
