//! ndots-webhook - Kubernetes mutating admission webhook for Pod DNS tuning
//!
//! Intercepts Pod CREATE/UPDATE admission reviews and converges the Pod's
//! `spec.dnsConfig.options` so that it carries an `ndots` entry with the
//! configured value. The decision of whether to mutate a Pod at all is made by
//! the [`mutation::MutationEngine`]:
//!
//! ```text
//! NamespaceFilter  ──deny──▶ no patch
//!       │ allow
//! AnnotationPolicy ──false─▶ no patch
//!       │ true
//! PatchBuilder     ──────▶ zero or one JSON Patch operation
//! ```
//!
//! Once the Pod itself has been decoded, everything around the engine is
//! fail-open: a Pod is never blocked because its DNS options could not be
//! tuned.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod mutation;
pub mod server;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port for the HTTPS admission webhook server
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Default port for the plain HTTP metrics server
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Name of the DNS resolver option managed by the webhook
pub const NDOTS_OPTION: &str = "ndots";

/// Largest ndots value accepted by the resolver
pub const MAX_NDOTS: u8 = 15;

/// Namespaces excluded from mutation unless configured otherwise
pub const DEFAULT_EXCLUDED_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease"];
