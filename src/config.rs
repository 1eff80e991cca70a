//! Process configuration
//!
//! Every setting is a CLI flag that can also be provided through an
//! environment variable, which is how the webhook Deployment configures it.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tracing::info;

use crate::mutation::{AnnotationMode, EngineConfig, DEFAULT_ANNOTATION_KEY};
use crate::telemetry::{LogConfig, LogFormat};
use crate::{Error, Result, DEFAULT_METRICS_PORT, DEFAULT_WEBHOOK_PORT, MAX_NDOTS};

/// Webhook server and policy configuration
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTPS port for the admission webhook
    #[arg(long, env = "PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    pub port: u16,

    /// ndots value injected into Pods (0-15)
    #[arg(long, env = "NDOTS_VALUE", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(0..=i64::from(MAX_NDOTS)))]
    pub ndots_value: u8,

    /// Annotation key read from Pods and Namespaces
    #[arg(long, env = "ANNOTATION_KEY", default_value = DEFAULT_ANNOTATION_KEY)]
    pub annotation_key: String,

    /// Default behaviour when no annotation decides: always, opt-in or opt-out
    #[arg(long, env = "ANNOTATION_MODE", default_value = "opt-out")]
    pub annotation_mode: AnnotationMode,

    /// Only mutate Pods in these namespaces (comma-separated; empty means all)
    #[arg(long, env = "NAMESPACE_INCLUDE", value_delimiter = ',')]
    pub namespace_include: Vec<String>,

    /// Never mutate Pods in these namespaces (comma-separated)
    #[arg(
        long,
        env = "NAMESPACE_EXCLUDE",
        value_delimiter = ',',
        default_value = "kube-system,kube-public,kube-node-lease"
    )]
    pub namespace_exclude: Vec<String>,

    /// TLS certificate served by the webhook
    #[arg(long, env = "TLS_CERT_PATH", default_value = "/certs/tls.crt")]
    pub tls_cert_path: PathBuf,

    /// TLS private key served by the webhook
    #[arg(long, env = "TLS_KEY_PATH", default_value = "/certs/tls.key")]
    pub tls_key_path: PathBuf,

    /// Upper bound in seconds for Kubernetes API calls made while admitting a Pod
    #[arg(long, env = "TIMEOUT_SECONDS", default_value_t = 10)]
    pub timeout_seconds: u64,

    /// Log level: debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    /// Plain HTTP port serving Prometheus metrics
    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_WEBHOOK_PORT,
            ndots_value: 2,
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
            annotation_mode: AnnotationMode::OptOut,
            namespace_include: Vec::new(),
            namespace_exclude: crate::DEFAULT_EXCLUDED_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .collect(),
            tls_cert_path: PathBuf::from("/certs/tls.crt"),
            tls_key_path: PathBuf::from("/certs/tls.key"),
            timeout_seconds: 10,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl Config {
    /// Check invariants that flag parsing alone does not enforce
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port must be between 1 and 65535"));
        }
        if self.metrics_port == 0 {
            return Err(Error::config("metricsPort must be between 1 and 65535"));
        }
        if self.tls_cert_path.as_os_str().is_empty() {
            return Err(Error::config("tlsCertPath is required"));
        }
        if self.tls_key_path.as_os_str().is_empty() {
            return Err(Error::config("tlsKeyPath is required"));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::config("timeout must be greater than zero"));
        }
        self.engine_config().validate()
    }

    /// Configuration for the mutation engine
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ndots: self.ndots_value,
            annotation_key: self.annotation_key.trim().to_string(),
            mode: self.annotation_mode,
            namespace_include: normalize_namespaces(&self.namespace_include),
            namespace_exclude: normalize_namespaces(&self.namespace_exclude),
        }
    }

    /// Configuration for log output
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }

    /// Timeout applied to Kubernetes API calls
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Log the effective configuration as structured fields
    pub fn log(&self) {
        info!(
            ndots_value = self.ndots_value,
            annotation_key = %self.annotation_key,
            annotation_mode = %self.annotation_mode,
            namespace_include = ?self.namespace_include,
            namespace_exclude = ?self.namespace_exclude,
            port = self.port,
            tls_cert_path = %self.tls_cert_path.display(),
            tls_key_path = %self.tls_key_path.display(),
            timeout_seconds = self.timeout_seconds,
            log_level = %self.log_level,
            log_format = ?self.log_format,
            metrics_port = self.metrics_port,
            "loaded configuration"
        );
    }
}

/// Trim names and drop empty entries
fn normalize_namespaces(names: &[String]) -> BTreeSet<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}
