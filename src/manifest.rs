//! MutatingWebhookConfiguration generation
//!
//! Renders the registration that points the API server at this webhook, so a
//! deployment can `ndots-webhook manifest ... | kubectl apply -f -`.

use std::path::PathBuf;

use clap::Args;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;

use crate::mutation::NamespaceFilter;
use crate::{Error, Result};

/// Name of the MutatingWebhookConfiguration object
pub const CONFIGURATION_NAME: &str = "ndots-webhook";

/// Fully qualified webhook name
pub const WEBHOOK_NAME: &str = "ndots.webhook.k8s.io";

/// Label the API server sets on every Namespace to its own name
pub const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

/// Path of the admission endpoint
pub const MUTATE_PATH: &str = "/mutate";

/// Options for the generated manifest
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ManifestOptions {
    /// Name of the Service fronting the webhook Pods
    #[arg(long, default_value = "ndots-webhook")]
    pub service_name: String,

    /// Namespace of the Service fronting the webhook Pods
    #[arg(long, default_value = "default")]
    pub service_namespace: String,

    /// Service port the API server connects to
    #[arg(long, default_value_t = 443)]
    pub service_port: i32,

    /// PEM CA bundle the API server uses to verify the webhook certificate
    #[arg(long)]
    pub ca_bundle_path: Option<PathBuf>,
}

/// Build the webhook registration
///
/// Namespaces the filter excludes are dropped by the API server before a
/// request is even sent, in addition to the webhook's own filtering.
pub fn webhook_configuration(
    options: &ManifestOptions,
    ca_bundle: Option<Vec<u8>>,
    filter: &NamespaceFilter,
) -> MutatingWebhookConfiguration {
    let excluded: Vec<String> = filter.excluded().map(str::to_string).collect();
    let namespace_selector = (!excluded.is_empty()).then(|| LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: NAMESPACE_NAME_LABEL.to_string(),
            operator: "NotIn".to_string(),
            values: Some(excluded),
        }]),
        ..Default::default()
    });

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(CONFIGURATION_NAME.to_string()),
            ..Default::default()
        },
        webhooks: Some(vec![MutatingWebhook {
            name: WEBHOOK_NAME.to_string(),
            admission_review_versions: vec!["v1".to_string()],
            side_effects: "None".to_string(),
            failure_policy: Some("Ignore".to_string()),
            match_policy: Some("Equivalent".to_string()),
            reinvocation_policy: Some("Never".to_string()),
            timeout_seconds: Some(10),
            rules: Some(vec![RuleWithOperations {
                operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
                api_groups: Some(vec![String::new()]),
                api_versions: Some(vec!["v1".to_string()]),
                resources: Some(vec!["pods".to_string()]),
                scope: Some("Namespaced".to_string()),
            }]),
            client_config: WebhookClientConfig {
                service: Some(ServiceReference {
                    name: options.service_name.clone(),
                    namespace: options.service_namespace.clone(),
                    path: Some(MUTATE_PATH.to_string()),
                    port: Some(options.service_port),
                }),
                ca_bundle: ca_bundle.map(ByteString),
                ..Default::default()
            },
            namespace_selector,
            ..Default::default()
        }]),
    }
}

/// Render the webhook registration as YAML, reading the CA bundle if given
pub fn render(options: &ManifestOptions, filter: &NamespaceFilter) -> Result<String> {
    let ca_bundle = options
        .ca_bundle_path
        .as_ref()
        .map(|path| {
            std::fs::read(path).map_err(|e| {
                Error::config(format!("failed to read CA bundle {}: {e}", path.display()))
            })
        })
        .transpose()?;

    let config = webhook_configuration(options, ca_bundle, filter);
    serde_yaml::to_string(&config).map_err(|e| {
        Error::serialization(format!("failed to serialize webhook configuration: {e}"))
    })
}
