//! Mutation decision engine
//!
//! Runs the namespace filter, the annotation policy and the patch builder in
//! sequence for one Pod. The engine only holds immutable configuration, so a
//! single instance can serve any number of concurrent admission requests.

use std::collections::{BTreeMap, BTreeSet};

use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, error};

use super::annotation::{AnnotationMode, AnnotationPolicy, DEFAULT_ANNOTATION_KEY};
use super::lookup::NamespaceLookup;
use super::namespace::NamespaceFilter;
use super::patch::{DnsOption, PatchBuilder};
use crate::{Error, Result, DEFAULT_EXCLUDED_NAMESPACES, MAX_NDOTS};

/// The parts of a Pod the engine looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodDescriptor {
    /// Namespace the Pod is admitted into
    pub namespace: String,
    /// Pod name (or generateName prefix when the name is not yet assigned)
    pub name: String,
    /// Pod annotations
    pub annotations: Option<BTreeMap<String, String>>,
    /// `spec.dnsConfig.options`; `None` when the Pod has no `dnsConfig`
    pub dns_options: Option<Vec<DnsOption>>,
}

impl PodDescriptor {
    /// Build a descriptor from a decoded Pod
    ///
    /// `request_namespace` is the namespace from the admission request, which
    /// is authoritative when the Pod object itself does not carry one yet.
    pub fn from_pod(pod: &Pod, request_namespace: Option<&str>) -> Self {
        let namespace = request_namespace
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .or_else(|| pod.metadata.namespace.clone())
            .unwrap_or_default();

        let name = pod
            .metadata
            .name
            .clone()
            .or_else(|| pod.metadata.generate_name.clone())
            .unwrap_or_default();

        let dns_options = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.dns_config.as_ref())
            .map(|dns| {
                dns.options
                    .iter()
                    .flatten()
                    .map(|o| DnsOption {
                        name: o.name.clone().unwrap_or_default(),
                        value: o.value.clone(),
                    })
                    .collect()
            });

        Self {
            namespace,
            name,
            annotations: pod.metadata.annotations.clone(),
            dns_options,
        }
    }
}

/// Immutable engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Desired ndots value (0-15)
    pub ndots: u8,
    /// Annotation key consulted on Pods and Namespaces
    pub annotation_key: String,
    /// Default mode when no annotation decides
    pub mode: AnnotationMode,
    /// If non-empty, only these namespaces are mutated
    pub namespace_include: BTreeSet<String>,
    /// Namespaces never mutated
    pub namespace_exclude: BTreeSet<String>,
}

impl EngineConfig {
    /// Check the configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.ndots > MAX_NDOTS {
            return Err(Error::config(format!(
                "ndotsValue must be between 0 and {MAX_NDOTS} (got {})",
                self.ndots
            )));
        }
        if self.annotation_key.trim().is_empty() {
            return Err(Error::config("annotationKey must not be empty"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ndots: 2,
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
            mode: AnnotationMode::default(),
            namespace_include: BTreeSet::new(),
            namespace_exclude: DEFAULT_EXCLUDED_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .collect(),
        }
    }
}

/// Decides, per Pod, which JSON Patch (if any) to apply
#[derive(Debug, Clone)]
pub struct MutationEngine {
    namespace_filter: NamespaceFilter,
    annotation_policy: AnnotationPolicy,
    patch_builder: PatchBuilder,
}

impl MutationEngine {
    /// Create an engine from validated configuration
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            namespace_filter: NamespaceFilter::new(
                config.namespace_include.iter().cloned(),
                config.namespace_exclude.iter().cloned(),
            ),
            annotation_policy: AnnotationPolicy::new(config.annotation_key.clone(), config.mode),
            patch_builder: PatchBuilder::new(config.ndots.to_string()),
        })
    }

    /// Namespace filter in use
    pub fn namespace_filter(&self) -> &NamespaceFilter {
        &self.namespace_filter
    }

    /// Decide the patch for one Pod
    ///
    /// Returns an empty list when the Pod must be left alone. A failing
    /// namespace lookup is logged and treated as a namespace without
    /// annotations.
    pub async fn decide(
        &self,
        pod: &PodDescriptor,
        lookup: &dyn NamespaceLookup,
    ) -> Vec<PatchOperation> {
        if !self.namespace_filter.decide(&pod.namespace) {
            debug!(
                namespace = %pod.namespace,
                name = %pod.name,
                "skipping mutation due to namespace filter"
            );
            return Vec::new();
        }

        let namespace_annotations = match lookup.annotations(&pod.namespace).await {
            Ok(annotations) => annotations,
            Err(e) => {
                error!(
                    namespace = %pod.namespace,
                    error = %e,
                    "failed to get namespace, continuing without namespace annotations"
                );
                None
            }
        };

        if !self
            .annotation_policy
            .evaluate(pod.annotations.as_ref(), namespace_annotations.as_ref())
        {
            debug!(
                namespace = %pod.namespace,
                name = %pod.name,
                "skipping mutation due to annotation"
            );
            return Vec::new();
        }

        self.patch_builder
            .build(pod.dns_options.as_deref())
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::lookup::{MockNamespaceLookup, StaticNamespaceLookup};
    use k8s_openapi::api::core::v1::{PodDNSConfig, PodDNSConfigOption, PodSpec};
    use kube::api::ObjectMeta;
    use serde_json::{json, Value};

    const KEY: &str = "change-ndots";

    fn engine(mode: AnnotationMode) -> MutationEngine {
        MutationEngine::new(&EngineConfig {
            mode,
            ..Default::default()
        })
        .unwrap()
    }

    fn pod(namespace: &str) -> PodDescriptor {
        PodDescriptor {
            namespace: namespace.to_string(),
            name: "web-0".to_string(),
            annotations: None,
            dns_options: None,
        }
    }

    fn annotated(mut pod: PodDescriptor, value: &str) -> PodDescriptor {
        pod.annotations = Some(BTreeMap::from([(KEY.to_string(), value.to_string())]));
        pod
    }

    fn to_json(ops: &[PatchOperation]) -> Value {
        serde_json::to_value(ops).unwrap()
    }

    fn failing_lookup() -> MockNamespaceLookup {
        let mut lookup = MockNamespaceLookup::new();
        lookup
            .expect_annotations()
            .returning(|ns| Err(Error::namespace_lookup(ns, "connection refused")));
        lookup
    }

    // =========================================================================
    // Unit Tests
    // =========================================================================

    #[test]
    fn test_config_rejects_out_of_range_ndots() {
        let config = EngineConfig {
            ndots: 16,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(MutationEngine::new(&config).is_err());
    }

    #[test]
    fn test_config_rejects_empty_key() {
        let config = EngineConfig {
            annotation_key: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_excludes_system_namespaces() {
        let engine = MutationEngine::new(&EngineConfig::default()).unwrap();
        assert!(!engine.namespace_filter().decide("kube-system"));
        assert!(engine.namespace_filter().decide("default"));
    }

    #[test]
    fn test_descriptor_from_pod_prefers_request_namespace() {
        let pod = Pod {
            metadata: ObjectMeta {
                generate_name: Some("web-".to_string()),
                namespace: Some("from-object".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let desc = PodDescriptor::from_pod(&pod, Some("from-request"));
        assert_eq!(desc.namespace, "from-request");
        assert_eq!(desc.name, "web-");
        assert!(desc.dns_options.is_none());

        let desc = PodDescriptor::from_pod(&pod, Some(""));
        assert_eq!(desc.namespace, "from-object");
    }

    #[test]
    fn test_descriptor_dns_states() {
        let with_dns = |dns: Option<PodDNSConfig>| Pod {
            spec: Some(PodSpec {
                dns_config: dns,
                ..Default::default()
            }),
            ..Default::default()
        };

        let desc = PodDescriptor::from_pod(&with_dns(None), None);
        assert_eq!(desc.dns_options, None);

        let desc = PodDescriptor::from_pod(&with_dns(Some(PodDNSConfig::default())), None);
        assert_eq!(desc.dns_options, Some(vec![]));

        let desc = PodDescriptor::from_pod(
            &with_dns(Some(PodDNSConfig {
                options: Some(vec![PodDNSConfigOption {
                    name: Some("ndots".to_string()),
                    value: Some("5".to_string()),
                }]),
                ..Default::default()
            })),
            None,
        );
        assert_eq!(desc.dns_options, Some(vec![DnsOption::new("ndots", "5")]));
    }

    #[tokio::test]
    async fn test_excluded_namespace_skips_lookup() {
        let mut lookup = MockNamespaceLookup::new();
        lookup.expect_annotations().never();

        let ops = engine(AnnotationMode::Always)
            .decide(&pod("kube-system"), &lookup)
            .await;
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_degrades_to_no_annotations() {
        let ops = engine(AnnotationMode::OptOut)
            .decide(&pod("default"), &failing_lookup())
            .await;
        assert_eq!(ops.len(), 1);

        let ops = engine(AnnotationMode::OptIn)
            .decide(&pod("default"), &failing_lookup())
            .await;
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_receives_pod_namespace() {
        let mut lookup = MockNamespaceLookup::new();
        lookup
            .expect_annotations()
            .withf(|ns| ns == "payments")
            .times(1)
            .returning(|_| Ok(None));

        engine(AnnotationMode::OptOut)
            .decide(&pod("payments"), &lookup)
            .await;
    }

    #[tokio::test]
    async fn test_namespace_annotation_opts_in() {
        let lookup = StaticNamespaceLookup::new().with_namespace("team", [(KEY, "true")]);
        let ops = engine(AnnotationMode::OptIn).decide(&pod("team"), &lookup).await;
        assert_eq!(ops.len(), 1);
    }

    // =========================================================================
    // Story Tests
    // =========================================================================

    /// Story: a Pod with no DNS config in an unannotated namespace gets one
    #[tokio::test]
    async fn story_fresh_pod_gets_dns_config() {
        let ops = engine(AnnotationMode::OptOut)
            .decide(&pod("default"), &StaticNamespaceLookup::new())
            .await;

        assert_eq!(
            to_json(&ops),
            json!([{
                "op": "add",
                "path": "/spec/dnsConfig",
                "value": {"options": [{"name": "ndots", "value": "2"}]}
            }])
        );
    }

    /// Story: a Pod opting in overrides its namespace opting out
    #[tokio::test]
    async fn story_pod_opt_in_beats_namespace_opt_out() {
        let lookup = StaticNamespaceLookup::new().with_namespace("team", [(KEY, "false")]);
        let mut desc = annotated(pod("team"), "true");
        desc.dns_options = Some(vec![]);

        let ops = engine(AnnotationMode::OptIn).decide(&desc, &lookup).await;
        assert_eq!(
            to_json(&ops),
            json!([{
                "op": "add",
                "path": "/spec/dnsConfig/options",
                "value": [{"name": "ndots", "value": "2"}]
            }])
        );
    }

    /// Story: a Pod opting out overrides its namespace opting in
    #[tokio::test]
    async fn story_pod_opt_out_beats_namespace_opt_in() {
        let lookup = StaticNamespaceLookup::new().with_namespace("team", [(KEY, "true")]);
        let ops = engine(AnnotationMode::OptOut)
            .decide(&annotated(pod("team"), "false"), &lookup)
            .await;
        assert!(ops.is_empty());
    }

    /// Story: an existing different ndots is replaced in place
    #[tokio::test]
    async fn story_existing_ndots_is_corrected() {
        let mut desc = pod("default");
        desc.dns_options = Some(vec![DnsOption::new("ndots", "5")]);

        let ops = engine(AnnotationMode::OptOut)
            .decide(&desc, &StaticNamespaceLookup::new())
            .await;
        assert_eq!(
            to_json(&ops),
            json!([{"op": "replace", "path": "/spec/dnsConfig/options/0/value", "value": "2"}])
        );
    }

    /// Story: a Pod already at the desired value is left alone
    #[tokio::test]
    async fn story_converged_pod_is_untouched() {
        let mut desc = pod("default");
        desc.dns_options = Some(vec![DnsOption::new("ndots", "2")]);

        let ops = engine(AnnotationMode::Always)
            .decide(&desc, &StaticNamespaceLookup::new())
            .await;
        assert!(ops.is_empty());
    }

    /// Story: excluded namespaces are never mutated whatever the annotations say
    #[tokio::test]
    async fn story_excluded_namespace_ignores_everything() {
        let config = EngineConfig {
            mode: AnnotationMode::Always,
            namespace_exclude: BTreeSet::from(["legacy".to_string()]),
            namespace_include: BTreeSet::from(["legacy".to_string()]),
            ..Default::default()
        };
        let engine = MutationEngine::new(&config).unwrap();
        let lookup = StaticNamespaceLookup::new().with_namespace("legacy", [(KEY, "true")]);

        for desc in [pod("legacy"), annotated(pod("legacy"), "true")] {
            assert!(engine.decide(&desc, &lookup).await.is_empty());
        }
    }

    /// Story: a different ndots target is rendered as its decimal string
    #[tokio::test]
    async fn story_configured_ndots_value_is_used() {
        let engine = MutationEngine::new(&EngineConfig {
            ndots: 15,
            mode: AnnotationMode::Always,
            ..Default::default()
        })
        .unwrap();
        let mut desc = pod("default");
        desc.dns_options = Some(vec![DnsOption::new("timeout", "1")]);

        let ops = engine.decide(&desc, &StaticNamespaceLookup::new()).await;
        assert_eq!(
            to_json(&ops),
            json!([{
                "op": "add",
                "path": "/spec/dnsConfig/options/-",
                "value": {"name": "ndots", "value": "15"}
            }])
        );
    }
}
