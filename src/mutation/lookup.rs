//! Namespace annotation lookup
//!
//! The engine needs the annotations of the namespace a Pod is created in. This
//! trait lets the webhook read them from the cluster while tests (and
//! processes without cluster access) supply them from memory.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Annotations of a single namespace
pub type Annotations = BTreeMap<String, String>;

/// Reads the annotations of a namespace
///
/// `Ok(None)` means the namespace has no annotations (or does not exist).
/// Errors are transport failures; the engine treats them as "no annotations".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamespaceLookup: Send + Sync {
    /// Fetch the annotations of `namespace`
    async fn annotations(&self, namespace: &str) -> Result<Option<Annotations>>;
}

/// Reads namespace annotations from the Kubernetes API
#[derive(Clone)]
pub struct KubeNamespaceLookup {
    api: Api<Namespace>,
    timeout: Duration,
}

impl KubeNamespaceLookup {
    /// Create a lookup bounded by `timeout` per request
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            api: Api::all(client),
            timeout,
        }
    }
}

#[async_trait]
impl NamespaceLookup for KubeNamespaceLookup {
    async fn annotations(&self, namespace: &str) -> Result<Option<Annotations>> {
        let ns = tokio::time::timeout(self.timeout, self.api.get_opt(namespace))
            .await
            .map_err(|_| {
                Error::namespace_lookup(namespace, format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| Error::namespace_lookup(namespace, e.to_string()))?;

        Ok(ns.and_then(|ns| ns.metadata.annotations))
    }
}

/// In-memory namespace annotations
#[derive(Debug, Clone, Default)]
pub struct StaticNamespaceLookup {
    namespaces: BTreeMap<String, Annotations>,
}

impl StaticNamespaceLookup {
    /// Create a lookup with no namespaces
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the annotations of a namespace
    pub fn with_namespace<K, V>(
        mut self,
        namespace: impl Into<String>,
        annotations: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.namespaces.insert(
            namespace.into(),
            annotations
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

#[async_trait]
impl NamespaceLookup for StaticNamespaceLookup {
    async fn annotations(&self, namespace: &str) -> Result<Option<Annotations>> {
        Ok(self.namespaces.get(namespace).cloned())
    }
}
