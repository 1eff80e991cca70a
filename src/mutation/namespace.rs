//! Namespace include/exclude filtering

use std::collections::BTreeSet;

use tracing::debug;

/// Decides whether Pods in a namespace are eligible for mutation.
///
/// Exclusion always wins: a namespace listed in both sets is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl NamespaceFilter {
    /// Create a filter from include and exclude namespace names
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if Pods in `namespace` may be mutated
    pub fn decide(&self, namespace: &str) -> bool {
        if self.exclude.contains(namespace) {
            debug!(namespace = %namespace, "namespace excluded");
            return false;
        }

        if !self.include.is_empty() {
            let allowed = self.include.contains(namespace);
            if !allowed {
                debug!(namespace = %namespace, "namespace not in include list");
            }
            return allowed;
        }

        true
    }

    /// Namespaces that are always denied
    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(String::as_str)
    }
}
