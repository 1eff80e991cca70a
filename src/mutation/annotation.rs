//! Annotation-driven mutation policy
//!
//! Resolves whether a Pod should be mutated from two annotation sources and a
//! process-wide default mode. Precedence, highest first:
//!
//! 1. the Pod's own annotation
//! 2. the Pod's namespace annotation
//! 3. the configured [`AnnotationMode`]
//!
//! An annotation whose value is not a boolean literal counts as unset and
//! falls through to the next tier.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Default annotation key consulted on Pods and Namespaces
pub const DEFAULT_ANNOTATION_KEY: &str = "change-ndots";

/// Process-wide default applied when no annotation expresses an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationMode {
    /// Mutate every Pod; annotations are ignored
    Always,
    /// Mutate only Pods that (directly or via their namespace) ask for it
    OptIn,
    /// Mutate every Pod unless it (directly or via its namespace) opts out
    #[default]
    OptOut,
}

impl AnnotationMode {
    /// The configuration spelling of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationMode::Always => "always",
            AnnotationMode::OptIn => "opt-in",
            AnnotationMode::OptOut => "opt-out",
        }
    }
}

impl fmt::Display for AnnotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(AnnotationMode::Always),
            "opt-in" => Ok(AnnotationMode::OptIn),
            "opt-out" => Ok(AnnotationMode::OptOut),
            other => Err(Error::config(format!(
                "annotationMode must be 'always', 'opt-in', or 'opt-out' (got '{other}')"
            ))),
        }
    }
}

/// Parsed intent of a single annotation source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    /// Annotation explicitly asks for mutation
    True,
    /// Annotation explicitly refuses mutation
    False,
    /// Annotation absent, or its value is not a boolean literal
    Neutral,
}

impl TriState {
    /// Parse an annotation value as a boolean literal
    ///
    /// Accepts `1`, `t`, `true` and `0`, `f`, `false` in any letter case.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => TriState::True,
            "0" | "f" | "false" => TriState::False,
            _ => TriState::Neutral,
        }
    }

    /// The definite boolean, if any
    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::True => Some(true),
            TriState::False => Some(false),
            TriState::Neutral => None,
        }
    }
}

/// Resolves Pod/Namespace annotations into a mutate-or-not decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPolicy {
    key: String,
    mode: AnnotationMode,
}

impl AnnotationPolicy {
    /// Create a policy reading `key` with the given default mode
    pub fn new(key: impl Into<String>, mode: AnnotationMode) -> Self {
        Self {
            key: key.into(),
            mode,
        }
    }

    /// Classify one annotation source
    pub fn classify(&self, annotations: Option<&BTreeMap<String, String>>) -> TriState {
        annotations
            .and_then(|a| a.get(&self.key))
            .map_or(TriState::Neutral, |v| TriState::parse(v))
    }

    /// Decide whether to mutate given the Pod's and its namespace's annotations
    pub fn evaluate(
        &self,
        pod_annotations: Option<&BTreeMap<String, String>>,
        namespace_annotations: Option<&BTreeMap<String, String>>,
    ) -> bool {
        if self.mode == AnnotationMode::Always {
            return true;
        }

        if let Some(decision) = self.classify(pod_annotations).as_bool() {
            return decision;
        }

        if let Some(decision) = self.classify(namespace_annotations).as_bool() {
            return decision;
        }

        match self.mode {
            AnnotationMode::OptIn => false,
            AnnotationMode::OptOut | AnnotationMode::Always => true,
        }
    }
}

impl Default for AnnotationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOTATION_KEY, AnnotationMode::default())
    }
}
