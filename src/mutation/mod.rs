//! Mutation decision engine
//!
//! Pure policy logic deciding whether a Pod gets an ndots patch and what that
//! patch looks like. No I/O happens here except through [`NamespaceLookup`].

mod annotation;
mod engine;
mod lookup;
mod namespace;
mod patch;

pub use annotation::{AnnotationMode, AnnotationPolicy, TriState, DEFAULT_ANNOTATION_KEY};
pub use engine::{EngineConfig, MutationEngine, PodDescriptor};
pub use lookup::{Annotations, KubeNamespaceLookup, NamespaceLookup, StaticNamespaceLookup};
pub use namespace::NamespaceFilter;
pub use patch::{DnsOption, PatchBuilder};
