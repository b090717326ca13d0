//! NewResource CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the NewResource operator.

pub mod new_resource;

pub use new_resource::*;
