//! ClusterExternalSecret Controller Library
//!
//! Projects a cluster-scoped `ClusterExternalSecret` template into one
//! `ExternalSecret` per namespace matching its label selector, and keeps the
//! set of generated ExternalSecrets in step with the namespaces.
//!
//! ## Quick Start
//!
//! ```rust
//! use cluster_external_secret_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
