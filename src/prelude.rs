//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use cluster_external_secret_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (ClusterExternalSecret, ExternalSecret, status types)
//! - The `ClusterClient` seam and its kube-rs implementation
//! - Reconciler types (Reconciler, ReconcileError, etc.)
//! - The `MetricsSink` seam and its Prometheus implementation
//! - Config types

// CRD types - most commonly used
pub use crate::crd::*;

// Kubernetes API seam - needed for running the reconciler against other backends
pub use crate::controller::client::{ChildOperation, ClusterClient, KubeClusterClient, ParentPage};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{reconcile, reconcile_by_name, ReconcileError, Reconciler};

// Metrics
pub use crate::observability::{ControllerMetrics, MetricsSink};

// Config types
pub use crate::config::ControllerConfig;
