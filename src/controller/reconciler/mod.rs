//! # Reconciler
//!
//! Core reconciliation logic for `ClusterExternalSecret` resources.
//!
//! The reconciler:
//! - Evaluates the `namespaceSelector` against the live namespaces
//! - Deletes ExternalSecrets from namespaces that no longer match
//! - Creates or overwrites the ExternalSecret in every matching namespace
//! - Updates resource status with per-namespace results
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the `ClusterExternalSecret`
//! 2. Convert the selector and list matching namespaces
//! 3. Remove ExternalSecrets from previously provisioned namespaces that dropped out
//! 4. Synchronize the ExternalSecret in each matching namespace
//! 5. Aggregate failures into the `Ready` condition and patch status

pub mod children;
pub mod membership;
pub mod reconcile;
pub mod selector;
pub mod status;
pub mod types;
pub mod validation;

// Re-export public API
pub use children::{ChildKey, ChildSyncError, FailedNamespaces, OwnershipError};
pub use reconcile::{effective_interval, reconcile, reconcile_by_name};
pub use status::StatusPatch;
pub use types::{ReconcileError, Reconciler};
