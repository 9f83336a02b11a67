//! # Custom Resource Definitions
//!
//! CRD types for the ClusterExternalSecret controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - ClusterExternalSecret specification (the parent)
//! - `status.rs` - Status types for tracking reconciliation state
//! - `external_secret.rs` - ExternalSecret envelope (the generated child)

mod external_secret;
mod spec;
mod status;

// Re-export all public types
pub use external_secret::{ExternalSecret, ExternalSecretSpec};
pub use spec::{ClusterExternalSecret, ClusterExternalSecretSpec, ExternalSecretMetadata};
pub use status::{ClusterExternalSecretStatus, Condition, NamespaceFailure};
