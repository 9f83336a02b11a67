//! # ClusterExternalSecret Status
//!
//! Status types for tracking per-namespace provisioning and conditions.

use serde::{Deserialize, Serialize};

/// Status of the ClusterExternalSecret resource
///
/// Rebuilt from scratch on every reconciliation: it describes the outcome of
/// the latest cycle only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterExternalSecretStatus {
    /// Namespaces whose ExternalSecret was synchronized in the last cycle
    /// Sorted and free of duplicates
    #[serde(default)]
    pub provisioned_namespaces: Vec<String>,
    /// Namespaces that failed in the last cycle, sorted by namespace
    #[serde(default)]
    pub failed_namespaces: Vec<NamespaceFailure>,
    /// Conditions represent the latest available observations
    /// Holds a single `Ready` condition
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A namespace the controller could not synchronize
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceFailure {
    /// Namespace that failed
    pub namespace: String,
    /// Why it failed
    pub reason: String,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl ClusterExternalSecretStatus {
    /// The `Ready` condition, if one has been recorded
    #[must_use]
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == "Ready")
    }
}
