//! # ClusterExternalSecret Spec
//!
//! Main CRD specification types and default values.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ClusterExternalSecret Custom Resource Definition
///
/// A cluster-scoped template that is projected as one `ExternalSecret` into
/// every namespace matching `namespaceSelector`.
///
/// # Example
///
/// ```yaml
/// apiVersion: external-secrets.io/v1beta1
/// kind: ClusterExternalSecret
/// metadata:
///   name: shared-db-credentials
/// spec:
///   namespaceSelector:
///     matchLabels:
///       env: prod
///   externalSecretName: db-credentials
///   externalSecretMetadata:
///     labels:
///       team: platform
///   refreshInterval: 1h
///   externalSecretSpec:
///     secretStoreRef:
///       name: vault
///       kind: ClusterSecretStore
///     target:
///       name: db-credentials
///     dataFrom:
///       - extract:
///           key: shared/db
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ClusterExternalSecret",
    group = "external-secrets.io",
    version = "v1beta1",
    status = "crate::crd::ClusterExternalSecretStatus",
    shortname = "ces",
    printcolumn = r#"{"name":"Store", "type":"string", "jsonPath":".spec.externalSecretSpec.secretStoreRef.name"}, {"name":"Refresh Interval", "type":"string", "jsonPath":".spec.refreshInterval"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterExternalSecretSpec {
    /// Label selector choosing the namespaces that receive an ExternalSecret
    /// An empty selector matches every namespace
    #[serde(default)]
    #[schemars(schema_with = "label_selector_schema")]
    pub namespace_selector: LabelSelector,
    /// Name of the ExternalSecret created in each namespace
    /// Defaults to the name of the ClusterExternalSecret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_secret_name: Option<String>,
    /// Labels and annotations applied to every created ExternalSecret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_secret_metadata: Option<ExternalSecretMetadata>,
    /// Template copied verbatim into the spec of every ExternalSecret
    pub external_secret_spec: crate::crd::ExternalSecretSpec,
    /// How often the ClusterExternalSecret is reconciled
    /// Format: Go duration string (e.g., "30s", "15m", "1h", "1h30m")
    /// Defaults to the controller-wide REQUEUE_INTERVAL when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
}

/// Metadata applied to each ExternalSecret created from the template
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ClusterExternalSecret {
    /// Name of the ExternalSecret this resource owns in each namespace
    ///
    /// `externalSecretName` wins when set and non-empty, otherwise the
    /// resource's own name is used.
    #[must_use]
    pub fn external_secret_name(&self) -> String {
        match self.spec.external_secret_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.metadata.name.clone().unwrap_or_default(),
        }
    }
}

fn label_selector_schema(_gen: &mut SchemaGenerator) -> Schema {
    // k8s-openapi types carry no JsonSchema impl, so the LabelSelector shape is spelled out here
    schemars::json_schema!({
        "type": "object",
        "description": "Label selector for the target namespaces",
        "properties": {
            "matchLabels": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            },
            "matchExpressions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["key", "operator"],
                    "properties": {
                        "key": { "type": "string" },
                        "operator": { "type": "string" },
                        "values": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    }
                }
            }
        }
    })
}
