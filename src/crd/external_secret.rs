//! # ExternalSecret
//!
//! The namespaced resource this controller fans out. Its schema belongs to
//! the external-secrets project; only the envelope is modelled here and the
//! spec is carried as an opaque JSON object.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// ExternalSecret Custom Resource
///
/// Created once per matching namespace, owned (as controller) by the
/// ClusterExternalSecret it was projected from.
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    kind = "ExternalSecret",
    group = "external-secrets.io",
    version = "v1beta1",
    namespaced,
    derive = "PartialEq"
)]
pub struct ExternalSecretSpec {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ExternalSecretSpec {
    #[must_use]
    pub fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { fields }
    }
}

impl JsonSchema for ExternalSecretSpec {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("ExternalSecretSpec")
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        // The template is validated by the external-secrets admission webhook, not here
        schemars::json_schema!({
            "type": "object",
            "description": "ExternalSecret spec copied verbatim into every generated ExternalSecret",
            "x-kubernetes-preserve-unknown-fields": true
        })
    }
}
