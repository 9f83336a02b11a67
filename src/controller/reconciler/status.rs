//! # Status Aggregation
//!
//! Folds the per-namespace results of one cycle into the ClusterExternalSecret
//! status and writes it back as a single JSON merge patch.
//!
//! The status describes the latest cycle only: both namespace lists and the
//! `Ready` condition are rebuilt every time.

use crate::constants::CONDITION_TYPE_READY;
use crate::controller::client::ClusterClient;
use crate::controller::reconciler::children::FailedNamespaces;
use crate::controller::reconciler::types::ERR_NAMESPACES_FAILED;
use crate::crd::{ClusterExternalSecret, ClusterExternalSecretStatus, Condition, NamespaceFailure};
use chrono::{DateTime, SecondsFormat, Utc};
use kube::ResourceExt;
use serde_json::{Map, Value};
use tracing::{debug, error};

pub const REASON_SYNCED: &str = "Synced";
pub const REASON_PARTIALLY_SYNCED: &str = "PartiallySynced";
pub const REASON_SYNC_FAILED: &str = "SyncFailed";

/// Build the `Ready` condition for a cycle
///
/// `lastTransitionTime` is kept from `previous` when the status value did
/// not flip, so unchanged cycles produce an identical condition.
#[must_use]
pub fn new_condition(
    failed: usize,
    matched: usize,
    previous: Option<&Condition>,
    now: DateTime<Utc>,
) -> Condition {
    let (status, reason, message) = if failed == 0 {
        ("True", REASON_SYNCED, None)
    } else {
        let reason = if failed >= matched {
            REASON_SYNC_FAILED
        } else {
            REASON_PARTIALLY_SYNCED
        };
        (
            "False",
            reason,
            Some(format!(
                "{ERR_NAMESPACES_FAILED}: {failed} of {matched} namespaces failed"
            )),
        )
    };

    let last_transition_time = previous
        .filter(|p| p.status == status)
        .and_then(|p| p.last_transition_time.clone())
        .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Secs, true));

    Condition {
        r#type: CONDITION_TYPE_READY.to_string(),
        status: status.to_string(),
        last_transition_time: Some(last_transition_time),
        reason: Some(reason.to_string()),
        message,
    }
}

/// Failure list sorted by namespace
#[must_use]
pub fn to_namespace_failures(failed: &FailedNamespaces) -> Vec<NamespaceFailure> {
    // BTreeMap iteration is already ordered by namespace
    failed
        .iter()
        .map(|(namespace, reason)| NamespaceFailure {
            namespace: namespace.clone(),
            reason: reason.clone(),
        })
        .collect()
}

/// Replace `status` with the outcome of this cycle
pub fn apply_cycle_outcome(
    status: &mut ClusterExternalSecretStatus,
    mut provisioned: Vec<String>,
    failed: &FailedNamespaces,
    matched: usize,
    now: DateTime<Utc>,
) {
    provisioned.sort();
    provisioned.dedup();

    let condition = new_condition(failed.len(), matched, status.ready_condition(), now);

    status.provisioned_namespaces = provisioned;
    status.failed_namespaces = to_namespace_failures(failed);
    status.conditions = vec![condition];
}

/// RFC 7386 merge patch turning `old` into `new`
///
/// Removed object members become `null`; arrays and scalars are replaced
/// whole. Returns an empty object when nothing changed.
#[must_use]
pub fn merge_patch(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for key in old.keys() {
                if !new.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, new_value) in new {
                match old.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value) if old_value.is_object() && new_value.is_object() => {
                        patch.insert(key.clone(), merge_patch(old_value, new_value));
                    }
                    _ => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            Value::Object(patch)
        }
        (_, new) => new.clone(),
    }
}

/// Status write scoped to one reconciliation cycle
///
/// Captures the status as it was when the cycle started. Whatever the cycle
/// ends up with is diffed against that snapshot and sent exactly once by
/// [`StatusPatch::commit`].
#[derive(Debug)]
pub struct StatusPatch {
    name: String,
    snapshot: Option<ClusterExternalSecretStatus>,
}

impl StatusPatch {
    #[must_use]
    pub fn begin(parent: &ClusterExternalSecret) -> Self {
        Self {
            name: parent.name_any(),
            snapshot: parent.status.clone(),
        }
    }

    /// Status at cycle entry, or an empty one if none was ever written
    #[must_use]
    pub fn working_copy(&self) -> ClusterExternalSecretStatus {
        self.snapshot.clone().unwrap_or_default()
    }

    /// Merge patch body for the status subresource
    #[must_use]
    pub fn body(&self, status: &ClusterExternalSecretStatus) -> Value {
        let old = serde_json::json!({ "status": self.snapshot });
        let new = serde_json::json!({ "status": status });
        merge_patch(&old, &new)
    }

    /// Send the patch; failures are logged and swallowed
    pub async fn commit(self, client: &dyn ClusterClient, status: &ClusterExternalSecretStatus) {
        let body = self.body(status);
        if body.as_object().is_some_and(Map::is_empty) {
            debug!(
                "Status of ClusterExternalSecret {} unchanged, sending empty status patch",
                self.name
            );
        }

        if let Err(e) = client
            .patch_cluster_external_secret_status(&self.name, &body)
            .await
        {
            error!(
                "unable to patch status of ClusterExternalSecret {}: {:#}",
                self.name, e
            );
        }
    }
}
