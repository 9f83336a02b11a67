//! # ExternalSecret Synchronization
//!
//! Creates, overwrites and deletes the ExternalSecrets a ClusterExternalSecret
//! owns, one per namespace.
//!
//! Ownership is decided from owner references alone:
//! - an ExternalSecret with no owner references belongs to someone else and is
//!   never touched;
//! - an ExternalSecret controlled by a different object cannot take this
//!   ClusterExternalSecret as controller and is never touched either.

use crate::controller::client::{ChildOperation, ClusterClient};
use crate::controller::reconciler::types::{
    ERR_CREATING_OR_UPDATING, ERR_FAILED_TO_DELETE, ERR_GET_EXISTING_ES, ERR_SECRET_ALREADY_EXISTS,
    ERR_SET_CTRL_REFERENCE,
};
use crate::crd::{ClusterExternalSecret, ExternalSecret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, error, info};

/// Namespace -> failure reason for one reconciliation cycle
pub type FailedNamespaces = BTreeMap<String, String>;

/// Identity of one generated ExternalSecret
///
/// The owner is recorded by UID rather than by reference to the parent object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildKey {
    pub owner_uid: String,
    pub namespace: String,
    pub name: String,
}

impl ChildKey {
    pub fn new(parent: &ClusterExternalSecret, namespace: &str, name: &str) -> Self {
        Self {
            owner_uid: parent.uid().unwrap_or_default(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether `meta` names this key's owner as its controller
    #[must_use]
    pub fn is_controlled_by_owner(&self, meta: &ObjectMeta) -> bool {
        controller_of(meta).is_some_and(|owner| owner.uid == self.owner_uid)
    }
}

impl std::fmt::Display for ChildKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("owner has no name or uid")]
    MissingIdentity,
    #[error("object is already owned by another {kind} controller {name}")]
    AlreadyOwned { kind: String, name: String },
}

/// Why a single namespace could not be synchronized
#[derive(Debug, Error)]
pub enum ChildSyncError {
    #[error("could not get existing ExternalSecret: {0:#}")]
    GetExisting(anyhow::Error),
    #[error("external secret already exists in namespace")]
    AlreadyExists,
    #[error("could not set the controller owner reference: {0}")]
    SetControllerReference(#[from] OwnershipError),
    #[error("could not create or update ExternalSecret: {0:#}")]
    CreateOrUpdate(anyhow::Error),
    #[error("external secret in non matching namespace could not be deleted: {0:#}")]
    Delete(anyhow::Error),
}

impl ChildSyncError {
    /// Reason recorded against the namespace in the status
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ChildSyncError::GetExisting(_) => ERR_GET_EXISTING_ES,
            ChildSyncError::AlreadyExists => ERR_SECRET_ALREADY_EXISTS,
            ChildSyncError::SetControllerReference(_) => ERR_SET_CTRL_REFERENCE,
            ChildSyncError::CreateOrUpdate(_) => ERR_CREATING_OR_UPDATING,
            ChildSyncError::Delete(_) => ERR_FAILED_TO_DELETE,
        }
    }
}

/// The owner reference marked as controller, if any
#[must_use]
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true))
}

/// Controller owner reference pointing at the ClusterExternalSecret
pub fn owner_reference(parent: &ClusterExternalSecret) -> Result<OwnerReference, OwnershipError> {
    let mut owner = parent
        .controller_owner_ref(&())
        .ok_or(OwnershipError::MissingIdentity)?;
    // Foreground deletion of the parent waits for its children
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}

/// Make `owner` the controller of `meta`
///
/// Fails when another object is already the controller. A stale reference to
/// the same owner is replaced; unrelated non-controller references are kept.
pub fn set_controller_reference(
    owner: &OwnerReference,
    meta: &mut ObjectMeta,
) -> Result<(), OwnershipError> {
    if let Some(existing) = controller_of(meta) {
        if existing.uid != owner.uid {
            return Err(OwnershipError::AlreadyOwned {
                kind: existing.kind.clone(),
                name: existing.name.clone(),
            });
        }
    }

    let references = meta.owner_references.get_or_insert_with(Vec::new);
    references.retain(|r| r.uid != owner.uid);
    references.push(owner.clone());
    Ok(())
}

/// Classify the result of a metadata-only fetch
///
/// Not-found comes back as `Ok(None)`. An object with no owner references
/// was not created by this controller and is reported as a naming conflict.
pub fn check_for_error(
    existing: anyhow::Result<Option<ObjectMeta>>,
) -> Result<Option<ObjectMeta>, ChildSyncError> {
    match existing {
        Err(e) => Err(ChildSyncError::GetExisting(e)),
        Ok(Some(meta)) if meta.owner_references.as_ref().is_none_or(Vec::is_empty) => {
            Err(ChildSyncError::AlreadyExists)
        }
        Ok(existing) => Ok(existing),
    }
}

/// Build the ExternalSecret this ClusterExternalSecret wants in `key.namespace`
pub fn desired_external_secret(
    parent: &ClusterExternalSecret,
    key: &ChildKey,
) -> Result<ExternalSecret, OwnershipError> {
    let template_metadata = parent
        .spec
        .external_secret_metadata
        .clone()
        .unwrap_or_default();

    let mut metadata = ObjectMeta {
        name: Some(key.name.clone()),
        namespace: Some(key.namespace.clone()),
        labels: template_metadata.labels,
        annotations: template_metadata.annotations,
        ..ObjectMeta::default()
    };
    set_controller_reference(&owner_reference(parent)?, &mut metadata)?;

    Ok(ExternalSecret {
        metadata,
        spec: parent.spec.external_secret_spec.clone(),
    })
}

/// Create or overwrite the ExternalSecret for one matched namespace
///
/// `existing` is the metadata returned by [`check_for_error`]. The spec of an
/// existing ExternalSecret is rewritten on every call so out-of-band edits
/// are reverted.
pub async fn resolve_external_secret(
    client: &dyn ClusterClient,
    parent: &ClusterExternalSecret,
    existing: Option<&ObjectMeta>,
    key: &ChildKey,
) -> Result<ChildOperation, ChildSyncError> {
    // The existing object must accept this ClusterExternalSecret as its controller
    if let Some(meta) = existing {
        let mut candidate = meta.clone();
        set_controller_reference(&owner_reference(parent)?, &mut candidate)?;
    }

    let desired = desired_external_secret(parent, key)?;

    client
        .create_or_update_external_secret(&desired)
        .await
        .map_err(ChildSyncError::CreateOrUpdate)
}

/// Delete the ExternalSecret from a namespace that no longer matches
///
/// Returns `Ok(false)` when there was nothing to delete.
pub async fn remove_external_secret(
    client: &dyn ClusterClient,
    key: &ChildKey,
) -> Result<bool, ChildSyncError> {
    let existing = client
        .get_external_secret_metadata(&key.namespace, &key.name)
        .await;

    let Some(meta) = check_for_error(existing)? else {
        return Ok(false);
    };

    if controller_of(&meta).is_some() && !key.is_controlled_by_owner(&meta) {
        return Err(ChildSyncError::AlreadyExists);
    }

    client
        .delete_external_secret(&key.namespace, &key.name)
        .await
        .map_err(ChildSyncError::Delete)?;
    Ok(true)
}

/// Delete ExternalSecrets from every namespace in `removed`
///
/// A failure is recorded for its namespace and the pass carries on.
pub async fn remove_old_namespaces(
    client: &dyn ClusterClient,
    parent: &ClusterExternalSecret,
    removed: &[String],
    external_secret_name: &str,
) -> FailedNamespaces {
    let mut failed = FailedNamespaces::new();

    for namespace in removed {
        let key = ChildKey::new(parent, namespace, external_secret_name);
        match remove_external_secret(client, &key).await {
            Ok(true) => info!(
                "Deleted ExternalSecret {} from namespace that no longer matches {}",
                key,
                parent.name_any()
            ),
            Ok(false) => debug!("ExternalSecret {} already gone", key),
            Err(e) => {
                error!("unable to delete external-secret {}: {}", key, e);
                failed.insert(namespace.clone(), e.reason().to_string());
            }
        }
    }

    failed
}
