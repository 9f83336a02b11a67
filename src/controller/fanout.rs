//! # Namespace Fan-out
//!
//! Works out which ClusterExternalSecrets have to be reconciled when a
//! namespace appears, disappears or changes its labels, and which one owns a
//! changed ExternalSecret.

use crate::constants::PARENT_LIST_PAGE_SIZE;
use crate::controller::client::ClusterClient;
use crate::controller::reconciler::children::controller_of;
use crate::controller::reconciler::selector::{label_selector_as_selector, matches_labels};
use crate::crd::ClusterExternalSecret;
use anyhow::{Context, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Kind of change observed on a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceEventKind {
    Create,
    Update,
    Delete,
}

impl NamespaceEventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceEventKind::Create => "create",
            NamespaceEventKind::Update => "update",
            NamespaceEventKind::Delete => "delete",
        }
    }
}

/// Whether a namespace event can change which namespaces a selector matches
///
/// Creates and deletes always can. An update only matters when the label
/// set changed.
#[must_use]
pub fn should_reenqueue(
    old_labels: &BTreeMap<String, String>,
    new_labels: &BTreeMap<String, String>,
    kind: NamespaceEventKind,
) -> bool {
    match kind {
        NamespaceEventKind::Create | NamespaceEventKind::Delete => true,
        NamespaceEventKind::Update => old_labels != new_labels,
    }
}

/// ClusterExternalSecrets whose selector matches a namespace with `labels`
///
/// Walks every page of ClusterExternalSecrets. Any listing or selector error
/// drops the whole result: the resources would be reconciled on their next
/// scheduled cycle anyway.
pub async fn find_parents_for_namespace(
    client: &dyn ClusterClient,
    labels: &BTreeMap<String, String>,
) -> Vec<ObjectRef<ClusterExternalSecret>> {
    match matching_parents(client, labels).await {
        Ok(parents) => parents,
        Err(e) => {
            error!("Failed to map namespace to ClusterExternalSecrets: {:#}", e);
            Vec::new()
        }
    }
}

async fn matching_parents(
    client: &dyn ClusterClient,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<ObjectRef<ClusterExternalSecret>>> {
    let mut parents = Vec::new();
    let mut continue_token: Option<String> = None;

    loop {
        let page = client
            .list_cluster_external_secrets(PARENT_LIST_PAGE_SIZE, continue_token.as_deref())
            .await?;

        for parent in &page.items {
            let selector = label_selector_as_selector(&parent.spec.namespace_selector)
                .with_context(|| format!("Invalid namespaceSelector on {}", parent.name_any()))?;
            if matches_labels(&selector, labels) {
                debug!("Namespace change selects ClusterExternalSecret {}", parent.name_any());
                parents.push(ObjectRef::from_obj(parent));
            }
        }

        match page.continue_token {
            Some(token) => continue_token = Some(token),
            None => return Ok(parents),
        }
    }
}

/// The ClusterExternalSecret controlling an ExternalSecret, from its metadata
#[must_use]
pub fn owner_parent_ref(meta: &ObjectMeta) -> Option<ObjectRef<ClusterExternalSecret>> {
    let owner = controller_of(meta)?;
    let expected_kind = ClusterExternalSecret::kind(&());
    let expected_api_version = ClusterExternalSecret::api_version(&());

    (owner.kind == expected_kind && owner.api_version == expected_api_version)
        .then(|| ObjectRef::new(&owner.name))
}
