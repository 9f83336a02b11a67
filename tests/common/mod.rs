//! Common test utilities
//!
//! `FakeCluster` is an in-memory API server implementing `ClusterClient`,
//! with switches to make individual calls fail. `RecordingMetrics` captures
//! what the reconciler reports.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cluster_external_secret_controller::controller::client::{
    ChildOperation, ClusterClient, ParentPage,
};
use cluster_external_secret_controller::crd::{
    ClusterExternalSecret, ClusterExternalSecretSpec, ExternalSecret, ExternalSecretSpec,
};
use cluster_external_secret_controller::observability::MetricsSink;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::core::{Selector, SelectorExt};
use kube::ResourceExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn template() -> ExternalSecretSpec {
    ExternalSecretSpec::new(
        serde_json::json!({
            "refreshInterval": "1h",
            "secretStoreRef": {"name": "vault", "kind": "ClusterSecretStore"},
            "target": {"name": "db-credentials"},
            "dataFrom": [{"extract": {"key": "shared/db"}}]
        })
        .as_object()
        .cloned()
        .unwrap(),
    )
}

/// ClusterExternalSecret selecting namespaces by `matchLabels`
pub fn parent(name: &str, match_labels: &[(&str, &str)]) -> ClusterExternalSecret {
    ClusterExternalSecret::new(
        name,
        ClusterExternalSecretSpec {
            namespace_selector: LabelSelector {
                match_labels: Some(labels(match_labels)),
                ..LabelSelector::default()
            },
            external_secret_spec: template(),
            ..ClusterExternalSecretSpec::default()
        },
    )
}

/// An ExternalSecret nobody controls
pub fn foreign_external_secret(namespace: &str, name: &str) -> ExternalSecret {
    ExternalSecret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: ExternalSecretSpec::new(
            serde_json::json!({"target": {"name": "hand-made"}})
                .as_object()
                .cloned()
                .unwrap(),
        ),
    }
}

/// An ExternalSecret controlled by some other ClusterExternalSecret
pub fn external_secret_owned_by(namespace: &str, name: &str, owner_uid: &str) -> ExternalSecret {
    let mut external_secret = foreign_external_secret(namespace, name);
    external_secret.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "external-secrets.io/v1beta1".to_string(),
        kind: "ClusterExternalSecret".to_string(),
        name: "someone-else".to_string(),
        uid: owner_uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);
    external_secret
}

#[derive(Default)]
struct State {
    parents: BTreeMap<String, ClusterExternalSecret>,
    namespaces: BTreeMap<String, Namespace>,
    children: BTreeMap<(String, String), ExternalSecret>,
    next_uid: u64,

    fail_get_child: HashSet<String>,
    fail_write_child: HashSet<String>,
    fail_delete_child: HashSet<String>,
    fail_list_namespaces: bool,
    fail_patch_status: bool,
    fail_parent_page: Option<usize>,
    max_page_size: Option<usize>,
    reverse_namespace_order: bool,

    parent_list_calls: Vec<(u32, Option<String>)>,
    patches: Vec<(String, Value)>,
    child_writes: usize,
    child_deletes: Vec<(String, String)>,
}

/// In-memory cluster implementing `ClusterClient`
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_namespace(&self, name: &str, namespace_labels: &[(&str, &str)]) {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels(namespace_labels)),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        self.state().namespaces.insert(name.to_string(), namespace);
    }

    pub fn relabel_namespace(&self, name: &str, namespace_labels: &[(&str, &str)]) {
        self.add_namespace(name, namespace_labels);
    }

    /// Store a ClusterExternalSecret, assigning a uid; returns the stored copy
    pub fn add_parent(&self, mut parent: ClusterExternalSecret) -> ClusterExternalSecret {
        let mut state = self.state();
        state.next_uid += 1;
        parent.metadata.uid = Some(format!("uid-{}", state.next_uid));
        state.parents.insert(parent.name_any(), parent.clone());
        parent
    }

    /// Replace the spec of a stored ClusterExternalSecret, keeping uid and status
    pub fn update_parent_spec(&self, name: &str, spec: ClusterExternalSecretSpec) {
        if let Some(parent) = self.state().parents.get_mut(name) {
            parent.spec = spec;
        }
    }

    pub fn parent(&self, name: &str) -> ClusterExternalSecret {
        self.state().parents[name].clone()
    }

    pub fn put_child(&self, child: ExternalSecret) {
        let key = (child.namespace().unwrap_or_default(), child.name_any());
        self.state().children.insert(key, child);
    }

    pub fn child(&self, namespace: &str, name: &str) -> Option<ExternalSecret> {
        self.state()
            .children
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Remove an ExternalSecret behind the controller's back
    pub fn remove_child(&self, namespace: &str, name: &str) {
        self.state()
            .children
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn child_namespaces(&self) -> Vec<String> {
        self.state().children.keys().map(|(ns, _)| ns.clone()).collect()
    }

    pub fn patches(&self) -> Vec<(String, Value)> {
        self.state().patches.clone()
    }

    pub fn child_writes(&self) -> usize {
        self.state().child_writes
    }

    pub fn child_deletes(&self) -> Vec<(String, String)> {
        self.state().child_deletes.clone()
    }

    pub fn parent_list_calls(&self) -> Vec<(u32, Option<String>)> {
        self.state().parent_list_calls.clone()
    }

    pub fn fail_get_child_in(&self, namespace: &str) {
        self.state().fail_get_child.insert(namespace.to_string());
    }

    pub fn fail_write_child_in(&self, namespace: &str) {
        self.state().fail_write_child.insert(namespace.to_string());
    }

    pub fn fail_delete_child_in(&self, namespace: &str) {
        self.state().fail_delete_child.insert(namespace.to_string());
    }

    pub fn fail_list_namespaces(&self) {
        self.state().fail_list_namespaces = true;
    }

    pub fn fail_patch_status(&self) {
        self.state().fail_patch_status = true;
    }

    /// Make the listing of the given page (0-based) fail
    pub fn fail_parent_page(&self, page: usize) {
        self.state().fail_parent_page = Some(page);
    }

    /// Cap pages below the requested limit to force pagination
    pub fn set_max_page_size(&self, size: usize) {
        self.state().max_page_size = Some(size);
    }

    pub fn reverse_namespace_order(&self) {
        self.state().reverse_namespace_order = true;
    }
}

/// Apply an RFC 7386 merge patch to `target`
fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let Value::Object(target) = target else {
        return;
    };
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_cluster_external_secret(
        &self,
        name: &str,
    ) -> Result<Option<ClusterExternalSecret>> {
        Ok(self.state().parents.get(name).cloned())
    }

    async fn list_cluster_external_secrets(
        &self,
        limit: u32,
        continue_token: Option<&str>,
    ) -> Result<ParentPage> {
        let mut state = self.state();
        state
            .parent_list_calls
            .push((limit, continue_token.map(str::to_string)));

        let page_size = state
            .max_page_size
            .map_or(limit as usize, |max| max.min(limit as usize));
        let start: usize = continue_token.map_or(Ok(0), str::parse::<usize>)?;
        if state.fail_parent_page == Some(start / page_size) {
            return Err(anyhow!("listing ClusterExternalSecrets failed"));
        }

        let items: Vec<_> = state
            .parents
            .values()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();
        let next = start + items.len();
        let continue_token = (next < state.parents.len()).then(|| next.to_string());
        Ok(ParentPage {
            items,
            continue_token,
        })
    }

    async fn patch_cluster_external_secret_status(&self, name: &str, patch: &Value) -> Result<()> {
        let mut state = self.state();
        state.patches.push((name.to_string(), patch.clone()));
        if state.fail_patch_status {
            return Err(anyhow!("status patch rejected"));
        }

        let parent = state
            .parents
            .get_mut(name)
            .ok_or_else(|| anyhow!("ClusterExternalSecret {name} not found"))?;
        let mut document = serde_json::to_value(&*parent)?;
        apply_merge_patch(&mut document, patch);
        *parent = serde_json::from_value(document)?;
        Ok(())
    }

    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>> {
        let state = self.state();
        if state.fail_list_namespaces {
            return Err(anyhow!("listing namespaces failed"));
        }
        let mut namespaces: Vec<Namespace> = state
            .namespaces
            .values()
            .filter(|ns| selector.matches(ns.labels()))
            .cloned()
            .collect();
        if state.reverse_namespace_order {
            namespaces.reverse();
        }
        Ok(namespaces)
    }

    async fn get_external_secret_metadata(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        let state = self.state();
        if state.fail_get_child.contains(namespace) {
            return Err(anyhow!("get ExternalSecret failed"));
        }
        Ok(state
            .children
            .get(&(namespace.to_string(), name.to_string()))
            .map(|child| child.metadata.clone()))
    }

    async fn create_or_update_external_secret(
        &self,
        desired: &ExternalSecret,
    ) -> Result<ChildOperation> {
        let mut state = self.state();
        let namespace = desired.namespace().unwrap_or_default();
        if state.fail_write_child.contains(&namespace) {
            return Err(anyhow!("write ExternalSecret failed"));
        }
        state.child_writes += 1;

        let key = (namespace, desired.name_any());
        match state.children.get_mut(&key) {
            Some(existing) => {
                existing.spec = desired.spec.clone();
                Ok(ChildOperation::Updated)
            }
            None => {
                state.children.insert(key, desired.clone());
                Ok(ChildOperation::Created)
            }
        }
    }

    async fn delete_external_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_delete_child.contains(namespace) {
            return Err(anyhow!("delete ExternalSecret failed"));
        }
        state
            .child_deletes
            .push((namespace.to_string(), name.to_string()));
        state
            .children
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

/// `MetricsSink` that remembers everything it was told
#[derive(Default)]
pub struct RecordingMetrics {
    durations: Mutex<Vec<(String, String, Duration)>>,
    reconciliations: AtomicU64,
    errors: AtomicU64,
}

impl RecordingMetrics {
    pub fn durations(&self) -> Vec<(String, String, Duration)> {
        self.durations.lock().unwrap().clone()
    }

    pub fn reconciliations(&self) -> u64 {
        self.reconciliations.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }
}

impl MetricsSink for RecordingMetrics {
    fn observe_reconcile_duration(&self, name: &str, namespace: &str, duration: Duration) {
        self.durations
            .lock()
            .unwrap()
            .push((name.to_string(), namespace.to_string(), duration));
    }

    fn increment_reconciliations(&self) {
        self.reconciliations.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_reconciliation_errors(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}
