//! # Namespace Watch
//!
//! Turns namespace and ExternalSecret watch events into reconcile triggers
//! for the ClusterExternalSecret controller.
//!
//! The namespace watcher only reports the current state of an object, so the
//! labels each namespace had when last seen are cached here to tell creates,
//! label updates and deletes apart.

use crate::controller::client::ClusterClient;
use crate::controller::fanout::{
    find_parents_for_namespace, owner_parent_ref, should_reenqueue, NamespaceEventKind,
};
use crate::crd::{ClusterExternalSecret, ExternalSecret};
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::watcher::{self, Event};
use kube::runtime::{metadata_watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Labels = BTreeMap<String, String>;

/// A namespace change worth mapping to ClusterExternalSecrets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceChange {
    pub name: String,
    pub kind: NamespaceEventKind,
    /// Labels before the change, empty for a create
    pub old_labels: Labels,
    /// Labels after the change, empty for a delete
    pub new_labels: Labels,
}

impl NamespaceChange {
    /// Label sets to evaluate selectors against
    ///
    /// A relabel is checked against both sides so the selector it left is
    /// reconciled as well as the one it joined.
    #[must_use]
    pub fn label_sets(&self) -> Vec<&Labels> {
        match self.kind {
            NamespaceEventKind::Create => vec![&self.new_labels],
            NamespaceEventKind::Delete => vec![&self.old_labels],
            NamespaceEventKind::Update => vec![&self.old_labels, &self.new_labels],
        }
    }
}

/// Last seen labels per namespace
#[derive(Debug, Default)]
pub struct NamespaceLabelCache {
    known: HashMap<String, Labels>,
    /// Namespaces seen since the current re-list started
    relisted: Option<HashSet<String>>,
}

impl NamespaceLabelCache {
    /// Classify a watcher event, returning the changes that need fan-out
    pub fn observe(&mut self, event: Event<Namespace>) -> Vec<NamespaceChange> {
        match event {
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(namespace) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(namespace.name_any());
                }
                self.apply(&namespace).into_iter().collect()
            }
            Event::Apply(namespace) => self.apply(&namespace).into_iter().collect(),
            Event::Delete(namespace) => {
                let name = namespace.name_any();
                let old_labels = self
                    .known
                    .remove(&name)
                    .unwrap_or_else(|| namespace.labels().clone());
                vec![NamespaceChange {
                    name,
                    kind: NamespaceEventKind::Delete,
                    old_labels,
                    new_labels: Labels::new(),
                }]
            }
            Event::InitDone => self.finish_relist(),
        }
    }

    fn apply(&mut self, namespace: &Namespace) -> Option<NamespaceChange> {
        let name = namespace.name_any();
        let new_labels = namespace.labels().clone();

        let (kind, old_labels) = match self.known.insert(name.clone(), new_labels.clone()) {
            None => (NamespaceEventKind::Create, Labels::new()),
            Some(old) => (NamespaceEventKind::Update, old),
        };

        should_reenqueue(&old_labels, &new_labels, kind).then_some(NamespaceChange {
            name,
            kind,
            old_labels,
            new_labels,
        })
    }

    // Namespaces missing from a completed re-list were deleted while the watch was down
    fn finish_relist(&mut self) -> Vec<NamespaceChange> {
        let Some(relisted) = self.relisted.take() else {
            return Vec::new();
        };

        let vanished: Vec<String> = self
            .known
            .keys()
            .filter(|name| !relisted.contains(*name))
            .cloned()
            .collect();

        vanished
            .into_iter()
            .filter_map(|name| {
                let old_labels = self.known.remove(&name)?;
                Some(NamespaceChange {
                    name,
                    kind: NamespaceEventKind::Delete,
                    old_labels,
                    new_labels: Labels::new(),
                })
            })
            .collect()
    }
}

/// ClusterExternalSecrets affected by one namespace change, without duplicates
pub async fn find_parents_for_change(
    client: &dyn ClusterClient,
    change: &NamespaceChange,
) -> Vec<ObjectRef<ClusterExternalSecret>> {
    let mut seen = HashSet::new();
    let mut parents = Vec::new();

    for labels in change.label_sets() {
        for parent in find_parents_for_namespace(client, labels).await {
            if seen.insert(parent.name.clone()) {
                parents.push(parent);
            }
        }
    }

    parents
}

/// Start the namespace event pump
///
/// Watches namespaces in a background task and sends a reference for every
/// ClusterExternalSecret a change affects. The task stops when the returned
/// stream is dropped or the handle is aborted.
pub fn spawn_namespace_fanout(
    client: Client,
    cluster: Arc<dyn ClusterClient>,
) -> (
    impl Stream<Item = ObjectRef<ClusterExternalSecret>> + Send + 'static,
    JoinHandle<()>,
) {
    let (sender, receiver) = mpsc::unbounded();

    let handle = tokio::spawn(async move {
        let namespaces: Api<Namespace> = Api::all(client);
        let mut events = watcher::watcher(namespaces, watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut cache = NamespaceLabelCache::default();

        info!("Watching namespaces for ClusterExternalSecret fan-out");
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("Namespace watch error: {}", e);
                    continue;
                }
            };

            for change in cache.observe(event) {
                let parents = find_parents_for_change(cluster.as_ref(), &change).await;
                debug!(
                    "Namespace {} {} selects {} ClusterExternalSecret(s)",
                    change.name,
                    change.kind.as_str(),
                    parents.len()
                );
                for parent in parents {
                    if sender.unbounded_send(parent).is_err() {
                        debug!("Controller stopped, ending namespace fan-out");
                        return;
                    }
                }
            }
        }
    });

    (receiver, handle)
}

/// Reconcile triggers from ExternalSecret metadata events
///
/// Maps every change to an ExternalSecret, deletes included, to the
/// ClusterExternalSecret that controls it.
pub fn external_secret_triggers(
    client: Client,
) -> impl Stream<Item = ObjectRef<ClusterExternalSecret>> + Send + 'static {
    let external_secrets: Api<ExternalSecret> = Api::all(client);

    metadata_watcher(external_secrets, watcher::Config::default())
        .default_backoff()
        .filter_map(|event| async move {
            match event {
                Ok(Event::Apply(meta) | Event::InitApply(meta) | Event::Delete(meta)) => {
                    owner_parent_ref(&meta.metadata)
                }
                Ok(Event::Init | Event::InitDone) => None,
                Err(e) => {
                    warn!("ExternalSecret watch error: {}", e);
                    None
                }
            }
        })
}
