//! # Reconciliation Logic
//!
//! Main reconciliation loop for ClusterExternalSecret resources.
//!
//! One cycle: fetch the resource fresh from the API server, evaluate its
//! selector, delete ExternalSecrets from namespaces that stopped matching,
//! create or overwrite the ExternalSecret in every matching namespace, then
//! write the aggregated status back with a single merge patch.

use crate::controller::client::{ChildOperation, ClusterClient};
use crate::controller::reconciler::children::{
    check_for_error, remove_old_namespaces, resolve_external_secret, ChildKey, ChildSyncError,
};
use crate::controller::reconciler::membership::removed_namespaces;
use crate::controller::reconciler::selector::{label_selector_as_selector, select_namespaces};
use crate::controller::reconciler::status::{apply_cycle_outcome, StatusPatch};
use crate::controller::reconciler::types::{ReconcileError, Reconciler, ERR_GET_CES};
use crate::controller::reconciler::validation::parse_kubernetes_duration;
use crate::crd::{ClusterExternalSecret, ClusterExternalSecretStatus};
use crate::observability::ReconcileTimer;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Entry point handed to the kube-runtime `Controller`
///
/// The object from the watch cache only supplies the key; the cycle always
/// works on a fresh read.
pub async fn reconcile(
    parent: Arc<ClusterExternalSecret>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcileError> {
    reconcile_by_name(&ctx, &parent.name_any()).await
}

/// Run one reconciliation cycle for the named ClusterExternalSecret
///
/// Returns `Action::await_change()` when the resource is gone or cannot be
/// read, `Action::requeue` with the effective interval on success, and the
/// fatal error otherwise. The status patch is sent in every case where the
/// resource was read.
pub async fn reconcile_by_name(ctx: &Reconciler, name: &str) -> Result<Action, ReconcileError> {
    let span = tracing::info_span!(
        "reconcile",
        resource.name = name,
        resource.kind = "ClusterExternalSecret"
    );

    async move {
        // cluster-scoped, so the namespace label is always empty
        let _timer = ReconcileTimer::start(Arc::clone(&ctx.metrics), name, "");
        ctx.metrics.increment_reconciliations();

        let parent = match ctx.client.get_cluster_external_secret(name).await {
            Ok(Some(parent)) => parent,
            Ok(None) => {
                debug!("ClusterExternalSecret {} not found, nothing to do", name);
                return Ok(Action::await_change());
            }
            Err(e) => {
                error!("{}: {:#}", ERR_GET_CES, e);
                return Ok(Action::await_change());
            }
        };

        let interval = effective_interval(&parent, ctx.requeue_interval);
        let patch = StatusPatch::begin(&parent);
        let mut status = patch.working_copy();

        let result = reconcile_cycle(ctx.client.as_ref(), &parent, &mut status).await;
        patch.commit(ctx.client.as_ref(), &status).await;

        match result {
            Ok(()) => {
                debug!("Requeueing {} in {:?}", name, interval);
                Ok(Action::requeue(interval))
            }
            Err(e) => {
                error!("Reconciliation of {} failed: {}", name, e);
                ctx.metrics.increment_reconciliation_errors();
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// How long to wait before the next cycle of `parent`
///
/// `refreshInterval` wins when it parses; an invalid value falls back to
/// `default` with a warning.
#[must_use]
pub fn effective_interval(parent: &ClusterExternalSecret, default: Duration) -> Duration {
    match parent.spec.refresh_interval.as_deref() {
        None => default,
        Some(raw) => match parse_kubernetes_duration(raw) {
            Ok(interval) => interval,
            Err(e) => {
                warn!(
                    "Invalid refreshInterval '{}' on {}: {:#}, using {:?}",
                    raw,
                    parent.name_any(),
                    e,
                    default
                );
                default
            }
        },
    }
}

async fn reconcile_cycle(
    client: &dyn ClusterClient,
    parent: &ClusterExternalSecret,
    status: &mut ClusterExternalSecretStatus,
) -> Result<(), ReconcileError> {
    let selector = label_selector_as_selector(&parent.spec.namespace_selector)?;

    let namespaces = client
        .list_namespaces(&selector)
        .await
        .map_err(ReconcileError::ListNamespaces)?;
    let matched = select_namespaces(&selector, namespaces);

    let external_secret_name = parent.external_secret_name();

    let removed = removed_namespaces(&matched, &status.provisioned_namespaces);
    let mut failed =
        remove_old_namespaces(client, parent, &removed, &external_secret_name).await;

    let mut provisioned = Vec::with_capacity(matched.len());
    for namespace in matched.iter().map(ResourceExt::name_any) {
        let key = ChildKey::new(parent, &namespace, &external_secret_name);
        match sync_namespace(client, parent, &key).await {
            Ok(operation) => {
                info!("ExternalSecret {} {}", key, operation.as_str());
                provisioned.push(namespace);
            }
            Err(e) => {
                error!("Failed to synchronize ExternalSecret {}: {}", key, e);
                failed.insert(namespace, e.reason().to_string());
            }
        }
    }

    apply_cycle_outcome(status, provisioned, &failed, matched.len(), chrono::Utc::now());
    Ok(())
}

async fn sync_namespace(
    client: &dyn ClusterClient,
    parent: &ClusterExternalSecret,
    key: &ChildKey,
) -> Result<ChildOperation, ChildSyncError> {
    let existing = check_for_error(
        client
            .get_external_secret_metadata(&key.namespace, &key.name)
            .await,
    )?;
    resolve_external_secret(client, parent, existing.as_ref(), key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ClusterExternalSecretSpec;

    fn parent(refresh_interval: Option<&str>) -> ClusterExternalSecret {
        ClusterExternalSecret::new(
            "shared",
            ClusterExternalSecretSpec {
                refresh_interval: refresh_interval.map(str::to_string),
                ..ClusterExternalSecretSpec::default()
            },
        )
    }

    #[test]
    fn test_effective_interval_defaults() {
        let default = Duration::from_secs(3600);
        assert_eq!(effective_interval(&parent(None), default), default);
    }

    #[test]
    fn test_effective_interval_uses_refresh_interval() {
        let interval = effective_interval(&parent(Some("1m30s")), Duration::from_secs(3600));
        assert_eq!(interval, Duration::from_secs(90));
    }

    #[test]
    fn test_effective_interval_accepts_fractional_hours() {
        let interval = effective_interval(&parent(Some("1.5h")), Duration::from_secs(3600));
        assert_eq!(interval, Duration::from_secs(5400));
    }

    #[test]
    fn test_effective_interval_invalid_falls_back() {
        let default = Duration::from_secs(3600);
        assert_eq!(effective_interval(&parent(Some("soon")), default), default);
        assert_eq!(effective_interval(&parent(Some("")), default), default);
    }
}
