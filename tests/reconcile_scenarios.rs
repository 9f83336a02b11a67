//! # Reconciliation Tests
//!
//! Drives whole reconciliation cycles against an in-memory cluster and checks
//! the resulting ExternalSecrets and ClusterExternalSecret status.

mod common;

use cluster_external_secret_controller::controller::reconciler::{
    reconcile_by_name, ReconcileError, Reconciler,
};
use cluster_external_secret_controller::crd::{
    ClusterExternalSecretSpec, ClusterExternalSecretStatus, ExternalSecretMetadata,
    NamespaceFailure,
};
use cluster_external_secret_controller::runtime::error_policy::error_policy;
use common::{
    external_secret_owned_by, foreign_external_secret, labels, parent, template, FakeCluster,
    RecordingMetrics,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn setup() -> (Arc<FakeCluster>, Arc<RecordingMetrics>, Reconciler) {
    let cluster = Arc::new(FakeCluster::new());
    let metrics = Arc::new(RecordingMetrics::default());
    let reconciler = Reconciler::new(cluster.clone(), metrics.clone(), HOUR);
    (cluster, metrics, reconciler)
}

fn status(cluster: &FakeCluster, name: &str) -> ClusterExternalSecretStatus {
    cluster.parent(name).status.unwrap_or_default()
}

fn failure(namespace: &str, reason: &str) -> NamespaceFailure {
    NamespaceFailure {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    }
}

fn prod_cluster() -> (Arc<FakeCluster>, Arc<RecordingMetrics>, Reconciler) {
    let (cluster, metrics, reconciler) = setup();
    cluster.add_namespace("a", &[("env", "prod")]);
    cluster.add_namespace("b", &[("env", "prod")]);
    cluster.add_namespace("c", &[("env", "dev")]);
    cluster.add_parent(parent("shared", &[("env", "prod")]));
    (cluster, metrics, reconciler)
}

#[tokio::test]
async fn test_creates_external_secret_in_every_matching_namespace() {
    let (cluster, _metrics, reconciler) = prod_cluster();

    let action = reconcile_by_name(&reconciler, "shared").await.unwrap();
    assert_eq!(action, Action::requeue(HOUR));

    assert_eq!(cluster.child_namespaces(), vec!["a", "b"]);
    let owner_uid = cluster.parent("shared").metadata.uid.unwrap();
    for namespace in ["a", "b"] {
        let child = cluster.child(namespace, "shared").unwrap();
        assert_eq!(child.spec, template());
        let owner = &child.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.uid, owner_uid);
        assert_eq!(owner.kind, "ClusterExternalSecret");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["a", "b"]);
    assert!(status.failed_namespaces.is_empty());
    let ready = status.ready_condition().unwrap();
    assert_eq!(ready.status, "True");
    assert_eq!(ready.reason.as_deref(), Some("Synced"));
    assert_eq!(cluster.patches().len(), 1);
}

#[tokio::test]
async fn test_unowned_external_secret_is_a_naming_conflict() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    let hand_made = foreign_external_secret("b", "shared");
    cluster.put_child(hand_made.clone());

    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert_eq!(cluster.child("b", "shared").unwrap(), hand_made);
    assert!(cluster.child("a", "shared").is_some());

    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["a"]);
    assert_eq!(
        status.failed_namespaces,
        vec![failure("b", "external secret already exists in namespace")]
    );
    let ready = status.ready_condition().unwrap();
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some("PartiallySynced"));
    assert_eq!(
        ready.message.as_deref(),
        Some("one or more namespaces failed: 1 of 2 namespaces failed")
    );
}

#[tokio::test]
async fn test_external_secret_controlled_by_another_owner_is_left_alone() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    let taken = external_secret_owned_by("a", "shared", "uid-someone-else");
    cluster.put_child(taken.clone());

    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert_eq!(cluster.child("a", "shared").unwrap(), taken);
    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["b"]);
    assert_eq!(
        status.failed_namespaces,
        vec![failure("a", "could not set the controller owner reference")]
    );
}

#[tokio::test]
async fn test_relabelled_namespace_loses_its_external_secret() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    reconcile_by_name(&reconciler, "shared").await.unwrap();
    assert_eq!(status(&cluster, "shared").provisioned_namespaces, vec!["a", "b"]);

    cluster.relabel_namespace("b", &[("env", "dev")]);
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert!(cluster.child("b", "shared").is_none());
    assert!(cluster.child("a", "shared").is_some());
    assert_eq!(cluster.child_deletes(), vec![("b".to_string(), "shared".to_string())]);

    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["a"]);
    assert!(status.failed_namespaces.is_empty());
}

#[tokio::test]
async fn test_removal_skips_external_secret_owned_by_someone_else() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    // b drops out of the selector, and its ExternalSecret changed hands meanwhile
    cluster.relabel_namespace("b", &[("env", "dev")]);
    let taken = external_secret_owned_by("b", "shared", "uid-someone-else");
    cluster.put_child(taken.clone());

    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert_eq!(cluster.child("b", "shared").unwrap(), taken);
    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["a"]);
    assert_eq!(
        status.failed_namespaces,
        vec![failure("b", "external secret already exists in namespace")]
    );
}

#[tokio::test]
async fn test_failed_delete_is_reported() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    cluster.relabel_namespace("b", &[("env", "dev")]);
    cluster.fail_delete_child_in("b");
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert!(cluster.child("b", "shared").is_some());
    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["a"]);
    assert_eq!(
        status.failed_namespaces,
        vec![failure(
            "b",
            "external secret in non matching namespace could not be deleted"
        )]
    );
    assert_eq!(status.ready_condition().unwrap().status, "False");
}

#[tokio::test]
async fn test_already_deleted_external_secret_counts_as_removed() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    cluster.relabel_namespace("b", &[("env", "dev")]);
    cluster.remove_child("b", "shared");
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert!(cluster.child_deletes().is_empty());
    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["a"]);
    assert!(status.failed_namespaces.is_empty());
}

#[tokio::test]
async fn test_invalid_selector_aborts_before_touching_namespaces() {
    let (cluster, metrics, reconciler) = prod_cluster();
    reconcile_by_name(&reconciler, "shared").await.unwrap();
    let before = status(&cluster, "shared");
    let writes_before = cluster.child_writes();

    let mut spec = cluster.parent("shared").spec;
    spec.namespace_selector = LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: "env".to_string(),
            operator: "In".to_string(),
            values: None,
        }]),
        ..LabelSelector::default()
    };
    cluster.update_parent_spec("shared", spec);

    let result = reconcile_by_name(&reconciler, "shared").await;
    let error = result.unwrap_err();
    assert!(matches!(error, ReconcileError::InvalidSelector(_)));

    // status still sent once, with nothing in it
    assert_eq!(status(&cluster, "shared"), before);
    assert_eq!(cluster.patches().len(), 2);
    assert_eq!(cluster.patches()[1].1, serde_json::json!({}));
    assert_eq!(cluster.child_writes(), writes_before);
    assert!(cluster.child_deletes().is_empty());
    assert_eq!(metrics.errors(), 1);

    let action = error_policy(
        Arc::new(cluster.parent("shared")),
        &error,
        Arc::new(reconciler),
    );
    assert_eq!(action, Action::requeue(HOUR));
}

#[tokio::test]
async fn test_namespace_list_failure_is_fatal() {
    let (cluster, metrics, reconciler) = prod_cluster();
    cluster.fail_list_namespaces();

    let result = reconcile_by_name(&reconciler, "shared").await;

    assert!(matches!(result, Err(ReconcileError::ListNamespaces(_))));
    assert!(cluster.child_namespaces().is_empty());
    assert_eq!(cluster.patches().len(), 1);
    assert_eq!(metrics.errors(), 1);
}

#[tokio::test]
async fn test_second_cycle_changes_nothing() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    reconcile_by_name(&reconciler, "shared").await.unwrap();
    let first_status = status(&cluster, "shared");
    let first_child = cluster.child("a", "shared");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert_eq!(status(&cluster, "shared"), first_status);
    assert_eq!(cluster.child("a", "shared"), first_child);
    assert_eq!(cluster.patches()[1].1, serde_json::json!({}));
}

#[tokio::test]
async fn test_drifted_spec_is_restored() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    let mut drifted = cluster.child("a", "shared").unwrap();
    drifted.spec = foreign_external_secret("a", "shared").spec;
    cluster.put_child(drifted);

    reconcile_by_name(&reconciler, "shared").await.unwrap();
    assert_eq!(cluster.child("a", "shared").unwrap().spec, template());
}

#[tokio::test]
async fn test_per_namespace_failures_are_isolated() {
    let (cluster, _metrics, reconciler) = setup();
    for namespace in ["a", "b", "c"] {
        cluster.add_namespace(namespace, &[("env", "prod")]);
    }
    cluster.add_parent(parent("shared", &[("env", "prod")]));
    cluster.fail_get_child_in("a");
    cluster.fail_write_child_in("c");

    reconcile_by_name(&reconciler, "shared").await.unwrap();

    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["b"]);
    assert_eq!(
        status.failed_namespaces,
        vec![
            failure("a", "could not get existing ExternalSecret"),
            failure("c", "could not create or update ExternalSecret"),
        ]
    );
    assert_eq!(
        status.ready_condition().unwrap().message.as_deref(),
        Some("one or more namespaces failed: 2 of 3 namespaces failed")
    );
}

#[tokio::test]
async fn test_every_namespace_failing_is_sync_failed() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    cluster.fail_write_child_in("a");
    cluster.fail_write_child_in("b");

    reconcile_by_name(&reconciler, "shared").await.unwrap();

    let status = status(&cluster, "shared");
    assert!(status.provisioned_namespaces.is_empty());
    assert_eq!(
        status.ready_condition().unwrap().reason.as_deref(),
        Some("SyncFailed")
    );
}

#[tokio::test]
async fn test_status_lists_are_sorted() {
    let (cluster, _metrics, reconciler) = setup();
    for namespace in ["zeta", "mid", "alpha", "omega", "beta"] {
        cluster.add_namespace(namespace, &[("env", "prod")]);
    }
    cluster.add_parent(parent("shared", &[("env", "prod")]));
    cluster.reverse_namespace_order();
    cluster.fail_write_child_in("omega");
    cluster.fail_write_child_in("beta");

    reconcile_by_name(&reconciler, "shared").await.unwrap();

    let status = status(&cluster, "shared");
    assert_eq!(status.provisioned_namespaces, vec!["alpha", "mid", "zeta"]);
    let failed: Vec<_> = status
        .failed_namespaces
        .iter()
        .map(|f| f.namespace.as_str())
        .collect();
    assert_eq!(failed, vec!["beta", "omega"]);
}

#[tokio::test]
async fn test_name_override_metadata_and_refresh_interval() {
    let (cluster, _metrics, reconciler) = setup();
    cluster.add_namespace("a", &[("env", "prod")]);
    let mut shared = parent("shared", &[("env", "prod")]);
    shared.spec = ClusterExternalSecretSpec {
        external_secret_name: Some("db-credentials".to_string()),
        external_secret_metadata: Some(ExternalSecretMetadata {
            labels: Some(labels(&[("team", "platform")])),
            annotations: Some(labels(&[("owner", "sre")])),
        }),
        refresh_interval: Some("15m".to_string()),
        ..shared.spec
    };
    cluster.add_parent(shared);

    let action = reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(900)));
    assert!(cluster.child("a", "shared").is_none());
    let child = cluster.child("a", "db-credentials").unwrap();
    assert_eq!(child.metadata.labels, Some(labels(&[("team", "platform")])));
    assert_eq!(child.metadata.annotations, Some(labels(&[("owner", "sre")])));
}

#[tokio::test]
async fn test_missing_resource_is_a_no_op() {
    let (cluster, metrics, reconciler) = setup();

    let action = reconcile_by_name(&reconciler, "gone").await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(cluster.patches().is_empty());
    assert_eq!(metrics.errors(), 0);
}

#[tokio::test]
async fn test_status_patch_failure_does_not_fail_the_cycle() {
    let (cluster, _metrics, reconciler) = prod_cluster();
    cluster.fail_patch_status();

    let action = reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert_eq!(action, Action::requeue(HOUR));
    assert_eq!(cluster.child_namespaces(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_metrics_recorded_per_cycle() {
    let (_cluster, metrics, reconciler) = prod_cluster();

    reconcile_by_name(&reconciler, "shared").await.unwrap();
    reconcile_by_name(&reconciler, "shared").await.unwrap();

    assert_eq!(metrics.reconciliations(), 2);
    assert_eq!(metrics.errors(), 0);
    let durations = metrics.durations();
    assert_eq!(durations.len(), 2);
    assert_eq!(durations[0].0, "shared");
    assert_eq!(durations[0].1, "");
}
