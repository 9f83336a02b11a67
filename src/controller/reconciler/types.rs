//! # Types
//!
//! Core types for the reconciler.

use crate::controller::client::ClusterClient;
use crate::observability::MetricsSink;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ERR_GET_CES: &str = "could not get ClusterExternalSecret";
pub const ERR_PATCH_STATUS: &str = "unable to patch status";
pub const ERR_CONVERT_LABEL_SELECTOR: &str = "unable to convert labelselector";
pub const ERR_NAMESPACES: &str = "could not get namespaces from selector";
pub const ERR_GET_EXISTING_ES: &str = "could not get existing ExternalSecret";
pub const ERR_CREATING_OR_UPDATING: &str = "could not create or update ExternalSecret";
pub const ERR_SET_CTRL_REFERENCE: &str = "could not set the controller owner reference";
pub const ERR_SECRET_ALREADY_EXISTS: &str = "external secret already exists in namespace";
pub const ERR_NAMESPACES_FAILED: &str = "one or more namespaces failed";
pub const ERR_FAILED_TO_DELETE: &str =
    "external secret in non matching namespace could not be deleted";

/// Errors that abort a whole reconciliation cycle
///
/// Per-namespace failures never surface here; they are recorded in the
/// ClusterExternalSecret status instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unable to convert labelselector: {0}")]
    InvalidSelector(String),
    #[error("could not get namespaces from selector: {0:#}")]
    ListNamespaces(anyhow::Error),
}

/// Shared context handed to every reconciliation
#[derive(Clone)]
pub struct Reconciler {
    pub client: Arc<dyn ClusterClient>,
    pub metrics: Arc<dyn MetricsSink>,
    /// Cadence used when a ClusterExternalSecret sets no refreshInterval
    pub requeue_interval: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("requeue_interval", &self.requeue_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        metrics: Arc<dyn MetricsSink>,
        requeue_interval: Duration,
    ) -> Self {
        Self {
            client,
            metrics,
            requeue_interval,
        }
    }
}
