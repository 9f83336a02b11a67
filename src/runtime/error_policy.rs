//! # Error Policy
//!
//! Error handling for the controller watch loop.
//!
//! Failed reconciliations are retried at a fixed interval: the same cadence
//! the ClusterExternalSecret would be reconciled at anyway. There is no
//! backoff escalation.

use crate::controller::reconciler::{effective_interval, ReconcileError, Reconciler};
use crate::crd::ClusterExternalSecret;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Requeue a failed ClusterExternalSecret after its effective interval
pub fn error_policy(
    parent: Arc<ClusterExternalSecret>,
    error: &ReconcileError,
    ctx: Arc<Reconciler>,
) -> Action {
    let interval = effective_interval(&parent, ctx.requeue_interval);
    warn!(
        "Reconciliation of ClusterExternalSecret {} failed: {}, retrying in {:?}",
        parent.name_any(),
        error,
        interval
    );
    Action::requeue(interval)
}

/// How a watch stream error should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old, the watch re-lists on its own
    Expired,
    /// API server storage is (re)initializing
    TooManyRequests,
    /// Object or CRD missing
    NotFound,
    Other,
}

/// Classify a watch error from its debug rendering
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    // 404 before 401: a plain-text 404 body surfaces as a serde error mentioning WatchFailed
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");

    if (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::TooManyRequests
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a controller stream error and pause where retrying right away won't help
pub async fn handle_watch_stream_error(error_string: &str, restart_delay: Duration) {
    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "Watch authentication failed (401 Unauthorized), check the controller's ClusterRole and ServiceAccount: {}",
                error_string
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will re-list");
        }
        WatchErrorKind::TooManyRequests => {
            warn!(
                "API server storage reinitializing (429), pausing {:?}",
                restart_delay
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404), the ClusterExternalSecret may have been deleted or the CRD is missing: {}",
                error_string
            );
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(restart_delay).await;
        }
    }
}
