//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue interval when a ClusterExternalSecret sets no refreshInterval
pub const DEFAULT_REQUEUE_INTERVAL: &str = "1h";

/// Default maximum number of ClusterExternalSecrets reconciled at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default delay before restarting the watch loop after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Page size used when listing ClusterExternalSecrets for namespace fan-out
/// Bounds memory use on clusters with many ClusterExternalSecrets
pub const PARENT_LIST_PAGE_SIZE: u32 = 100;

/// Field manager recorded on writes made by this controller
pub const FIELD_MANAGER: &str = "cluster-external-secret-controller";

/// Condition type carried in the ClusterExternalSecret status
pub const CONDITION_TYPE_READY: &str = "Ready";
