//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT, DEFAULT_REQUEUE_INTERVAL,
    DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use crate::controller::reconciler::validation::parse_kubernetes_duration;
use std::time::Duration;
use tracing::warn;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Default reconcile cadence for ClusterExternalSecrets without a refreshInterval
    /// Also the fixed retry interval after a failed reconciliation
    pub requeue_interval: Duration,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Maximum concurrent reconciliations
    /// Limits how many ClusterExternalSecrets can be reconciled simultaneously
    pub max_concurrent_reconciliations: u16,
    /// Delay before the watch loop is restarted after its stream ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Global log level used when RUST_LOG is unset (error, warn, info, debug, trace)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_interval: default_requeue_interval(),
            metrics_port: DEFAULT_METRICS_PORT,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Values that fail to parse fall back to their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let requeue_interval = match lookup("REQUEUE_INTERVAL") {
            Some(raw) => parse_kubernetes_duration(&raw).unwrap_or_else(|e| {
                warn!(
                    "Invalid REQUEUE_INTERVAL '{}': {}, using default {}",
                    raw, e, DEFAULT_REQUEUE_INTERVAL
                );
                defaults.requeue_interval
            }),
            None => defaults.requeue_interval,
        };

        Self {
            requeue_interval,
            metrics_port: parsed_or_default(&lookup, "METRICS_PORT", defaults.metrics_port),
            max_concurrent_reconciliations: parsed_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            watch_restart_delay_secs: parsed_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_format),
        }
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

fn default_requeue_interval() -> Duration {
    // One hour; kept in sync with DEFAULT_REQUEUE_INTERVAL
    Duration::from_secs(3600)
}

fn parsed_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
