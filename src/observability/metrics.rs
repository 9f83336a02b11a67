//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `cluster_external_secret_reconcile_duration_seconds` - Duration of the last reconciliation, per resource
//! - `cluster_external_secret_reconciliations_total` - Total number of reconciliations
//! - `cluster_external_secret_reconciliation_errors_total` - Total number of reconciliation errors
//!
//! The reconciler only sees the [`MetricsSink`] trait. [`ControllerMetrics`]
//! is the Prometheus implementation and owns its registry, so tests can
//! create as many as they like without clashing registrations.

use anyhow::{Context, Result};
use prometheus::{Encoder, GaugeVec, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the reconciler reports what it did
pub trait MetricsSink: Send + Sync {
    /// Record how long the latest reconciliation of a resource took
    fn observe_reconcile_duration(&self, name: &str, namespace: &str, duration: Duration);

    fn increment_reconciliations(&self);

    fn increment_reconciliation_errors(&self);
}

/// Prometheus-backed [`MetricsSink`]
#[derive(Debug, Clone)]
pub struct ControllerMetrics {
    registry: Registry,
    reconcile_duration: GaugeVec,
    reconciliations_total: IntCounter,
    reconciliation_errors_total: IntCounter,
}

impl ControllerMetrics {
    /// Create the metrics and register them on a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconcile_duration = GaugeVec::new(
            Opts::new(
                "cluster_external_secret_reconcile_duration_seconds",
                "Duration of the last reconciliation of a ClusterExternalSecret in seconds",
            ),
            &["name", "namespace"],
        )
        .context("Failed to create reconcile duration metric")?;
        let reconciliations_total = IntCounter::new(
            "cluster_external_secret_reconciliations_total",
            "Total number of reconciliations",
        )
        .context("Failed to create reconciliations metric")?;
        let reconciliation_errors_total = IntCounter::new(
            "cluster_external_secret_reconciliation_errors_total",
            "Total number of reconciliation errors",
        )
        .context("Failed to create reconciliation errors metric")?;

        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(reconciliations_total.clone()))?;
        registry.register(Box::new(reconciliation_errors_total.clone()))?;

        Ok(Self {
            registry,
            reconcile_duration,
            reconciliations_total,
            reconciliation_errors_total,
        })
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
    }

    #[must_use]
    pub fn reconciliations(&self) -> u64 {
        self.reconciliations_total.get()
    }

    #[must_use]
    pub fn reconciliation_errors(&self) -> u64 {
        self.reconciliation_errors_total.get()
    }
}

impl MetricsSink for ControllerMetrics {
    fn observe_reconcile_duration(&self, name: &str, namespace: &str, duration: Duration) {
        self.reconcile_duration
            .with_label_values(&[name, namespace])
            .set(duration.as_secs_f64());
    }

    fn increment_reconciliations(&self) {
        self.reconciliations_total.inc();
    }

    fn increment_reconciliation_errors(&self) {
        self.reconciliation_errors_total.inc();
    }
}

/// Records the reconcile duration when dropped
///
/// Held for the whole cycle, so early returns are measured too.
pub struct ReconcileTimer {
    sink: Arc<dyn MetricsSink>,
    name: String,
    namespace: String,
    start: Instant,
}

impl ReconcileTimer {
    #[must_use]
    pub fn start(sink: Arc<dyn MetricsSink>, name: &str, namespace: &str) -> Self {
        Self {
            sink,
            name: name.to_string(),
            namespace: namespace.to_string(),
            start: Instant::now(),
        }
    }
}

impl std::fmt::Debug for ReconcileTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileTimer")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Drop for ReconcileTimer {
    fn drop(&mut self) {
        self.sink
            .observe_reconcile_duration(&self.name, &self.namespace, self.start.elapsed());
    }
}
