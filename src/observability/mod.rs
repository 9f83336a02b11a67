//! # Observability
//!
//! - `metrics`: Prometheus metrics collection behind the `MetricsSink` seam

pub mod metrics;

// Re-export for convenience
pub use metrics::*;
