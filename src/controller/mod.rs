//! # Controller
//!
//! Core controller modules for the ClusterExternalSecret controller.
//!
//! - `client`: Kubernetes API operations behind the `ClusterClient` trait
//! - `fanout`: Maps namespace events to the ClusterExternalSecrets selecting them
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod client;
pub mod fanout;
pub mod reconciler;
pub mod server;
