//! # Runtime
//!
//! Process-level wiring for the controller.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `namespace_watch`: namespace and ExternalSecret events turned into reconcile triggers
//! - `watch_loop`: the kube-runtime `Controller` and its restart loop
//! - `error_policy`: fixed-interval retry and watch error handling

pub mod error_policy;
pub mod initialization;
pub mod namespace_watch;
pub mod watch_loop;
