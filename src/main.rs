//! # ClusterExternalSecret Controller
//!
//! A Kubernetes controller that projects a cluster-scoped `ClusterExternalSecret`
//! into an `ExternalSecret` in every namespace matching its label selector.
//!
//! ## Overview
//!
//! 1. **Selecting namespaces** - Evaluates `namespaceSelector` against the live namespaces
//! 2. **Projecting the template** - Creates or overwrites one `ExternalSecret` per matching namespace
//! 3. **Cleaning up** - Deletes the `ExternalSecret` from namespaces that stop matching
//! 4. **Reporting** - Records provisioned and failed namespaces plus a `Ready` condition
//!
//! Namespace label changes and edits to generated ExternalSecrets trigger a
//! reconciliation straight away; otherwise each resource is revisited every
//! `refreshInterval`.

use anyhow::Result;
use cluster_external_secret_controller::runtime::{
    initialization::initialize, watch_loop::run_watch_loop,
};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.client,
        init.reconciler,
        init.server_state,
        &init.config,
    )
    .await
}
