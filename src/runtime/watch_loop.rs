//! # Watch Loop
//!
//! Controller watch loop that monitors ClusterExternalSecret resources and
//! triggers reconciliation when they, the namespaces they select, or the
//! ExternalSecrets they own change.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::ClusterExternalSecret;
use crate::runtime::error_policy::{error_policy, handle_watch_stream_error};
use crate::runtime::namespace_watch::{external_secret_triggers, spawn_namespace_fanout};
use anyhow::Context;
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop
///
/// Restarts the controller whenever its stream ends, until a shutdown signal
/// marks the server as not ready.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) -> Result<(), anyhow::Error> {
    let parents: Api<ClusterExternalSecret> = Api::all(client.clone());
    let restart_delay = config.watch_restart_delay_duration();

    // Mark the server not ready on SIGTERM/SIGINT so the loop below stops restarting
    let shutdown =
        ShutdownSignal::register().context("Failed to register shutdown signal handlers")?;
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown.recv().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
    });

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let (namespace_triggers, fanout_task) =
            spawn_namespace_fanout(client.clone(), Arc::clone(&reconciler.client));
        let triggers =
            futures::stream::select(namespace_triggers, external_secret_triggers(client.clone()));

        info!(
            "Starting controller watch loop (max {} concurrent reconciliations)...",
            config.max_concurrent_reconciliations
        );
        Controller::new(parents.clone(), watcher::Config::default().any_semantic())
            .reconcile_on(triggers)
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::clone(&reconciler))
            .for_each(|result| async move {
                match result {
                    Ok((parent, _action)) => debug!("Reconciled {}", parent.name),
                    // already logged by the reconciler and the error policy
                    Err(controller::Error::ReconcilerFailed(_, parent)) => {
                        debug!("Reconciliation of {} failed", parent.name);
                    }
                    Err(e) => handle_watch_stream_error(&format!("{e:?}"), restart_delay).await,
                }
            })
            .instrument(tracing::info_span!("controller.watch", operation = "watch_loop"))
            .await;

        fanout_task.abort();

        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            config.watch_restart_delay_secs
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves on SIGINT or, on unix, SIGTERM (what the kubelet sends)
///
/// Handlers are installed by `register`, so a signal delivered before
/// `recv` is polled is not lost.
#[derive(Debug)]
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Install the signal handlers
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Wait for the first shutdown signal
    #[cfg(unix)]
    pub async fn recv(mut self) {
        tokio::select! {
            () = interrupt() => {}
            _ = self.terminate.recv() => {}
        }
    }

    /// Wait for the first shutdown signal
    #[cfg(not(unix))]
    pub async fn recv(self) {
        interrupt().await;
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
}
