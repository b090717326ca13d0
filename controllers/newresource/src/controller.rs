//! Main controller bootstrap.
//!
//! Wires the reconciler to the kube-runtime dispatch loop, starts the
//! metrics endpoint and (optionally) leader election, then runs until a
//! termination signal or a subsystem failure. Setup failures here are
//! unrecoverable and tear the whole process down.

use crate::error::ControllerError;
use crate::leader::{self, LeaderElectionConfig, LeaderStatus};
use crate::metrics::{self, Metrics};
use crate::reconciler::Reconciler;
use crate::store::{KubeStore, ResourceId};
use crds::NewResource;
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::controller::{Action, Controller as DispatchLoop};
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared state handed to every reconcile invocation.
struct Context {
    reconciler: Reconciler<KubeStore>,
    metrics: Arc<Metrics>,
}

/// Main controller for NewResource management.
pub struct Controller {
    reconcile_loop: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
    leader_status: LeaderStatus,
    leader_elect: bool,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        metrics_bind_address: String,
        leader_elect: bool,
        leader_election_id: String,
        watch_namespace: Option<String>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing NewResource controller");

        // Create Kubernetes client
        let client = Client::try_default().await?;

        // Metrics and probes endpoint
        let metrics = Arc::new(Metrics::new()?);
        let bind_addr = metrics::parse_bind_addr(&metrics_bind_address)?;
        let metrics_server = tokio::spawn(metrics::serve(bind_addr, Arc::clone(&metrics)));

        // Leader election gate: reconciliation starts only once this replica
        // holds the lease.
        let leader_status = LeaderStatus::new();
        if leader_elect {
            let config = LeaderElectionConfig::new(leader_election_id);
            info!(
                holder = %config.holder_id,
                lease = %config.lease_name,
                "Starting leader election"
            );
            tokio::spawn(leader::run(
                client.clone(),
                config,
                leader_status.clone(),
            ));

            info!("Waiting for leadership...");
            while !leader_status.is_leader() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            info!("Elected as leader, starting reconciliation");
        } else {
            info!("Leader election disabled, running as leader");
            leader_status.force_leader();
        }
        metrics.set_leader(true);

        // Watch one namespace when configured, the whole cluster otherwise.
        let api: Api<NewResource> = match watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };

        let context = Arc::new(Context {
            reconciler: Reconciler::new(KubeStore::new(client)),
            metrics,
        });
        let reconcile_loop = tokio::spawn(run_dispatch(api, context));

        Ok(Self {
            reconcile_loop,
            metrics_server,
            leader_status,
            leader_elect,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("NewResource controller running");

        tokio::select! {
            result = &mut self.reconcile_loop => {
                result
                    .map_err(|e| ControllerError::Watch(format!("reconcile loop panicked: {e}")))??;
            }
            result = &mut self.metrics_server => {
                result
                    .map_err(|e| ControllerError::Watch(format!("metrics server panicked: {e}")))??;
                return Err(ControllerError::Watch("metrics server exited".to_string()));
            }
            () = leadership_lost(self.leader_status.clone(), self.leader_elect) => {
                return Err(ControllerError::Watch(
                    "lost leadership, shutting down for restart".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Resolves only when leader election is enabled and leadership goes away.
async fn leadership_lost(status: LeaderStatus, enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }
    loop {
        tokio::time::sleep(Duration::from_secs(2)).await;
        if !status.is_leader() {
            return;
        }
    }
}

/// Runs the per-key dispatch loop until a termination signal. The runtime
/// owns the work queue, trigger coalescing and requeue scheduling.
async fn run_dispatch(
    api: Api<NewResource>,
    context: Arc<Context>,
) -> Result<(), ControllerError> {
    DispatchLoop::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok(reference) => debug!("Reconciled {:?}", reference),
                Err(err) => warn!("Dispatch error: {}", err),
            }
        })
        .await;

    info!("Dispatch loop terminated");
    Ok(())
}

/// Dispatch glue: map the observed object to its identity and run one
/// reconciliation pass.
async fn reconcile(
    resource: Arc<NewResource>,
    ctx: Arc<Context>,
) -> Result<Action, ControllerError> {
    let id = identity_of(&resource)?;
    let outcome = ctx.reconciler.reconcile(&id).await;
    ctx.metrics.record_result(outcome.is_ok());
    outcome?;
    Ok(Action::await_change())
}

/// Requeue policy for failed passes; the error itself was already
/// propagated unmasked by the reconciler.
fn error_policy(resource: Arc<NewResource>, error: &ControllerError, _ctx: Arc<Context>) -> Action {
    warn!(
        "Reconcile failed for {}: {}",
        resource.metadata.name.as_deref().unwrap_or("<unknown>"),
        error
    );
    Action::requeue(Duration::from_secs(5))
}

fn identity_of(resource: &NewResource) -> Result<ResourceId, ControllerError> {
    let name = resource
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::InvalidConfig("NewResource missing name".to_string()))?;
    let namespace = resource.metadata.namespace.as_deref().unwrap_or("default");
    Ok(ResourceId::new(namespace, name))
}
