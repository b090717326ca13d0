//! NewResource Controller
//!
//! Minimal operator for the `NewResource` CRD: every observed object gets
//! `status.ready = true` written back through the status subresource.
//! Deletion between enqueue and processing is absorbed; every other store
//! error is handed back to the dispatch runtime for requeue.

mod controller;
mod error;
mod leader;
mod metrics;
mod reconciler;
mod store;

use crate::error::ControllerError;
use clap::Parser;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "newresource-controller")]
#[command(about = "Kubernetes controller for NewResource objects")]
#[command(version)]
struct Args {
    /// The address the metrics/probes endpoint binds to.
    #[arg(long, default_value = ":8080")]
    metrics_bind_address: String,

    /// Enable leader election so only one replica reconciles at a time.
    #[arg(long)]
    leader_elect: bool,

    /// Name of the leader-election lease.
    #[arg(long, default_value = "newresource-controller")]
    leader_election_id: String,

    /// Namespace to watch; all namespaces when unset.
    #[arg(long, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting NewResource Controller");
    info!("Configuration:");
    info!("  Metrics bind address: {}", args.metrics_bind_address);
    info!("  Leader election: {}", args.leader_elect);
    info!(
        "  Namespace: {}",
        args.watch_namespace.as_deref().unwrap_or("all namespaces")
    );

    // Initialize and run controller; any setup failure exits the process.
    let controller = Controller::new(
        args.metrics_bind_address,
        args.leader_elect,
        args.leader_election_id,
        args.watch_namespace,
    )
    .await?;
    controller.run().await?;

    Ok(())
}
