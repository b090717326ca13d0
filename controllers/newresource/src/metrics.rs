//! Prometheus metrics and the probes endpoint.
//!
//! Serves `/metrics`, `/healthz` and `/readyz` on the configured bind
//! address. The counters are shared with the dispatch glue through an
//! `Arc<Metrics>`.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Controller metrics registry.
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    leader: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates and registers the controller metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "newresource_reconciliations_total",
                "Reconciliation passes by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;

        let leader = IntGauge::new(
            "newresource_leader",
            "1 when this replica holds leadership",
        )?;
        registry.register(Box::new(leader.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            leader,
        })
    }

    /// Records the outcome of one reconciliation pass.
    pub fn record_result(&self, success: bool) {
        let result = if success { "success" } else { "error" };
        self.reconciliations.with_label_values(&[result]).inc();
    }

    /// Flags whether this replica currently holds leadership.
    pub fn set_leader(&self, leader: bool) {
        self.leader.set(i64::from(leader));
    }

    fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// Normalizes a bind address, accepting the Go-style `:8080` shorthand.
pub fn parse_bind_addr(addr: &str) -> Result<SocketAddr, ControllerError> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    normalized
        .parse()
        .map_err(|err| ControllerError::InvalidConfig(format!("invalid bind address {addr}: {err}")))
}

/// Serves the metrics and probe routes until the process exits.
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<(), ControllerError> {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(probe))
        .route("/readyz", get(probe))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> Result<String, StatusCode> {
    metrics.render().map_err(|err| {
        error!("Failed to encode metrics: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn probe() -> &'static str {
    "ok"
}
