//! Operator endpoint: Prometheus scraping and a health probe.
//!
//! `/healthz` answers 200 while the session is registered and 503 at any
//! other time. The body carries the session state and the generation of the
//! live bindings, so an operator can confirm a rehash landed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::registry::LiveBindings;
use crate::session::SessionState;

/// Shared state behind `/healthz`.
#[derive(Debug, Clone)]
pub struct BotStatus {
    session: watch::Receiver<SessionState>,
    live: Arc<LiveBindings>,
}

impl BotStatus {
    pub fn new(session: watch::Receiver<SessionState>, live: Arc<LiveBindings>) -> Self {
        Self { session, live }
    }
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn healthz_handler(State(status): State<BotStatus>) -> (StatusCode, String) {
    let state = *status.session.borrow();
    let code = match state {
        SessionState::Connected { registered: true } => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = format!("session: {state}\ngeneration: {}\n", status.live.generation());
    (code, body)
}

pub fn router(status: BotStatus) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(status)
}

/// Serve the operator endpoint on `addr` until `shutdown` fires.
///
/// A bind failure is logged and the task ends; the bot keeps running
/// without the endpoint.
pub async fn serve(addr: SocketAddr, status: BotStatus, shutdown: CancellationToken) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind operator endpoint");
            return;
        }
    };
    info!(%addr, "Operator endpoint listening (/metrics, /healthz)");

    let stop = async move { shutdown.cancelled().await };
    if let Err(e) = axum::serve(listener, router(status))
        .with_graceful_shutdown(stop)
        .await
    {
        error!(error = %e, "Operator endpoint failed");
    }
}
