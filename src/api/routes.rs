use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::notifications::{ledger_entries, notify};
use super::scheduler::run_tick;

/// Unauthenticated probes
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
}

/// Routes mounted under `/api/v1` behind the API key check
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", post(notify))
        .route("/notifications/ledger/{entity_id}", get(ledger_entries))
        .route("/scheduler/tick", post(run_tick))
}
