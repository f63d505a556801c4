//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::infrastructure::resilience::{CircuitBreakerStats, CircuitState};
use crate::notification::OrchestratorStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub ledger_backend: &'static str,
    pub gateway: CircuitBreakerStats,
    pub scheduler: SchedulerHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresHealthResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<CircuitBreakerStats>,
}

#[derive(Debug, Serialize)]
pub struct SchedulerHealthResponse {
    pub enabled: bool,
    pub backend: &'static str,
    pub interval_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct PostgresHealthResponse {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
    pub circuit_breaker: CircuitBreakerStats,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub notifications: OrchestratorStatsSnapshot,
    pub gateway: CircuitBreakerStats,
    pub chunk_size: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = state.orchestrator.dispatcher().circuit_breaker().stats();

    let postgres = match &state.postgres_pool {
        Some(pool) => Some(PostgresHealthResponse {
            connected: pool.ping().await,
            pool_size: pool.pool().size(),
            idle_connections: pool.pool().num_idle() as u32,
            circuit_breaker: pool.circuit_breaker().stats(),
        }),
        None => None,
    };

    let redis = state
        .redis_pool
        .as_ref()
        .map(|pool| pool.circuit_breaker().stats());

    let degraded = gateway.state == CircuitState::Open
        || postgres.as_ref().is_some_and(|p| !p.connected)
        || redis.as_ref().is_some_and(|r| r.state == CircuitState::Open);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        ledger_backend: state.orchestrator.ledger().backend_type(),
        gateway,
        scheduler: SchedulerHealthResponse {
            enabled: state.scheduler.is_enabled(),
            backend: state.scheduler.store().backend_type(),
            interval_seconds: state.scheduler.interval().as_secs(),
        },
        postgres,
        redis,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let dispatcher = state.orchestrator.dispatcher();

    Json(StatsResponse {
        notifications: state.orchestrator.stats().snapshot(),
        gateway: dispatcher.circuit_breaker().stats(),
        chunk_size: dispatcher.chunk_size(),
    })
}
