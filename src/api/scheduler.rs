use axum::{extract::State, Json};

use crate::error::Result;
use crate::schedule::TickReport;
use crate::server::AppState;

/// POST /api/v1/scheduler/tick - run one pass now, regardless of the enable flag
pub async fn run_tick(State(state): State<AppState>) -> Result<Json<TickReport>> {
    let report = state.scheduler.tick().await?;
    Ok(Json(report))
}
