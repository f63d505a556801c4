use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::{AppError, Result};
use crate::ledger::NotificationLedgerEntry;
use crate::notification::{NotifyOptions, NotifyOutcome};
use crate::push::{Priority, PushPayload};
use crate::server::AppState;

/// Body of `POST /api/v1/notifications`
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub entity_id: String,
    /// Logical channel, e.g. "new_content" or "approval"
    pub delivery_type: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl NotifyRequest {
    fn into_parts(self) -> (String, String, PushPayload, NotifyOptions) {
        let payload = PushPayload {
            title: self.title,
            body: self.body,
            data: self.data,
            priority: self.priority,
        };
        let options = NotifyOptions {
            force: self.force,
            dry_run: self.dry_run,
        };
        (self.entity_id, self.delivery_type, payload, options)
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub entity_id: String,
    pub entries: Vec<NotificationLedgerEntry>,
}

/// POST /api/v1/notifications
///
/// The send runs in its own task: a client that disconnects mid-request
/// must not abandon a Pending row or a held send guard.
pub async fn notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<NotifyOutcome>> {
    let (entity_id, delivery_type, payload, options) = request.into_parts();
    let span = tracing::info_span!(
        "api.notify",
        entity_id = %entity_id,
        delivery_type = %delivery_type
    );

    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(
        async move {
            orchestrator
                .notify(&entity_id, &delivery_type, payload, options)
                .await
        }
        .instrument(span),
    )
    .await
    .map_err(|e| AppError::Internal(format!("notify task failed: {}", e)))??;

    Ok(Json(outcome))
}

/// GET /api/v1/notifications/ledger/{entity_id}
pub async fn ledger_entries(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<LedgerResponse>> {
    let entries = state.orchestrator.ledger_entries(&entity_id).await?;
    Ok(Json(LedgerResponse { entity_id, entries }))
}
