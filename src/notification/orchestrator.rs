use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{LedgerError, LedgerStatus, LedgerStore, NotificationLedgerEntry};
use crate::metrics::{DeliveryMetrics, LedgerMetrics};
use crate::push::{validate_recipients, BatchDispatcher, DeviceToken, PushPayload};

use super::directory::{DirectoryError, InvalidTokenSink, RecipientResolver};
use super::guard::{guard_key, GuardError, GuardLease, SendGuard};

/// Attempts at writing the final status before falling back to Failed
const FINALIZE_ATTEMPTS: u32 = 3;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{0}")]
    Validation(String),

    #[error("Entity '{0}' does not exist")]
    EntityNotFound(String),

    #[error("A send for {entity_id}/{delivery_type} is already in progress")]
    SendInProgress {
        entity_id: String,
        delivery_type: String,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Device directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Send guard error: {0}")]
    Guard(#[from] GuardError),
}

/// Caller switches for one `notify` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NotifyOptions {
    /// Send even if a Sent row already exists for the pair
    #[serde(default)]
    pub force: bool,
    /// Resolve and validate recipients, record a DryRun row, send nothing
    #[serde(default)]
    pub dry_run: bool,
}

/// A fully resolved logical send, built after recipient lookup.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub entity_id: String,
    pub delivery_type: String,
    pub payload: PushPayload,
    pub recipients: Vec<DeviceToken>,
}

/// What `notify` did with the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyDisposition {
    /// Recipients were dispatched and a new row finalized
    Dispatched,
    /// A Sent row existed; it is returned unchanged
    AlreadySent,
    /// Projection only
    DryRun,
    /// Another caller holds the send guard; its Pending row is returned
    InProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyOutcome {
    pub disposition: NotifyDisposition,
    pub entry: NotificationLedgerEntry,
    /// Tokens dropped by validation before dispatch
    pub rejected_tokens: usize,
}

impl NotifyOutcome {
    fn reused(disposition: NotifyDisposition, entry: NotificationLedgerEntry) -> Self {
        Self {
            disposition,
            entry,
            rejected_tokens: 0,
        }
    }
}

/// Counters for the orchestrator
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    pub notify_calls: AtomicU64,
    pub idempotent_hits: AtomicU64,
    pub dispatched: AtomicU64,
    pub failed_sends: AtomicU64,
    pub dry_runs: AtomicU64,
    pub in_progress: AtomicU64,
    pub tokens_delivered: AtomicU64,
    pub tokens_failed: AtomicU64,
    pub tokens_rejected: AtomicU64,
    pub invalid_tokens: AtomicU64,
}

impl OrchestratorStats {
    pub fn snapshot(&self) -> OrchestratorStatsSnapshot {
        OrchestratorStatsSnapshot {
            notify_calls: self.notify_calls.load(Ordering::Relaxed),
            idempotent_hits: self.idempotent_hits.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed_sends: self.failed_sends.load(Ordering::Relaxed),
            dry_runs: self.dry_runs.load(Ordering::Relaxed),
            in_progress: self.in_progress.load(Ordering::Relaxed),
            tokens_delivered: self.tokens_delivered.load(Ordering::Relaxed),
            tokens_failed: self.tokens_failed.load(Ordering::Relaxed),
            tokens_rejected: self.tokens_rejected.load(Ordering::Relaxed),
            invalid_tokens: self.invalid_tokens.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatsSnapshot {
    pub notify_calls: u64,
    pub idempotent_hits: u64,
    pub dispatched: u64,
    pub failed_sends: u64,
    pub dry_runs: u64,
    pub in_progress: u64,
    pub tokens_delivered: u64,
    pub tokens_failed: u64,
    pub tokens_rejected: u64,
    pub invalid_tokens: u64,
}

/// Composes recipient lookup, validation, dispatch and the ledger into one
/// idempotent "notify about this entity" operation.
///
/// A non-forced call is a no-op once a Sent row exists for
/// `(entity_id, delivery_type)`. Pending and Failed rows never block a retry.
pub struct NotificationOrchestrator {
    resolver: Arc<dyn RecipientResolver>,
    dispatcher: BatchDispatcher,
    ledger: Arc<dyn LedgerStore>,
    token_sink: Arc<dyn InvalidTokenSink>,
    guard: Option<Arc<dyn SendGuard>>,
    stats: OrchestratorStats,
}

impl NotificationOrchestrator {
    pub fn new(
        resolver: Arc<dyn RecipientResolver>,
        dispatcher: BatchDispatcher,
        ledger: Arc<dyn LedgerStore>,
        token_sink: Arc<dyn InvalidTokenSink>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            ledger,
            token_sink,
            guard: None,
            stats: OrchestratorStats::default(),
        }
    }

    /// Serialize real sends per pair through `guard`.
    pub fn with_guard(mut self, guard: Arc<dyn SendGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn stats(&self) -> &OrchestratorStats {
        &self.stats
    }

    /// Notify every recipient of `entity_id` at most once per `delivery_type`.
    ///
    /// # Errors
    ///
    /// Delivery failures are recorded in the ledger row, never returned.
    /// Only invalid input, an unknown entity, a busy guard with no visible
    /// Pending row, or a storage failure produce an error.
    #[tracing::instrument(
        name = "orchestrator.notify",
        skip(self, payload, options),
        fields(force = options.force, dry_run = options.dry_run)
    )]
    pub async fn notify(
        &self,
        entity_id: &str,
        delivery_type: &str,
        payload: PushPayload,
        options: NotifyOptions,
    ) -> Result<NotifyOutcome, NotifyError> {
        self.stats.notify_calls.fetch_add(1, Ordering::Relaxed);

        validate_input(entity_id, delivery_type, &payload)?;

        if !self.resolver.entity_exists(entity_id).await? {
            return Err(NotifyError::EntityNotFound(entity_id.to_string()));
        }

        if !options.force {
            if let Some(existing) = self.already_sent(entity_id, delivery_type).await? {
                return Ok(NotifyOutcome::reused(NotifyDisposition::AlreadySent, existing));
            }
        }

        let request = NotificationRequest {
            entity_id: entity_id.to_string(),
            delivery_type: delivery_type.to_string(),
            recipients: self.resolver.resolve_recipients(entity_id).await?,
            payload,
        };

        if options.dry_run {
            return self.dry_run(request).await;
        }

        let Some(guard) = &self.guard else {
            return self.send(request, options.force).await;
        };

        let key = guard_key(entity_id, delivery_type);
        let Some(lease) = guard.try_acquire(&key).await? else {
            return self.busy(entity_id, delivery_type).await;
        };

        // The previous holder may have finished between our check and acquiring
        let recheck = if options.force {
            Ok(None)
        } else {
            self.already_sent(entity_id, delivery_type).await
        };
        let result = match recheck {
            Ok(Some(existing)) => Ok(NotifyOutcome::reused(NotifyDisposition::AlreadySent, existing)),
            Ok(None) => {
                self.send_holding(guard.as_ref(), &lease, request, options.force)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = guard.release(&lease).await {
            tracing::warn!(key = %key, error = %e, "Failed to release send guard");
        }

        result
    }

    /// All ledger rows for an entity, newest first.
    pub async fn ledger_entries(
        &self,
        entity_id: &str,
    ) -> Result<Vec<NotificationLedgerEntry>, NotifyError> {
        Ok(self.ledger.entries_for_entity(entity_id).await?)
    }

    async fn already_sent(
        &self,
        entity_id: &str,
        delivery_type: &str,
    ) -> Result<Option<NotificationLedgerEntry>, NotifyError> {
        let latest = self.ledger.latest_live(entity_id, delivery_type).await?;

        match latest {
            Some(entry) if entry.status == LedgerStatus::Sent => {
                self.stats.idempotent_hits.fetch_add(1, Ordering::Relaxed);
                LedgerMetrics::record_idempotent_hit();
                tracing::info!(
                    entity_id = %entity_id,
                    delivery_type = %delivery_type,
                    ledger_id = %entry.id,
                    "Already sent, skipping"
                );
                Ok(Some(entry))
            }
            _ => Ok(None),
        }
    }

    async fn busy(&self, entity_id: &str, delivery_type: &str) -> Result<NotifyOutcome, NotifyError> {
        self.stats.in_progress.fetch_add(1, Ordering::Relaxed);

        match self.ledger.latest_live(entity_id, delivery_type).await? {
            Some(entry) if entry.status == LedgerStatus::Pending => {
                Ok(NotifyOutcome::reused(NotifyDisposition::InProgress, entry))
            }
            _ => Err(NotifyError::SendInProgress {
                entity_id: entity_id.to_string(),
                delivery_type: delivery_type.to_string(),
            }),
        }
    }

    async fn dry_run(&self, request: NotificationRequest) -> Result<NotifyOutcome, NotifyError> {
        let validated = validate_recipients(request.recipients);

        let entry = NotificationLedgerEntry::dry_run(
            &request.entity_id,
            &request.delivery_type,
            &request.payload.title,
            validated.valid.len() as u32,
        );
        self.ledger.insert(&entry).await?;

        self.stats.dry_runs.fetch_add(1, Ordering::Relaxed);
        LedgerMetrics::record_entry(entry.status.as_str());
        tracing::info!(
            entity_id = %entry.entity_id,
            delivery_type = %entry.delivery_type,
            would_send = validated.valid.len(),
            rejected = validated.rejected.len(),
            "Dry run recorded"
        );

        Ok(NotifyOutcome {
            disposition: NotifyDisposition::DryRun,
            entry,
            rejected_tokens: validated.rejected.len(),
        })
    }

    /// Run a send while renewing `lease`, so a send that outlives the lease
    /// TTL still excludes other callers.
    async fn send_holding(
        &self,
        guard: &dyn SendGuard,
        lease: &GuardLease,
        request: NotificationRequest,
        forced: bool,
    ) -> Result<NotifyOutcome, NotifyError> {
        let send = self.send(request, forced);
        tokio::pin!(send);

        let mut heartbeat = tokio::time::interval(renew_interval(guard.ttl()));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick is immediate and the lease is fresh
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = &mut send => return result,
                _ = heartbeat.tick() => match guard.renew(lease).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(key = %lease.key, "Send guard lease lost mid-send");
                    }
                    Err(e) => {
                        tracing::warn!(key = %lease.key, error = %e, "Failed to renew send guard");
                    }
                },
            }
        }
    }

    async fn send(
        &self,
        request: NotificationRequest,
        forced: bool,
    ) -> Result<NotifyOutcome, NotifyError> {
        let validated = validate_recipients(request.recipients);
        let rejected = validated.rejected.len();
        if rejected > 0 {
            self.stats
                .tokens_rejected
                .fetch_add(rejected as u64, Ordering::Relaxed);
            DeliveryMetrics::record_rejected(rejected as u64);
            tracing::debug!(rejected, "Dropped malformed device tokens");
        }

        let mut entry = NotificationLedgerEntry::pending(
            &request.entity_id,
            &request.delivery_type,
            &request.payload.title,
            forced,
        );
        self.ledger.insert(&entry).await?;

        let report = self.dispatcher.dispatch(&validated.valid, &request.payload).await;

        // Dead tokens are facts regardless of what happens to the ledger write
        let signals = report.invalid_token_signals();
        for signal in &signals {
            DeliveryMetrics::record_invalid_token();
            if let Err(e) = self.token_sink.on_invalid_token(signal).await {
                tracing::warn!(
                    token = %signal.token,
                    error = %e,
                    "Failed to report invalid token"
                );
            }
        }

        let status = if report.is_total_failure() {
            LedgerStatus::Failed
        } else {
            LedgerStatus::Sent
        };
        let delivered = report.delivered_count() as u32;
        let failed = report.failure_count() as u32;
        entry.finalize(status, delivered, failed);
        if let Err(e) = self.write_final(&entry).await {
            self.compensate(&mut entry).await;
            return Err(e.into());
        }

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        if status == LedgerStatus::Failed {
            self.stats.failed_sends.fetch_add(1, Ordering::Relaxed);
        }
        self.stats
            .tokens_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .tokens_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        self.stats
            .invalid_tokens
            .fetch_add(signals.len() as u64, Ordering::Relaxed);
        LedgerMetrics::record_entry(status.as_str());

        tracing::info!(
            entity_id = %entry.entity_id,
            delivery_type = %entry.delivery_type,
            ledger_id = %entry.id,
            status = %status,
            success = delivered,
            failure = failed,
            invalid_tokens = signals.len(),
            "Notification finalized"
        );

        Ok(NotifyOutcome {
            disposition: NotifyDisposition::Dispatched,
            entry,
            rejected_tokens: rejected,
        })
    }

    /// Persist the finalized row, retrying transient store failures.
    async fn write_final(&self, entry: &NotificationLedgerEntry) -> Result<(), LedgerError> {
        let mut attempt = 1;
        loop {
            match self.ledger.update(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(
                        ledger_id = %entry.id,
                        attempt,
                        error = %e,
                        "Ledger finalize failed, retrying"
                    );
                    tokio::time::sleep(FINALIZE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Last-chance write after finalize gave up: a row left Pending would
    /// look like a send that never finished.
    async fn compensate(&self, entry: &mut NotificationLedgerEntry) {
        let (delivered, failed) = (entry.success_count, entry.failure_count);
        entry.finalize(LedgerStatus::Failed, delivered, failed);

        match self.ledger.update(entry).await {
            Ok(()) => {
                self.stats.failed_sends.fetch_add(1, Ordering::Relaxed);
                LedgerMetrics::record_entry(entry.status.as_str());
                tracing::error!(
                    ledger_id = %entry.id,
                    "Ledger finalize failed; row marked failed"
                );
            }
            Err(e) => {
                tracing::error!(
                    ledger_id = %entry.id,
                    entity_id = %entry.entity_id,
                    delivery_type = %entry.delivery_type,
                    error = %e,
                    "Ledger finalize failed; row left pending"
                );
            }
        }
    }
}

fn renew_interval(ttl: Duration) -> Duration {
    (ttl / 3).max(Duration::from_millis(10))
}

fn validate_input(entity_id: &str, delivery_type: &str, payload: &PushPayload) -> Result<(), NotifyError> {
    if entity_id.trim().is_empty() {
        return Err(NotifyError::Validation("entity_id must not be empty".to_string()));
    }
    if delivery_type.trim().is_empty() {
        return Err(NotifyError::Validation(
            "delivery_type must not be empty".to_string(),
        ));
    }
    if payload.title.trim().is_empty() {
        return Err(NotifyError::Validation("title must not be empty".to_string()));
    }
    Ok(())
}
