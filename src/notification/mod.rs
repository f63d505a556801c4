//! Idempotent "notify about this entity" orchestration.
//!
//! # Collaborators
//!
//! - `RecipientResolver` / `InvalidTokenSink`: the device directory
//!   (`PostgresDeviceDirectory` in production)
//! - `LedgerStore`: the idempotency record
//! - `SendGuard` (optional): serializes concurrent sends for one pair
//!
//! Use `create_send_guard()` to build the guard named in configuration.

mod directory;
mod guard;
mod orchestrator;

pub use directory::{
    DirectoryError, InvalidTokenSink, LoggingTokenSink, PostgresDeviceDirectory,
    RecipientResolver,
};
pub use guard::{
    create_send_guard, guard_key, GuardError, GuardLease, LocalSendGuard, RedisSendGuard,
    SendGuard,
};
pub use orchestrator::{
    NotificationOrchestrator, NotificationRequest, NotifyDisposition, NotifyError,
    NotifyOptions, NotifyOutcome, OrchestratorStats, OrchestratorStatsSnapshot,
};
