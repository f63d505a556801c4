//! Backend trait for the delivery ledger.
//!
//! One ledger row exists per logical send attempt, keyed by
//! `(entity_id, delivery_type)`. Rows are never deleted; a forced resend
//! adds a row instead of rewriting history.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Backend is temporarily unavailable (e.g., circuit breaker open)
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger entry {0} not found")]
    NotFound(Uuid),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Sent,
    Failed,
    DryRun,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Sent => "sent",
            LedgerStatus::Failed => "failed",
            LedgerStatus::DryRun => "dry_run",
        }
    }

    /// Whether this row counts toward the "already sent" gate.
    pub fn is_live(&self) -> bool {
        !matches!(self, LedgerStatus::DryRun)
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LedgerStatus::Pending),
            "sent" => Ok(LedgerStatus::Sent),
            "failed" => Ok(LedgerStatus::Failed),
            "dry_run" => Ok(LedgerStatus::DryRun),
            other => Err(LedgerError::Corrupt(format!("unknown status '{}'", other))),
        }
    }
}

/// Persistent record of one logical send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationLedgerEntry {
    pub id: Uuid,
    pub entity_id: String,
    pub delivery_type: String,
    pub status: LedgerStatus,
    pub title: String,
    pub success_count: u32,
    pub failure_count: u32,
    /// Set when the row was created by an explicit resend
    pub forced: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl NotificationLedgerEntry {
    pub fn pending(entity_id: &str, delivery_type: &str, title: &str, forced: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id: entity_id.to_string(),
            delivery_type: delivery_type.to_string(),
            status: LedgerStatus::Pending,
            title: title.to_string(),
            success_count: 0,
            failure_count: 0,
            forced,
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    /// A completed dry-run row with projected counts.
    pub fn dry_run(entity_id: &str, delivery_type: &str, title: &str, projected: u32) -> Self {
        let mut entry = Self::pending(entity_id, delivery_type, title, false);
        entry.status = LedgerStatus::DryRun;
        entry.success_count = projected;
        entry.finalized_at = Some(entry.created_at);
        entry
    }

    /// Move a pending row to its terminal state.
    pub fn finalize(&mut self, status: LedgerStatus, success_count: u32, failure_count: u32) {
        self.status = status;
        self.success_count = success_count;
        self.failure_count = failure_count;
        self.finalized_at = Some(Utc::now());
    }
}

/// Storage for ledger rows.
///
/// Every method touches at most one row; no multi-row transactions are
/// needed. Implementations must be thread-safe.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> &'static str;

    /// Persist a new row.
    async fn insert(&self, entry: &NotificationLedgerEntry) -> Result<(), LedgerError>;

    /// Overwrite the mutable fields of an existing row.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no row has `entry.id`.
    async fn update(&self, entry: &NotificationLedgerEntry) -> Result<(), LedgerError>;

    /// Most recent non-dry-run row for the pair, if any.
    async fn latest_live(
        &self,
        entity_id: &str,
        delivery_type: &str,
    ) -> Result<Option<NotificationLedgerEntry>, LedgerError>;

    /// All rows for an entity, newest first.
    async fn entries_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<NotificationLedgerEntry>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            LedgerStatus::Pending,
            LedgerStatus::Sent,
            LedgerStatus::Failed,
            LedgerStatus::DryRun,
        ] {
            assert_eq!(status.as_str().parse::<LedgerStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<LedgerStatus>().is_err());
    }

    #[test]
    fn test_dry_run_is_not_live() {
        let entry = NotificationLedgerEntry::dry_run("post-1", "new_content", "Hello", 4);
        assert_eq!(entry.status, LedgerStatus::DryRun);
        assert!(!entry.status.is_live());
        assert_eq!(entry.success_count, 4);
        assert!(entry.finalized_at.is_some());
    }

    #[test]
    fn test_finalize_sets_counts() {
        let mut entry = NotificationLedgerEntry::pending("post-1", "new_content", "Hello", true);
        assert!(entry.forced);
        entry.finalize(LedgerStatus::Sent, 2, 1);
        assert_eq!(entry.status, LedgerStatus::Sent);
        assert_eq!((entry.success_count, entry.failure_count), (2, 1));
        assert!(entry.finalized_at.is_some());
    }
}
