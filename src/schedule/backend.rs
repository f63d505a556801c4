//! Backend trait for time-bounded records (promotional campaigns and the like).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ScheduleStoreError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Schedule store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Corrupt schedule row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Draft,
    Paused,
    Active,
    Expired,
}

impl WindowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowStatus::Draft => "draft",
            WindowStatus::Paused => "paused",
            WindowStatus::Active => "active",
            WindowStatus::Expired => "expired",
        }
    }

    /// Statuses the scheduler may move to Active when their window opens.
    pub fn is_activatable(&self) -> bool {
        matches!(self, WindowStatus::Draft | WindowStatus::Paused)
    }
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowStatus {
    type Err = ScheduleStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(WindowStatus::Draft),
            "paused" => Ok(WindowStatus::Paused),
            "active" => Ok(WindowStatus::Active),
            "expired" => Ok(WindowStatus::Expired),
            other => Err(ScheduleStoreError::Corrupt(format!("unknown status '{}'", other))),
        }
    }
}

/// A record that is live during `[starts_at, ends_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRecord {
    pub id: Uuid,
    pub name: String,
    pub status: WindowStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledRecord {
    pub fn new(
        name: &str,
        status: WindowStatus,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Self, ScheduleStoreError> {
        if ends_at <= starts_at {
            return Err(ScheduleStoreError::InvalidWindow(format!(
                "ends_at {} is not after starts_at {}",
                ends_at, starts_at
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status,
            starts_at,
            ends_at,
            updated_at: Utc::now(),
        })
    }

    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.ends_at <= now
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

/// Storage for scheduled records.
///
/// The two transition methods must each be a single conditional bulk update
/// so concurrent writers (manual edits, a second scheduler instance) can
/// never lose an update. Re-applying either one is a no-op.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    fn backend_type(&self) -> &'static str;

    /// Active records with `ends_at <= now` become Expired. Returns the count.
    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64, ScheduleStoreError>;

    /// Draft/Paused records with `starts_at <= now < ends_at` become Active.
    async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, ScheduleStoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ScheduledRecord>, ScheduleStoreError>;

    /// Insert or replace a record by id.
    async fn upsert(&self, record: &ScheduledRecord) -> Result<(), ScheduleStoreError>;
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_window_must_be_ordered() {
        let now = Utc::now();
        assert!(matches!(
            ScheduledRecord::new("spring", WindowStatus::Draft, now, now),
            Err(ScheduleStoreError::InvalidWindow(_))
        ));
        assert!(ScheduledRecord::new("spring", WindowStatus::Draft, now, now + Duration::hours(1)).is_ok());
    }

    #[test]
    fn test_window_bounds_are_half_open() {
        let now = Utc::now();
        let record =
            ScheduledRecord::new("spring", WindowStatus::Active, now - Duration::hours(1), now)
                .unwrap();
        assert!(record.is_elapsed(now));
        assert!(!record.is_open(now));
        assert!(record.is_open(now - Duration::minutes(1)));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("paused".parse::<WindowStatus>().unwrap(), WindowStatus::Paused);
        assert!("archived".parse::<WindowStatus>().is_err());
        assert!(WindowStatus::Draft.is_activatable());
        assert!(!WindowStatus::Expired.is_activatable());
    }
}
