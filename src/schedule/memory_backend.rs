//! In-memory schedule store using DashMap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::backend::{ScheduleStore, ScheduleStoreError, ScheduledRecord, WindowStatus};

#[derive(Default)]
pub struct MemoryScheduleStore {
    records: DashMap<Uuid, ScheduledRecord>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply `to` to every record matching `predicate`. Each shard is updated
    /// under its write lock, so a concurrent `upsert` is either seen or wins.
    fn transition<F>(&self, now: DateTime<Utc>, to: WindowStatus, predicate: F) -> u64
    where
        F: Fn(&ScheduledRecord) -> bool,
    {
        let mut changed = 0;
        for mut record in self.records.iter_mut() {
            if predicate(record.value()) {
                record.status = to;
                record.updated_at = now;
                changed += 1;
            }
        }
        changed
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64, ScheduleStoreError> {
        Ok(self.transition(now, WindowStatus::Expired, |r| {
            r.status == WindowStatus::Active && r.is_elapsed(now)
        }))
    }

    async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, ScheduleStoreError> {
        Ok(self.transition(now, WindowStatus::Active, |r| {
            r.status.is_activatable() && r.is_open(now)
        }))
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScheduledRecord>, ScheduleStoreError> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn upsert(&self, record: &ScheduledRecord) -> Result<(), ScheduleStoreError> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(status: WindowStatus, start_offset_h: i64, end_offset_h: i64) -> ScheduledRecord {
        let now = Utc::now();
        ScheduledRecord::new(
            "campaign",
            status,
            now + Duration::hours(start_offset_h),
            now + Duration::hours(end_offset_h),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_expire_only_touches_elapsed_active_records() {
        let store = MemoryScheduleStore::new();
        let elapsed = record(WindowStatus::Active, -3, -1);
        let running = record(WindowStatus::Active, -1, 2);
        let paused_elapsed = record(WindowStatus::Paused, -3, -1);
        for r in [&elapsed, &running, &paused_elapsed] {
            store.upsert(r).await.unwrap();
        }

        assert_eq!(store.expire_elapsed(Utc::now()).await.unwrap(), 1);
        assert_eq!(store.get(elapsed.id).await.unwrap().unwrap().status, WindowStatus::Expired);
        assert_eq!(store.get(running.id).await.unwrap().unwrap().status, WindowStatus::Active);
        assert_eq!(
            store.get(paused_elapsed.id).await.unwrap().unwrap().status,
            WindowStatus::Paused
        );

        // Second application changes nothing
        assert_eq!(store.expire_elapsed(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_activate_opens_due_drafts_and_paused() {
        let store = MemoryScheduleStore::new();
        let draft = record(WindowStatus::Draft, -1, 1);
        let paused = record(WindowStatus::Paused, -1, 1);
        let future = record(WindowStatus::Draft, 1, 2);
        let expired = record(WindowStatus::Expired, -1, 1);
        for r in [&draft, &paused, &future, &expired] {
            store.upsert(r).await.unwrap();
        }

        assert_eq!(store.activate_due(Utc::now()).await.unwrap(), 2);
        assert_eq!(store.get(draft.id).await.unwrap().unwrap().status, WindowStatus::Active);
        assert_eq!(store.get(paused.id).await.unwrap().unwrap().status, WindowStatus::Active);
        assert_eq!(store.get(future.id).await.unwrap().unwrap().status, WindowStatus::Draft);
        assert_eq!(store.get(expired.id).await.unwrap().unwrap().status, WindowStatus::Expired);
    }
}
