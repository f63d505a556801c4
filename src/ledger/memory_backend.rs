//! In-memory ledger backend using DashMap.
//!
//! Rows are lost on restart, so idempotency only holds for the lifetime of
//! the process. Intended for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{LedgerError, LedgerStore, NotificationLedgerEntry};

/// Per-entity row lists in insertion order.
#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: DashMap<String, Vec<NotificationLedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all entities
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, entry: &NotificationLedgerEntry) -> Result<(), LedgerError> {
        self.entries
            .entry(entry.entity_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &NotificationLedgerEntry) -> Result<(), LedgerError> {
        let mut rows = self
            .entries
            .get_mut(&entry.entity_id)
            .ok_or(LedgerError::NotFound(entry.id))?;

        let row = rows
            .iter_mut()
            .find(|row| row.id == entry.id)
            .ok_or(LedgerError::NotFound(entry.id))?;

        *row = entry.clone();
        Ok(())
    }

    async fn latest_live(
        &self,
        entity_id: &str,
        delivery_type: &str,
    ) -> Result<Option<NotificationLedgerEntry>, LedgerError> {
        Ok(self.entries.get(entity_id).and_then(|rows| {
            rows.iter()
                .rev()
                .find(|row| row.delivery_type == delivery_type && row.status.is_live())
                .cloned()
        }))
    }

    async fn entries_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<NotificationLedgerEntry>, LedgerError> {
        Ok(self
            .entries
            .get(entity_id)
            .map(|rows| rows.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStatus;

    #[tokio::test]
    async fn test_latest_live_skips_dry_runs_and_other_types() {
        let store = MemoryLedgerStore::new();

        let mut sent = NotificationLedgerEntry::pending("post-1", "new_content", "Hi", false);
        sent.finalize(LedgerStatus::Sent, 3, 0);
        store.insert(&sent).await.unwrap();
        store
            .insert(&NotificationLedgerEntry::dry_run("post-1", "new_content", "Hi", 3))
            .await
            .unwrap();
        store
            .insert(&NotificationLedgerEntry::pending("post-1", "approval", "Hi", false))
            .await
            .unwrap();

        let latest = store.latest_live("post-1", "new_content").await.unwrap().unwrap();
        assert_eq!(latest.id, sent.id);
        assert!(store.latest_live("post-2", "new_content").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_row() {
        let store = MemoryLedgerStore::new();
        let mut entry = NotificationLedgerEntry::pending("post-1", "new_content", "Hi", false);
        store.insert(&entry).await.unwrap();

        entry.finalize(LedgerStatus::Failed, 0, 5);
        store.update(&entry).await.unwrap();

        let rows = store.entries_for_entity("post-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, LedgerStatus::Failed);
        assert_eq!(rows[0].failure_count, 5);
    }

    #[tokio::test]
    async fn test_update_unknown_row_fails() {
        let store = MemoryLedgerStore::new();
        let entry = NotificationLedgerEntry::pending("post-1", "new_content", "Hi", false);
        assert!(matches!(
            store.update(&entry).await,
            Err(LedgerError::NotFound(id)) if id == entry.id
        ));
    }

    #[tokio::test]
    async fn test_entries_newest_first() {
        let store = MemoryLedgerStore::new();
        let first = NotificationLedgerEntry::pending("post-1", "new_content", "one", false);
        let second = NotificationLedgerEntry::pending("post-1", "new_content", "two", true);
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        let rows = store.entries_for_entity("post-1").await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(store.len(), 2);
    }
}
