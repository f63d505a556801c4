//! PostgreSQL-based ledger backend.
//!
//! Table structure (see `migrations/0001_notification_ledger.sql`):
//! - `notification_ledger` - one row per logical send attempt; `seq` breaks
//!   `created_at` ties so "most recent" is total.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::postgres::{PostgresPool, PostgresPoolError};

use super::backend::{LedgerError, LedgerStatus, LedgerStore, NotificationLedgerEntry};

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    entity_id: String,
    delivery_type: String,
    status: String,
    title: String,
    success_count: i32,
    failure_count: i32,
    forced: bool,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<LedgerRow> for NotificationLedgerEntry {
    type Error = LedgerError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            entity_id: row.entity_id,
            delivery_type: row.delivery_type,
            status: row.status.parse()?,
            title: row.title,
            success_count: row.success_count.max(0) as u32,
            failure_count: row.failure_count.max(0) as u32,
            forced: row.forced,
            created_at: row.created_at,
            finalized_at: row.finalized_at,
        })
    }
}

impl From<PostgresPoolError> for LedgerError {
    fn from(err: PostgresPoolError) -> Self {
        match err {
            PostgresPoolError::Sqlx(e) => LedgerError::Postgres(e),
            PostgresPoolError::CircuitOpen => {
                LedgerError::Unavailable("PostgreSQL circuit breaker is open".to_string())
            }
        }
    }
}

const SELECT_COLUMNS: &str = "id, entity_id, delivery_type, status, title, success_count, \
     failure_count, forced, created_at, finalized_at";

pub struct PostgresLedgerStore {
    pool: PostgresPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, entry: &NotificationLedgerEntry) -> Result<(), LedgerError> {
        let entry = entry.clone();
        self.pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query(
                    r#"
                    INSERT INTO notification_ledger
                        (id, entity_id, delivery_type, status, title, success_count,
                         failure_count, forced, created_at, finalized_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(entry.id)
                .bind(&entry.entity_id)
                .bind(&entry.delivery_type)
                .bind(entry.status.as_str())
                .bind(&entry.title)
                .bind(entry.success_count as i32)
                .bind(entry.failure_count as i32)
                .bind(entry.forced)
                .bind(entry.created_at)
                .bind(entry.finalized_at)
                .execute(&pool)
                .await
            })
            .await?;

        tracing::trace!("Ledger row inserted into PostgreSQL");
        Ok(())
    }

    async fn update(&self, entry: &NotificationLedgerEntry) -> Result<(), LedgerError> {
        let id = entry.id;
        let entry = entry.clone();
        let result = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query(
                    r#"
                    UPDATE notification_ledger
                    SET status = $2, success_count = $3, failure_count = $4, finalized_at = $5
                    WHERE id = $1
                    "#,
                )
                .bind(entry.id)
                .bind(entry.status.as_str())
                .bind(entry.success_count as i32)
                .bind(entry.failure_count as i32)
                .bind(entry.finalized_at)
                .execute(&pool)
                .await
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }
        Ok(())
    }

    async fn latest_live(
        &self,
        entity_id: &str,
        delivery_type: &str,
    ) -> Result<Option<NotificationLedgerEntry>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM notification_ledger \
             WHERE entity_id = $1 AND delivery_type = $2 AND status <> 'dry_run' \
             ORDER BY created_at DESC, seq DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let entity_id = entity_id.to_string();
        let delivery_type = delivery_type.to_string();

        let row: Option<LedgerRow> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as(&sql)
                    .bind(entity_id)
                    .bind(delivery_type)
                    .fetch_optional(&pool)
                    .await
            })
            .await?;

        row.map(NotificationLedgerEntry::try_from).transpose()
    }

    async fn entries_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<NotificationLedgerEntry>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM notification_ledger WHERE entity_id = $1 \
             ORDER BY created_at DESC, seq DESC",
            SELECT_COLUMNS
        );
        let entity_id = entity_id.to_string();

        let rows: Vec<LedgerRow> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as(&sql).bind(entity_id).fetch_all(&pool).await
            })
            .await?;

        rows.into_iter().map(NotificationLedgerEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> LedgerRow {
        LedgerRow {
            id: Uuid::new_v4(),
            entity_id: "post-1".to_string(),
            delivery_type: "new_content".to_string(),
            status: status.to_string(),
            title: "Hello".to_string(),
            success_count: 2,
            failure_count: 1,
            forced: false,
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    #[test]
    fn test_row_conversion() {
        let entry = NotificationLedgerEntry::try_from(row("sent")).unwrap();
        assert_eq!(entry.status, LedgerStatus::Sent);
        assert_eq!(entry.success_count, 2);
        assert_eq!(entry.failure_count, 1);
    }

    #[test]
    fn test_row_with_unknown_status_is_corrupt() {
        assert!(matches!(
            NotificationLedgerEntry::try_from(row("archived")),
            Err(LedgerError::Corrupt(_))
        ));
    }

    #[test]
    fn test_circuit_open_maps_to_unavailable() {
        let err: LedgerError = PostgresPoolError::CircuitOpen.into();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}
