//! PostgreSQL-based schedule store.
//!
//! Table structure (see `migrations/0002_scheduled_campaigns.sql`):
//! - `scheduled_campaigns` - one row per time-bounded record

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::postgres::{PostgresPool, PostgresPoolError};

use super::backend::{ScheduleStore, ScheduleStoreError, ScheduledRecord};

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    name: String,
    status: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for ScheduledRecord {
    type Error = ScheduleStoreError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            status: row.status.parse()?,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<PostgresPoolError> for ScheduleStoreError {
    fn from(err: PostgresPoolError) -> Self {
        match err {
            PostgresPoolError::Sqlx(e) => ScheduleStoreError::Postgres(e),
            PostgresPoolError::CircuitOpen => {
                ScheduleStoreError::Unavailable("PostgreSQL circuit breaker is open".to_string())
            }
        }
    }
}

pub struct PostgresScheduleStore {
    pool: PostgresPool,
}

impl PostgresScheduleStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    async fn bulk_update(&self, sql: &'static str, now: DateTime<Utc>) -> Result<u64, ScheduleStoreError> {
        let result = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query(sql).bind(now).execute(&pool).await
            })
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ScheduleStore for PostgresScheduleStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64, ScheduleStoreError> {
        self.bulk_update(
            r#"
            UPDATE scheduled_campaigns
            SET status = 'expired', updated_at = $1
            WHERE status = 'active' AND ends_at <= $1
            "#,
            now,
        )
        .await
    }

    async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, ScheduleStoreError> {
        self.bulk_update(
            r#"
            UPDATE scheduled_campaigns
            SET status = 'active', updated_at = $1
            WHERE status IN ('draft', 'paused') AND starts_at <= $1 AND ends_at > $1
            "#,
            now,
        )
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScheduledRecord>, ScheduleStoreError> {
        let row: Option<CampaignRow> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as(
                    "SELECT id, name, status, starts_at, ends_at, updated_at \
                     FROM scheduled_campaigns WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&pool)
                .await
            })
            .await?;

        row.map(ScheduledRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &ScheduledRecord) -> Result<(), ScheduleStoreError> {
        let record = record.clone();
        self.pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query(
                    r#"
                    INSERT INTO scheduled_campaigns (id, name, status, starts_at, ends_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (id) DO UPDATE SET
                        name = EXCLUDED.name,
                        status = EXCLUDED.status,
                        starts_at = EXCLUDED.starts_at,
                        ends_at = EXCLUDED.ends_at,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(record.id)
                .bind(&record.name)
                .bind(record.status.as_str())
                .bind(record.starts_at)
                .bind(record.ends_at)
                .bind(record.updated_at)
                .execute(&pool)
                .await
            })
            .await?;

        Ok(())
    }
}
