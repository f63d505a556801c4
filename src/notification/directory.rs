//! Collaborators owned by the device-registration side.
//!
//! The orchestrator never stores tokens itself: it asks a
//! [`RecipientResolver`] who to notify and reports dead tokens to an
//! [`InvalidTokenSink`].

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DirectoryConfig;
use crate::postgres::{PostgresPool, PostgresPoolError};
use crate::push::{DeviceToken, InvalidTokenSignal};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

impl From<PostgresPoolError> for DirectoryError {
    fn from(err: PostgresPoolError) -> Self {
        match err {
            PostgresPoolError::Sqlx(e) => DirectoryError::Postgres(e),
            PostgresPoolError::CircuitOpen => {
                DirectoryError::Unavailable("PostgreSQL circuit breaker is open".to_string())
            }
        }
    }
}

/// Resolves which devices should receive a notification about an entity.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn entity_exists(&self, entity_id: &str) -> Result<bool, DirectoryError>;

    async fn resolve_recipients(&self, entity_id: &str) -> Result<Vec<DeviceToken>, DirectoryError>;
}

/// Receives tokens the gateway confirmed dead so the owner can clear them.
#[async_trait]
pub trait InvalidTokenSink: Send + Sync {
    async fn on_invalid_token(&self, signal: &InvalidTokenSignal) -> Result<(), DirectoryError>;
}

/// Sink that only logs; for deployments where device storage polls elsewhere.
pub struct LoggingTokenSink;

#[async_trait]
impl InvalidTokenSink for LoggingTokenSink {
    async fn on_invalid_token(&self, signal: &InvalidTokenSignal) -> Result<(), DirectoryError> {
        tracing::info!(
            token = %signal.token,
            reason = %signal.reason,
            "Device token reported invalid"
        );
        Ok(())
    }
}

/// Device directory backed by the device-registration tables.
///
/// Queries come from configuration so the schema stays owned by the
/// registration service.
pub struct PostgresDeviceDirectory {
    pool: PostgresPool,
    config: DirectoryConfig,
}

impl PostgresDeviceDirectory {
    pub fn new(pool: PostgresPool, config: DirectoryConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl RecipientResolver for PostgresDeviceDirectory {
    async fn entity_exists(&self, entity_id: &str) -> Result<bool, DirectoryError> {
        let sql = self.config.entity_exists_query.clone();
        let entity_id = entity_id.to_string();

        let (exists,): (bool,) = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as(&sql).bind(entity_id).fetch_one(&pool).await
            })
            .await?;

        Ok(exists)
    }

    async fn resolve_recipients(&self, entity_id: &str) -> Result<Vec<DeviceToken>, DirectoryError> {
        let sql = self.config.recipients_query.clone();
        let entity_id = entity_id.to_string();

        let rows: Vec<(String,)> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                // Broadcast-style queries select every opted-in device and take no parameter
                let query = sqlx::query_as(&sql);
                let query = if sql.contains("$1") {
                    query.bind(entity_id)
                } else {
                    query
                };
                query.fetch_all(&pool).await
            })
            .await?;

        Ok(rows.into_iter().map(|(token,)| token).collect())
    }
}

#[async_trait]
impl InvalidTokenSink for PostgresDeviceDirectory {
    async fn on_invalid_token(&self, signal: &InvalidTokenSignal) -> Result<(), DirectoryError> {
        let sql = self.config.invalidate_token_query.clone();
        let signal = signal.clone();

        let result = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query(&sql)
                    .bind(&signal.token)
                    .bind(&signal.reason)
                    .execute(&pool)
                    .await
            })
            .await?;

        tracing::debug!(rows = result.rows_affected(), "Invalid token cleared in device store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_sink_accepts_signals() {
        let sink = LoggingTokenSink;
        let signal = InvalidTokenSignal {
            token: "ExponentPushToken[x]".to_string(),
            reason: "DeviceNotRegistered".to_string(),
        };
        assert!(sink.on_invalid_token(&signal).await.is_ok());
    }

    #[test]
    fn test_circuit_open_maps_to_unavailable() {
        let err: DirectoryError = PostgresPoolError::CircuitOpen.into();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
    }
}
