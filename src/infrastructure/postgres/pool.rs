//! PostgreSQL connection pool with circuit breaker integration.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::infrastructure::resilience::CircuitBreaker;

#[derive(Debug, Error)]
pub enum PostgresPoolError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

/// Shared PostgreSQL pool used by the ledger, schedule store and device directory.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    circuit_breaker: Arc<CircuitBreaker>,
    database_url: String,
}

impl PostgresPool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, PostgresPoolError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
            .connect(&config.url)
            .await?;

        let this = Self {
            pool,
            circuit_breaker: Arc::new(CircuitBreaker::new("postgres")),
            database_url: config.url.clone(),
        };

        tracing::info!(
            pool_size = config.pool_size,
            url = %this.database_url_masked(),
            "PostgreSQL connection pool created"
        );

        Ok(this)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// Run `operation` unless the breaker is open, recording its outcome.
    pub async fn execute_with_circuit_breaker<T, F, Fut>(
        &self,
        operation: F,
    ) -> Result<T, PostgresPoolError>
    where
        F: FnOnce(PgPool) -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.circuit_breaker.allow_request() {
            return Err(PostgresPoolError::CircuitOpen);
        }

        match operation(self.pool.clone()).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                // Row-level errors say nothing about database availability
                if !matches!(e, sqlx::Error::RowNotFound | sqlx::Error::Database(_)) {
                    self.circuit_breaker.record_failure();
                }
                Err(PostgresPoolError::Sqlx(e))
            }
        }
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        self.execute_with_circuit_breaker(|pool| async move {
            sqlx::query("SELECT 1").execute(&pool).await
        })
        .await
        .is_ok()
    }

    pub fn database_url_masked(&self) -> String {
        mask_url(&self.database_url)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "postgres://" has its own colon; only mask a user:password pair
            if url[..colon_pos].contains("//") && !url[..colon_pos].ends_with('/') {
                return format!("{}***{}", &url[..colon_pos + 1], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_url_hides_password() {
        let masked = mask_url("postgres://push:secret123@db:5432/push");
        assert_eq!(masked, "postgres://push:***@db:5432/push");
    }

    #[test]
    fn test_mask_url_without_credentials() {
        assert_eq!(mask_url("postgres://db:5432/push"), "postgres://db:5432/push");
        assert_eq!(mask_url("postgres://push@db/push"), "postgres://push@db/push");
    }

    #[test]
    fn test_error_display() {
        let err = PostgresPoolError::CircuitOpen;
        assert!(err.to_string().contains("Circuit breaker is open"));
    }
}
