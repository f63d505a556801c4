//! Delivery ledger: the persisted idempotency record of logical sends.
//!
//! # Backend Architecture
//!
//! - `MemoryLedgerStore`: DashMap-backed, process lifetime only (default)
//! - `PostgresLedgerStore`: durable rows in `notification_ledger`
//!
//! Use `create_ledger_store()` to build the backend named in configuration.

mod backend;
mod memory_backend;
mod postgres_backend;

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::postgres::PostgresPool;

pub use backend::{LedgerError, LedgerStatus, LedgerStore, NotificationLedgerEntry};
pub use memory_backend::MemoryLedgerStore;
pub use postgres_backend::PostgresLedgerStore;

/// Create a ledger backend based on configuration.
///
/// - `"postgres"`: Returns a `PostgresLedgerStore` if a pool is provided
/// - `"memory"` (default): Returns a `MemoryLedgerStore`
pub fn create_ledger_store(
    config: &LedgerConfig,
    pool: Option<PostgresPool>,
) -> Arc<dyn LedgerStore> {
    match config.backend.as_str() {
        "postgres" => {
            if let Some(pool) = pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL ledger store");
                Arc::new(PostgresLedgerStore::new(pool))
            } else {
                tracing::warn!(
                    "PostgreSQL ledger requested but no pool provided, falling back to memory; \
                     idempotency will not survive restarts"
                );
                Arc::new(MemoryLedgerStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory ledger store");
            Arc::new(MemoryLedgerStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_falls_back_to_memory() {
        let config = LedgerConfig {
            backend: "postgres".to_string(),
        };
        assert_eq!(create_ledger_store(&config, None).backend_type(), "memory");
        assert_eq!(
            create_ledger_store(&LedgerConfig::default(), None).backend_type(),
            "memory"
        );
    }
}
