//! Time-bounded records and the background scheduler that keeps their
//! status in step with the clock.
//!
//! # Backend Architecture
//!
//! - `MemoryScheduleStore`: DashMap-backed (default)
//! - `PostgresScheduleStore`: `scheduled_campaigns` table
//!
//! Use `create_schedule_store()` to build the backend named in configuration.

mod backend;
mod memory_backend;
mod postgres_backend;
mod task;

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::postgres::PostgresPool;

pub use backend::{ScheduleStore, ScheduleStoreError, ScheduledRecord, WindowStatus};
pub use memory_backend::MemoryScheduleStore;
pub use postgres_backend::PostgresScheduleStore;
pub use task::{ExpiryScheduler, TickReport};

/// Create a schedule store based on configuration.
///
/// - `"postgres"`: Returns a `PostgresScheduleStore` if a pool is provided
/// - `"memory"` (default): Returns a `MemoryScheduleStore`
pub fn create_schedule_store(
    config: &SchedulerConfig,
    pool: Option<PostgresPool>,
) -> Arc<dyn ScheduleStore> {
    match config.backend.as_str() {
        "postgres" => {
            if let Some(pool) = pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL schedule store");
                Arc::new(PostgresScheduleStore::new(pool))
            } else {
                tracing::warn!(
                    "PostgreSQL schedule store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryScheduleStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory schedule store");
            Arc::new(MemoryScheduleStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_falls_back_to_memory() {
        let config = SchedulerConfig {
            backend: "postgres".to_string(),
            ..Default::default()
        };
        assert_eq!(create_schedule_store(&config, None).backend_type(), "memory");
    }
}
