use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::notification::NotificationOrchestrator;
use crate::postgres::PostgresPool;
use crate::redis::RedisPool;
use crate::schedule::ExpiryScheduler;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<NotificationOrchestrator>,
    pub scheduler: Arc<ExpiryScheduler>,
    pub postgres_pool: Option<PostgresPool>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        orchestrator: Arc<NotificationOrchestrator>,
        scheduler: Arc<ExpiryScheduler>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            orchestrator,
            scheduler,
            postgres_pool: None,
            redis_pool: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_postgres(mut self, pool: Option<PostgresPool>) -> Self {
        self.postgres_pool = pool;
        self
    }

    pub fn with_redis(mut self, pool: Option<Arc<RedisPool>>) -> Self {
        self.redis_pool = pool;
        self
    }
}
