use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::SchedulerConfig;
use crate::metrics::SchedulerMetrics;

use super::{ScheduleStore, ScheduleStoreError};

/// Floor for the tick interval so a zero setting cannot spin on the store
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one scheduler pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub expired: u64,
    pub activated: u64,
    pub ran_at: DateTime<Utc>,
}

/// Periodically flips time-bounded records between Active and Expired.
///
/// The enable flag and interval are fixed at construction; tests drive
/// single passes through [`ExpiryScheduler::tick_at`].
pub struct ExpiryScheduler {
    store: Arc<dyn ScheduleStore>,
    interval: Duration,
    enabled: bool,
}

impl ExpiryScheduler {
    pub fn new(store: Arc<dyn ScheduleStore>, interval: Duration, enabled: bool) -> Self {
        Self {
            store,
            interval: interval.max(MIN_INTERVAL),
            enabled,
        }
    }

    pub fn from_config(store: Arc<dyn ScheduleStore>, config: &SchedulerConfig) -> Self {
        Self::new(
            store,
            Duration::from_secs(config.interval_seconds),
            config.enabled,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }

    /// Run a single pass against the current time.
    pub async fn tick(&self) -> Result<TickReport, ScheduleStoreError> {
        self.tick_at(Utc::now()).await
    }

    /// Run a single pass as of `now`.
    #[tracing::instrument(name = "scheduler.tick", skip(self))]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, ScheduleStoreError> {
        let result = async {
            let expired = self.store.expire_elapsed(now).await?;
            let activated = self.store.activate_due(now).await?;
            Ok::<_, ScheduleStoreError>(TickReport {
                expired,
                activated,
                ran_at: now,
            })
        }
        .await;

        match &result {
            Ok(report) => {
                SchedulerMetrics::record_tick(true);
                SchedulerMetrics::record_transitions(report.expired, report.activated);
                if report.expired > 0 || report.activated > 0 {
                    tracing::info!(
                        expired = report.expired,
                        activated = report.activated,
                        "Scheduled records transitioned"
                    );
                }
            }
            Err(e) => {
                SchedulerMetrics::record_tick(false);
                tracing::error!(error = %e, "Scheduler tick failed");
            }
        }

        result
    }

    /// Tick on the configured interval until `shutdown` fires.
    ///
    /// A failed tick is logged and the loop continues.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if !self.enabled {
            tracing::info!("Expiry scheduler disabled");
            return;
        }

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            backend = self.store.backend_type(),
            "Expiry scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Expiry scheduler received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    // Errors are already logged and counted inside tick
                    let _ = self.tick().await;
                }
            }
        }

        tracing::info!("Expiry scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::schedule::{MemoryScheduleStore, ScheduledRecord, WindowStatus};

    #[tokio::test]
    async fn test_tick_reports_transitions() {
        let store = Arc::new(MemoryScheduleStore::new());
        let now = Utc::now();
        let ended = ScheduledRecord::new(
            "ended",
            WindowStatus::Active,
            now - ChronoDuration::days(2),
            now - ChronoDuration::days(1),
        )
        .unwrap();
        let opening = ScheduledRecord::new(
            "opening",
            WindowStatus::Draft,
            now - ChronoDuration::minutes(1),
            now + ChronoDuration::days(1),
        )
        .unwrap();
        store.upsert(&ended).await.unwrap();
        store.upsert(&opening).await.unwrap();

        let scheduler = ExpiryScheduler::new(store.clone(), Duration::from_secs(60), true);
        let report = scheduler.tick_at(now).await.unwrap();
        assert_eq!((report.expired, report.activated), (1, 1));

        let report = scheduler.tick_at(now).await.unwrap();
        assert_eq!((report.expired, report.activated), (0, 0));
    }

    #[tokio::test]
    async fn test_disabled_run_returns_immediately() {
        let scheduler = ExpiryScheduler::new(
            Arc::new(MemoryScheduleStore::new()),
            Duration::from_secs(60),
            false,
        );
        let (_tx, rx) = broadcast::channel(1);

        tokio::time::timeout(Duration::from_secs(1), scheduler.run(rx))
            .await
            .expect("disabled scheduler should not loop");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = SchedulerConfig {
            enabled: true,
            interval_seconds: 0,
            backend: "memory".to_string(),
        };
        let scheduler = ExpiryScheduler::from_config(Arc::new(MemoryScheduleStore::new()), &config);
        assert_eq!(scheduler.interval(), MIN_INTERVAL);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let scheduler = Arc::new(ExpiryScheduler::new(
            Arc::new(MemoryScheduleStore::new()),
            Duration::from_millis(10),
            true,
        ));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(rx).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();
    }
}
