use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use push_ledger_service::config::Settings;
use push_ledger_service::infrastructure::resilience::{CircuitBreaker, CircuitBreakerConfig};
use push_ledger_service::ledger::create_ledger_store;
use push_ledger_service::notification::{
    create_send_guard, NotificationOrchestrator, PostgresDeviceDirectory,
};
use push_ledger_service::postgres::PostgresPool;
use push_ledger_service::push::{BatchDispatcher, DispatcherConfig, HttpPushGateway};
use push_ledger_service::redis::RedisPool;
use push_ledger_service::schedule::{create_schedule_store, ExpiryScheduler};
use push_ledger_service::server::{create_app, AppState};
use push_ledger_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    let database = settings
        .database
        .as_ref()
        .context("database section is required: device tokens are read from PostgreSQL")?;
    let postgres = PostgresPool::new(database).await?;

    let redis = if settings.guard.backend == "redis" {
        match RedisPool::new(&settings.redis) {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable for send guard");
                None
            }
        }
    } else {
        None
    };

    // Gateway with its own breaker tuned from configuration
    let gateway = Arc::new(HttpPushGateway::new(&settings.gateway)?);
    let gateway_breaker = Arc::new(CircuitBreaker::with_config(
        "gateway",
        CircuitBreakerConfig {
            failure_threshold: settings.gateway.circuit_failure_threshold,
            reset_timeout_ms: settings.gateway.circuit_reset_timeout_ms,
            ..Default::default()
        },
    ));
    let dispatcher = BatchDispatcher::with_circuit_breaker(
        gateway,
        DispatcherConfig::from(&settings.gateway),
        gateway_breaker,
    );

    let directory = Arc::new(PostgresDeviceDirectory::new(
        postgres.clone(),
        settings.directory.clone(),
    ));
    let ledger = create_ledger_store(&settings.ledger, Some(postgres.clone()));

    let mut orchestrator =
        NotificationOrchestrator::new(directory.clone(), dispatcher, ledger, directory);
    if let Some(guard) = create_send_guard(&settings.guard, redis.clone()) {
        orchestrator = orchestrator.with_guard(guard);
    }

    let schedule_store = create_schedule_store(&settings.scheduler, Some(postgres.clone()));
    let scheduler = Arc::new(ExpiryScheduler::from_config(
        schedule_store,
        &settings.scheduler,
    ));

    let state = AppState::new(settings.clone(), Arc::new(orchestrator), scheduler.clone())
        .with_postgres(Some(postgres.clone()))
        .with_redis(redis);
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler_rx = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = scheduler_handle.await;
    postgres.close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}
