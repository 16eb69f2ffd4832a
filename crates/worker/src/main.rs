//! LoanPush worker binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use loanpush_common::config::AppConfig;
use loanpush_common::db::create_pool;
use loanpush_engine::store::{PgDeviceRegistry, PgLoanSource, PgQueueStore};
use loanpush_engine::{BatchProcessor, RateLimiter, ReminderGenerator, ReminderSchedule};
use loanpush_notifier::RelayTransport;

use loanpush_worker::routes::create_router;
use loanpush_worker::scheduler::{self, Scheduler};
use loanpush_worker::state::{AppState, HealthState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("loanpush_worker=info,loanpush_engine=info,loanpush_notifier=info")
        }))
        .json()
        .init();

    tracing::info!("LoanPush worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = create_pool(&config).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let queue = Arc::new(PgQueueStore::new(pool.clone()));
    let devices = Arc::new(PgDeviceRegistry::new(pool.clone()));
    let loans = Arc::new(PgLoanSource::new(pool));
    let transport = Arc::new(RelayTransport::new(
        config.push_relay_url.clone(),
        config.push_relay_token.clone(),
        config.push_ttl_seconds,
    )?);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_ceiling));

    let processor = Arc::new(BatchProcessor::new(
        queue.clone(),
        devices,
        transport,
        limiter.clone(),
        config.batch_size,
    ));
    let reminders = Arc::new(ReminderGenerator::new(
        loans,
        queue,
        ReminderSchedule::from_config(&config)?,
    ));

    let health = HealthState::new();
    let scheduler = Scheduler::new(
        processor,
        reminders,
        health.clone(),
        Duration::from_secs(config.batch_interval_secs),
        Duration::from_secs(config.reminder_interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = scheduler.spawn(shutdown_rx.clone());

    // Health listener
    let app = create_router(AppState::new(limiter, health, config.batch_size))
        .layer(TraceLayer::new_for_http());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Health endpoint listening on {}", addr);

    let mut server_shutdown = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    tracing::info!("Received shutdown signal, stopping gracefully...");

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    scheduler::shutdown(&shutdown_tx, jobs, grace).await;

    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "Health server exited with error"),
        Ok(Err(e)) => tracing::error!(error = %e, "Health server task panicked"),
        Err(_) => tracing::warn!("Health server did not stop within the grace window"),
        Ok(Ok(Ok(()))) => {}
    }

    tracing::info!("LoanPush worker stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
