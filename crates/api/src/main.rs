use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use event_commerce_api::app::{create_app, AppState};
use event_commerce_api::config::Config;
use event_commerce_api::jobs::{
    CheckoutExpiryJob, EventReminderJob, JobScheduler, PaymentNotificationRetryJob,
    PoolMetricsJob, PrimaryImageSweepJob,
};
use event_commerce_api::middleware;
use event_commerce_api::services::{build_checkout_provider, build_dispatcher};
use tokio::signal;
use tracing::info;

const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::load().context("Failed to load configuration")?);

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics().context("Failed to install metrics recorder")?;

    info!("Starting event commerce API v{}", env!("CARGO_PKG_VERSION"));

    let db_config = persistence::db::DatabaseConfig::from(&config.database);
    let pool = persistence::db::create_pool(&db_config)
        .await
        .context("Failed to connect to database")?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let dispatcher = build_dispatcher(&config.notifications);
    let checkout = build_checkout_provider(&config.payments)
        .context("Failed to build checkout provider")?;
    let state = AppState::new(Arc::clone(&config), pool.clone(), dispatcher, checkout);

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool));
    if config.jobs.enabled {
        scheduler.register(PaymentNotificationRetryJob::new(
            state.payment_notifications.clone(),
            config.payments.retry_batch_size,
        ));
        scheduler.register(CheckoutExpiryJob::new(
            state.registrations.clone(),
            config.payments.retry_batch_size,
        ));
        scheduler.register(PrimaryImageSweepJob::new(
            state.images.clone(),
            config.jobs.image_sweep_interval_minutes,
            config.jobs.image_sweep_batch_size,
        ));
        if config.reminders.enabled {
            scheduler.register(EventReminderJob::new(
                state.reminders.clone(),
                config.reminders.batch_size,
            ));
        }
    }
    scheduler.start();

    let app = create_app(state);
    let addr = config.socket_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
