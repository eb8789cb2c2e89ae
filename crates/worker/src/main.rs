//! Relaybase Background Worker
//!
//! Handles scheduled jobs:
//! - Billing and membership invariant checks (hourly)
//! - Code-exchange expiry (every 5 minutes)

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod jobs;

use std::sync::Arc;
use std::time::Duration;

use relaybase_billing::InvariantChecker;
use relaybase_shared::{create_pool, PgRecordStore, RecordStore};
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

const WORKER_MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Relaybase Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url, WORKER_MAX_CONNECTIONS).await?;
    info!("Database pool created");

    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool));
    let checker = Arc::new(InvariantChecker::new(store.clone()));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Invariant checks (hourly)
    // Duplicate checkout deliveries, seat limits out of sync with billing,
    // relays over their seat limit
    let invariant_checker = checker.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let checker = invariant_checker.clone();
            Box::pin(async move {
                info!("Running invariant checks");
                jobs::run_invariant_checks(&checker).await;
            })
        })?)
        .await?;
    info!("Scheduled: Invariant checks (hourly)");

    // Job 2: Code-exchange expiry (every 5 minutes)
    let expiry_store = store.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let store = expiry_store.clone();
            Box::pin(async move {
                if let Err(e) =
                    jobs::expire_code_exchanges(store.as_ref(), OffsetDateTime::now_utc()).await
                {
                    error!(error = %e, "Failed to expire code exchange records");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Code-exchange expiry (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Relaybase Worker started successfully with {} scheduled jobs", 2);

    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
