use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use rssagg_core::{
    feed::HttpFetcher,
    scheduler::SchedulerService,
    storage::Database,
    AppConfig,
};

/// Run the scheduler until Ctrl+C, then let in-flight workers drain
pub async fn run(db: Arc<Database>, config: Arc<AppConfig>) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(&config.scraper)?);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let scheduler = SchedulerService::new(db, fetcher, config.scraper.clone());

    println!("Scheduler started. Press Ctrl+C to stop.");
    println!("  Concurrency: {}", config.scraper.concurrency);
    println!("  Tick interval: {} seconds", config.scraper.tick_interval_secs);
    println!("  Fetch timeout: {} seconds", config.scraper.fetch_timeout_secs);
    println!("  Database: {}", config.database_path().display());

    // Blocks until shutdown
    scheduler.run(shutdown_rx).await;

    println!("Scheduler stopped.");

    Ok(())
}
