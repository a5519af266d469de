use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use rssagg_core::{
    feed::HttpFetcher,
    scheduler::SchedulerService,
    storage::Database,
    AppConfig,
};

pub async fn run(db: Arc<Database>, config: &AppConfig) -> Result<()> {
    println!("Fetching up to {} due feeds...\n", config.scraper.concurrency);

    let fetcher = Arc::new(HttpFetcher::new(&config.scraper)?);
    let scheduler = SchedulerService::new(db, fetcher, config.scraper.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = shutdown_tx.send(true);
    });

    let summary = scheduler.run_batch(shutdown_rx).await;

    println!(
        "\nRefresh complete. {} feeds fetched ({} failed), {} items seen, {} new posts.",
        summary.feeds, summary.failed_feeds, summary.items_seen, summary.inserted
    );

    Ok(())
}
