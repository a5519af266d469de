use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::feed::FeedSource;
use crate::storage::FeedStore;

use super::tasks::{run_batch, wait_for_shutdown, BatchSummary};

/// Events emitted by the scheduler after each batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    BatchCompleted { feeds: usize, items_seen: usize, inserted: usize },
}

/// Drives periodic fetch batches until shutdown
pub struct SchedulerService {
    store: Arc<dyn FeedStore>,
    source: Arc<dyn FeedSource>,
    config: ScraperConfig,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl SchedulerService {
    pub fn new(store: Arc<dyn FeedStore>, source: Arc<dyn FeedSource>, config: ScraperConfig) -> Self {
        Self {
            store,
            source,
            config,
            event_tx: None,
        }
    }

    /// Set the event sender for batch notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                warn!("Failed to send scheduler event: receiver dropped");
            }
        }
    }

    /// Run batches every tick until shutdown
    ///
    /// The first batch starts immediately. A tick never starts while the
    /// previous batch is still running; a long batch delays the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Scraping on {} workers every {}s",
            self.config.concurrency, self.config.tick_interval_secs
        );

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Scheduler received shutdown signal");
                    break;
                }

                _ = interval.tick() => {
                    debug!("Starting scheduled batch");
                    let summary = self.run_batch(shutdown.clone()).await;
                    self.send_event(SchedulerEvent::BatchCompleted {
                        feeds: summary.feeds,
                        items_seen: summary.items_seen,
                        inserted: summary.inserted,
                    });
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Run a single batch immediately
    pub async fn run_batch(&self, shutdown: watch::Receiver<bool>) -> BatchSummary {
        let summary = run_batch(
            Arc::clone(&self.store),
            Arc::clone(&self.source),
            &self.config,
            shutdown,
        )
        .await;

        if summary.feeds > 0 {
            info!(
                feeds = summary.feeds,
                failed = summary.failed_feeds,
                duplicates = summary.duplicates,
                skipped = summary.skipped,
                "Batch complete: {} items seen, {} new posts",
                summary.items_seen,
                summary.inserted
            );
        }

        summary
    }
}
