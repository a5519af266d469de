use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::ScraperConfig;
use crate::feed::{fetch_document, normalize, Feed, FeedSource, NewPost};
use crate::storage::FeedStore;
use crate::Error;

/// How a single feed's ingestion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed,
    /// The feed could not be marked as fetched; nothing else was attempted
    MarkFailed,
    /// Network, timeout or parse failure; no posts were written
    FetchFailed,
    /// Shutdown arrived while the document was being fetched
    Cancelled,
}

/// What one worker did, for logging only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub feed_id: uuid::Uuid,
    pub outcome: IngestOutcome,
    pub items_seen: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub unparseable_dates: usize,
    pub failed_inserts: usize,
}

impl IngestSummary {
    fn new(feed: &Feed, outcome: IngestOutcome) -> Self {
        Self {
            feed_id: feed.id,
            outcome,
            items_seen: 0,
            inserted: 0,
            duplicates: 0,
            unparseable_dates: 0,
            failed_inserts: 0,
        }
    }
}

/// Totals over one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub feeds: usize,
    pub failed_feeds: usize,
    pub items_seen: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl BatchSummary {
    fn record(&mut self, ingest: &IngestSummary) {
        if ingest.outcome != IngestOutcome::Completed {
            self.failed_feeds += 1;
        }
        self.items_seen += ingest.items_seen;
        self.inserted += ingest.inserted;
        self.duplicates += ingest.duplicates;
        self.skipped += ingest.unparseable_dates + ingest.failed_inserts;
    }
}

/// Resolves once shutdown is signalled; never resolves if the sender is gone
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Fetch one feed and store its new posts
///
/// Never fails: every error ends this feed's cycle (or skips one item) and is
/// logged here. The feed is stamped as fetched before retrieval starts, so a
/// failing feed rotates to the back like any other.
pub async fn ingest_feed(
    store: &dyn FeedStore,
    source: &dyn FeedSource,
    feed: &Feed,
    fetch_timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> IngestSummary {
    if let Err(e) = store.mark_fetched(feed.id).await {
        tracing::error!("Failed to mark feed '{}' as fetched, skipping: {}", feed.name, e);
        return IngestSummary::new(feed, IngestOutcome::MarkFailed);
    }

    let result = tokio::select! {
        result = tokio::time::timeout(fetch_timeout, fetch_document(source, &feed.url)) => {
            result.unwrap_or_else(|_| {
                Err(Error::Timeout(format!("fetching {} took longer than {:?}", feed.url, fetch_timeout)))
            })
        }
        _ = wait_for_shutdown(shutdown) => Err(Error::Cancelled),
    };

    let document = match result {
        Ok(document) => document,
        Err(Error::Cancelled) => {
            tracing::info!("Fetch of feed '{}' cancelled by shutdown", feed.name);
            return IngestSummary::new(feed, IngestOutcome::Cancelled);
        }
        Err(e) => {
            tracing::error!("Failed to fetch feed '{}': {}", feed.name, e);
            return IngestSummary::new(feed, IngestOutcome::FetchFailed);
        }
    };

    let mut summary = IngestSummary::new(feed, IngestOutcome::Completed);
    summary.items_seen = document.items.len();

    for item in &document.items {
        let published_at = match normalize(&item.pub_date) {
            Ok(published_at) => published_at,
            Err(e) => {
                tracing::warn!(feed = %feed.name, link = %item.link, "Skipping item: {}", e);
                summary.unparseable_dates += 1;
                continue;
            }
        };

        let post = NewPost {
            feed_id: feed.id,
            title: item.title.clone(),
            description: (!item.description.is_empty()).then(|| item.description.clone()),
            published_at,
            url: item.link.clone(),
        };

        match store.insert_post(&post).await {
            Ok(_) => summary.inserted += 1,
            Err(e) if e.is_conflict() => summary.duplicates += 1,
            Err(e) => {
                tracing::warn!(feed = %feed.name, link = %item.link, "Failed to create post: {}", e);
                summary.failed_inserts += 1;
            }
        }
    }

    tracing::info!(
        new = summary.inserted,
        "Feed '{}' collected, {} posts found",
        feed.name,
        summary.items_seen
    );

    summary
}

/// Ask the store for the next batch; a store failure yields an empty batch
pub async fn select_batch(store: &dyn FeedStore, concurrency: u32) -> Vec<Feed> {
    match store.select_due(concurrency).await {
        Ok(feeds) => feeds,
        Err(e) => {
            tracing::error!("Failed to select feeds to fetch: {}", e);
            Vec::new()
        }
    }
}

/// Select one batch and ingest every feed in it concurrently, returning when all are done
///
/// If shutdown is signalled mid-batch the workers see it too; they get
/// `shutdown_grace` to finish before the rest are aborted.
pub async fn run_batch(
    store: Arc<dyn FeedStore>,
    source: Arc<dyn FeedSource>,
    config: &ScraperConfig,
    shutdown: watch::Receiver<bool>,
) -> BatchSummary {
    let feeds = select_batch(store.as_ref(), config.concurrency).await;
    let mut summary = BatchSummary {
        feeds: feeds.len(),
        ..BatchSummary::default()
    };

    if feeds.is_empty() {
        tracing::debug!("No feeds to fetch");
        return summary;
    }

    let fetch_timeout = config.fetch_timeout();
    let mut join_set = JoinSet::new();
    for feed in feeds {
        let store = Arc::clone(&store);
        let source = Arc::clone(&source);
        let mut shutdown = shutdown.clone();
        join_set.spawn(async move {
            ingest_feed(store.as_ref(), source.as_ref(), &feed, fetch_timeout, &mut shutdown).await
        });
    }

    let mut stop = shutdown;
    let mut deadline: Option<Instant> = None;
    loop {
        let current = deadline;
        let joined = match current {
            None => tokio::select! {
                joined = join_set.join_next() => joined,
                _ = wait_for_shutdown(&mut stop) => {
                    tracing::info!("Shutdown requested, draining {} ingestion tasks", join_set.len());
                    deadline = Some(Instant::now() + config.shutdown_grace());
                    continue;
                }
            },
            Some(at) => match tokio::time::timeout_at(at, join_set.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("Abandoning {} ingestion tasks after grace period", join_set.len());
                    join_set.abort_all();
                    break;
                }
            },
        };

        match joined {
            Some(Ok(ingest)) => summary.record(&ingest),
            Some(Err(e)) => {
                tracing::error!("Ingestion task failed: {}", e);
                summary.failed_feeds += 1;
            }
            None => break,
        }
    }

    summary
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use uuid::Uuid;

    use crate::feed::{NewFeed, Post};
    use crate::storage::{Database, FeedRepository, PostRepository};
    use crate::Result;

    pub(crate) fn rss(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(link, date)| {
                format!(
                    "<item><title>{0}</title><link>{0}</link><description>about {0}</description><pubDate>{1}</pubDate></item>",
                    link, date
                )
            })
            .collect();
        format!(r#"<rss version="2.0"><channel><title>t</title>{}</channel></rss>"#, body)
    }

    /// Serves canned bodies by URL; unknown URLs fail like a refused connection
    #[derive(Default)]
    pub(crate) struct StubSource {
        pub bodies: HashMap<String, String>,
        pub delay: Option<Duration>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub fetches: AtomicUsize,
    }

    impl StubSource {
        pub(crate) fn with(bodies: &[(&str, String)]) -> Self {
            Self {
                bodies: bodies.iter().map(|(u, b)| (u.to_string(), b.clone())).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl FeedSource for StubSource {
        async fn fetch(&self, url: &str) -> Result<Bytes> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.bodies
                .get(url)
                .map(|body| Bytes::from(body.clone()))
                .ok_or_else(|| Error::Other(format!("connection refused: {}", url)))
        }
    }

    /// Delegates to a real store but refuses to mark some feeds
    struct FlakyStore {
        db: Database,
        refuse_mark: HashSet<Uuid>,
    }

    #[async_trait]
    impl FeedStore for FlakyStore {
        async fn select_due(&self, limit: u32) -> Result<Vec<Feed>> {
            self.db.select_due(limit).await
        }

        async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed> {
            if self.refuse_mark.contains(&feed_id) {
                return Err(Error::Other("database is read-only".to_string()));
            }
            self.db.mark_fetched(feed_id).await
        }

        async fn insert_post(&self, post: &NewPost) -> Result<Post> {
            self.db.insert_post(post).await
        }
    }

    async fn add_feed(db: &Database, name: &str) -> Feed {
        FeedRepository::new(db)
            .create(&NewFeed {
                url: format!("https://{}.example.com/rss", name),
                name: name.to_string(),
                user_id: Uuid::new_v4(),
            })
            .await
            .unwrap()
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    fn config(concurrency: u32) -> ScraperConfig {
        ScraperConfig {
            concurrency,
            ..ScraperConfig::default()
        }
    }

    const DATE: &str = "Wed, 26 Nov 2025 10:28:03 +0000";

    #[tokio::test]
    async fn test_ingest_stores_posts_and_skips_bad_dates() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "alpha").await;
        let source = StubSource::with(&[(
            feed.url.as_str(),
            rss(&[("http://x/1", DATE), ("http://x/2", "last tuesday"), ("http://x/3", "2024-08-28")]),
        )]);

        let summary =
            ingest_feed(&db, &source, &feed, Duration::from_secs(5), &mut no_shutdown()).await;

        assert_eq!(summary.outcome, IngestOutcome::Completed);
        assert_eq!(summary.items_seen, 3);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.unparseable_dates, 1);

        let posts = PostRepository::new(&db).list_by_feed(feed.id, 10).await.unwrap();
        let first = posts.iter().find(|p| p.url == "http://x/1").unwrap();
        assert_eq!(first.published_at.to_rfc3339(), "2025-11-26T10:28:03+00:00");
        assert_eq!(first.description.as_deref(), Some("about http://x/1"));

        let stored = FeedRepository::new(&db).find_by_id(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_reingesting_same_document_is_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "alpha").await;
        let source = StubSource::with(&[(
            feed.url.as_str(),
            rss(&[("http://x/1", DATE), ("http://x/2", DATE)]),
        )]);
        let posts = PostRepository::new(&db);

        ingest_feed(&db, &source, &feed, Duration::from_secs(5), &mut no_shutdown()).await;
        let after_first = posts.count_by_feed(feed.id).await.unwrap();

        let second =
            ingest_feed(&db, &source, &feed, Duration::from_secs(5), &mut no_shutdown()).await;

        assert_eq!(after_first, 2);
        assert_eq!(posts.count_by_feed(feed.id).await.unwrap(), after_first);
        assert_eq!(second.outcome, IngestOutcome::Completed);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
    }

    #[tokio::test]
    async fn test_empty_description_is_stored_as_none() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "alpha").await;
        let body = format!(
            r#"<rss><channel><item><title>bare</title><link>http://x/bare</link><description></description><pubDate>{}</pubDate></item></channel></rss>"#,
            DATE
        );
        let source = StubSource::with(&[(feed.url.as_str(), body)]);

        ingest_feed(&db, &source, &feed, Duration::from_secs(5), &mut no_shutdown()).await;

        let posts = PostRepository::new(&db).list_by_feed(feed.id, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].description, None);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing_but_marks_feed() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "alpha").await;
        let source = StubSource::default();

        let summary =
            ingest_feed(&db, &source, &feed, Duration::from_secs(5), &mut no_shutdown()).await;

        assert_eq!(summary.outcome, IngestOutcome::FetchFailed);
        assert_eq!(PostRepository::new(&db).count_by_feed(feed.id).await.unwrap(), 0);
        let stored = FeedRepository::new(&db).find_by_id(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_slow_fetch_hits_deadline() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "alpha").await;
        let mut source = StubSource::with(&[(feed.url.as_str(), rss(&[("http://x/1", DATE)]))]);
        source.delay = Some(Duration::from_secs(30));

        let summary =
            ingest_feed(&db, &source, &feed, Duration::from_millis(50), &mut no_shutdown()).await;

        assert_eq!(summary.outcome, IngestOutcome::FetchFailed);
        assert_eq!(PostRepository::new(&db).count_by_feed(feed.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_fetch() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "alpha").await;
        let mut source = StubSource::with(&[(feed.url.as_str(), rss(&[("http://x/1", DATE)]))]);
        source.delay = Some(Duration::from_secs(30));
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });
        let summary = ingest_feed(&db, &source, &feed, Duration::from_secs(60), &mut rx).await;

        assert_eq!(summary.outcome, IngestOutcome::Cancelled);
        assert_eq!(PostRepository::new(&db).count_by_feed(feed.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broken_feed_does_not_affect_rest_of_batch() {
        let db = Database::new_in_memory().await.unwrap();
        let good = add_feed(&db, "good").await;
        let broken = add_feed(&db, "broken").await;
        let source = StubSource::with(&[
            (good.url.as_str(), rss(&[("http://x/1", DATE), ("http://x/2", DATE)])),
            (broken.url.as_str(), "<rss><channel><item>".to_string()),
        ]);

        let summary = run_batch(
            Arc::new(db.clone()),
            Arc::new(source),
            &config(5),
            no_shutdown(),
        )
        .await;

        assert_eq!(summary.feeds, 2);
        assert_eq!(summary.failed_feeds, 1);
        assert_eq!(summary.inserted, 2);
        let posts = PostRepository::new(&db);
        assert_eq!(posts.count_by_feed(good.id).await.unwrap(), 2);
        assert_eq!(posts.count_by_feed(broken.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_failure_skips_only_that_feed() {
        let db = Database::new_in_memory().await.unwrap();
        let stuck = add_feed(&db, "stuck").await;
        let fine = add_feed(&db, "fine").await;
        let source = StubSource::with(&[
            (stuck.url.as_str(), rss(&[("http://x/1", DATE)])),
            (fine.url.as_str(), rss(&[("http://x/1", DATE)])),
        ]);
        let store = FlakyStore {
            db: db.clone(),
            refuse_mark: HashSet::from([stuck.id]),
        };

        let summary = run_batch(Arc::new(store), Arc::new(source), &config(5), no_shutdown()).await;

        assert_eq!(summary.feeds, 2);
        assert_eq!(summary.failed_feeds, 1);
        let posts = PostRepository::new(&db);
        assert_eq!(posts.count_by_feed(stuck.id).await.unwrap(), 0);
        assert_eq!(posts.count_by_feed(fine.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batches_rotate_least_recently_fetched() {
        let db = Database::new_in_memory().await.unwrap();
        let mut feeds = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            feeds.push(add_feed(&db, name).await);
        }
        let bodies: Vec<(&str, String)> = feeds
            .iter()
            .map(|f| (f.url.as_str(), rss(&[("http://x/1", DATE)])))
            .collect();
        let source = Arc::new(StubSource::with(&bodies));
        let store: Arc<dyn FeedStore> = Arc::new(db.clone());

        let first = run_batch(store.clone(), source.clone(), &config(3), no_shutdown()).await;
        assert_eq!(first.feeds, 3);

        let repo = FeedRepository::new(&db);
        let fetched: Vec<Uuid> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .filter(|f| f.last_fetched_at.is_some())
            .map(|f| f.id)
            .collect();
        assert_eq!(fetched, vec![feeds[0].id, feeds[1].id, feeds[2].id]);

        let next: Vec<Uuid> = repo.select_due(3).await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(&next[..2], &[feeds[3].id, feeds[4].id]);
        assert!(fetched.contains(&next[2]));

        let second = run_batch(store, source.clone(), &config(3), no_shutdown()).await;
        assert_eq!(second.feeds, 3);
        assert!(repo.list_all().await.unwrap().iter().all(|f| f.last_fetched_at.is_some()));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_batch() {
        let db = Database::new_in_memory().await.unwrap();

        let summary = run_batch(
            Arc::new(db),
            Arc::new(StubSource::default()),
            &config(3),
            no_shutdown(),
        )
        .await;

        assert_eq!(summary, BatchSummary::default());
    }

    #[tokio::test]
    async fn test_batch_drains_on_shutdown() {
        let db = Database::new_in_memory().await.unwrap();
        let feed = add_feed(&db, "slow").await;
        let mut source = StubSource::with(&[(feed.url.as_str(), rss(&[("http://x/1", DATE)]))]);
        source.delay = Some(Duration::from_secs(30));
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            run_batch(Arc::new(db), Arc::new(source), &config(3), rx),
        )
        .await
        .expect("batch should stop promptly on shutdown");

        assert_eq!(summary.feeds, 1);
        assert_eq!(summary.failed_feeds, 1);
    }
}
