use async_trait::async_trait;
use uuid::Uuid;

use super::{Database, FeedRepository, PostRepository};
use crate::feed::{Feed, NewPost, Post};
use crate::Result;

/// Persistence operations the ingestion pipeline depends on
///
/// Implementations must be safe to call from many workers at once and must
/// reject a duplicate (feed, url) post atomically with
/// [`crate::Error::PostConflict`].
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Up to `limit` feeds, least recently fetched first, never-fetched feeds before all others
    async fn select_due(&self, limit: u32) -> Result<Vec<Feed>>;

    /// Set the feed's last fetch time to now
    async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed>;

    async fn insert_post(&self, post: &NewPost) -> Result<Post>;
}

#[async_trait]
impl FeedStore for Database {
    async fn select_due(&self, limit: u32) -> Result<Vec<Feed>> {
        FeedRepository::new(self).select_due(limit).await
    }

    async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed> {
        FeedRepository::new(self).mark_fetched(feed_id).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post> {
        PostRepository::new(self).create(post).await
    }
}
