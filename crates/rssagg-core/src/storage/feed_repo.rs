use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::retry::with_retry;
use super::Database;
use crate::feed::{Feed, NewFeed};
use crate::{Error, Result};

/// Repository for feed records
pub struct FeedRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct FeedRow {
    id: String,
    url: String,
    name: String,
    user_id: String,
    last_fetched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            url: row.url,
            name: row.name,
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            last_fetched_at: row.last_fetched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const FEED_COLUMNS: &str = "id, url, name, user_id, last_fetched_at, created_at, updated_at";

impl<'a> FeedRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new feed
    pub async fn create(&self, new_feed: &NewFeed) -> Result<Feed> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO feeds (id, url, name, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new_feed.url)
        .bind(&new_feed.name)
        .bind(new_feed.user_id.to_string())
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::FeedNotFound(id.to_string()))
    }

    /// Find a feed by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Feed>> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {} FROM feeds WHERE id = ?", FEED_COLUMNS))
                .bind(id.to_string())
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(Feed::from))
    }

    /// Find a feed by URL
    pub async fn find_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {} FROM feeds WHERE url = ?", FEED_COLUMNS))
                .bind(url)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(Feed::from))
    }

    /// Get all feeds, oldest first
    pub async fn list_all(&self) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feeds ORDER BY created_at ASC, rowid ASC",
            FEED_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Up to `limit` feeds, least recently fetched first, never-fetched before all others
    pub async fn select_due(&self, limit: u32) -> Result<Vec<Feed>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, rowid ASC
            LIMIT ?
            "#,
            FEED_COLUMNS
        );

        let rows = with_retry(|| {
            sqlx::query_as::<_, FeedRow>(&sql)
                .bind(i64::from(limit))
                .fetch_all(self.db.pool())
        })
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Stamp the feed's last fetch time with now and return the updated record
    pub async fn mark_fetched(&self, id: Uuid) -> Result<Feed> {
        let now = Utc::now();
        let sql = format!(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            FEED_COLUMNS
        );

        let row = with_retry(|| {
            sqlx::query_as::<_, FeedRow>(&sql)
                .bind(now)
                .bind(now)
                .bind(id.to_string())
                .fetch_optional(self.db.pool())
        })
        .await?;

        row.map(Feed::from)
            .ok_or_else(|| Error::FeedNotFound(id.to_string()))
    }

    /// Get total feed count
    pub async fn count(&self) -> Result<u32> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0 as u32)
    }
}
