use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::retry::with_retry;
use super::Database;
use crate::feed::{NewPost, Post};
use crate::{Error, Result};

/// Repository for ingested posts
pub struct PostRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct PostRow {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    title: String,
    description: Option<String>,
    published_at: DateTime<Utc>,
    url: String,
    feed_id: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            title: row.title,
            description: row.description,
            published_at: row.published_at,
            url: row.url,
            feed_id: Uuid::parse_str(&row.feed_id).unwrap_or_default(),
        }
    }
}

impl<'a> PostRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a post; a second post with the same (feed, url) yields [`Error::PostConflict`]
    pub async fn create(&self, new_post: &NewPost) -> Result<Post> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let result = with_retry(|| {
            sqlx::query_as::<_, PostRow>(
                r#"
                INSERT INTO posts
                (id, created_at, updated_at, title, description, published_at, url, feed_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id, created_at, updated_at, title, description, published_at, url, feed_id
                "#,
            )
            .bind(id.to_string())
            .bind(now)
            .bind(now)
            .bind(&new_post.title)
            .bind(&new_post.description)
            .bind(new_post.published_at)
            .bind(&new_post.url)
            .bind(new_post.feed_id.to_string())
            .fetch_one(self.db.pool())
        })
        .await;

        match result {
            Ok(row) => Ok(Post::from(row)),
            Err(err) if is_unique_violation(&err) => Err(Error::PostConflict {
                feed_id: new_post.feed_id,
                url: new_post.url.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Most recently published posts across all feeds
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Post>> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
            SELECT id, created_at, updated_at, title, description, published_at, url, feed_id
            FROM posts
            ORDER BY published_at DESC, created_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// Most recently published posts of one feed
    pub async fn list_by_feed(&self, feed_id: Uuid, limit: u32) -> Result<Vec<Post>> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
            SELECT id, created_at, updated_at, title, description, published_at, url, feed_id
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC, created_at DESC
            LIMIT ?
            "#,
        )
        .bind(feed_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    pub async fn count_by_feed(&self, feed_id: Uuid) -> Result<u32> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE feed_id = ?")
            .bind(feed_id.to_string())
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0 as u32)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
