use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscribed remote feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub user_id: Uuid,
    /// `None` until the first fetch attempt
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new feed
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub url: String,
    pub name: String,
    pub user_id: Uuid,
}

/// A single entry ingested from a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub feed_id: Uuid,
}

/// Data required to create a new post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
}

impl Feed {
    pub fn is_never_fetched(&self) -> bool {
        self.last_fetched_at.is_none()
    }
}
