use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Post already exists for feed {feed_id}: {url}")]
    PostConflict { feed_id: Uuid, url: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled by shutdown")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the store rejected a post because (feed, url) already exists
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::PostConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
