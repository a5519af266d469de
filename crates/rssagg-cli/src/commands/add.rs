use anyhow::{bail, Result};
use url::Url;
use uuid::Uuid;

use rssagg_core::{
    feed::NewFeed,
    storage::{Database, FeedRepository},
};

pub async fn run(db: &Database, url: &str, name: &str, user_id: Uuid) -> Result<()> {
    let parsed = Url::parse(url)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Unsupported URL scheme '{}': only http and https feeds can be fetched", parsed.scheme());
    }

    let feed_repo = FeedRepository::new(db);
    if let Some(existing) = feed_repo.find_by_url(url).await? {
        println!("Feed already exists: {} ({})", existing.name, existing.id);
        return Ok(());
    }

    let feed = feed_repo
        .create(&NewFeed {
            url: url.to_string(),
            name: name.to_string(),
            user_id,
        })
        .await?;

    println!("Added feed: {} ({})", feed.name, feed.id);
    println!("It will be fetched on the next scheduler tick.");

    Ok(())
}
