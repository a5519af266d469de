use anyhow::{anyhow, Result};

use rssagg_core::storage::{Database, FeedRepository, PostRepository};

pub async fn run(db: &Database, feed_url: Option<&str>, limit: u32, json: bool) -> Result<()> {
    let post_repo = PostRepository::new(db);

    let posts = match feed_url {
        Some(url) => {
            let feed = FeedRepository::new(db)
                .find_by_url(url)
                .await?
                .ok_or_else(|| anyhow!("No feed with URL {}", url))?;
            post_repo.list_by_feed(feed.id, limit).await?
        }
        None => post_repo.list_recent(limit).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    if posts.is_empty() {
        println!("No posts yet.");
        return Ok(());
    }

    for post in &posts {
        println!("  {} {}", post.published_at.format("%Y-%m-%d %H:%M"), post.title);
        println!("    {}", post.url);
    }

    Ok(())
}
