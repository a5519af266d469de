use anyhow::Result;

use rssagg_core::storage::{Database, FeedRepository};

pub async fn run(db: &Database) -> Result<()> {
    let feed_repo = FeedRepository::new(db);
    let feeds = feed_repo.list_all().await?;

    if feeds.is_empty() {
        println!("No feeds yet.");
        println!("\nTo add a feed, run:");
        println!("  rssagg add -u <url> -n <name>");
        return Ok(());
    }

    let total = feed_repo.count().await?;
    let pending = feeds.iter().filter(|f| f.is_never_fetched()).count();
    println!("Feeds ({}, {} not fetched yet):\n", total, pending);

    for feed in &feeds {
        println!("  {} ({})", feed.name, feed.id);
        println!("    URL: {}", feed.url);
        match feed.last_fetched_at {
            Some(last) => println!("    Last fetched: {}", last.format("%Y-%m-%d %H:%M")),
            None => println!("    Last fetched: never"),
        }
        println!();
    }

    Ok(())
}
