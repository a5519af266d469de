mod fetcher;
mod models;
mod parser;
pub mod timestamp;

pub use fetcher::{fetch_document, FeedSource, HttpFetcher};
pub use models::{Feed, NewFeed, NewPost, Post};
pub use parser::{parse_feed, ChannelItem, RawFeedDocument};
pub use timestamp::{normalize, NotParseable};
