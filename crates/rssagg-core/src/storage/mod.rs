mod database;
mod feed_repo;
mod post_repo;
mod retry;
mod store;

pub use database::Database;
pub use feed_repo::FeedRepository;
pub use post_repo::PostRepository;
pub use store::FeedStore;
