use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use rssagg_core::{storage::Database, AppConfig};

mod commands;

#[derive(Parser)]
#[command(name = "rssagg")]
#[command(author, version, about = "Periodically pulls RSS feeds and stores their posts")]
struct Cli {
    /// Configuration file (defaults to ~/.config/rssagg/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fetch scheduler until interrupted
    Run,
    /// Fetch one batch of due feeds and exit
    Refresh,
    /// Add a feed to the store
    Add {
        /// RSS feed URL
        #[arg(short = 'u', long)]
        url: String,
        /// Display name
        #[arg(short = 'n', long)]
        name: String,
        /// Owning user
        #[arg(long, default_value_t = Uuid::nil())]
        user: Uuid,
    },
    /// List feeds with their last fetch time
    List,
    /// Show recently published posts
    Posts {
        /// Only posts of the feed with this URL
        #[arg(short = 'f', long)]
        feed: Option<String>,
        /// Maximum number of posts
        #[arg(short = 'l', long, default_value_t = 10)]
        limit: u32,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load and validate configuration before anything touches the store
    let config = match cli.config {
        Some(ref path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    config.validate()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Arc::new(config);

    // Initialize database
    let db = Arc::new(Database::new(&config).await?);

    match cli.command {
        Some(Commands::Run) | None => commands::run::run(db, config).await,
        Some(Commands::Refresh) => commands::refresh::run(db, &config).await,
        Some(Commands::Add { url, name, user }) => {
            commands::add::run(&db, &url, &name, user).await
        }
        Some(Commands::List) => commands::list::run(&db).await,
        Some(Commands::Posts { feed, limit, json }) => {
            commands::posts::run(&db, feed.as_deref(), limit, json).await
        }
    }
}
