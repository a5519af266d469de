use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level, used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `<data_dir>/rssagg.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Feeds fetched per tick, and the number of concurrent workers
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Seconds between batch starts
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Deadline for retrieving one feed document, retries included
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Timeout of a single HTTP request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Attempts per fetch for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay, doubled on every retry
    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,
    /// Largest accepted feed body
    #[serde(default = "default_max_feed_bytes")]
    pub max_feed_bytes: usize,
    /// How long shutdown waits for in-flight workers
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// HTTP proxy URL for feed fetching (e.g., "http://127.0.0.1:7890" or "socks5://127.0.0.1:1080")
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            tick_interval_secs: default_tick_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_feed_bytes: default_max_feed_bytes(),
            shutdown_grace_secs: default_shutdown_grace(),
            proxy_url: None,
            user_agent: default_user_agent(),
        }
    }
}

impl ScraperConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rssagg")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_concurrency() -> u32 {
    10
}

fn default_tick_interval() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay() -> u64 {
    500
}

fn default_max_feed_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("rssagg/{}", env!("CARGO_PKG_VERSION"))
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from the default location or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit file; a missing file yields defaults
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let scraper = &self.scraper;
        if scraper.concurrency == 0 {
            return Err(crate::Error::Config(
                "scraper.concurrency must be at least 1".to_string(),
            ));
        }
        if scraper.tick_interval_secs == 0 {
            return Err(crate::Error::Config(
                "scraper.tick_interval_secs must be at least 1".to_string(),
            ));
        }
        if scraper.fetch_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "scraper.fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(crate::Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Default configuration file, `<home>/.config/rssagg/config.toml`
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("rssagg")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        match self.database.path {
            Some(ref path) => expand_tilde(path),
            None => self.data_dir().join("rssagg.db"),
        }
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}
