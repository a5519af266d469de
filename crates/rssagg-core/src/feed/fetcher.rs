use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};

use super::parser::{parse_feed, RawFeedDocument};
use crate::config::ScraperConfig;
use crate::{Error, Result};

/// Anything that can hand back the raw bytes of a feed URL
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Retrieve and parse a feed document in one step
pub async fn fetch_document(source: &dyn FeedSource, url: &str) -> Result<RawFeedDocument> {
    let content = source.fetch(url).await?;
    parse_feed(&content)
}

/// HTTP feed fetcher with retry and exponential backoff
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    initial_retry_delay: Duration,
    max_feed_bytes: usize,
}

impl HttpFetcher {
    /// Create a new feed fetcher with configuration
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Self::build_client(config)?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
            initial_retry_delay: Duration::from_millis(config.initial_retry_delay_ms),
            max_feed_bytes: config.max_feed_bytes,
        })
    }

    /// Build HTTP client with optional proxy
    fn build_client(config: &ScraperConfig) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(Self::build_headers(&config.user_agent))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        // Only the configured proxy is used, never one from the environment
        match config.proxy_url {
            Some(ref proxy) => {
                let proxy = Proxy::all(proxy)
                    .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
                builder = builder.proxy(proxy);
                tracing::info!("Using HTTP proxy for feed fetching");
            }
            None => builder = builder.no_proxy(),
        }

        builder.build().map_err(Error::Http)
    }

    fn build_headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml,application/xml;q=0.9,text/xml;q=0.8,*/*;q=0.5",
            ),
        );
        if let Ok(ua) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// Fetch with retry and exponential backoff
    async fn fetch_with_retry(&self, url: &str) -> Result<Bytes> {
        let mut last_error = None;
        let mut delay = self.initial_retry_delay;

        for attempt in 0..self.max_retries {
            tracing::debug!(url, attempt = attempt + 1, "Fetching feed");

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if is_retryable_status(status) {
                        tracing::warn!(
                            "Received {} for {}, retrying after {}ms...",
                            status,
                            url,
                            delay.as_millis()
                        );
                        last_error = Some(Error::FeedParse(format!("HTTP {} for URL: {}", status, url)));
                    } else if !status.is_success() {
                        return Err(Error::FeedParse(format!("HTTP {} for URL: {}", status, url)));
                    } else {
                        self.ensure_content_size(response.content_length().unwrap_or(0) as usize, url)?;
                        match response.bytes().await {
                            Ok(bytes) => {
                                self.ensure_content_size(bytes.len(), url)?;
                                return Ok(bytes);
                            }
                            Err(e) => {
                                tracing::warn!("Failed to read response body from {}: {}", url, e);
                                last_error = Some(Error::Http(e));
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Request failed for {} (attempt {}): {}",
                        url,
                        attempt + 1,
                        e
                    );
                    last_error = Some(Error::Http(e));
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::FeedParse(format!(
                "Failed to fetch URL after {} retries: {}",
                self.max_retries, url
            ))
        }))
    }

    fn ensure_content_size(&self, size: usize, url: &str) -> Result<()> {
        if size > self.max_feed_bytes {
            return Err(Error::FeedParse(format!(
                "Feed too large ({} bytes) for URL: {}",
                size,
                url
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.fetch_with_retry(url).await
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}
