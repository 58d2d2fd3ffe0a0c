use crate::types::{FetchConfig, PublisherError, Result};
use crate::utils::html::extract_article_text;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// Containers tried in order when scraping an article page
const ARTICLE_SELECTORS: &[&str] = &[
    ".sidearm-story-template-text",
    ".article-body",
    ".story-content",
    "article",
    "#main-content",
];

/// Scraped text at or below this length is treated as navigation chrome
const MIN_SCRAPED_CHARS: usize = 300;

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET a feed document, retrying transient failures with exponential backoff.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();
        debug!("Fetching feed: {}", url);

        // Apply rate limiting
        self.apply_rate_limit(url).await?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if !status.is_success() {
                        last_error = Some(PublisherError::General(format!(
                            "HTTP {}: {}",
                            status,
                            status.canonical_reason().unwrap_or("Unknown")
                        )));

                        // A 4xx will not get better by asking again
                        if status.is_client_error() {
                            break;
                        }
                    } else {
                        // Check content length
                        if let Some(content_length) = response.content_length() {
                            let size_mb = content_length as usize / (1024 * 1024);
                            if size_mb > self.config.max_feed_size_mb {
                                return Err(PublisherError::FeedTooLarge { size_mb });
                            }
                        }

                        match response.text().await {
                            Ok(content) => {
                                info!(
                                    "Successfully fetched feed: {} ({} bytes in {}ms)",
                                    url,
                                    content.len(),
                                    start_time.elapsed().as_millis()
                                );
                                return Ok(content);
                            }
                            Err(e) => last_error = Some(PublisherError::Http(e)),
                        }
                    }
                }
                Err(e) => last_error = Some(PublisherError::Http(e)),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        error!("Failed to fetch feed after {} attempts: {}", self.config.max_retries + 1, url);
        Err(last_error.unwrap_or_else(|| PublisherError::General("Unknown error".to_string())))
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();

        let now = Instant::now();
        let min_interval = Duration::from_secs(1); // Minimum 1 second between requests to same host

        {
            let mut rate_limiter = self.rate_limiter.write().await;

            if let Some(last_request) = rate_limiter.get(&host) {
                let elapsed = now.duration_since(*last_request);
                if elapsed < min_interval {
                    let wait_time = min_interval - elapsed;
                    debug!("Rate limiting {}: waiting {:?}", host, wait_time);
                    tokio::time::sleep(wait_time).await;
                }
            }

            rate_limiter.insert(host, Instant::now());
        }

        Ok(())
    }

    /// Fetch an article page and pull the story text out of it.
    ///
    /// Returns `Ok(None)` when the page has no recognisable article container.
    pub async fn fetch_full_content(&self, url: &str) -> Result<Option<String>> {
        debug!("Fetching full content from: {}", url);

        // Apply rate limiting
        self.apply_rate_limit(url).await?;

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(PublisherError::General(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let page = response.text().await?;
        Ok(extract_article_text(&page, ARTICLE_SELECTORS, MIN_SCRAPED_CHARS))
    }
}
