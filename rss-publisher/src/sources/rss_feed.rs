use crate::parser::FeedParser;
use crate::traits::FeedSource;
use crate::types::{FeedEntry, FetchConfig, PublisherError, Result};
use crate::utils::text::strip_html;
use crate::Fetcher;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Feed source backed by HTTP fetches and feed-rs parsing
pub struct RssFeedSource {
    fetcher: Arc<Fetcher>,
    parser: FeedParser,
}

impl RssFeedSource {
    pub fn new(fetch_config: FetchConfig) -> Result<Self> {
        let parser = FeedParser::new(fetch_config.max_entries_per_feed);
        let fetcher = Arc::new(Fetcher::new(fetch_config)?);

        Ok(Self { fetcher, parser })
    }

    /// Replace thin feed bodies with the text scraped from the article page.
    async fn enrich(&self, entry: &mut FeedEntry) {
        let config = self.fetcher.config();
        if !config.scrape_full_content {
            return;
        }

        let Some(link) = entry.link.clone() else {
            return;
        };

        let current_len = strip_html(&entry.body).chars().count();
        if current_len >= config.min_content_chars {
            return;
        }

        debug!("Content for '{}' is short ({} chars), scraping {}", entry.title, current_len, link);
        match self.fetcher.fetch_full_content(&link).await {
            Ok(Some(text)) if text.chars().count() > current_len => {
                info!("Scraped {} chars of full content for '{}'", text.chars().count(), entry.title);
                entry.body = text;
            }
            Ok(_) => debug!("No fuller content found at {}", link),
            Err(e) => warn!("Failed to scrape {}: {}", link, e),
        }
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedEntry>> {
        info!("Pulling RSS feed: {}", feed_url);

        let unreachable = |reason: String| PublisherError::FeedUnreachable {
            url: feed_url.to_string(),
            reason,
        };

        let content = self.fetcher.fetch_text(feed_url).await.map_err(|e| {
            error!("Failed to fetch RSS feed {}: {}", feed_url, e);
            unreachable(e.to_string())
        })?;

        if !FeedParser::is_valid_feed_content(&content) {
            return Err(unreachable("response is not an RSS or Atom document".to_string()));
        }

        let mut entries = self
            .parser
            .parse_feed(&content, feed_url)
            .map_err(|e| unreachable(e.to_string()))?;

        for entry in entries.iter_mut() {
            self.enrich(entry).await;
        }

        Ok(entries)
    }
}
