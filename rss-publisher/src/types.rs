use serde::{Deserialize, Serialize};

pub use interfaces::defs::{EntryIdentifier, FeedEntry, ImageOrigin, ImageRef, RunSummary};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    /// Only the first N entries of each feed are considered
    pub max_entries_per_feed: usize,
    /// Feed content shorter than this triggers a scrape of the article page
    pub min_content_chars: usize,
    pub scrape_full_content: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "RSS-Publisher/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
            max_entries_per_feed: 5,
            min_content_chars: 500,
            scrape_full_content: true,
        }
    }
}

/// An entry rewritten in AP style, ready to post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewrittenArticle {
    pub headline: String,
    pub body: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// A post created on the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: u64,
    pub link: String,
    /// Media id of the featured image, when one was uploaded
    pub featured_media: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed unreachable: {url}: {reason}")]
    FeedUnreachable { url: String, reason: String },

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Rewrite failed: {0}")]
    RewriteFailed(String),

    #[error("No image could be extracted or generated")]
    ImageUnavailable,

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, PublisherError>;
