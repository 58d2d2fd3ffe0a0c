use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One item read from a feed. Rebuilt on every poll, never stored as-is.
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub link: Option<String>,
    pub guid: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub title: String,
    pub body: String,
    pub summary: String,
    pub images: Vec<ImageRef>,
    pub feed_url: String,
}

/// Where an [`EntryIdentifier`] was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentitySource {
    Link,
    Guid,
    /// Hash over title and timestamp. Two entries sharing both collide.
    ContentHash,
}

/// Dedup key for a feed entry.
///
/// Equality and hashing only look at the string value; the source is kept so
/// callers can tell a weak identifier apart from a link-based one.
#[derive(Debug, Clone)]
pub struct EntryIdentifier {
    value: String,
    source: IdentitySource,
}

impl EntryIdentifier {
    pub fn new(value: impl Into<String>, source: IdentitySource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }

    pub fn is_weak(&self) -> bool {
        self.source == IdentitySource::ContentHash
    }
}

impl PartialEq for EntryIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for EntryIdentifier {}

impl Hash for EntryIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Display for EntryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageOrigin {
    Feed,
    Generated,
}

/// A remote image that can be attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub alt_text: Option<String>,
    pub origin: ImageOrigin,
}

impl ImageRef {
    pub fn from_feed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alt_text: None,
            origin: ImageOrigin::Feed,
        }
    }

    pub fn generated(url: impl Into<String>, alt_text: Option<String>) -> Self {
        Self {
            url: url.into(),
            alt_text,
            origin: ImageOrigin::Generated,
        }
    }
}

/// An article that made it onto the site during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedArticle {
    pub headline: String,
    pub source_url: String,
    pub post_url: String,
    pub post_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryFailure {
    pub identifier: String,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFailure {
    pub feed_url: String,
    pub error: String,
}

/// Outcome of one sweep over all configured feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
    pub articles: Vec<PublishedArticle>,
    pub failures: Vec<EntryFailure>,
    pub feed_errors: Vec<FeedFailure>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            published: 0,
            failed: 0,
            skipped: 0,
            articles: Vec::new(),
            failures: Vec::new(),
            feed_errors: Vec::new(),
        }
    }

    /// Anything worth telling an operator about: a publication or a failure.
    pub fn is_reportable(&self) -> bool {
        self.published > 0 || self.failed > 0 || !self.feed_errors.is_empty()
    }

    pub fn post_ids(&self) -> Vec<u64> {
        self.articles.iter().map(|a| a.post_id).collect()
    }

    /// True when something went wrong and nothing was published.
    pub fn is_total_failure(&self) -> bool {
        self.published == 0 && (self.failed > 0 || !self.feed_errors.is_empty())
    }
}

/// Delivers a run summary somewhere a human will see it.
///
/// Delivery is best effort: callers log the error and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &RunSummary) -> anyhow::Result<()>;
}
