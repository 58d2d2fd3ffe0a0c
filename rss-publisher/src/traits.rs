//! Seams between the publishing core and the services it drives.

use crate::types::{FeedEntry, ImageRef, PublishedPost, Result, RewrittenArticle};
use async_trait::async_trait;

/// Reads entries from a feed URL.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and parse the feed. Fails with `FeedUnreachable` when the feed
    /// cannot be retrieved or understood.
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedEntry>>;
}

/// Turns a raw entry into a publishable article.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, entry: &FeedEntry) -> Result<RewrittenArticle>;
}

/// Finds an image for an article.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// An image carried by the entry itself, if any.
    fn extract_image(&self, entry: &FeedEntry) -> Option<ImageRef>;

    /// An image found or generated for the given prompt (usually the headline).
    async fn generate_image(&self, prompt: &str) -> Option<ImageRef>;
}

/// The site articles are published to.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish the article. An image that cannot be uploaded is left off and
    /// `featured_media` comes back empty.
    async fn create_post(&self, article: &RewrittenArticle, image: Option<&ImageRef>) -> Result<PublishedPost>;

    /// Upload an image and make it the featured image of an existing post;
    /// returns the media id.
    async fn set_featured_image(&self, post_id: u64, image: &ImageRef, headline: &str) -> Result<u64>;

    /// Check credentials; returns the name of the authenticated user.
    async fn test_connection(&self) -> Result<String>;
}
