use crate::traits::{ImageProvider, Publisher, Rewriter};
use crate::types::{EntryIdentifier, FeedEntry, ImageOrigin, ImageRef, PublishedPost, PublisherError, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of pushing one entry through rewrite, image and publish.
#[derive(Debug)]
pub struct PublishResult {
    pub identifier: EntryIdentifier,
    /// Headline the article was published under
    pub headline: Option<String>,
    pub post: Option<PublishedPost>,
    pub image_attached: bool,
    pub error: Option<PublisherError>,
}

impl PublishResult {
    fn published(identifier: &EntryIdentifier, headline: String, post: PublishedPost, image_attached: bool) -> Self {
        Self {
            identifier: identifier.clone(),
            headline: Some(headline),
            post: Some(post),
            image_attached,
            error: None,
        }
    }

    fn failed(identifier: &EntryIdentifier, error: PublisherError) -> Self {
        Self {
            identifier: identifier.clone(),
            headline: None,
            post: None,
            image_attached: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.post.is_some()
    }

    pub fn post_id(&self) -> Option<u64> {
        self.post.as_ref().map(|p| p.id)
    }
}

/// Rewrite, find an image for, and publish a single entry.
///
/// The pipeline never touches the ledger; the caller records the outcome.
pub struct PublishPipeline {
    rewriter: Arc<dyn Rewriter>,
    images: Arc<dyn ImageProvider>,
    publisher: Arc<dyn Publisher>,
}

impl PublishPipeline {
    pub fn new(rewriter: Arc<dyn Rewriter>, images: Arc<dyn ImageProvider>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            rewriter,
            images,
            publisher,
        }
    }

    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    pub async fn publish(&self, entry: &FeedEntry, identifier: &EntryIdentifier) -> PublishResult {
        match self.run(entry).await {
            Ok((headline, post, image_attached)) => PublishResult::published(identifier, headline, post, image_attached),
            Err(e) => {
                error!("Failed to publish '{}' ({}): {}", entry.title, identifier, e);
                PublishResult::failed(identifier, e)
            }
        }
    }

    async fn run(&self, entry: &FeedEntry) -> Result<(String, PublishedPost, bool)> {
        // Rewrite
        let article = match self.rewriter.rewrite(entry).await {
            Ok(article) if article.headline.trim().is_empty() => {
                return Err(PublisherError::RewriteFailed("rewriter returned an empty headline".to_string()))
            }
            Ok(article) if article.body.trim().is_empty() => {
                return Err(PublisherError::RewriteFailed("rewriter returned an empty body".to_string()))
            }
            Ok(article) => article,
            Err(e @ PublisherError::RewriteFailed(_)) => return Err(e),
            Err(e) => return Err(PublisherError::RewriteFailed(e.to_string())),
        };
        debug!("Rewrote '{}' as '{}'", entry.title, article.headline);

        // Image: the entry's own first, generated second, none is acceptable
        let image = self.resolve_image(entry, &article.headline).await;

        // Publish
        let mut post = match self.publisher.create_post(&article, image.as_ref()).await {
            Ok(post) => post,
            Err(e @ PublisherError::PublishFailed(_)) => return Err(e),
            Err(e) => return Err(PublisherError::PublishFailed(e.to_string())),
        };

        if let (Some(image), None) = (&image, post.featured_media) {
            warn!("Post {} went up without its image {}", post.id, image.url);
            if image.origin == ImageOrigin::Feed {
                post.featured_media = self.attach_generated(post.id, &article.headline).await;
            }
        }
        let image_attached = post.featured_media.is_some();

        info!("Published '{}' as post {}", article.headline, post.id);
        Ok((article.headline, post, image_attached))
    }

    async fn resolve_image(&self, entry: &FeedEntry, headline: &str) -> Option<ImageRef> {
        if let Some(image) = self.images.extract_image(entry) {
            debug!("Using feed image {}", image.url);
            return Some(image);
        }

        if let Some(image) = self.images.generate_image(headline).await {
            debug!("Using generated image {}", image.url);
            return Some(image);
        }

        warn!("{} for '{}', publishing without one", PublisherError::ImageUnavailable, headline);
        None
    }

    /// Falls back to a stock image when the feed's own image could not be attached.
    async fn attach_generated(&self, post_id: u64, headline: &str) -> Option<u64> {
        let image = self.images.generate_image(headline).await?;
        info!("Falling back to generated image {} for post {}", image.url, post_id);

        match self.publisher.set_featured_image(post_id, &image, headline).await {
            Ok(media_id) => Some(media_id),
            Err(e) => {
                warn!("Could not attach fallback image to post {}: {}", post_id, e);
                None
            }
        }
    }
}
