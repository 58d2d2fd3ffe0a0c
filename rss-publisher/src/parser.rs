use crate::types::{FeedEntry, ImageRef, PublisherError, Result};
use crate::utils::html::first_image_url;
use feed_rs::model::{Entry, MediaObject};
use feed_rs::parser;
use tracing::{debug, info};

pub struct FeedParser {
    max_entries: usize,
}

impl FeedParser {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Parse a feed document and map its first `max_entries` items.
    pub fn parse_feed(&self, content: &str, feed_url: &str) -> Result<Vec<FeedEntry>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        // Items without a guid get an empty id; identity falls back on link or content hash
        let feed = parser::Builder::new()
            .id_generator(|_links, _title, _uri| String::new())
            .build()
            .parse(content.as_bytes())
            .map_err(|e| PublisherError::Parse(format!("Failed to parse feed: {}", e)))?;

        let total = feed.entries.len();
        let entries: Vec<FeedEntry> = feed
            .entries
            .into_iter()
            .take(self.max_entries)
            .map(|entry| Self::parse_entry(entry, feed_url))
            .collect();

        info!("Parsed feed {} with {} entries ({} considered)", feed_url, total, entries.len());
        Ok(entries)
    }

    fn parse_entry(entry: Entry, feed_url: &str) -> FeedEntry {
        let title = entry.title.map(|t| t.content.trim().to_string()).unwrap_or_default();

        // Get the primary link
        let link = entry.links.first().map(|l| l.href.clone());

        let guid = Some(entry.id.trim().to_string()).filter(|id| !id.is_empty());

        let summary = entry.summary.map(|s| s.content).unwrap_or_default();

        // Extract content (prefer content over summary)
        let body = entry
            .content
            .and_then(|c| c.body)
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| summary.clone());

        let published = entry.published.or(entry.updated);

        let mut images = Self::media_images(&entry.media);
        if images.is_empty() {
            if let Some(url) = first_image_url(&body).or_else(|| first_image_url(&summary)) {
                images.push(ImageRef::from_feed(url));
            }
        }

        FeedEntry {
            link,
            guid,
            published,
            title,
            body,
            summary,
            images,
            feed_url: feed_url.to_string(),
        }
    }

    /// Image URLs from media:content (and enclosures), then media:thumbnail.
    fn media_images(media: &[MediaObject]) -> Vec<ImageRef> {
        let content = media.iter().flat_map(|m| m.content.iter()).filter_map(|c| {
            let is_image = c
                .content_type
                .as_ref()
                .map(|ct| ct.type_().as_str() == "image")
                .unwrap_or(true);
            c.url.as_ref().filter(|_| is_image).map(|u| u.to_string())
        });

        let thumbnails = media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.clone());

        content
            .chain(thumbnails)
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
            .map(ImageRef::from_feed)
            .collect()
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        // Basic validation to check if content might be a valid RSS/Atom feed
        let content_lower = content.to_lowercase();

        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel")
    }
}
