use crate::traits::ImageProvider;
use crate::types::{FeedEntry, ImageRef, Result};
use crate::utils::is_stop_word;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const PEXELS_BASE_URL: &str = "https://api.pexels.com/v1";

#[derive(Debug, Deserialize)]
struct PexelsSearch {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsSrc,
    #[serde(default)]
    alt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PexelsSrc {
    large: Option<String>,
}

/// Finds a featured image: the entry's own media first, otherwise a
/// keyword-matched Pexels stock photo when an API key is configured.
pub struct ImageResolver {
    client: Client,
    pexels_api_key: Option<String>,
    base_url: String,
}

impl ImageResolver {
    pub fn new(pexels_api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            pexels_api_key: pexels_api_key.filter(|k| !k.trim().is_empty()),
            base_url: PEXELS_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn search_pexels(&self, api_key: &str, query: &str) -> Result<Option<ImageRef>> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .header("Authorization", api_key)
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .send()
            .await?
            .error_for_status()?;

        let search: PexelsSearch = response.json().await?;
        Ok(search.photos.into_iter().next().and_then(|photo| {
            let alt = photo.alt.filter(|a| !a.trim().is_empty());
            photo.src.large.map(|url| ImageRef::generated(url, alt))
        }))
    }
}

#[async_trait]
impl ImageProvider for ImageResolver {
    fn extract_image(&self, entry: &FeedEntry) -> Option<ImageRef> {
        entry.images.first().cloned()
    }

    async fn generate_image(&self, prompt: &str) -> Option<ImageRef> {
        let Some(api_key) = self.pexels_api_key.as_deref() else {
            debug!("No Pexels API key configured, skipping stock photo search");
            return None;
        };

        let query = create_search_query(prompt);
        info!("Searching Pexels for '{}'", query);

        match self.search_pexels(api_key, &query).await {
            Ok(Some(mut image)) => {
                info!("Found Pexels image: {}", image.url);
                if image.alt_text.is_none() {
                    image.alt_text = Some(prompt.to_string());
                }
                Some(image)
            }
            Ok(None) => {
                warn!("No Pexels results for '{}'", query);
                None
            }
            Err(e) => {
                warn!("Pexels search failed for '{}': {}", query, e);
                None
            }
        }
    }
}

/// First three meaningful words (three or more letters, not stop words) of a title.
pub fn create_search_query(title: &str) -> String {
    let lower = title.to_lowercase();
    let keywords: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.len() >= 3 && w.chars().all(|c| c.is_ascii_alphabetic()))
        .filter(|w| !is_stop_word(w))
        .take(3)
        .collect();

    if keywords.is_empty() {
        "news".to_string()
    } else {
        keywords.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_skips_stop_words() {
        assert_eq!(
            create_search_query("The Mayor announces new budget for city parks"),
            "mayor budget city"
        );
        assert_eq!(create_search_query("It is on: 2024"), "news");
    }

    #[test]
    fn test_extract_image_prefers_feed_media() {
        let resolver = ImageResolver::new(None).unwrap();
        let entry = FeedEntry {
            images: vec![
                ImageRef::from_feed("https://cdn.example.com/a.jpg"),
                ImageRef::from_feed("https://cdn.example.com/b.jpg"),
            ],
            ..Default::default()
        };

        let image = resolver.extract_image(&entry).unwrap();
        assert_eq!(image.url, "https://cdn.example.com/a.jpg");
        assert!(resolver.extract_image(&FeedEntry::default()).is_none());
    }

    #[tokio::test]
    async fn test_generate_without_key_is_none() {
        let resolver = ImageResolver::new(Some("  ".to_string())).unwrap();
        assert!(resolver.generate_image("Anything at all").await.is_none());
    }
}
