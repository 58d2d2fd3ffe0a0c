use crate::traits::Publisher;
use crate::types::{ImageRef, PublishedPost, PublisherError, Result, RewrittenArticle};
use crate::utils::text::truncate_chars;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

const IMAGE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) RSS-Bot/1.0";

#[derive(Debug, Clone, Copy)]
enum Taxonomy {
    Category,
    Tag,
}

impl Taxonomy {
    fn endpoint(&self) -> &'static str {
        match self {
            Taxonomy::Category => "categories",
            Taxonomy::Tag => "tags",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Term {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewPost<'a> {
    title: &'a str,
    content: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    featured_media: Option<u64>,
}

/// WordPress REST API (v2) client authenticated with an application password
pub struct WordPressClient {
    client: Client,
    site_url: String,
    username: String,
    app_password: String,
    category_cache: Arc<RwLock<HashMap<String, u64>>>,
    tag_cache: Arc<RwLock<HashMap<String, u64>>>,
}

impl WordPressClient {
    pub fn new(site_url: &str, username: impl Into<String>, app_password: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            site_url: site_url.trim_end_matches('/').to_string(),
            username: username.into(),
            app_password: app_password.into(),
            category_cache: Arc::new(RwLock::new(HashMap::new())),
            tag_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Short link to a post that works regardless of permalink settings
    pub fn post_url(&self, post_id: u64) -> String {
        format!("{}/?p={}", self.site_url, post_id)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}/wp-json/wp/v2/{}", self.site_url, endpoint.trim_start_matches('/'));
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.app_password))
    }

    fn cache(&self, taxonomy: Taxonomy) -> &Arc<RwLock<HashMap<String, u64>>> {
        match taxonomy {
            Taxonomy::Category => &self.category_cache,
            Taxonomy::Tag => &self.tag_cache,
        }
    }

    async fn get_or_create_term(&self, taxonomy: Taxonomy, name: &str) -> Result<u64> {
        let key = name.trim().to_lowercase();

        if let Some(id) = self.cache(taxonomy).read().await.get(&key) {
            return Ok(*id);
        }

        let existing: Vec<Term> = self
            .request(Method::GET, taxonomy.endpoint())
            .query(&[("search", name), ("per_page", "100")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let id = match existing.into_iter().find(|t| t.name.trim().to_lowercase() == key) {
            Some(term) => {
                debug!("Found existing {} '{}' (ID: {})", taxonomy.endpoint(), name, term.id);
                term.id
            }
            None => {
                let created: Created = self
                    .request(Method::POST, taxonomy.endpoint())
                    .json(&serde_json::json!({ "name": name.trim() }))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                info!("Created {} '{}' (ID: {})", taxonomy.endpoint(), name, created.id);
                created.id
            }
        };

        self.cache(taxonomy).write().await.insert(key, id);
        Ok(id)
    }

    /// Resolve category and tag names to ids. Terms that cannot be resolved are left out.
    async fn term_ids(&self, article: &RewrittenArticle) -> (Vec<u64>, Vec<u64>) {
        let mut categories = Vec::new();
        if !article.category.trim().is_empty() {
            match self.get_or_create_term(Taxonomy::Category, &article.category).await {
                Ok(id) => categories.push(id),
                Err(e) => warn!("Could not resolve category '{}': {}", article.category, e),
            }
        }

        let mut tags = Vec::new();
        for tag in &article.tags {
            match self.get_or_create_term(Taxonomy::Tag, tag).await {
                Ok(id) if !tags.contains(&id) => tags.push(id),
                Ok(_) => {}
                Err(e) => warn!("Could not resolve tag '{}': {}", tag, e),
            }
        }

        (categories, tags)
    }

    async fn download_image(&self, url: &str) -> Result<(Vec<u8>, String, String)> {
        info!("Downloading image: {}", url);

        let response = self
            .client
            .get(url)
            .header("User-Agent", IMAGE_USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_lowercase())
            .filter(|v| !v.is_empty());

        let bytes = response.bytes().await?.to_vec();
        let extension = image_extension(content_type.as_deref(), url);
        let content_type = content_type
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or_else(|| mime_for_extension(extension).to_string());

        Ok((bytes, media_filename(url, extension), content_type))
    }

    /// Download an image and upload it to the media library; returns the media id.
    pub async fn upload_image(&self, image: &ImageRef, headline: &str) -> Result<u64> {
        let (bytes, filename, content_type) = self.download_image(&image.url).await?;

        let media: Created = self
            .request(Method::POST, "media")
            .header("Content-Type", content_type)
            .header("Content-Disposition", format!("attachment; filename=\"{}\"", filename))
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let alt_text = image.alt_text.as_deref().unwrap_or(headline);
        let update = self
            .request(Method::POST, &format!("media/{}", media.id))
            .json(&serde_json::json!({
                "alt_text": alt_text,
                "caption": format!("Image for: {}", headline),
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = update {
            warn!("Uploaded media {} but could not set alt text: {}", media.id, e);
        }

        info!("Uploaded media: {} (ID: {})", filename, media.id);
        Ok(media.id)
    }
}

#[async_trait]
impl Publisher for WordPressClient {
    async fn create_post(&self, article: &RewrittenArticle, image: Option<&ImageRef>) -> Result<PublishedPost> {
        let (categories, tags) = self.term_ids(article).await;

        let featured_media = match image {
            Some(image) => match self.upload_image(image, &article.headline).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Failed to upload image {}, posting without it: {}", image.url, e);
                    None
                }
            },
            None => None,
        };

        let post = NewPost {
            title: &article.headline,
            content: &article.body,
            status: "publish",
            categories,
            tags,
            featured_media,
        };

        let response = self
            .request(Method::POST, "posts")
            .json(&post)
            .send()
            .await
            .map_err(|e| PublisherError::PublishFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("WordPress rejected post '{}': HTTP {}", article.headline, status);
            return Err(PublisherError::PublishFailed(format!(
                "HTTP {}: {}",
                status,
                truncate_chars(&body, 500)
            )));
        }

        let created: Created = response
            .json()
            .await
            .map_err(|e| PublisherError::PublishFailed(format!("unreadable response: {}", e)))?;

        let link = created
            .link
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.post_url(created.id));

        info!(
            "Created post: {} (ID: {}, URL: {})",
            truncate_chars(&article.headline, 50),
            created.id,
            link
        );

        Ok(PublishedPost {
            id: created.id,
            link,
            featured_media,
        })
    }

    async fn set_featured_image(&self, post_id: u64, image: &ImageRef, headline: &str) -> Result<u64> {
        let media_id = self.upload_image(image, headline).await?;

        self.request(Method::POST, &format!("posts/{}", post_id))
            .json(&serde_json::json!({ "featured_media": media_id }))
            .send()
            .await?
            .error_for_status()?;

        info!("Set media {} as featured image of post {}", media_id, post_id);
        Ok(media_id)
    }

    async fn test_connection(&self) -> Result<String> {
        let user: CurrentUser = self
            .request(Method::GET, "users/me")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let name = user.name.unwrap_or_else(|| self.username.clone());
        info!("WordPress connection successful. Logged in as: {}", name);
        Ok(name)
    }
}

fn image_extension(content_type: Option<&str>, url: &str) -> &'static str {
    let from_type = match content_type {
        Some("image/jpeg") | Some("image/jpg") | Some("image/pjpeg") => Some(".jpg"),
        Some("image/png") => Some(".png"),
        Some("image/gif") => Some(".gif"),
        Some("image/webp") => Some(".webp"),
        Some("image/svg+xml") => Some(".svg"),
        Some("image/avif") => Some(".avif"),
        _ => None,
    };
    if let Some(ext) = from_type {
        return ext;
    }

    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".avif"]
        .into_iter()
        .find(|ext| path.ends_with(ext))
        .map(|ext| if ext == ".jpeg" { ".jpg" } else { ext })
        .unwrap_or(".jpg")
}

fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".svg" => "image/svg+xml",
        ".avif" => "image/avif",
        _ => "image/jpeg",
    }
}

/// Stable file name derived from the image URL
fn media_filename(url: &str, extension: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    format!("image_{}{}", &digest[..12], extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension(Some("image/png"), "https://x.test/a"), ".png");
        assert_eq!(image_extension(None, "https://x.test/photo.JPEG?w=300"), ".jpg");
        assert_eq!(image_extension(Some("application/octet-stream"), "https://x.test/a.webp"), ".webp");
        assert_eq!(image_extension(None, "https://x.test/a"), ".jpg");
    }

    #[test]
    fn test_media_filename_is_stable() {
        let a = media_filename("https://cdn.example.com/a.jpg", ".jpg");
        let b = media_filename("https://cdn.example.com/a.jpg", ".jpg");
        assert_eq!(a, b);
        assert!(a.starts_with("image_"));
        assert_eq!(a.len(), "image_".len() + 12 + ".jpg".len());
    }

    #[test]
    fn test_post_url() {
        let client = WordPressClient::new("https://blog.example.com/", "editor", "xxxx").unwrap();
        assert_eq!(client.site_url(), "https://blog.example.com");
        assert_eq!(client.post_url(42), "https://blog.example.com/?p=42");
    }
}
