use crate::traits::Rewriter;
use crate::types::{FeedEntry, PublisherError, Result, RewrittenArticle};
use crate::utils::text::{ensure_html_paragraphs, strip_html, truncate_chars, word_count};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_SOURCE_CHARS: usize = 8000;
const MAX_ATTEMPTS: u32 = 3;

const AP_STYLE_SYSTEM_PROMPT: &str = r#"You are a professional news editor at a major wire service. Rewrite articles in strict Associated Press (AP) style, producing complete, publication-ready news articles.

## AP style
- Inverted pyramid: lead with who, what, when, where, why and how, then supporting detail in descending order of importance
- Active voice and strong verbs
- Paragraphs of one to three sentences
- Headlines in present tense, active voice, articles omitted where possible
- Attribute every source and quote; prefer "said"
- Spell out one through nine; numerals for 10 and above, and always for ages, percentages and measurements
- Capitalize formal titles only directly before a name
- Neutral, factual language with no editorializing

## Length
- At least 120 words
- When the source is thin, add general background: who the subject is, related earlier events, why it matters, what happens next

## Accuracy
- NEVER invent quotes, statistics or specific facts that are not in the source
- Only add general, verifiable background
- When details are limited, close with a sentence such as "We will provide more information as it becomes available."

## Response format
Respond with a single JSON object with exactly these keys:
- "headline": concise AP-style headline, at most 100 characters
- "body": the full article as 3-6 HTML paragraphs (<p></p>), at least 120 words
- "category": one of News, Politics, Business, Technology, Sports, Entertainment, Health, Science, Education, Local
- "tags": an array of 3-5 lowercase tags

Return ONLY the JSON object, with no markdown and no extra text."#;

const BRIEF_SOURCE_GUIDANCE: &str = r#"
NOTE: The source material is brief. Expand it into an article of at least 120 words by:
- Adding relevant background about the subject or organization
- Explaining why the news matters
- Giving general context that helps readers understand the story
- If details are limited, ending with: "We will provide more information as it becomes available."
CRITICAL: Do NOT fabricate quotes, statistics or facts that are not in the source."#;

const SHORT_SOURCE_GUIDANCE: &str = r#"
NOTE: Make sure the rewritten article is at least 120 words with proper context and background. Do NOT fabricate any facts."#;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Rewrites entries in AP style through the OpenAI chat completions API
pub struct OpenAiRewriter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiRewriter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the user prompt for an entry: cleaned, truncated source plus length guidance.
    pub fn build_prompt(entry: &FeedEntry) -> String {
        let mut clean = strip_html(&entry.body);
        if clean.is_empty() {
            clean = strip_html(&entry.summary);
        }
        if clean.is_empty() {
            warn!("Article content is empty after cleaning, using title");
            clean = entry.title.clone();
        }

        if clean.chars().count() > MAX_SOURCE_CHARS {
            info!("Truncated content of '{}' due to length", entry.title);
            clean = truncate_chars(&clean, MAX_SOURCE_CHARS);
        }

        let source_words = word_count(&clean);
        let guidance = if source_words < 100 {
            BRIEF_SOURCE_GUIDANCE
        } else if source_words < 200 {
            SHORT_SOURCE_GUIDANCE
        } else {
            ""
        };

        format!(
            "Please rewrite the following article in AP style:\n\nTitle: {}\nSource URL: {}\nSource word count: approximately {} words\n{}\n\nContent:\n{}\n\nRemember to respond with only a valid JSON object.",
            entry.title,
            entry.link.as_deref().unwrap_or(""),
            source_words,
            guidance,
            clean
        )
    }

    async fn complete(&self, user_prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: AP_STYLE_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            temperature: 0.7,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(2),
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            let retryable = match response {
                Ok(response) if response.status().is_success() => {
                    let chat: ChatResponse = response.json().await?;
                    return chat
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| PublisherError::RewriteFailed("no response from OpenAI".to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    let error_text = response.text().await.unwrap_or_default();
                    last_error = Some(PublisherError::RewriteFailed(format!(
                        "OpenAI API error {}: {}",
                        status, error_text
                    )));
                    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    last_error = Some(PublisherError::Http(e));
                    retryable
                }
            };

            if !retryable || attempt == MAX_ATTEMPTS {
                break;
            }
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!("OpenAI attempt {} failed, retrying in {:?}", attempt, delay);
                    tokio::time::sleep(delay).await;
                }
                None => break,
            }
        }

        Err(last_error.unwrap_or_else(|| PublisherError::RewriteFailed("unknown OpenAI error".to_string())))
    }
}

#[async_trait]
impl Rewriter for OpenAiRewriter {
    async fn rewrite(&self, entry: &FeedEntry) -> Result<RewrittenArticle> {
        info!("Rewriting article: {}", truncate_chars(&entry.title, 60));

        let prompt = Self::build_prompt(entry);
        let response_text = self.complete(prompt).await.map_err(|e| match e {
            PublisherError::RewriteFailed(_) => e,
            other => PublisherError::RewriteFailed(other.to_string()),
        })?;

        let article = parse_json_response(&response_text)
            .ok_or_else(|| {
                error!("Failed to parse model response as JSON");
                debug!("Unparseable response: {}", truncate_chars(&response_text, 500));
                PublisherError::RewriteFailed("response was not valid JSON".to_string())
            })
            .and_then(|value| article_from_json(&value, &entry.title))?;

        info!("Article rewritten successfully: {}", truncate_chars(&article.headline, 60));
        Ok(article)
    }
}

/// Parse a model reply as JSON: the whole text, then a fenced code block, then
/// the outermost `{...}` span.
pub fn parse_json_response(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            if let Ok(value) = serde_json::from_str::<Value>(after_fence[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end]).ok()
}

/// Map the model's JSON onto an article, filling gaps with sane defaults.
pub fn article_from_json(value: &Value, original_title: &str) -> Result<RewrittenArticle> {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let body = field("body").map(ensure_html_paragraphs).unwrap_or_default();
    if body.trim().is_empty() {
        return Err(PublisherError::RewriteFailed("rewritten body is empty".to_string()));
    }

    let headline = field("headline").unwrap_or(original_title).to_string();
    let category = field("category").unwrap_or("News").to_string();

    let tags = match value.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    let tags = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(RewrittenArticle {
        headline,
        body,
        category,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let value = parse_json_response(r#"{"headline":"A","body":"B","category":"News","tags":[]}"#).unwrap();
        assert_eq!(value["headline"], "A");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here you go:\n```json\n{\"headline\": \"Fenced\", \"body\": \"x\"}\n```\nThanks";
        let value = parse_json_response(text).unwrap();
        assert_eq!(value["headline"], "Fenced");
    }

    #[test]
    fn test_parse_embedded_object() {
        let text = "Sure! {\"headline\": \"Embedded\", \"body\": \"x\"} hope that helps";
        let value = parse_json_response(text).unwrap();
        assert_eq!(value["headline"], "Embedded");
        assert!(parse_json_response("no json here").is_none());
    }

    #[test]
    fn test_article_defaults_and_tag_coercion() {
        let value = serde_json::json!({
            "body": "First paragraph.\n\nSecond paragraph.",
            "tags": "Local News "
        });

        let article = article_from_json(&value, "Original Title").unwrap();
        assert_eq!(article.headline, "Original Title");
        assert_eq!(article.category, "News");
        assert_eq!(article.tags, vec!["local news".to_string()]);
        assert_eq!(article.body, "<p>First paragraph.</p>\n<p>Second paragraph.</p>");
    }

    #[test]
    fn test_empty_body_is_rewrite_failure() {
        let value = serde_json::json!({ "headline": "Nothing", "body": "   " });
        assert!(matches!(
            article_from_json(&value, "t"),
            Err(PublisherError::RewriteFailed(_))
        ));
    }

    #[test]
    fn test_prompt_guidance_for_brief_source() {
        let entry = FeedEntry {
            title: "Short item".to_string(),
            link: Some("https://example.com/a".to_string()),
            body: "<p>Only a few words <script>ignored()</script>here.</p>".to_string(),
            ..Default::default()
        };

        let prompt = OpenAiRewriter::build_prompt(&entry);
        assert!(prompt.contains("The source material is brief"));
        assert!(prompt.contains("Only a few words here."));
        assert!(!prompt.contains("ignored"));
        assert!(prompt.contains("Source URL: https://example.com/a"));
    }
}
