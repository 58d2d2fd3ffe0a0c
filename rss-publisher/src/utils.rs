/// Check if a word is a common stop word
pub fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "a" | "an" | "the" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" | "of" | "with" | "by" |
        "from" | "is" | "are" | "was" | "were" | "be" | "been" | "being" | "have" | "has" | "had" | "do" |
        "does" | "did" | "will" | "would" | "could" | "should" | "may" | "might" | "must" | "shall" | "can" |
        "need" | "this" | "that" | "these" | "those" | "it" | "its" | "as" | "if" | "when" | "where" | "how" |
        "what" | "which" | "who" | "whom" | "why" | "so" | "than" | "too" | "very" | "just" | "also" | "now" |
        "here" | "there" | "then" | "some" | "any" | "all" | "both" | "each" | "few" | "more" | "most" |
        "other" | "into" | "over" | "after" | "before" | "between" | "under" | "again" | "further" | "once" |
        "during" | "out" | "up" | "down" | "off" | "about" | "only" | "same" | "new" | "says" | "said" |
        "announces" | "announced" | "reports" | "reported"
    )
}

/// Text processing utilities
pub mod text {
    use scraper::Html;

    /// Remove tags, drop script/style content and collapse whitespace
    pub fn strip_html(html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }

        let fragment = Html::parse_fragment(html);
        let mut text = String::new();

        for node in fragment.root_element().descendants() {
            if let Some(chunk) = node.value().as_text() {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .map(|el| matches!(el.name(), "script" | "style"))
                        .unwrap_or(false)
                });
                if !hidden {
                    text.push_str(chunk);
                    text.push(' ');
                }
            }
        }

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Truncate to at most `max_chars` characters, appending "..." when cut
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
            None => text.to_string(),
        }
    }

    pub fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Wrap plain-text paragraphs (separated by blank lines) in `<p>` tags.
    /// Text that already carries block markup is returned unchanged.
    pub fn ensure_html_paragraphs(body: &str) -> String {
        if body.trim().is_empty() {
            return String::new();
        }

        let lower = body.to_lowercase();
        if lower.contains("<p>") || lower.contains("<p ") || lower.contains("<div") {
            return body.to_string();
        }

        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in body.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    paragraphs.push(current.join("\n"));
                    current.clear();
                }
            } else {
                current.push(line.trim());
            }
        }
        if !current.is_empty() {
            paragraphs.push(current.join("\n"));
        }

        paragraphs
            .iter()
            .map(|p| format!("<p>{}</p>", p))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// HTML inspection helpers
pub mod html {
    use scraper::{Html, Selector};

    fn is_absolute(url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    /// First absolute image URL in an HTML snippet (`src`, then lazy-load `data-src`)
    pub fn first_image_url(html: &str) -> Option<String> {
        if !html.contains("<img") {
            return None;
        }

        let fragment = Html::parse_fragment(html);
        let selector = Selector::parse("img").ok()?;
        let img = fragment.select(&selector).next()?;

        ["src", "data-src"]
            .iter()
            .filter_map(|attr| img.value().attr(attr))
            .find(|url| is_absolute(url))
            .map(|url| url.to_string())
    }

    /// Text of the first container matching one of `selectors` that holds more
    /// than `min_chars` characters
    pub fn extract_article_text(html: &str, selectors: &[&str], min_chars: usize) -> Option<String> {
        let document = Html::parse_document(html);

        for raw in selectors {
            let Ok(selector) = Selector::parse(raw) else {
                continue;
            };
            if let Some(container) = document.select(&selector).next() {
                let text = container
                    .text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                if text.len() > min_chars {
                    return Some(text);
                }
            }
        }

        None
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Validate feed URL format
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => url.scheme() == "http" || url.scheme() == "https",
            Err(_) => false,
        }
    }
}
