use interfaces::RunSummary;

fn has_problems(summary: &RunSummary) -> bool {
    summary.failed > 0 || !summary.feed_errors.is_empty()
}

pub fn subject(summary: &RunSummary) -> String {
    if summary.published == 0 && has_problems(summary) {
        return format!(
            "⚠️ RSS Publisher: {} Failed Entries, {} Unreachable Feeds",
            summary.failed,
            summary.feed_errors.len()
        );
    }
    format!("📰 {} New Article(s) Published to WordPress", summary.published)
}

/// Plain-text body: one numbered block per published article, then every failure
pub fn render_text(summary: &RunSummary) -> String {
    let mut text = format!("New Articles Published ({} total)\n", summary.articles.len());
    text.push_str(&"=".repeat(50));
    text.push_str("\n\n");

    for (i, article) in summary.articles.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, article.headline));
        text.push_str(&format!("   Source: {}\n", article.source_url));
        text.push_str(&format!("   Published: {}\n", article.post_url));
        text.push_str(&format!("   Post ID: {}\n\n", article.post_id));
    }

    if !has_problems(summary) {
        return text;
    }

    text.push_str(&format!(
        "{} entries failed, {} feeds could not be read.\n",
        summary.failed,
        summary.feed_errors.len()
    ));

    if !summary.failures.is_empty() {
        text.push_str("\nFailed Entries\n");
        text.push_str(&"-".repeat(50));
        text.push('\n');
        for failure in &summary.failures {
            text.push_str(&format!("- {} ({})\n", failure.title, failure.identifier));
            text.push_str(&format!("  Error: {}\n", failure.error));
        }
    }

    if !summary.feed_errors.is_empty() {
        text.push_str("\nUnreachable Feeds\n");
        text.push_str(&"-".repeat(50));
        text.push('\n');
        for feed in &summary.feed_errors {
            text.push_str(&format!("- {}\n", feed.feed_url));
            text.push_str(&format!("  Error: {}\n", feed.error));
        }
    }

    text
}

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .header { background: #2563eb; color: white; padding: 20px; border-radius: 8px 8px 0 0; }
        .content { padding: 20px; background: #f8fafc; }
        .article { background: white; padding: 15px; margin: 10px 0; border-radius: 8px; border-left: 4px solid #2563eb; }
        .article h3 { margin: 0 0 10px 0; color: #1e40af; }
        .links a { display: inline-block; margin-right: 15px; color: #2563eb; text-decoration: none; }
        .failure { background: white; padding: 15px; margin: 10px 0; border-radius: 8px; border-left: 4px solid #dc2626; }
        .failure h3 { margin: 0 0 10px 0; color: #b91c1c; }
        .error { font-family: monospace; color: #7f1d1d; }
        .footer { padding: 15px; background: #e2e8f0; border-radius: 0 0 8px 8px; font-size: 12px; color: #64748b; }
"#;

/// HTML body with one card per published article and one per failure
pub fn render_html(summary: &RunSummary) -> String {
    let mut html = format!(
        "<html>\n<head>\n<style>{}</style>\n</head>\n<body>\n<div class=\"header\"><h1>📰 {} New Article(s) Published</h1></div>\n<div class=\"content\">\n",
        STYLE,
        summary.articles.len()
    );

    for article in &summary.articles {
        html.push_str(&format!(
            "<div class=\"article\">\n<h3>{}</h3>\n<div class=\"links\">\n<a href=\"{}\">📄 Original Source</a>\n<a href=\"{}\">🌐 View on WordPress</a>\n</div>\n</div>\n",
            escape(&article.headline),
            escape(&article.source_url),
            escape(&article.post_url)
        ));
    }

    for failure in &summary.failures {
        html.push_str(&format!(
            "<div class=\"failure\">\n<h3>❌ {}</h3>\n<p>{}</p>\n<p class=\"error\">{}</p>\n</div>\n",
            escape(&failure.title),
            escape(&failure.identifier),
            escape(&failure.error)
        ));
    }

    for feed in &summary.feed_errors {
        html.push_str(&format!(
            "<div class=\"failure\">\n<h3>⚠️ Feed unreachable</h3>\n<p>{}</p>\n<p class=\"error\">{}</p>\n</div>\n",
            escape(&feed.feed_url),
            escape(&feed.error)
        ));
    }

    html.push_str(
        "</div>\n<div class=\"footer\">This is an automated notification from the RSS to WordPress publisher.</div>\n</body>\n</html>\n",
    );
    html
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
