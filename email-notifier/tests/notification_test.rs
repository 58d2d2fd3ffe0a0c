use chrono::Utc;
use email_notifier::{render_html, render_text, subject, EmailConfig, EmailNotifier, NotifyError};
use interfaces::defs::{EntryFailure, FeedFailure, PublishedArticle};
use interfaces::RunSummary;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn test_config() -> EmailConfig {
    EmailConfig {
        smtp_server: "smtp.invalid".to_string(),
        smtp_port: 587,
        username: "bot@example.com".to_string(),
        password: "app-password".to_string(),
        recipient: "editor@example.com".to_string(),
    }
}

fn summary_with_articles() -> RunSummary {
    let mut summary = RunSummary::new(Utc::now());
    summary.published = 2;
    summary.articles = vec![
        PublishedArticle {
            headline: "Council approves budget".to_string(),
            source_url: "https://news.example.com/budget".to_string(),
            post_url: "https://blog.example.com/?p=101".to_string(),
            post_id: 101,
        },
        PublishedArticle {
            headline: "Storms & <flooding> hit coast".to_string(),
            source_url: "https://news.example.com/storms".to_string(),
            post_url: "https://blog.example.com/?p=102".to_string(),
            post_id: 102,
        },
    ];
    summary
}

#[test]
fn test_text_lists_every_published_article() {
    init_tracing();
    let summary = summary_with_articles();
    let text = render_text(&summary);

    assert!(text.starts_with("New Articles Published (2 total)"));
    assert!(text.contains("1. Council approves budget"));
    assert!(text.contains("   Source: https://news.example.com/budget"));
    assert!(text.contains("   Published: https://blog.example.com/?p=101"));
    assert!(text.contains("   Post ID: 101"));
    assert!(text.contains("2. Storms & <flooding> hit coast"));
    assert!(text.contains("   Post ID: 102"));
    assert!(!text.contains("could not be read"));
}

#[test]
fn test_html_cards_escape_headlines() {
    init_tracing();
    let summary = summary_with_articles();
    let html = render_html(&summary);

    assert_eq!(html.matches("class=\"article\"").count(), 2);
    assert!(html.contains("Storms &amp; &lt;flooding&gt; hit coast"));
    assert!(html.contains("href=\"https://blog.example.com/?p=102\""));
    assert_eq!(subject(&summary), "📰 2 New Article(s) Published to WordPress");
}

fn failure_only_summary() -> RunSummary {
    let mut summary = RunSummary::new(Utc::now());
    summary.failed = 1;
    summary.failures.push(EntryFailure {
        identifier: "https://news.example.com/fire".to_string(),
        title: "Warehouse <fire>".to_string(),
        error: "rewrite failed: model timed out".to_string(),
    });
    summary.feed_errors.push(FeedFailure {
        feed_url: "https://down.example.com/rss".to_string(),
        error: "timed out".to_string(),
    });
    summary
}

#[test]
fn test_failures_are_listed_with_their_errors() {
    init_tracing();
    let mut summary = failure_only_summary();
    summary.published = 2;
    summary.articles = summary_with_articles().articles;

    let text = render_text(&summary);
    assert!(text.contains("1 entries failed, 1 feeds could not be read."));
    assert!(text.contains("- Warehouse <fire> (https://news.example.com/fire)"));
    assert!(text.contains("  Error: rewrite failed: model timed out"));
    assert!(text.contains("- https://down.example.com/rss"));
    assert!(text.contains("  Error: timed out"));

    let html = render_html(&summary);
    assert_eq!(html.matches("class=\"article\"").count(), 2);
    assert_eq!(html.matches("class=\"failure\"").count(), 2);
    assert!(html.contains("Warehouse &lt;fire&gt;"));
    assert!(html.contains("rewrite failed: model timed out"));
    assert!(html.contains("https://down.example.com/rss"));
}

#[test]
fn test_failure_only_run_gets_a_warning_subject() {
    init_tracing();
    let summary = failure_only_summary();
    assert!(summary.is_reportable());
    assert_eq!(subject(&summary), "⚠️ RSS Publisher: 1 Failed Entries, 1 Unreachable Feeds");
    assert!(render_text(&summary).starts_with("New Articles Published (0 total)"));
}

#[tokio::test]
async fn test_failure_only_run_is_sent() {
    init_tracing();
    let mut config = test_config();
    config.smtp_server = "127.0.0.1".to_string();
    config.smtp_port = 1;
    let notifier = EmailNotifier::new(config);

    // Nothing listens on port 1, so reaching the transport shows up as an SMTP error
    let result = notifier.send(&failure_only_summary()).await;
    info!("Send result: {:?}", result);
    assert!(matches!(result, Err(NotifyError::Smtp(_))));
}

#[test]
fn test_message_builds_with_both_parts() {
    init_tracing();
    let notifier = EmailNotifier::new(test_config());
    let message = notifier.build_message(&summary_with_articles()).expect("message should build");

    let raw = String::from_utf8_lossy(&message.formatted()).to_string();
    info!("Built message of {} bytes", raw.len());
    assert!(raw.contains("multipart/alternative"));
    assert!(raw.contains("text/plain"));
    assert!(raw.contains("text/html"));
    assert!(raw.contains("editor@example.com"));
}

#[test]
fn test_invalid_recipient_is_rejected() {
    init_tracing();
    let mut config = test_config();
    config.recipient = "not an address".to_string();

    let notifier = EmailNotifier::new(config);
    assert!(notifier.build_message(&summary_with_articles()).is_err());
}

#[test]
fn test_empty_run_sends_nothing() {
    init_tracing();
    let notifier = EmailNotifier::new(test_config());
    let mut summary = RunSummary::new(Utc::now());
    summary.skipped = 4;
    assert!(!summary.is_reportable());

    // No SMTP connection is attempted for an empty run
    let sent = tokio_test::block_on(notifier.send(&summary)).expect("empty run should not error");
    assert!(!sent);
}
