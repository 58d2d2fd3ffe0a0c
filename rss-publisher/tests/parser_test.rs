use interfaces::IdentitySource;
use rss_publisher::{identify, FeedParser};
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

const FEED_URL: &str = "https://news.example.com/rss";

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com</link>
    <description>Local news</description>
    <item>
      <title>Council approves budget</title>
      <link>https://news.example.com/budget</link>
      <guid isPermaLink="false">budget-2024</guid>
      <pubDate>Wed, 01 May 2024 12:00:00 GMT</pubDate>
      <description>The council voted 5-2.</description>
      <media:content url="https://cdn.example.com/budget.jpg" medium="image" type="image/jpeg" />
    </item>
    <item>
      <title>Storm closes schools</title>
      <link>https://news.example.com/storm</link>
      <pubDate>Wed, 01 May 2024 13:00:00 GMT</pubDate>
      <description><![CDATA[<p>Schools are closed.</p><img src="https://cdn.example.com/storm.png" alt="storm">]]></description>
    </item>
    <item>
      <title>Library reopens</title>
      <link>https://news.example.com/library</link>
      <description>No pictures here.</description>
    </item>
    <item>
      <title>Fourth item</title>
      <link>https://news.example.com/four</link>
    </item>
  </channel>
</rss>"#;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <id>urn:uuid:feed</id>
  <updated>2024-05-01T12:00:00Z</updated>
  <entry>
    <title>Atom story</title>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <link href="https://atom.example.com/story"/>
    <updated>2024-05-01T12:00:00Z</updated>
    <summary>Short summary</summary>
    <content type="html">&lt;p&gt;Full content&lt;/p&gt;</content>
  </entry>
</feed>"#;

#[test]
fn test_rss_entries_are_mapped() {
    init_tracing();
    let parser = FeedParser::new(5);
    let entries = parser.parse_feed(RSS, FEED_URL).expect("feed should parse");
    info!("Parsed {} entries", entries.len());

    assert_eq!(entries.len(), 4);

    let budget = &entries[0];
    assert_eq!(budget.title, "Council approves budget");
    assert_eq!(budget.link.as_deref(), Some("https://news.example.com/budget"));
    assert_eq!(budget.guid.as_deref(), Some("budget-2024"));
    assert_eq!(budget.feed_url, FEED_URL);
    assert!(budget.published.is_some());
    assert_eq!(budget.body, "The council voted 5-2.");
    assert_eq!(budget.images[0].url, "https://cdn.example.com/budget.jpg");

    let storm = &entries[1];
    assert!(storm.guid.is_none());
    assert_eq!(storm.images.len(), 1);
    assert_eq!(storm.images[0].url, "https://cdn.example.com/storm.png");

    assert!(entries[2].images.is_empty());
    assert!(entries[2].published.is_none());
}

#[test]
fn test_only_first_entries_are_kept() {
    init_tracing();
    let parser = FeedParser::new(2);
    let entries = parser.parse_feed(RSS, FEED_URL).expect("feed should parse");

    let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Council approves budget", "Storm closes schools"]);
}

#[test]
fn test_atom_prefers_content_over_summary() {
    init_tracing();
    let parser = FeedParser::new(5);
    let entries = parser.parse_feed(ATOM, "https://atom.example.com/feed").expect("feed should parse");

    assert_eq!(entries.len(), 1);
    let story = &entries[0];
    assert_eq!(story.body, "<p>Full content</p>");
    assert_eq!(story.summary, "Short summary");
    assert!(story.published.is_some());

    let id = identify(story).expect("identifiable");
    assert_eq!(id.source(), IdentitySource::Link);
    assert_eq!(id.as_str(), "https://atom.example.com/story");
}

#[test]
fn test_garbage_is_a_parse_error() {
    init_tracing();
    let parser = FeedParser::new(5);

    assert!(!FeedParser::is_valid_feed_content("<html><body>Not a feed</body></html>"));
    assert!(FeedParser::is_valid_feed_content(RSS));
    assert!(parser.parse_feed("definitely not xml", FEED_URL).is_err());
}
