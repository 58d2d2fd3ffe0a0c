use crate::rewriter::DEFAULT_MODEL;
use crate::types::FetchConfig;
use crate::utils::url::is_valid_feed_url;
use anyhow::{bail, Context, Result};
use email_notifier::EmailConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_FEEDS_FILE: &str = "feeds.txt";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub wp_url: String,
    pub wp_username: String,
    pub wp_app_password: String,
    pub pexels_api_key: Option<String>,
    pub rss_feeds: Vec<String>,
    pub poll_interval: Duration,
    pub database_path: PathBuf,
    pub max_entries_per_feed: usize,
    /// `None` when the age filter is disabled
    pub max_age: Option<chrono::Duration>,
    pub entry_delay: Duration,
    pub retry_failed: bool,
    pub email: Option<EmailConfig>,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn from_env(feeds_file: &Path) -> Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        Self::from_lookup(feeds_file, |key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(feeds_file: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{} must be set", key));

        let openai_api_key = required("OPENAI_API_KEY")?;
        let wp_url = required("WP_URL")?.trim_end_matches('/').to_string();
        let wp_username = required("WP_USERNAME")?;
        let wp_app_password = required("WP_APP_PASSWORD")?;

        if !is_valid_feed_url(&wp_url) {
            bail!("WP_URL must be an http(s) URL, got '{}'", wp_url);
        }

        let rss_feeds = load_feeds(feeds_file, var("RSS_FEEDS").as_deref())?;

        let poll_minutes: u64 = parse_or(&var, "POLL_INTERVAL_MINUTES", 30)?;
        let max_age_hours: i64 = parse_or(&var, "MAX_AGE_HOURS", 24)?;
        let entry_delay_seconds: u64 = parse_or(&var, "ENTRY_DELAY_SECONDS", 2)?;
        let max_entries_per_feed: usize = parse_or(&var, "MAX_ENTRIES_PER_FEED", 5)?;

        if poll_minutes == 0 {
            bail!("POLL_INTERVAL_MINUTES must be at least 1");
        }
        if max_entries_per_feed == 0 {
            bail!("MAX_ENTRIES_PER_FEED must be at least 1");
        }

        let poll_interval = poll_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .with_context(|| format!("POLL_INTERVAL_MINUTES is too large: {}", poll_minutes))?;

        let max_age = if max_age_hours > 0 {
            let max_age = chrono::TimeDelta::try_hours(max_age_hours)
                .with_context(|| format!("MAX_AGE_HOURS is too large: {}", max_age_hours))?;
            Some(max_age)
        } else {
            None
        };

        let retry_failed = match var("RETRY_FAILED") {
            Some(value) => parse_bool(&value).with_context(|| format!("RETRY_FAILED must be true or false, got '{}'", value))?,
            None => false,
        };

        let email = match (var("NOTIFY_EMAIL"), var("SMTP_USERNAME"), var("SMTP_PASSWORD")) {
            (Some(recipient), Some(username), Some(password)) => Some(EmailConfig {
                smtp_server: var("SMTP_SERVER").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                smtp_port: parse_or(&var, "SMTP_PORT", 587)?,
                username,
                password,
                recipient,
            }),
            _ => None,
        };

        Ok(Self {
            openai_api_key,
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            wp_url,
            wp_username,
            wp_app_password,
            pexels_api_key: var("PEXELS_API_KEY"),
            rss_feeds,
            poll_interval,
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./processed.db")),
            max_entries_per_feed,
            max_age,
            entry_delay: Duration::from_secs(entry_delay_seconds),
            retry_failed,
            email,
        })
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_entries_per_feed: self.max_entries_per_feed,
            ..FetchConfig::default()
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", key, value)),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Feed URLs, one per line; blank lines and `#` comments are ignored
pub fn parse_feed_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn load_feeds(feeds_file: &Path, rss_feeds_var: Option<&str>) -> Result<Vec<String>> {
    let mut feeds = Vec::new();

    if feeds_file.exists() {
        let content = std::fs::read_to_string(feeds_file)
            .with_context(|| format!("Failed to read feeds file {}", feeds_file.display()))?;
        feeds = parse_feed_list(&content);
        info!("Loaded {} feeds from {}", feeds.len(), feeds_file.display());
    }

    if feeds.is_empty() {
        if let Some(list) = rss_feeds_var {
            feeds = list
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    let (valid, invalid): (Vec<String>, Vec<String>) = feeds.into_iter().partition(|f| is_valid_feed_url(f));
    for feed in &invalid {
        warn!("Ignoring invalid feed URL: {}", feed);
    }

    if valid.is_empty() {
        bail!(
            "No RSS feeds configured; add them to {} or set RSS_FEEDS",
            feeds_file.display()
        );
    }

    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn missing_file() -> PathBuf {
        std::env::temp_dir().join("rss-publisher-no-such-feeds-file.txt")
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("OPENAI_API_KEY", "sk-test"),
        ("WP_URL", "https://blog.example.com/"),
        ("WP_USERNAME", "editor"),
        ("WP_APP_PASSWORD", "abcd efgh"),
        ("RSS_FEEDS", "https://a.example.com/rss, https://b.example.com/feed ,"),
    ];

    #[test]
    fn test_parse_feed_list_skips_comments() {
        let content = "# local news\nhttps://a.example.com/rss\n\n   \n  https://b.example.com/feed  \n#https://c.example.com\n";
        assert_eq!(
            parse_feed_list(content),
            vec!["https://a.example.com/rss".to_string(), "https://b.example.com/feed".to_string()]
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(&missing_file(), lookup(REQUIRED)).unwrap();

        assert_eq!(config.wp_url, "https://blog.example.com");
        assert_eq!(config.rss_feeds.len(), 2);
        assert_eq!(config.poll_interval, Duration::from_secs(30 * 60));
        assert_eq!(config.database_path, PathBuf::from("./processed.db"));
        assert_eq!(config.openai_model, "gpt-4.1-nano");
        assert_eq!(config.max_age, Some(chrono::Duration::hours(24)));
        assert_eq!(config.entry_delay, Duration::from_secs(2));
        assert!(!config.retry_failed);
        assert!(config.email.is_none());
    }

    #[test]
    fn test_missing_required_value_is_named() {
        let vars: Vec<(&str, &str)> = REQUIRED.iter().copied().filter(|(k, _)| *k != "WP_USERNAME").collect();
        let err = Config::from_lookup(&missing_file(), lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("WP_USERNAME"));
    }

    #[test]
    fn test_email_needs_all_three_settings() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("NOTIFY_EMAIL", "me@example.com"));
        vars.push(("SMTP_USERNAME", "bot@example.com"));
        let config = Config::from_lookup(&missing_file(), lookup(&vars)).unwrap();
        assert!(config.email.is_none());

        vars.push(("SMTP_PASSWORD", "secret"));
        vars.push(("SMTP_PORT", "2525"));
        vars.push(("MAX_AGE_HOURS", "0"));
        vars.push(("RETRY_FAILED", "true"));
        let config = Config::from_lookup(&missing_file(), lookup(&vars)).unwrap();
        let email = config.email.unwrap();
        assert_eq!(email.smtp_server, "smtp.gmail.com");
        assert_eq!(email.smtp_port, 2525);
        assert_eq!(email.recipient, "me@example.com");
        assert!(config.max_age.is_none());
        assert!(config.retry_failed);
    }

    #[test]
    fn test_no_feeds_is_an_error() {
        let vars: Vec<(&str, &str)> = REQUIRED.iter().copied().filter(|(k, _)| *k != "RSS_FEEDS").collect();
        assert!(Config::from_lookup(&missing_file(), lookup(&vars)).is_err());
    }

    #[test]
    fn test_out_of_range_durations_are_config_errors() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("POLL_INTERVAL_MINUTES", "18446744073709551615"));
        let err = Config::from_lookup(&missing_file(), lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_MINUTES"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_AGE_HOURS", "9223372036854775807"));
        let err = Config::from_lookup(&missing_file(), lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("MAX_AGE_HOURS"));
    }
}
