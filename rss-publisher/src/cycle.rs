use crate::identity::identify;
use crate::pipeline::PublishPipeline;
use crate::traits::FeedSource;
use crate::types::{EntryIdentifier, FeedEntry, RunSummary};
use chrono::{Duration as ChronoDuration, Utc};
use interfaces::defs::{EntryFailure, FeedFailure, PublishedArticle};
use interfaces::{Ledger, LedgerError, ProcessedEntryRecord};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sweeps every configured feed once per call, publishing entries the ledger
/// has not seen and recording each outcome.
pub struct PollCycleController {
    source: Arc<dyn FeedSource>,
    pipeline: PublishPipeline,
    entry_delay: Duration,
    max_age: Option<ChronoDuration>,
    retry_failed: bool,
    // Entries handed to the pipeline by this process, across cycles
    attempted: HashSet<EntryIdentifier>,
}

enum Decision {
    Publish,
    Skip(&'static str),
    RecordStale,
}

impl PollCycleController {
    pub fn new(source: Arc<dyn FeedSource>, pipeline: PublishPipeline) -> Self {
        Self {
            source,
            pipeline,
            entry_delay: Duration::from_secs(2),
            max_age: Some(ChronoDuration::hours(24)),
            retry_failed: false,
            attempted: HashSet::new(),
        }
    }

    /// Pause between published entries to stay under API rate limits.
    pub fn with_entry_delay(mut self, delay: Duration) -> Self {
        self.entry_delay = delay;
        self
    }

    /// Entries published longer ago than this are recorded as skipped. `None` disables the check.
    pub fn with_max_age(mut self, max_age: Option<ChronoDuration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Retry entries whose earlier attempt failed instead of skipping them for good.
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    pub fn pipeline(&self) -> &PublishPipeline {
        &self.pipeline
    }

    pub async fn run_cycle(&mut self, feeds: &[String], ledger: &Ledger) -> Result<RunSummary, LedgerError> {
        let mut summary = RunSummary::new(Utc::now());
        let mut pipeline_called = false;

        info!("Starting poll cycle over {} feeds", feeds.len());

        for feed_url in feeds {
            let entries = match self.source.fetch(feed_url).await {
                Ok(entries) => entries,
                Err(e) => {
                    error!("Feed {} failed: {}", feed_url, e);
                    summary.feed_errors.push(FeedFailure {
                        feed_url: feed_url.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            info!("Feed {} returned {} entries", feed_url, entries.len());
            let mut seen_in_feed = HashSet::new();

            for entry in &entries {
                let identifier = match identify(entry) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("Skipping entry from {}: {}", feed_url, e);
                        summary.skipped += 1;
                        continue;
                    }
                };

                if identifier.is_weak() {
                    warn!(
                        "Entry '{}' has no link or guid; using content hash {}",
                        entry.title, identifier
                    );
                }

                if !seen_in_feed.insert(identifier.clone()) {
                    debug!("Duplicate entry {} within {}", identifier, feed_url);
                    summary.skipped += 1;
                    continue;
                }

                match self.decide(entry, &identifier, ledger).await? {
                    Decision::Skip(reason) => {
                        debug!("Skipping {}: {}", identifier, reason);
                        summary.skipped += 1;
                    }
                    Decision::RecordStale => {
                        debug!("Skipping {}: older than the maximum age", identifier);
                        let record = ProcessedEntryRecord::skipped(&identifier, Utc::now())
                            .with_source(feed_url.as_str(), entry.title.as_str());
                        Self::record(ledger, record).await?;
                        summary.skipped += 1;
                    }
                    Decision::Publish => {
                        if pipeline_called && !self.entry_delay.is_zero() {
                            tokio::time::sleep(self.entry_delay).await;
                        }
                        pipeline_called = true;

                        self.attempted.insert(identifier.clone());
                        self.publish_entry(entry, &identifier, feed_url, ledger, &mut summary).await?;
                    }
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        info!(
            "Poll cycle complete: {} published, {} failed, {} skipped, {} feed errors",
            summary.published,
            summary.failed,
            summary.skipped,
            summary.feed_errors.len()
        );

        Ok(summary)
    }

    async fn decide(
        &self,
        entry: &FeedEntry,
        identifier: &EntryIdentifier,
        ledger: &Ledger,
    ) -> Result<Decision, LedgerError> {
        if self.attempted.contains(identifier) {
            return Ok(Decision::Skip("already attempted in this run"));
        }

        let seen = if self.retry_failed {
            ledger.is_published(identifier).await?
        } else {
            ledger.has(identifier).await?
        };
        if seen {
            return Ok(Decision::Skip("already in ledger"));
        }

        if let (Some(max_age), Some(published)) = (self.max_age, entry.published) {
            if Utc::now() - published > max_age {
                return Ok(Decision::RecordStale);
            }
        }

        Ok(Decision::Publish)
    }

    async fn publish_entry(
        &self,
        entry: &FeedEntry,
        identifier: &EntryIdentifier,
        feed_url: &str,
        ledger: &Ledger,
        summary: &mut RunSummary,
    ) -> Result<(), LedgerError> {
        info!("Processing entry: {}", entry.title);
        let result = self.pipeline.publish(entry, identifier).await;

        match (&result.post, &result.error) {
            (Some(post), _) => {
                if !result.image_attached {
                    debug!("Post {} has no featured image", post.id);
                }
                let record = ProcessedEntryRecord::published(identifier, post.id, Utc::now())
                    .with_source(feed_url, entry.title.as_str());
                Self::record(ledger, record).await?;

                summary.published += 1;
                summary.articles.push(PublishedArticle {
                    headline: result.headline.clone().unwrap_or_else(|| entry.title.clone()),
                    source_url: entry.link.clone().unwrap_or_else(|| identifier.to_string()),
                    post_url: post.link.clone(),
                    post_id: post.id,
                });
            }
            (None, error) => {
                let message = error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                let record = ProcessedEntryRecord::failed(identifier, message.clone(), Utc::now())
                    .with_source(feed_url, entry.title.as_str());
                Self::record(ledger, record).await?;

                summary.failed += 1;
                summary.failures.push(EntryFailure {
                    identifier: identifier.to_string(),
                    title: entry.title.clone(),
                    error: message,
                });
            }
        }

        Ok(())
    }

    /// Write a record; only errors that make the ledger untrustworthy abort the cycle.
    async fn record(ledger: &Ledger, record: ProcessedEntryRecord) -> Result<(), LedgerError> {
        match ledger.record(record).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                error!("Ledger write failed, aborting cycle: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!("{}", e);
                Ok(())
            }
        }
    }
}
