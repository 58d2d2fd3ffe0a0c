use chrono::{Duration, Utc};
use interfaces::{EntryIdentifier, EntryStatus, IdentitySource, Ledger, LedgerError, ProcessedEntryRecord};
use std::path::PathBuf;
use std::sync::Once;
use tracing::info;
use uuid::Uuid;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn temp_ledger_path() -> PathBuf {
    std::env::temp_dir().join(format!("ledger-test-{}.db", Uuid::new_v4()))
}

fn link_id(url: &str) -> EntryIdentifier {
    EntryIdentifier::new(url, IdentitySource::Link)
}

#[tokio::test]
async fn test_published_entry_survives_reload() -> Result<(), LedgerError> {
    init_tracing();
    let path = temp_ledger_path();
    let id = link_id("https://example.com/news/one");

    let ledger = Ledger::load(&path).await?;
    assert!(!ledger.has(&id).await?);

    ledger
        .record(ProcessedEntryRecord::published(&id, 42, Utc::now()).with_source("https://example.com/feed", "One"))
        .await?;
    assert!(ledger.has(&id).await?);
    ledger.persist().await?;

    info!("Reopening ledger at {}", path.display());
    let reopened = Ledger::load(&path).await?;
    assert!(reopened.has(&id).await?);
    assert!(reopened.is_published(&id).await?);
    assert_eq!(reopened.post_id_for(&id).await?, Some(42));
    assert_eq!(reopened.count().await?, 1);

    let record = reopened.get(&id).await?.expect("record should exist");
    assert_eq!(record.feed_url.as_deref(), Some("https://example.com/feed"));
    assert_eq!(record.title.as_deref(), Some("One"));
    reopened.persist().await?;

    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test]
async fn test_recording_same_status_twice_is_a_noop() -> Result<(), LedgerError> {
    init_tracing();
    let path = temp_ledger_path();
    let id = link_id("https://example.com/news/two");
    let first_at = Utc::now() - Duration::minutes(5);

    let ledger = Ledger::load(&path).await?;
    ledger.record(ProcessedEntryRecord::published(&id, 7, first_at)).await?;
    ledger.record(ProcessedEntryRecord::published(&id, 7, Utc::now())).await?;

    assert!(ledger.has(&id).await?);
    assert_eq!(ledger.count().await?, 1);

    // The original record is kept untouched
    let record = ledger.get(&id).await?.expect("record should exist");
    assert_eq!(record.processed_at.timestamp(), first_at.timestamp());

    ledger.persist().await?;
    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test]
async fn test_published_is_terminal() -> Result<(), LedgerError> {
    init_tracing();
    let path = temp_ledger_path();
    let id = link_id("https://example.com/news/three");

    let ledger = Ledger::load(&path).await?;
    ledger.record(ProcessedEntryRecord::published(&id, 3, Utc::now())).await?;

    let result = ledger
        .record(ProcessedEntryRecord::failed(&id, "rewrite failed", Utc::now()))
        .await;

    match result {
        Err(LedgerError::TerminalState { identifier, attempted }) => {
            assert_eq!(identifier, id.as_str());
            assert_eq!(attempted, EntryStatus::Failed);
        }
        other => panic!("expected TerminalState, got {:?}", other),
    }

    let record = ledger.get(&id).await?.expect("record should exist");
    assert_eq!(record.status, EntryStatus::Published);
    assert_eq!(record.post_id, Some(3));
    assert!(record.error.is_none());

    ledger.persist().await?;
    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test]
async fn test_failed_entry_counts_as_seen_and_can_be_superseded() -> Result<(), LedgerError> {
    init_tracing();
    let path = temp_ledger_path();
    let id = link_id("https://example.com/news/four");

    let ledger = Ledger::load(&path).await?;
    ledger
        .record(ProcessedEntryRecord::failed(&id, "publish failed", Utc::now()))
        .await?;

    assert!(ledger.has(&id).await?);
    assert!(!ledger.is_published(&id).await?);

    ledger.record(ProcessedEntryRecord::published(&id, 99, Utc::now())).await?;
    let record = ledger.get(&id).await?.expect("record should exist");
    assert_eq!(record.status, EntryStatus::Published);
    assert_eq!(record.post_id, Some(99));
    assert_eq!(ledger.count().await?, 1);

    ledger.persist().await?;
    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_file_is_unavailable() {
    init_tracing();
    let path = temp_ledger_path();
    std::fs::write(&path, b"this is definitely not an sqlite database, just some bytes on disk")
        .expect("write corrupt file");

    let result = Ledger::load(&path).await;
    match result {
        Err(err @ LedgerError::Unavailable { .. }) => {
            assert!(err.is_fatal());
            info!("Corrupt ledger rejected: {}", err);
        }
        Err(other) => panic!("expected Unavailable, got {:?}", other),
        Ok(_) => panic!("corrupt ledger file should not load"),
    }

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_closed_ledger_is_unavailable() -> Result<(), LedgerError> {
    init_tracing();
    let path = temp_ledger_path();
    let id = link_id("https://example.com/news/closed");

    let ledger = Ledger::load(&path).await?;
    ledger.record(ProcessedEntryRecord::skipped(&id, Utc::now())).await?;
    ledger.close().await;
    assert!(ledger.is_closed());

    let err = ledger.has(&id).await.expect_err("closed ledger must not answer");
    info!("Lookup after close: {}", err);
    assert!(matches!(err, LedgerError::Unavailable { .. }));
    assert!(err.is_fatal());

    let err = ledger
        .record(ProcessedEntryRecord::published(&id, 7, Utc::now()))
        .await
        .expect_err("closed ledger must not accept writes");
    assert!(matches!(err, LedgerError::Unavailable { .. }));

    let reopened = Ledger::load(&path).await?;
    assert_eq!(reopened.get(&id).await?.map(|r| r.status), Some(EntryStatus::Skipped));
    reopened.persist().await?;

    let _ = std::fs::remove_file(&path);
    Ok(())
}
