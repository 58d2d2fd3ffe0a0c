pub mod defs;
pub mod state;

pub use defs::{
    EntryFailure, EntryIdentifier, FeedEntry, FeedFailure, IdentitySource, ImageOrigin, ImageRef, Notifier,
    PublishedArticle, RunSummary,
};
pub use state::{EntryStatus, Ledger, LedgerError, LedgerResult, ProcessedEntryRecord};
