pub mod config;
pub mod cycle;
pub mod fetcher;
pub mod identity;
pub mod images;
pub mod parser;
pub mod pipeline;
pub mod rewriter;
pub mod sources;
pub mod traits;
pub mod types;
pub mod utils;
pub mod wordpress;

pub use config::Config;
pub use cycle::PollCycleController;
pub use fetcher::Fetcher;
pub use identity::{identify, IdentityError};
pub use images::ImageResolver;
pub use parser::FeedParser;
pub use pipeline::{PublishPipeline, PublishResult};
pub use rewriter::OpenAiRewriter;
pub use sources::RssFeedSource;
pub use traits::{FeedSource, ImageProvider, Publisher, Rewriter};
pub use types::*;
pub use wordpress::WordPressClient;
