use anyhow::{Context, Result};
use clap::Parser;
use email_notifier::EmailNotifier;
use interfaces::{Ledger, Notifier, RunSummary};
use rss_publisher::config::DEFAULT_FEEDS_FILE;
use rss_publisher::{
    Config, ImageResolver, OpenAiRewriter, PollCycleController, PublishPipeline, RssFeedSource,
    WordPressClient,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Publish AP-style rewrites of RSS entries to WordPress
#[derive(Debug, Parser)]
#[command(name = "rss-publisher", version, about)]
struct Cli {
    /// Keep running and poll every POLL_INTERVAL_MINUTES
    #[arg(long)]
    schedule: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Check the WordPress credentials and exit
    #[arg(long)]
    test_connection: bool,

    /// File with one feed URL per line
    #[arg(long, default_value = DEFAULT_FEEDS_FILE)]
    feeds_file: PathBuf,

    /// Ledger file, overrides DATABASE_PATH
    #[arg(long)]
    database: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},reqwest=warn,hyper=warn,sqlx=warn,html5ever=warn", default_level)));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct App {
    config: Config,
    controller: PollCycleController,
    notifier: Option<EmailNotifier>,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let source = RssFeedSource::new(config.fetch_config()).context("Failed to create feed source")?;
        let rewriter = OpenAiRewriter::new(config.openai_api_key.clone(), config.openai_model.clone())
            .context("Failed to create OpenAI client")?;
        let images = ImageResolver::new(config.pexels_api_key.clone()).context("Failed to create image resolver")?;
        let wordpress = WordPressClient::new(&config.wp_url, config.wp_username.clone(), config.wp_app_password.clone())
            .context("Failed to create WordPress client")?;

        let pipeline = PublishPipeline::new(Arc::new(rewriter), Arc::new(images), Arc::new(wordpress));
        let controller = PollCycleController::new(Arc::new(source), pipeline)
            .with_entry_delay(config.entry_delay)
            .with_max_age(config.max_age)
            .with_retry_failed(config.retry_failed);

        let notifier = config.email.clone().map(EmailNotifier::new);
        match &notifier {
            Some(n) => info!("Email notifications enabled. Will notify: {}", n.recipient()),
            None => info!("Email notifications disabled (set NOTIFY_EMAIL, SMTP_USERNAME and SMTP_PASSWORD)"),
        }

        Ok(Self {
            config,
            controller,
            notifier,
        })
    }

    /// One sweep: connection check, ledger open, cycle, ledger close, notification.
    async fn run_once(&mut self) -> Result<RunSummary> {
        self.controller
            .pipeline()
            .publisher()
            .test_connection()
            .await
            .context("WordPress connection failed, check WP_URL, WP_USERNAME and WP_APP_PASSWORD")?;

        let ledger = Ledger::load(&self.config.database_path)
            .await
            .context("Failed to open the processed-entry ledger")?;

        let result = self.controller.run_cycle(&self.config.rss_feeds, &ledger).await;
        ledger.persist().await.context("Failed to close the ledger")?;
        let summary = result.context("Poll cycle aborted")?;

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&summary).await {
                warn!("Failed to send notification: {}", e);
            }
        }

        Ok(summary)
    }

    async fn run_scheduled(&mut self) -> Result<()> {
        info!(
            "Running every {} minutes over {} feeds. Press Ctrl+C to stop.",
            self.config.poll_interval.as_secs() / 60,
            self.config.rss_feeds.len()
        );

        loop {
            match self.run_once().await {
                Ok(summary) => info!(
                    "Cycle finished: {} published, {} failed, {} skipped",
                    summary.published, summary.failed, summary.skipped
                ),
                Err(e) => error!("Cycle failed: {:#}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping");
                    return Ok(());
                }
            }
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::from_env(&cli.feeds_file).context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    info!("Starting RSS publisher for {}", config.wp_url);
    info!("Monitoring {} feeds, ledger at {}", config.rss_feeds.len(), config.database_path.display());

    let mut app = App::build(config)?;

    if cli.test_connection {
        let user = app
            .controller
            .pipeline()
            .publisher()
            .test_connection()
            .await
            .context("WordPress connection test failed")?;
        info!("WordPress connection OK (user: {})", user);
        return Ok(true);
    }

    if cli.schedule {
        app.run_scheduled().await?;
        return Ok(true);
    }

    let summary = app.run_once().await?;
    info!(
        "Run complete: {} published, {} failed, {} skipped",
        summary.published, summary.failed, summary.skipped
    );
    Ok(!summary.is_total_failure())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("Run had errors and published nothing");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
