use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedwheel_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "feedwheel")]
#[command(author, version, about = "Feed fetch scheduler with leased dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a feed in the catalog
    Add {
        /// Feed URL
        #[arg(short = 'u', long)]
        url: String,
        /// Optional display title
        #[arg(short = 't', long)]
        title: Option<String>,
    },
    /// List all catalog feeds
    List,
    /// Run a single scheduler tick
    Tick,
    /// Update specific feeds now
    Update {
        /// Feed ids to update
        feed_ids: Vec<i64>,
        /// Bypass the already-fresh skip logic
        #[arg(long)]
        force: bool,
    },
    /// Push pre-fetched content to a single feed via the daemon
    Push {
        /// Feed id
        feed_id: i64,
        /// Path to the document to push
        file: std::path::PathBuf,
    },
    /// Show daemon and lease store status
    Status,
    /// Background scheduler daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the background daemon
    Start,
    /// Stop the background daemon
    Stop,
    /// Check daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    match cli.command {
        Commands::Add { url, title } => commands::add::run(&config, &url, title.as_deref()).await,
        Commands::List => commands::list::run(&config).await,
        Commands::Tick => commands::tick::run(&config).await,
        Commands::Update { feed_ids, force } => {
            commands::update::run(&config, &feed_ids, force).await
        }
        Commands::Push { feed_id, file } => commands::push::run(&config, feed_id, &file).await,
        Commands::Status => commands::status::run(&config).await,
        Commands::Daemon { action } => match action {
            DaemonAction::Start => commands::daemon::start(config).await,
            DaemonAction::Stop => commands::daemon::stop().await,
            DaemonAction::Status => commands::daemon::status().await,
        },
    }
}
