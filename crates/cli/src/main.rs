use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pairwatch_core::{AppConfig, ConfigLoader, Timeframe};
use std::sync::Arc;

mod commands;

#[derive(Parser)]
#[command(name = "pairwatch")]
#[command(about = "Pair-trading analytics and alerting platform", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ingestion, resampling, and alert monitoring until interrupted
    Run,
    /// Run one resampling cycle and exit
    Resample,
    /// Run one alert sweep and exit
    Sweep,
    /// Analyze a pair from stored bars and print the result as JSON
    Analyze {
        /// First symbol (e.g. "BTCUSDT")
        #[arg(long)]
        symbol1: String,
        /// Second symbol (e.g. "ETHUSDT")
        #[arg(long)]
        symbol2: String,
        /// Bar timeframe
        #[arg(long, default_value = "1m")]
        timeframe: Timeframe,
        /// Bars to fetch per symbol
        #[arg(long, default_value_t = 100)]
        limit: i64,
        /// Rolling window (clamped to half the aligned length)
        #[arg(long)]
        window: Option<usize>,
    },
    /// Manage alert rules
    Rules {
        #[command(subcommand)]
        action: commands::RuleAction,
    },
    /// Show recent alert history
    History {
        /// Maximum records to show
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config: AppConfig =
        ConfigLoader::load_from(&cli.config).context("Failed to load configuration")?;

    let db = Arc::new(
        pairwatch_data::DatabaseClient::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to database")?,
    );
    db.init_schema().await?;

    match cli.command {
        Commands::Run => commands::run_all(&config, &db).await,
        Commands::Resample => commands::resample_once(&config, &db).await,
        Commands::Sweep => commands::sweep_once(&config, &db).await,
        Commands::Analyze {
            symbol1,
            symbol2,
            timeframe,
            limit,
            window,
        } => commands::analyze(&config, &db, &symbol1, &symbol2, timeframe, limit, window).await,
        Commands::Rules { action } => commands::rules(&db, action).await,
        Commands::History { limit } => commands::history(&db, limit).await,
    }
}
