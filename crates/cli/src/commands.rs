//! Subcommand implementations: service composition and one-shot queries.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use pairwatch_alerts::{AlertEvaluator, AlertMonitor, EvaluatorConfig, NotifierRegistry};
use pairwatch_analytics::{align_series, analyze_pair};
use pairwatch_core::{AppConfig, Timeframe};
use pairwatch_data::{ChannelKind, DatabaseClient, NewAlertRule};
use pairwatch_ingest::{IngestionService, ResamplerService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Subcommand)]
pub enum RuleAction {
    /// List all active rules
    List,
    /// Create a z-score threshold rule
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol1: String,
        #[arg(long)]
        symbol2: String,
        #[arg(long, default_value = "1m")]
        timeframe: Timeframe,
        /// Trigger when the z-score rises to this value or above
        #[arg(long)]
        upper: Option<f64>,
        /// Trigger when the z-score falls to this value or below
        #[arg(long)]
        lower: Option<f64>,
        /// Comma-separated channels (email, telegram, webhook)
        #[arg(long, default_value = "webhook", value_delimiter = ',')]
        channels: Vec<String>,
        /// Per-channel settings as a JSON object
        #[arg(long, default_value = "{}")]
        notification_config: String,
        /// Minimum minutes between triggers
        #[arg(long, default_value_t = 15)]
        cooldown: i64,
    },
    /// Enable a rule
    Enable {
        #[arg(long)]
        id: i64,
    },
    /// Disable a rule
    Disable {
        #[arg(long)]
        id: i64,
    },
}

fn parse_timeframes(config: &AppConfig) -> Result<Vec<Timeframe>> {
    config
        .resampler
        .timeframes
        .iter()
        .map(|s| {
            s.parse::<Timeframe>()
                .map_err(|e| anyhow::anyhow!("bad timeframe in config: {e}"))
        })
        .collect()
}

fn build_evaluator(config: &AppConfig, db: &DatabaseClient) -> Result<AlertEvaluator> {
    let registry =
        NotifierRegistry::with_defaults(Duration::from_secs(config.alerts.notify_timeout_secs))?;
    Ok(AlertEvaluator::new(
        Arc::new(db.alert_rules()),
        Arc::new(db.bars()),
        Arc::new(db.alert_history()),
        registry,
        EvaluatorConfig {
            bar_fetch_limit: config.alerts.bar_fetch_limit,
            min_aligned_points: config.analytics.min_aligned_points,
            default_rolling_window: config.analytics.default_rolling_window,
        },
    ))
}

/// Runs the full pipeline until ctrl-c: trade ingestion, periodic
/// resampling, and the alert monitor.
pub async fn run_all(config: &AppConfig, db: &Arc<DatabaseClient>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestion = IngestionService::new(&config.ingestion, &config.binance, db.ticks());

    let resampler = ResamplerService::new(
        config.ingestion.symbols.clone(),
        parse_timeframes(config)?,
        db.ticks(),
        db.bars(),
        chrono::Duration::seconds(config.resampler.lookback_secs),
    );
    let resample_interval = Duration::from_secs(config.resampler.interval_secs);

    let monitor = AlertMonitor::new(
        Arc::new(build_evaluator(config, db)?),
        Duration::from_secs(config.alerts.check_interval_secs),
    );

    // Ctrl-c flips the shared shutdown signal; every loop drains and exits.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let (ingest_result, (), ()) = tokio::join!(
        ingestion.run(shutdown_rx.clone()),
        resampler.run(resample_interval, shutdown_rx.clone()),
        monitor.run(shutdown_rx.clone()),
    );
    ingest_result
}

/// One resampling cycle over every configured symbol and timeframe.
pub async fn resample_once(config: &AppConfig, db: &DatabaseClient) -> Result<()> {
    let resampler = ResamplerService::new(
        config.ingestion.symbols.clone(),
        parse_timeframes(config)?,
        db.ticks(),
        db.bars(),
        chrono::Duration::seconds(config.resampler.lookback_secs),
    );

    let summary = resampler.run_once().await;
    println!(
        "{} bars written for {} symbols ({} errors)",
        summary.total_bars, summary.symbols_processed, summary.errors
    );
    Ok(())
}

/// One alert sweep.
pub async fn sweep_once(config: &AppConfig, db: &DatabaseClient) -> Result<()> {
    let evaluator = build_evaluator(config, db)?;
    let summary = evaluator.evaluate_all().await?;
    println!(
        "{} rules checked: {} triggered, {} skipped, {} errors",
        summary.total_rules, summary.triggered, summary.skipped, summary.errors
    );
    Ok(())
}

/// Analyzes one pair from stored bars and prints the result as JSON.
#[allow(clippy::too_many_arguments)]
pub async fn analyze(
    config: &AppConfig,
    db: &DatabaseClient,
    symbol1: &str,
    symbol2: &str,
    timeframe: Timeframe,
    limit: i64,
    window: Option<usize>,
) -> Result<()> {
    let bars = db.bars();
    let bars1 = bars.get_recent(symbol1, timeframe.as_str(), limit).await?;
    let bars2 = bars.get_recent(symbol2, timeframe.as_str(), limit).await?;

    let series1: Vec<_> = bars1
        .iter()
        .filter_map(|b| b.close_f64().map(|c| (b.timestamp, c)))
        .collect();
    let series2: Vec<_> = bars2
        .iter()
        .filter_map(|b| b.close_f64().map(|c| (b.timestamp, c)))
        .collect();

    let (aligned1, aligned2) = align_series(&series1, &series2);
    if aligned1.len() < config.analytics.min_aligned_points {
        bail!(
            "only {} aligned bars for {}/{}; need at least {}",
            aligned1.len(),
            symbol1,
            symbol2,
            config.analytics.min_aligned_points
        );
    }

    let requested = window.unwrap_or(config.analytics.default_rolling_window);
    let clamped = requested
        .min(config.analytics.max_rolling_window)
        .min(aligned1.len() / 2);

    let result = analyze_pair(symbol1, symbol2, &aligned1, &aligned2, clamped)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Rule management subcommands.
pub async fn rules(db: &DatabaseClient, action: RuleAction) -> Result<()> {
    let repo = db.alert_rules();

    match action {
        RuleAction::List => {
            let rules = repo.get_active().await?;
            if rules.is_empty() {
                println!("no active rules");
                return Ok(());
            }
            for rule in rules {
                println!(
                    "#{} {} [{}] {}/{} {} upper={:?} lower={:?} cooldown={}m triggers={}",
                    rule.id,
                    rule.name,
                    rule.alert_type,
                    rule.symbol1,
                    rule.symbol2.as_deref().unwrap_or("-"),
                    rule.timeframe,
                    rule.threshold_upper,
                    rule.threshold_lower,
                    rule.cooldown_minutes,
                    rule.trigger_count,
                );
            }
        }
        RuleAction::Create {
            name,
            symbol1,
            symbol2,
            timeframe,
            upper,
            lower,
            channels,
            notification_config,
            cooldown,
        } => {
            let channels: Vec<ChannelKind> = channels
                .iter()
                .map(|c| {
                    c.trim()
                        .parse()
                        .map_err(|e: String| anyhow::anyhow!(e))
                })
                .collect::<Result<_>>()?;
            let notification_config = serde_json::from_str(&notification_config)
                .context("notification-config must be a JSON object")?;

            let rule = repo
                .create(&NewAlertRule {
                    name,
                    alert_type: pairwatch_data::AlertType::ZscoreThreshold,
                    symbol1,
                    symbol2: Some(symbol2),
                    timeframe: timeframe.as_str().to_string(),
                    threshold_upper: upper,
                    threshold_lower: lower,
                    notification_channels: channels,
                    notification_config,
                    cooldown_minutes: cooldown,
                })
                .await?;
            println!("created rule #{}", rule.id);
        }
        RuleAction::Enable { id } => {
            if repo.set_enabled(id, true).await? {
                println!("rule #{id} enabled");
            } else {
                bail!("rule #{id} not found");
            }
        }
        RuleAction::Disable { id } => {
            if repo.set_enabled(id, false).await? {
                println!("rule #{id} disabled");
            } else {
                bail!("rule #{id} not found");
            }
        }
    }
    Ok(())
}

/// Prints recent alert history, newest first.
pub async fn history(db: &DatabaseClient, limit: i64) -> Result<()> {
    let records = db.alert_history().get_recent(limit).await?;
    if records.is_empty() {
        println!("no alert history");
        return Ok(());
    }
    for record in records {
        println!(
            "#{} rule={} {}/{} value={:.4} threshold={:.2} at {} sent={} errors={}{}",
            record.id,
            record.rule_id,
            record.symbol1,
            record.symbol2.as_deref().unwrap_or("-"),
            record.trigger_value,
            record.threshold_breached,
            record.triggered_at.format("%Y-%m-%d %H:%M:%S"),
            record.notifications_sent,
            record.notification_errors,
            if record.acknowledged { " [ack]" } else { "" },
        );
    }
    Ok(())
}
