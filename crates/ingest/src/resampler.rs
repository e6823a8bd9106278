//! Tick-to-bar resampling.
//!
//! [`resample_ticks`] is the pure aggregation kernel: it buckets a tick
//! range into OHLCV bars. [`ResamplerService`] wraps it with the periodic
//! read-aggregate-upsert cycle over the tick store. Because bar writes are
//! keyed upserts, re-running over an overlapping tick range (reconnect,
//! backfill, late ticks) converges to the same bars instead of duplicating
//! them.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use pairwatch_core::Timeframe;
use pairwatch_data::{BarRepository, OhlcvBarRecord, TickRepository, TradeTickRecord};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Running bucket state while ticks stream through.
struct BucketAccumulator {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    price_volume: Decimal,
    trade_count: i64,
}

impl BucketAccumulator {
    fn seed(tick: &TradeTickRecord) -> Self {
        Self {
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
            price_volume: tick.price * tick.volume,
            trade_count: 1,
        }
    }

    fn absorb(&mut self, tick: &TradeTickRecord) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume += tick.volume;
        self.price_volume += tick.price * tick.volume;
        self.trade_count += 1;
    }

    fn into_bar(self, bucket_start: DateTime<Utc>, symbol: &str, timeframe: Timeframe) -> OhlcvBarRecord {
        // Quantity is strictly positive on valid ticks, so a zero volume
        // sum cannot normally occur; the vwap still guards the division.
        let vwap = if self.volume > Decimal::ZERO {
            Some(self.price_volume / self.volume)
        } else {
            None
        };
        OhlcvBarRecord {
            timestamp: bucket_start,
            symbol: symbol.to_string(),
            timeframe: timeframe.as_str().to_string(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            trade_count: self.trade_count,
            vwap,
        }
    }
}

/// Aggregates a tick range into OHLCV bars for one symbol and timeframe.
///
/// Ticks are stably sorted by timestamp first (ties keep arrival order),
/// then bucketed to epoch-aligned intervals. Only buckets containing at
/// least one valid tick produce a bar; gaps emit nothing. Ticks with
/// non-positive price or quantity are skipped with a logged warning and
/// aggregation proceeds over the rest.
#[must_use]
pub fn resample_ticks(
    ticks: &[TradeTickRecord],
    timeframe: Timeframe,
    symbol: &str,
) -> Vec<OhlcvBarRecord> {
    if ticks.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<&TradeTickRecord> = ticks.iter().collect();
    ordered.sort_by_key(|t| t.timestamp);

    let mut buckets: BTreeMap<DateTime<Utc>, BucketAccumulator> = BTreeMap::new();
    let mut skipped = 0usize;

    for tick in ordered {
        if !tick.is_valid() {
            skipped += 1;
            tracing::warn!(
                symbol,
                timestamp = %tick.timestamp,
                price = %tick.price,
                quantity = %tick.quantity,
                "Skipping tick with non-positive price or quantity"
            );
            continue;
        }

        let bucket_start = timeframe.bucket_start(tick.timestamp);
        buckets
            .entry(bucket_start)
            .and_modify(|acc| acc.absorb(tick))
            .or_insert_with(|| BucketAccumulator::seed(tick));
    }

    if skipped > 0 {
        tracing::warn!(symbol, skipped, "Rejected malformed ticks during resampling");
    }

    buckets
        .into_iter()
        .map(|(bucket_start, acc)| acc.into_bar(bucket_start, symbol, timeframe))
        .collect()
}

/// Summary of one resampling cycle across all symbols and timeframes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResampleRunSummary {
    pub total_bars: u64,
    pub symbols_processed: usize,
    pub errors: u64,
}

/// Periodically reads the recent tick window and upserts the resulting bars.
pub struct ResamplerService {
    symbols: Vec<String>,
    timeframes: Vec<Timeframe>,
    ticks: TickRepository,
    bars: BarRepository,
    lookback: Duration,
}

impl ResamplerService {
    /// Creates a resampler over the given symbols and timeframes.
    #[must_use]
    pub fn new(
        symbols: Vec<String>,
        timeframes: Vec<Timeframe>,
        ticks: TickRepository,
        bars: BarRepository,
        lookback: Duration,
    ) -> Self {
        tracing::info!(
            symbols = symbols.len(),
            timeframes = ?timeframes.iter().map(Timeframe::as_str).collect::<Vec<_>>(),
            "Initialized resampler"
        );
        Self {
            symbols,
            timeframes,
            ticks,
            bars,
            lookback,
        }
    }

    /// Resamples the recent tick window for one symbol and timeframe.
    ///
    /// # Returns
    /// The number of bars written.
    ///
    /// # Errors
    /// Returns an error if the tick read or the bar upsert fails.
    pub async fn resample_symbol_timeframe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        let ticks = self
            .ticks
            .get_by_timerange(symbol, start, end)
            .await
            .context("Failed to read ticks for resampling")?;

        if ticks.is_empty() {
            tracing::debug!(symbol, timeframe = timeframe.as_str(), "No ticks in window");
            return Ok(0);
        }

        let bars = resample_ticks(&ticks, timeframe, symbol);
        if bars.is_empty() {
            return Ok(0);
        }

        let written = self
            .bars
            .upsert_batch(&bars)
            .await
            .context("Failed to upsert bars")?;

        tracing::info!(
            symbol,
            timeframe = timeframe.as_str(),
            ticks = ticks.len(),
            bars = written,
            "Resampled tick window"
        );
        Ok(written)
    }

    /// Runs one full cycle over every symbol and timeframe.
    ///
    /// Per-combination failures are logged and counted, never propagated:
    /// one symbol's bad window must not starve the others.
    pub async fn run_once(&self) -> ResampleRunSummary {
        let end = Utc::now();
        let start = end - self.lookback;
        let mut summary = ResampleRunSummary::default();

        for symbol in &self.symbols {
            let mut symbol_bars = 0u64;
            for timeframe in &self.timeframes {
                match self
                    .resample_symbol_timeframe(symbol, *timeframe, start, end)
                    .await
                {
                    Ok(written) => symbol_bars += written,
                    Err(e) => {
                        summary.errors += 1;
                        tracing::error!(
                            symbol,
                            timeframe = timeframe.as_str(),
                            "Resampling failed: {e:#}"
                        );
                    }
                }
            }
            if symbol_bars > 0 {
                summary.symbols_processed += 1;
                summary.total_bars += symbol_bars;
            }
        }

        tracing::info!(
            total_bars = summary.total_bars,
            symbols = summary.symbols_processed,
            errors = summary.errors,
            "Resampling cycle complete"
        );
        summary
    }

    /// Runs the periodic loop until `shutdown` flips. The in-flight cycle
    /// always finishes before the loop exits.
    pub async fn run(&self, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "Resampler loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.run_once().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("Resampler loop stopped");
    }
}
