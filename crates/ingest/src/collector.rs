//! Binance trade-stream collector.
//!
//! Subscribes to the combined aggTrade stream for the configured symbols
//! and pushes parsed ticks into the shared [`TickBuffer`]. Reconnects with
//! exponential backoff (base delay doubling up to a cap) and gives up after
//! a bounded number of consecutive failed attempts, which is a fatal
//! condition for the ingestion process.

use crate::buffer::TickBuffer;
use anyhow::{Context, Result};
use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use pairwatch_data::TradeTickRecord;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

/// Binance aggTrade WebSocket message.
///
/// JSON format:
/// ```json
/// {
///   "e": "aggTrade",
///   "E": 1699999999999,
///   "s": "BTCUSDT",
///   "a": 123456789,
///   "p": "42750.50",
///   "q": "0.150",
///   "f": 100,
///   "l": 102,
///   "T": 1699999999998,
///   "m": true
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AggTradeEvent {
    /// Event type ("aggTrade")
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time (milliseconds)
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,
    /// Aggregate trade ID
    #[serde(rename = "a")]
    pub agg_trade_id: i64,
    /// Price
    #[serde(rename = "p")]
    pub price: String,
    /// Quantity
    #[serde(rename = "q")]
    pub quantity: String,
    /// Trade time (milliseconds)
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Is the buyer the market maker?
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl AggTradeEvent {
    /// Converts to a tick record. Returns None when price, quantity, or
    /// timestamp fail to parse.
    #[must_use]
    pub fn to_tick(&self) -> Option<TradeTickRecord> {
        let price = Decimal::from_str(&self.price).ok()?;
        let quantity = Decimal::from_str(&self.quantity).ok()?;
        let timestamp = DateTime::from_timestamp_millis(self.trade_time)?;

        Some(TradeTickRecord::new(
            timestamp,
            self.symbol.clone(),
            price,
            quantity,
        ))
    }
}

/// Wrapper for messages on the combined stream endpoint.
#[derive(Debug, Deserialize)]
pub struct CombinedStreamMessage {
    /// Stream name (e.g. "btcusdt@aggTrade")
    pub stream: String,
    /// Event payload
    pub data: AggTradeEvent,
}

/// Collector connection settings.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub symbols: Vec<String>,
    /// Base WebSocket endpoint, e.g. "wss://stream.binance.com:9443"
    pub ws_base: String,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub max_reconnect_attempts: u32,
}

/// Why a single connection ended.
enum StreamEnd {
    /// Graceful cancellation requested.
    Shutdown,
    /// Server closed or the stream ran dry; reconnect.
    Disconnected,
}

/// Reads the exchange trade stream into the tick buffer.
pub struct TradeStreamCollector {
    config: CollectorConfig,
    buffer: Arc<TickBuffer>,
    ticks_received: u64,
    parse_errors: u64,
}

impl TradeStreamCollector {
    /// Creates a collector feeding the given buffer.
    #[must_use]
    pub fn new(config: CollectorConfig, buffer: Arc<TickBuffer>) -> Self {
        Self {
            config,
            buffer,
            ticks_received: 0,
            parse_errors: 0,
        }
    }

    /// Builds the combined-stream URL for the configured symbols.
    #[must_use]
    pub fn stream_url(&self) -> String {
        let streams: Vec<String> = self
            .config
            .symbols
            .iter()
            .map(|s| format!("{}@aggTrade", s.to_lowercase()))
            .collect();
        format!("{}/stream?streams={}", self.config.ws_base, streams.join("/"))
    }

    /// Total ticks pushed into the buffer so far.
    #[must_use]
    pub fn ticks_received(&self) -> u64 {
        self.ticks_received
    }

    /// Runs until shutdown or until the reconnect budget is exhausted.
    ///
    /// # Errors
    /// Returns an error once `max_reconnect_attempts` consecutive
    /// connection attempts have failed; the process should treat this as
    /// fatal and surface it to the operator.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut attempts = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.collect_stream(shutdown.clone()).await {
                Ok(StreamEnd::Shutdown) => {
                    tracing::info!("Trade stream collector exiting cleanly");
                    break;
                }
                Ok(StreamEnd::Disconnected) => {
                    // A connection that made it to streaming resets the
                    // failure budget.
                    attempts = 0;
                    tracing::warn!("Trade stream disconnected, reconnecting");
                }
                Err(e) => {
                    attempts += 1;
                    tracing::error!(attempts, "Trade stream error: {e:#}");

                    if attempts >= self.config.max_reconnect_attempts {
                        anyhow::bail!(
                            "trade stream failed {} consecutive reconnect attempts",
                            attempts
                        );
                    }
                }
            }

            let delay = backoff_delay(
                self.config.reconnect_base_delay,
                self.config.reconnect_max_delay,
                attempts,
            );
            tracing::info!(delay_secs = delay.as_secs_f64(), "Waiting before reconnect");
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }

    /// One connection lifetime: connect, then read until the stream ends
    /// or shutdown flips.
    async fn collect_stream(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<StreamEnd> {
        let url = self.stream_url();
        tracing::info!(%url, "Connecting to trade stream");

        let (mut ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .context("WebSocket connect failed")?;

        tracing::info!("Trade stream connected");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = ws.close(None).await;
                    return Ok(StreamEnd::Shutdown);
                }
                msg = ws.next() => {
                    let Some(msg) = msg else {
                        return Ok(StreamEnd::Disconnected);
                    };
                    match msg.context("WebSocket read failed")? {
                        Message::Text(text) => self.handle_text(&text).await,
                        Message::Ping(payload) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Message::Close(frame) => {
                            tracing::warn!(?frame, "Trade stream closed by server");
                            return Ok(StreamEnd::Disconnected);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let wrapper: CombinedStreamMessage = match serde_json::from_str(text) {
            Ok(w) => w,
            Err(e) => {
                self.parse_errors += 1;
                tracing::debug!("Unparseable stream message: {e}");
                return;
            }
        };

        let Some(tick) = wrapper.data.to_tick() else {
            self.parse_errors += 1;
            tracing::warn!(stream = %wrapper.stream, "Dropping unparseable trade fields");
            return;
        };

        if let Err(e) = self.buffer.add(tick).await {
            // The triggered flush failed; the tick is retained and the
            // next flush retries, so just log and keep reading.
            tracing::error!("Buffer flush during add failed: {e:#}");
        }
        self.ticks_received += 1;

        if self.ticks_received % 1000 == 0 {
            tracing::info!(
                ticks = self.ticks_received,
                parse_errors = self.parse_errors,
                "Trade stream progress"
            );
        }
    }
}

/// Exponential backoff: `base * 2^attempts`, capped.
#[must_use]
fn backoff_delay(base: Duration, cap: Duration, attempts: u32) -> Duration {
    let exp = attempts.min(16); // avoid shift overflow; cap dominates anyway
    base.saturating_mul(1u32 << exp).min(cap)
}
