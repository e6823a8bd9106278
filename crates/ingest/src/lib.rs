//! Trade-stream ingestion and tick-to-bar resampling.
//!
//! The pipeline: the WebSocket [`collector`] parses exchange trades into
//! tick records and pushes them through the [`buffer`], which batches them
//! into the tick store; the [`resampler`] periodically re-reads the recent
//! tick window and upserts OHLCV bars. Buffered delivery is at-least-once
//! and bar writes are idempotent upserts, so replays converge.

pub mod buffer;
pub mod collector;
pub mod resampler;
pub mod service;

pub use buffer::{BufferStats, FlushSink, TickBuffer};
pub use collector::{AggTradeEvent, CollectorConfig, CombinedStreamMessage, TradeStreamCollector};
pub use resampler::{resample_ticks, ResampleRunSummary, ResamplerService};
pub use service::{IngestionService, RepositoryFlushSink};
