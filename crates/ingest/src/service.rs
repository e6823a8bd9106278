//! Ingestion pipeline composition: stream -> buffer -> tick store.

use crate::buffer::{FlushSink, TickBuffer};
use crate::collector::{CollectorConfig, TradeStreamCollector};
use anyhow::Result;
use async_trait::async_trait;
use pairwatch_core::{BinanceConfig, IngestionConfig};
use pairwatch_data::{TickRepository, TradeTickRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Flush sink backed by the tick repository's batch insert.
pub struct RepositoryFlushSink {
    repo: TickRepository,
}

impl RepositoryFlushSink {
    #[must_use]
    pub fn new(repo: TickRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FlushSink for RepositoryFlushSink {
    async fn store_batch(&self, records: &[TradeTickRecord]) -> Result<u64> {
        self.repo.insert_batch(records).await
    }
}

/// Owns the collector, the buffer, and the timed flusher.
///
/// Constructed explicitly and injected where needed; lifecycle is
/// `start(shutdown)` / cooperative cancellation through the watch channel.
pub struct IngestionService {
    collector_config: CollectorConfig,
    flush_interval: Duration,
    buffer: Arc<TickBuffer>,
}

impl IngestionService {
    /// Wires the pipeline from configuration and the tick repository.
    #[must_use]
    pub fn new(ingestion: &IngestionConfig, binance: &BinanceConfig, ticks: TickRepository) -> Self {
        let sink = Arc::new(RepositoryFlushSink::new(ticks));
        let buffer = Arc::new(TickBuffer::new(ingestion.buffer_size, sink));

        let collector_config = CollectorConfig {
            symbols: ingestion.symbols.clone(),
            ws_base: binance.ws_url.clone(),
            reconnect_base_delay: Duration::from_secs(ingestion.reconnect_base_delay_secs),
            reconnect_max_delay: Duration::from_secs(ingestion.reconnect_max_delay_secs),
            max_reconnect_attempts: ingestion.max_reconnect_attempts,
        };

        tracing::info!(
            symbols = ?collector_config.symbols,
            buffer_size = ingestion.buffer_size,
            "Initialized ingestion service"
        );

        Self {
            collector_config,
            flush_interval: Duration::from_secs(ingestion.flush_interval_secs),
            buffer,
        }
    }

    /// Shared handle to the tick buffer (exposed for statistics).
    #[must_use]
    pub fn buffer(&self) -> Arc<TickBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Runs the pipeline until `shutdown` flips or the stream dies for
    /// good. The final buffer flush is mandatory on the way out.
    ///
    /// # Errors
    /// Returns an error if the collector exhausts its reconnect budget.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        // The flusher gets its own stop signal so it also winds down when
        // the collector dies for a reason other than external shutdown.
        let (flusher_stop_tx, flusher_stop_rx) = watch::channel(false);
        let flusher = self.buffer.spawn_flusher(self.flush_interval, flusher_stop_rx);

        let mut collector =
            TradeStreamCollector::new(self.collector_config.clone(), self.buffer());
        let result = collector.run(shutdown).await;

        // Stopping the flusher triggers its mandatory final drain; wait for
        // it so no buffered ticks are dropped.
        let _ = flusher_stop_tx.send(true);
        if let Err(e) = flusher.await {
            tracing::error!("Flusher task panicked: {e}");
        }

        let stats = self.buffer.stats().await;
        tracing::info!(
            total_added = stats.total_added,
            total_flushed = stats.total_flushed,
            flush_count = stats.flush_count,
            "Ingestion service stopped"
        );

        result
    }
}
