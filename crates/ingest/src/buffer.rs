//! Bounded tick buffer with batch flushing.
//!
//! Ticks accumulate in arrival order and are handed to a [`FlushSink`] as
//! one batch, either synchronously when the buffer reaches `max_size` or
//! from the timed flusher task. When the sink fails, the batch is restored
//! to the front of the buffer in its original order, so nothing is lost:
//! the buffer delivers at-least-once, and the tick store's writes make the
//! pipeline effectively once end to end.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairwatch_data::TradeTickRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Destination for flushed batches, typically the tick repository.
#[async_trait]
pub trait FlushSink: Send + Sync {
    /// Stores one batch. On error the entire batch is treated as unwritten.
    async fn store_batch(&self, records: &[TradeTickRecord]) -> Result<u64>;
}

/// Point-in-time buffer statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub buffered: usize,
    pub max_size: usize,
    pub total_added: u64,
    pub total_flushed: u64,
    pub flush_count: u64,
    pub last_flush_time: Option<DateTime<Utc>>,
}

struct Inner {
    queue: VecDeque<TradeTickRecord>,
    total_added: u64,
    total_flushed: u64,
    flush_count: u64,
    last_flush_time: Option<DateTime<Utc>>,
}

/// FIFO accumulator shared between the stream reader and the timed flusher.
///
/// All mutation happens under one async mutex; the size-triggered flush
/// runs inside the same critical section as the add that crossed the
/// threshold, so two writers can never double-flush the same batch.
pub struct TickBuffer {
    max_size: usize,
    sink: Arc<dyn FlushSink>,
    inner: Mutex<Inner>,
}

impl TickBuffer {
    /// Creates a buffer that flushes to `sink` once `max_size` is reached.
    #[must_use]
    pub fn new(max_size: usize, sink: Arc<dyn FlushSink>) -> Self {
        Self {
            max_size,
            sink,
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(max_size),
                total_added: 0,
                total_flushed: 0,
                flush_count: 0,
                last_flush_time: None,
            }),
        }
    }

    /// Appends one tick, flushing synchronously if the buffer is now full.
    ///
    /// # Errors
    /// Returns the sink error when a triggered flush fails; the tick itself
    /// is retained either way.
    pub async fn add(&self, tick: TradeTickRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.queue.push_back(tick);
        inner.total_added += 1;

        if inner.queue.len() >= self.max_size {
            tracing::debug!(buffered = inner.queue.len(), "Buffer full, triggering flush");
            self.flush_locked(&mut inner).await?;
        }
        Ok(())
    }

    /// Appends a batch of ticks in order, then applies the size check once.
    ///
    /// # Errors
    /// Returns the sink error when a triggered flush fails.
    pub async fn add_batch(&self, ticks: Vec<TradeTickRecord>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.total_added += ticks.len() as u64;
        inner.queue.extend(ticks);

        if inner.queue.len() >= self.max_size {
            self.flush_locked(&mut inner).await?;
        }
        Ok(())
    }

    /// Flushes the current contents to the sink.
    ///
    /// # Returns
    /// The number of records handed to the sink (0 for an empty buffer).
    ///
    /// # Errors
    /// Returns the sink error; the failed batch is restored to the front of
    /// the buffer in original order.
    pub async fn flush(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        self.flush_locked(&mut inner).await
    }

    async fn flush_locked(&self, inner: &mut Inner) -> Result<usize> {
        if inner.queue.is_empty() {
            return Ok(0);
        }

        let records: Vec<TradeTickRecord> = inner.queue.drain(..).collect();

        match self.sink.store_batch(&records).await {
            Ok(stored) => {
                inner.total_flushed += records.len() as u64;
                inner.flush_count += 1;
                inner.last_flush_time = Some(Utc::now());
                tracing::debug!(
                    flushed = records.len(),
                    stored,
                    flush_count = inner.flush_count,
                    "Flushed tick buffer"
                );
                Ok(records.len())
            }
            Err(e) => {
                // Restore in original order so a retry replays the exact
                // same sequence ahead of newer ticks.
                for record in records.into_iter().rev() {
                    inner.queue.push_front(record);
                }
                Err(e)
            }
        }
    }

    /// Current number of buffered ticks.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// True when nothing is buffered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns a snapshot of the buffer statistics.
    pub async fn stats(&self) -> BufferStats {
        let inner = self.inner.lock().await;
        BufferStats {
            buffered: inner.queue.len(),
            max_size: self.max_size,
            total_added: inner.total_added,
            total_flushed: inner.total_flushed,
            flush_count: inner.flush_count,
            last_flush_time: inner.last_flush_time,
        }
    }

    /// Spawns the timed flusher. It flushes whenever the buffer is
    /// non-empty, and performs the mandatory final flush when `shutdown`
    /// flips.
    pub fn spawn_flusher(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let buffer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs_f64(), "Timed buffer flusher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !buffer.is_empty().await {
                            if let Err(e) = buffer.flush().await {
                                tracing::error!("Timed buffer flush failed: {e:#}");
                            }
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            if let Err(e) = buffer.flush().await {
                tracing::error!("Final buffer flush failed: {e:#}");
            }
            tracing::info!("Timed buffer flusher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sink that records batches and can be toggled to fail.
    #[derive(Default)]
    struct MockSink {
        batches: Mutex<Vec<Vec<TradeTickRecord>>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl FlushSink for MockSink {
        async fn store_batch(&self, records: &[TradeTickRecord]) -> Result<u64> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("sink unavailable");
            }
            self.batches.lock().await.push(records.to_vec());
            Ok(records.len() as u64)
        }
    }

    fn tick(i: i64) -> TradeTickRecord {
        TradeTickRecord::new(
            Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(i),
            "BTCUSDT".to_string(),
            dec!(50000) + rust_decimal::Decimal::from(i),
            dec!(0.1),
        )
    }

    // ============================================
    // Size-Triggered Flush Tests
    // ============================================

    #[tokio::test]
    async fn test_auto_flush_at_max_size() {
        let sink = Arc::new(MockSink::default());
        let buffer = TickBuffer::new(3, sink.clone());

        buffer.add(tick(0)).await.unwrap();
        buffer.add(tick(1)).await.unwrap();
        assert_eq!(sink.batches.lock().await.len(), 0);

        buffer.add(tick(2)).await.unwrap();

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        drop(batches);
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_batch_flushes_once_when_full() {
        let sink = Arc::new(MockSink::default());
        let buffer = TickBuffer::new(3, sink.clone());

        buffer.add_batch((0..7).map(tick).collect()).await.unwrap();

        // One flush of all 7, not chunks of 3
        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 7);
    }

    #[tokio::test]
    async fn test_manual_flush_returns_count() {
        let sink = Arc::new(MockSink::default());
        let buffer = TickBuffer::new(100, sink.clone());

        buffer.add_batch((0..5).map(tick).collect()).await.unwrap();
        let flushed = buffer.flush().await.unwrap();

        assert_eq!(flushed, 5);
        assert_eq!(buffer.flush().await.unwrap(), 0); // now empty
    }

    // ============================================
    // Failure / Restore Tests
    // ============================================

    #[tokio::test]
    async fn test_failed_flush_restores_original_order() {
        let sink = Arc::new(MockSink::default());
        let buffer = TickBuffer::new(100, sink.clone());

        buffer.add_batch((0..4).map(tick).collect()).await.unwrap();

        sink.fail.store(true, Ordering::SeqCst);
        assert!(buffer.flush().await.is_err());
        assert_eq!(buffer.len().await, 4);

        // A tick arriving after the failure queues BEHIND the restored batch
        buffer.add(tick(99)).await.unwrap();

        sink.fail.store(false, Ordering::SeqCst);
        buffer.flush().await.unwrap();

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        let prices: Vec<_> = batches[0].iter().map(|t| t.price).collect();
        assert_eq!(
            prices,
            vec![
                dec!(50000),
                dec!(50001),
                dec!(50002),
                dec!(50003),
                dec!(50099)
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_flush_does_not_count_as_flushed() {
        let sink = Arc::new(MockSink::default());
        let buffer = TickBuffer::new(100, sink.clone());

        buffer.add_batch((0..4).map(tick).collect()).await.unwrap();
        sink.fail.store(true, Ordering::SeqCst);
        let _ = buffer.flush().await;

        let stats = buffer.stats().await;
        assert_eq!(stats.total_added, 4);
        assert_eq!(stats.total_flushed, 0);
        assert_eq!(stats.flush_count, 0);
        assert_eq!(stats.buffered, 4);
    }

    // ============================================
    // Timed Flusher Tests
    // ============================================

    #[tokio::test(start_paused = true)]
    async fn test_timed_flusher_flushes_and_drains_on_shutdown() {
        let sink = Arc::new(MockSink::default());
        let buffer = Arc::new(TickBuffer::new(100, sink.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = buffer.spawn_flusher(Duration::from_secs(1), shutdown_rx);

        buffer.add(tick(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sink.batches.lock().await.len(), 1);

        // Leave one buffered tick, then shut down: the final flush drains it
        buffer.add(tick(1)).await.unwrap();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(sink.batches.lock().await.len(), 2);
        assert!(buffer.is_empty().await);
    }
}
