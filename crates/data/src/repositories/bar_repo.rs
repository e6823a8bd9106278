//! OHLCV bar repository.
//!
//! Bars are written with an idempotent upsert keyed by
//! (symbol, timeframe, interval start): re-running aggregation over a
//! previously seen tick range overwrites the same rows instead of
//! duplicating them, which is what makes backfill and reconnect safe.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::OhlcvBarRecord;

#[derive(Debug, Clone)]
pub struct BarRepository {
    pool: PgPool,
}

impl BarRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a batch of bars inside one transaction.
    ///
    /// # Returns
    /// The number of rows written (inserted or overwritten).
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn upsert_batch(&self, records: &[OhlcvBarRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let mut written = 0u64;

        for record in records {
            let result = sqlx::query(
                r"
                INSERT INTO ohlcv_bars
                    (timestamp, symbol, timeframe, open, high, low, close,
                     volume, trade_count, vwap)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (symbol, timeframe, timestamp) DO UPDATE
                SET open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    trade_count = EXCLUDED.trade_count,
                    vwap = EXCLUDED.vwap
                ",
            )
            .bind(record.timestamp)
            .bind(&record.symbol)
            .bind(&record.timeframe)
            .bind(record.open)
            .bind(record.high)
            .bind(record.low)
            .bind(record.close)
            .bind(record.volume)
            .bind(record.trade_count)
            .bind(record.vwap)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert OHLCV bar")?;

            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(written)
    }

    /// Returns the most recent `limit` bars for a symbol/timeframe,
    /// re-sorted ascending for consumption by the analytics window.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_recent(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: i64,
    ) -> Result<Vec<OhlcvBarRecord>> {
        let mut records = sqlx::query_as::<_, OhlcvBarRecord>(
            r"
            SELECT timestamp, symbol, timeframe, open, high, low, close,
                   volume, trade_count, vwap
            FROM ohlcv_bars
            WHERE symbol = $1 AND timeframe = $2
            ORDER BY timestamp DESC
            LIMIT $3
            ",
        )
        .bind(symbol)
        .bind(timeframe)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query recent bars")?;

        records.reverse();
        Ok(records)
    }

    /// Queries bars for a symbol/timeframe within a closed time range,
    /// ascending.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_by_timerange(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OhlcvBarRecord>> {
        let records = sqlx::query_as::<_, OhlcvBarRecord>(
            r"
            SELECT timestamp, symbol, timeframe, open, high, low, close,
                   volume, trade_count, vwap
            FROM ohlcv_bars
            WHERE symbol = $1 AND timeframe = $2
              AND timestamp >= $3 AND timestamp <= $4
            ORDER BY timestamp ASC
            ",
        )
        .bind(symbol)
        .bind(timeframe)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query bars by time range")?;

        Ok(records)
    }

    /// Deletes bars older than the cutoff (retention policy).
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn delete_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM ohlcv_bars
            WHERE timestamp < $1
            ",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .context("Failed to delete old bars")?;

        Ok(result.rows_affected())
    }
}
