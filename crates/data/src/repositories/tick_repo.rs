//! Trade tick repository.
//!
//! Batch insert and time-range query operations for raw ticks. Inserts are
//! chunked inside a transaction; the resampler re-reads recent ranges, so
//! write latency matters less than not losing a flush.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::TradeTickRecord;

/// Rows per statement batch inside the insert transaction.
const INSERT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct TickRepository {
    pool: PgPool,
}

impl TickRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a batch of ticks inside one transaction.
    ///
    /// # Returns
    /// The number of rows inserted.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; no partial batch is kept.
    pub async fn insert_batch(&self, records: &[TradeTickRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let mut inserted = 0u64;

        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            for record in chunk {
                let result = sqlx::query(
                    r"
                    INSERT INTO trade_ticks (timestamp, symbol, price, quantity, volume)
                    VALUES ($1, $2, $3, $4, $5)
                    ",
                )
                .bind(record.timestamp)
                .bind(&record.symbol)
                .bind(record.price)
                .bind(record.quantity)
                .bind(record.volume)
                .execute(&mut *tx)
                .await
                .context("Failed to insert trade tick")?;

                inserted += result.rows_affected();
            }
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// Queries ticks for a symbol within a time range, ascending.
    ///
    /// The range is half-open `[start, end)` so consecutive resampling
    /// windows never double-count a tick on the boundary.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_by_timerange(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TradeTickRecord>> {
        let records = sqlx::query_as::<_, TradeTickRecord>(
            r"
            SELECT timestamp, symbol, price, quantity, volume
            FROM trade_ticks
            WHERE symbol = $1 AND timestamp >= $2 AND timestamp < $3
            ORDER BY timestamp ASC, id ASC
            ",
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query trade ticks")?;

        Ok(records)
    }

    /// Deletes ticks older than the cutoff (retention policy).
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn delete_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM trade_ticks
            WHERE timestamp < $1
            ",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .context("Failed to delete old ticks")?;

        Ok(result.rows_affected())
    }
}
