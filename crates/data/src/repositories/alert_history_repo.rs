//! Alert history repository.
//!
//! The history table is an append-only trigger log. Only the acknowledged
//! flag is ever updated after insert.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;

use crate::models::{AlertHistoryRecord, NewAlertHistory};

const HISTORY_COLUMNS: &str = r"
    id, rule_id, alert_type, symbol1, symbol2, trigger_value,
    threshold_breached, context_data, notifications_sent,
    notification_errors, triggered_at, acknowledged, acknowledged_at
";

#[derive(Debug, Clone)]
pub struct AlertHistoryRepository {
    pool: PgPool,
}

impl AlertHistoryRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends a history record, returning its id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(&self, entry: &NewAlertHistory) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO alert_history
                (rule_id, alert_type, symbol1, symbol2, trigger_value,
                 threshold_breached, context_data, notifications_sent,
                 notification_errors, triggered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            ",
        )
        .bind(entry.rule_id)
        .bind(entry.alert_type.as_str())
        .bind(&entry.symbol1)
        .bind(&entry.symbol2)
        .bind(entry.trigger_value)
        .bind(entry.threshold_breached)
        .bind(&entry.context_data)
        .bind(serde_json::json!(entry.notifications_sent))
        .bind(serde_json::json!(entry.notification_errors))
        .bind(entry.triggered_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert alert history record")?;

        tracing::info!(history_id = id, rule_id = entry.rule_id, "Recorded alert trigger");
        Ok(id)
    }

    /// Returns the most recent history records, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AlertHistoryRecord>> {
        let records = sqlx::query_as::<_, AlertHistoryRecord>(&format!(
            r"
            SELECT {HISTORY_COLUMNS}
            FROM alert_history
            ORDER BY triggered_at DESC
            LIMIT $1
            ",
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query alert history")?;

        Ok(records)
    }

    /// Marks a record acknowledged.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn acknowledge(&self, history_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE alert_history
            SET acknowledged = TRUE, acknowledged_at = $2
            WHERE id = $1 AND acknowledged = FALSE
            ",
        )
        .bind(history_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to acknowledge alert")?;

        Ok(result.rows_affected() > 0)
    }
}
