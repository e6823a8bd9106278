//! Alert rule repository.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{AlertRuleRecord, NewAlertRule};

const RULE_COLUMNS: &str = r"
    id, name, alert_type, symbol1, symbol2, timeframe,
    threshold_upper, threshold_lower, notification_channels,
    notification_config, status, cooldown_minutes, enabled,
    last_triggered_at, trigger_count, created_at, updated_at
";

#[derive(Debug, Clone)]
pub struct AlertRuleRepository {
    pool: PgPool,
}

impl AlertRuleRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a rule and returns the stored record.
    ///
    /// # Errors
    /// Returns an error if neither threshold is set (the rule could never
    /// fire) or if the insert fails.
    pub async fn create(&self, rule: &NewAlertRule) -> Result<AlertRuleRecord> {
        if !rule.has_threshold() {
            bail!("alert rule must set at least one of threshold_upper / threshold_lower");
        }

        let channels: Vec<&str> = rule.notification_channels.iter().map(|c| c.as_str()).collect();

        let record = sqlx::query_as::<_, AlertRuleRecord>(&format!(
            r"
            INSERT INTO alert_rules
                (name, alert_type, symbol1, symbol2, timeframe,
                 threshold_upper, threshold_lower, notification_channels,
                 notification_config, cooldown_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {RULE_COLUMNS}
            ",
        ))
        .bind(&rule.name)
        .bind(rule.alert_type.as_str())
        .bind(&rule.symbol1)
        .bind(&rule.symbol2)
        .bind(&rule.timeframe)
        .bind(rule.threshold_upper)
        .bind(rule.threshold_lower)
        .bind(serde_json::json!(channels))
        .bind(&rule.notification_config)
        .bind(rule.cooldown_minutes)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create alert rule")?;

        tracing::info!(rule_id = record.id, name = %record.name, "Created alert rule");
        Ok(record)
    }

    /// Returns enabled rules with active status.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_active(&self) -> Result<Vec<AlertRuleRecord>> {
        let records = sqlx::query_as::<_, AlertRuleRecord>(&format!(
            r"
            SELECT {RULE_COLUMNS}
            FROM alert_rules
            WHERE enabled = TRUE AND status = 'active'
            ORDER BY id ASC
            ",
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query active rules")?;

        Ok(records)
    }

    /// Looks up a single rule by id.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_by_id(&self, rule_id: i64) -> Result<Option<AlertRuleRecord>> {
        let record = sqlx::query_as::<_, AlertRuleRecord>(&format!(
            r"
            SELECT {RULE_COLUMNS}
            FROM alert_rules
            WHERE id = $1
            ",
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query rule by id")?;

        Ok(record)
    }

    /// Enables or disables a rule. Rules are never hard-deleted.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn set_enabled(&self, rule_id: i64, enabled: bool) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE alert_rules
            SET enabled = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(rule_id)
        .bind(enabled)
        .execute(&self.pool)
        .await
        .context("Failed to update rule enabled flag")?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a trigger: stamps `last_triggered_at` and increments the
    /// trigger counter. The sweep is the only caller.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn mark_triggered(&self, rule_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE alert_rules
            SET last_triggered_at = $2,
                trigger_count = trigger_count + 1,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(rule_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("Failed to mark rule triggered")?;

        Ok(())
    }
}
