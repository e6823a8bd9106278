//! Narrow storage traits the evaluator depends on.
//!
//! The sweep only needs three capabilities: read recent bars, read/stamp
//! rules, append history. Keeping them as traits lets tests drive the full
//! trigger path with in-memory stores and keeps the evaluator free of any
//! knowledge of the SQL layer.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairwatch_data::{
    AlertHistoryRepository, AlertRuleRecord, AlertRuleRepository, BarRepository, NewAlertHistory,
    OhlcvBarRecord,
};

/// Read access to recent bars for one symbol/timeframe.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Returns up to `limit` of the latest bars, ascending.
    async fn recent_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: i64,
    ) -> Result<Vec<OhlcvBarRecord>>;
}

/// Rule listing and trigger stamping. The evaluator is the single writer
/// of a rule's cooldown state.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn active_rules(&self) -> Result<Vec<AlertRuleRecord>>;
    async fn mark_triggered(&self, rule_id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Append-only trigger log.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, entry: &NewAlertHistory) -> Result<i64>;
}

#[async_trait]
impl BarSource for BarRepository {
    async fn recent_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: i64,
    ) -> Result<Vec<OhlcvBarRecord>> {
        self.get_recent(symbol, timeframe, limit).await
    }
}

#[async_trait]
impl RuleStore for AlertRuleRepository {
    async fn active_rules(&self) -> Result<Vec<AlertRuleRecord>> {
        self.get_active().await
    }

    async fn mark_triggered(&self, rule_id: i64, at: DateTime<Utc>) -> Result<()> {
        AlertRuleRepository::mark_triggered(self, rule_id, at).await
    }
}

#[async_trait]
impl HistorySink for AlertHistoryRepository {
    async fn append(&self, entry: &NewAlertHistory) -> Result<i64> {
        self.insert(entry).await
    }
}
