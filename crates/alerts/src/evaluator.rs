//! Alert rule evaluation sweep.
//!
//! One sweep walks every active rule: cooldown gate first, then the rule's
//! condition against a fresh pair analysis, then (on a breach) notification
//! dispatch, one history record, and the cooldown stamp. Rules are
//! independent; a failure inside one evaluation is logged and counted but
//! never aborts the rest of the sweep. The periodic monitor and the manual
//! "check now" path both land here, on the same code path.

use crate::notify::{AlertNotification, NotifierRegistry};
use crate::stores::{BarSource, HistorySink, RuleStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pairwatch_analytics::{align_series, analyze_pair, PairAnalysisResult};
use pairwatch_data::{AlertRuleRecord, AlertType, NewAlertHistory, OhlcvBarRecord};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Evaluator tuning knobs, sourced from `AlertsConfig`/`AnalyticsConfig`.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Bars fetched per symbol per evaluation.
    pub bar_fetch_limit: i64,
    /// Minimum aligned points before a pair is analyzed.
    pub min_aligned_points: usize,
    /// Rolling window cap; clamped to half the aligned length.
    pub default_rolling_window: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            bar_fetch_limit: 100,
            min_aligned_points: 20,
            default_rolling_window: 20,
        }
    }
}

/// Outcome counts for one sweep over all active rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub total_rules: usize,
    pub triggered: usize,
    pub skipped: usize,
    pub errors: usize,
    pub timestamp: DateTime<Utc>,
}

/// Evaluates alert rules against fresh pair analytics.
pub struct AlertEvaluator {
    rules: Arc<dyn RuleStore>,
    bars: Arc<dyn BarSource>,
    history: Arc<dyn HistorySink>,
    notifiers: NotifierRegistry,
    config: EvaluatorConfig,
}

impl AlertEvaluator {
    /// Builds an evaluator over the given stores and notification registry.
    #[must_use]
    pub fn new(
        rules: Arc<dyn RuleStore>,
        bars: Arc<dyn BarSource>,
        history: Arc<dyn HistorySink>,
        notifiers: NotifierRegistry,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            rules,
            bars,
            history,
            notifiers,
            config,
        }
    }

    /// Runs one sweep over all active rules.
    ///
    /// # Errors
    /// Only the initial rule listing can fail the sweep; everything after
    /// that is isolated per rule and reported through the summary counts.
    pub async fn evaluate_all(&self) -> Result<SweepSummary> {
        let rules = self
            .rules
            .active_rules()
            .await
            .context("Failed to load active rules")?;

        let mut summary = SweepSummary {
            total_rules: rules.len(),
            triggered: 0,
            skipped: 0,
            errors: 0,
            timestamp: Utc::now(),
        };

        for rule in &rules {
            if !rule.is_evaluable() {
                summary.skipped += 1;
                continue;
            }
            if rule.is_in_cooldown(Utc::now()) {
                summary.skipped += 1;
                continue;
            }

            match rule.parsed_type() {
                Some(AlertType::ZscoreThreshold) => {
                    match self.check_zscore_rule(rule).await {
                        Ok(true) => summary.triggered += 1,
                        Ok(false) => {}
                        Err(e) => {
                            summary.errors += 1;
                            tracing::error!(rule_id = rule.id, "Rule evaluation failed: {e:#}");
                        }
                    }
                }
                Some(other) => {
                    tracing::debug!(rule_id = rule.id, alert_type = %other, "Unsupported rule type");
                }
                None => {
                    summary.errors += 1;
                    tracing::error!(rule_id = rule.id, alert_type = %rule.alert_type, "Unknown rule type");
                }
            }
        }

        tracing::info!(
            total = summary.total_rules,
            triggered = summary.triggered,
            skipped = summary.skipped,
            errors = summary.errors,
            "Alert sweep complete"
        );
        Ok(summary)
    }

    /// Evaluates one z-score rule. Returns whether it triggered.
    async fn check_zscore_rule(&self, rule: &AlertRuleRecord) -> Result<bool> {
        let Some(symbol2) = rule.symbol2.as_deref() else {
            tracing::warn!(rule_id = rule.id, "Z-score rule missing symbol2");
            return Ok(false);
        };

        let bars1 = self
            .bars
            .recent_bars(&rule.symbol1, &rule.timeframe, self.config.bar_fetch_limit)
            .await
            .context("Failed to fetch bars for symbol1")?;
        let bars2 = self
            .bars
            .recent_bars(symbol2, &rule.timeframe, self.config.bar_fetch_limit)
            .await
            .context("Failed to fetch bars for symbol2")?;

        if bars1.is_empty() || bars2.is_empty() {
            tracing::debug!(rule_id = rule.id, "Insufficient bar data for pair");
            return Ok(false);
        }

        let series1 = close_series(&bars1);
        let series2 = close_series(&bars2);
        let (aligned1, aligned2) = align_series(&series1, &series2);

        if aligned1.len() < self.config.min_aligned_points {
            tracing::debug!(
                rule_id = rule.id,
                aligned = aligned1.len(),
                "Not enough aligned data"
            );
            return Ok(false);
        }

        // Clamp the window before calling analytics; it refuses to guess.
        let window = self.config.default_rolling_window.min(aligned1.len() / 2);
        let analysis =
            match analyze_pair(&rule.symbol1, symbol2, &aligned1, &aligned2, window) {
                Ok(analysis) => analysis,
                Err(e) => {
                    tracing::debug!(rule_id = rule.id, "Pair analysis rejected input: {e}");
                    return Ok(false);
                }
            };

        let Some(zscore) = analysis.current_zscore() else {
            return Ok(false);
        };

        // Upper threshold is checked first and short-circuits; with an
        // inverted configuration where both sides are breached, upper wins.
        let threshold_breached = if matches!(rule.threshold_upper, Some(upper) if zscore >= upper) {
            rule.threshold_upper
        } else if matches!(rule.threshold_lower, Some(lower) if zscore <= lower) {
            rule.threshold_lower
        } else {
            None
        };

        let Some(threshold) = threshold_breached else {
            return Ok(false);
        };

        tracing::info!(
            rule_id = rule.id,
            symbol1 = %rule.symbol1,
            symbol2,
            zscore,
            threshold,
            "Z-score alert triggered"
        );

        self.fire(rule, symbol2, zscore, threshold, &analysis).await?;
        Ok(true)
    }

    /// Dispatches notifications, appends history, and stamps the cooldown.
    ///
    /// Channel failures are collected, not propagated: a partial delivery
    /// still records exactly one history entry and still starts the
    /// cooldown, otherwise a flapping transport would cause alert storms.
    async fn fire(
        &self,
        rule: &AlertRuleRecord,
        symbol2: &str,
        zscore: f64,
        threshold: f64,
        analysis: &PairAnalysisResult,
    ) -> Result<()> {
        let now = Utc::now();
        let context = json!({
            "analysis": serde_json::to_value(analysis).unwrap_or(json!({})),
            "data_points": analysis.data_points,
        });

        let notification = AlertNotification {
            rule_name: rule.name.clone(),
            symbol1: rule.symbol1.clone(),
            symbol2: symbol2.to_string(),
            zscore,
            threshold,
            signal: analysis.signal(),
            correlation: analysis.correlation.ok().map(|c| c.pearson),
            hedge_ratio: analysis.hedge_ratio.ok().map(|h| h.ratio),
            context: context.clone(),
            triggered_at: now,
        };

        let (sent, errors) = self
            .notifiers
            .dispatch_all(&rule.channels(), &notification, &rule.notification_config)
            .await;

        self.history
            .append(&NewAlertHistory {
                rule_id: rule.id,
                alert_type: AlertType::ZscoreThreshold,
                symbol1: rule.symbol1.clone(),
                symbol2: Some(symbol2.to_string()),
                trigger_value: zscore,
                threshold_breached: threshold,
                context_data: context,
                notifications_sent: sent,
                notification_errors: errors,
                triggered_at: now,
            })
            .await
            .context("Failed to append alert history")?;

        self.rules
            .mark_triggered(rule.id, now)
            .await
            .context("Failed to stamp rule cooldown")?;

        Ok(())
    }
}

/// Extracts (timestamp, close) pairs, dropping bars whose close does not
/// convert to a float.
fn close_series(bars: &[OhlcvBarRecord]) -> Vec<(DateTime<Utc>, f64)> {
    bars.iter()
        .filter_map(|bar| bar.close_f64().map(|close| (bar.timestamp, close)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notifier;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use pairwatch_data::ChannelKind;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use serde_json::Value as JsonValue;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    // ============================================
    // In-Memory Stores
    // ============================================

    #[derive(Default)]
    struct MockRuleStore {
        rules: Mutex<Vec<AlertRuleRecord>>,
    }

    #[async_trait]
    impl RuleStore for MockRuleStore {
        async fn active_rules(&self) -> Result<Vec<AlertRuleRecord>> {
            Ok(self.rules.lock().await.clone())
        }

        async fn mark_triggered(&self, rule_id: i64, at: DateTime<Utc>) -> Result<()> {
            let mut rules = self.rules.lock().await;
            if let Some(rule) = rules.iter_mut().find(|r| r.id == rule_id) {
                rule.last_triggered_at = Some(at);
                rule.trigger_count += 1;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockBarSource {
        bars: HashMap<String, Vec<OhlcvBarRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl BarSource for MockBarSource {
        async fn recent_bars(
            &self,
            symbol: &str,
            _timeframe: &str,
            limit: i64,
        ) -> Result<Vec<OhlcvBarRecord>> {
            if self.fail {
                bail!("bar store unavailable");
            }
            let bars = self.bars.get(symbol).cloned().unwrap_or_default();
            let keep = bars.len().saturating_sub(limit.max(0) as usize);
            Ok(bars[keep..].to_vec())
        }
    }

    #[derive(Default)]
    struct MockHistorySink {
        records: Mutex<Vec<NewAlertHistory>>,
    }

    #[async_trait]
    impl HistorySink for MockHistorySink {
        async fn append(&self, entry: &NewAlertHistory) -> Result<i64> {
            let mut records = self.records.lock().await;
            records.push(entry.clone());
            Ok(records.len() as i64)
        }
    }

    struct AlwaysOk;
    struct AlwaysFail;

    #[async_trait]
    impl Notifier for AlwaysOk {
        async fn send(&self, _n: &AlertNotification, _c: &JsonValue) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for AlwaysFail {
        async fn send(&self, _n: &AlertNotification, _c: &JsonValue) -> Result<()> {
            bail!("endpoint down")
        }
    }

    // ============================================
    // Fixtures
    // ============================================

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap()
    }

    fn bar(symbol: &str, minute: usize, close: f64) -> OhlcvBarRecord {
        let price = Decimal::from_f64(close).unwrap();
        OhlcvBarRecord {
            timestamp: base_time() + Duration::minutes(minute as i64),
            symbol: symbol.to_string(),
            timeframe: "1m".to_string(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ONE,
            trade_count: 1,
            vwap: Some(price),
        }
    }

    /// Builds bar sets where the final spread point spikes by `spike`,
    /// producing a large-magnitude current z-score of matching sign.
    fn spiked_pair(spike: f64) -> (Vec<OhlcvBarRecord>, Vec<OhlcvBarRecord>) {
        let n = 60;
        let wiggle = [0.12, -0.27, 0.21, -0.06, -0.18, 0.24, -0.09, 0.03];
        let mut bars1 = Vec::new();
        let mut bars2 = Vec::new();
        for i in 0..n {
            let p2 = 100.0 + (i as f64 * 0.3).sin() * 2.0;
            let mut p1 = 2.0 * p2 + wiggle[i % wiggle.len()];
            if i == n - 1 {
                p1 += spike;
            }
            bars1.push(bar("AAAUSDT", i, p1));
            bars2.push(bar("BBBUSDT", i, p2));
        }
        (bars1, bars2)
    }

    fn zscore_rule(id: i64, upper: Option<f64>, lower: Option<f64>) -> AlertRuleRecord {
        AlertRuleRecord {
            id,
            name: format!("rule-{id}"),
            alert_type: "zscore_threshold".to_string(),
            symbol1: "AAAUSDT".to_string(),
            symbol2: Some("BBBUSDT".to_string()),
            timeframe: "1m".to_string(),
            threshold_upper: upper,
            threshold_lower: lower,
            notification_channels: json!(["webhook"]),
            notification_config: json!({}),
            status: "active".to_string(),
            cooldown_minutes: 15,
            enabled: true,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: base_time(),
            updated_at: base_time(),
        }
    }

    struct Harness {
        rules: Arc<MockRuleStore>,
        history: Arc<MockHistorySink>,
        evaluator: AlertEvaluator,
    }

    fn harness(
        rule_list: Vec<AlertRuleRecord>,
        bars: MockBarSource,
        registry: NotifierRegistry,
    ) -> Harness {
        let rules = Arc::new(MockRuleStore {
            rules: Mutex::new(rule_list),
        });
        let history = Arc::new(MockHistorySink::default());
        let evaluator = AlertEvaluator::new(
            rules.clone(),
            Arc::new(bars),
            history.clone(),
            registry,
            EvaluatorConfig::default(),
        );
        Harness {
            rules,
            history,
            evaluator,
        }
    }

    fn ok_registry() -> NotifierRegistry {
        let mut registry = NotifierRegistry::new();
        registry.register(ChannelKind::Webhook, Arc::new(AlwaysOk));
        registry
    }

    // ============================================
    // Trigger Path Tests
    // ============================================

    #[tokio::test]
    async fn test_breached_upper_threshold_triggers_once() {
        let (bars1, bars2) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let h = harness(vec![zscore_rule(1, Some(2.0), None)], bar_source, ok_registry());

        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.total_rules, 1);
        assert_eq!(summary.triggered, 1);
        assert_eq!(summary.errors, 0);

        let records = h.history.records.lock().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rule_id, 1);
        assert_eq!(records[0].threshold_breached, 2.0);
        assert!(records[0].trigger_value >= 2.0);
        assert_eq!(records[0].notifications_sent, vec!["webhook"]);
        assert!(records[0].notification_errors.is_empty());

        let rules = h.rules.rules.lock().await;
        assert_eq!(rules[0].trigger_count, 1);
        assert!(rules[0].last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn test_breached_lower_threshold_triggers() {
        let (bars1, bars2) = spiked_pair(-15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let h = harness(vec![zscore_rule(1, None, Some(-2.0))], bar_source, ok_registry());

        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.triggered, 1);
        let records = h.history.records.lock().await;
        assert_eq!(records[0].threshold_breached, -2.0);
        assert!(records[0].trigger_value <= -2.0);
    }

    #[tokio::test]
    async fn test_upper_threshold_takes_priority_when_both_breached() {
        let (bars1, bars2) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        // Inverted configuration: a huge positive z-score satisfies both
        // `z >= 1.0` and `z <= 100.0`; upper must win.
        let h = harness(
            vec![zscore_rule(1, Some(1.0), Some(100.0))],
            bar_source,
            ok_registry(),
        );

        h.evaluator.evaluate_all().await.unwrap();

        let records = h.history.records.lock().await;
        assert_eq!(records[0].threshold_breached, 1.0);
    }

    #[tokio::test]
    async fn test_quiet_pair_does_not_trigger() {
        let (bars1, bars2) = spiked_pair(0.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let h = harness(vec![zscore_rule(1, Some(2.0), Some(-2.0))], bar_source, ok_registry());

        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.triggered, 0);
        assert!(h.history.records.lock().await.is_empty());
        assert_eq!(h.rules.rules.lock().await[0].trigger_count, 0);
    }

    // ============================================
    // Cooldown Tests
    // ============================================

    #[tokio::test]
    async fn test_at_most_one_trigger_per_cooldown_window() {
        let (bars1, bars2) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let h = harness(vec![zscore_rule(1, Some(2.0), None)], bar_source, ok_registry());

        // The threshold stays breached for all 100 sweeps, but only the
        // first one may fire inside the cooldown window.
        let mut total_triggered = 0;
        let mut total_skipped = 0;
        for _ in 0..100 {
            let summary = h.evaluator.evaluate_all().await.unwrap();
            total_triggered += summary.triggered;
            total_skipped += summary.skipped;
        }

        assert_eq!(total_triggered, 1);
        assert_eq!(total_skipped, 99);
        assert_eq!(h.history.records.lock().await.len(), 1);
        assert_eq!(h.rules.rules.lock().await[0].trigger_count, 1);
    }

    #[tokio::test]
    async fn test_rule_past_cooldown_window_fires_again() {
        let (bars1, bars2) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let mut rule = zscore_rule(1, Some(2.0), None);
        // Last trigger a full cooldown ago: eligible again right now
        rule.last_triggered_at = Some(Utc::now() - Duration::minutes(15));
        rule.trigger_count = 1;

        let h = harness(vec![rule], bar_source, ok_registry());
        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.triggered, 1);
        assert_eq!(h.rules.rules.lock().await[0].trigger_count, 2);
    }

    // ============================================
    // Partial Failure Tests
    // ============================================

    #[tokio::test]
    async fn test_partial_channel_failure_still_records_and_cools_down() {
        let (bars1, bars2) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let mut registry = NotifierRegistry::new();
        registry.register(ChannelKind::Webhook, Arc::new(AlwaysOk));
        registry.register(ChannelKind::Telegram, Arc::new(AlwaysFail));

        let mut rule = zscore_rule(1, Some(2.0), None);
        rule.notification_channels = json!(["telegram", "webhook"]);

        let h = harness(vec![rule], bar_source, registry);
        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.triggered, 1);

        let records = h.history.records.lock().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].notifications_sent, vec!["webhook"]);
        assert_eq!(records[0].notification_errors.len(), 1);

        // Partial failure still starts the cooldown
        assert!(h.rules.rules.lock().await[0].last_triggered_at.is_some());
    }

    // ============================================
    // Isolation / Skip Tests
    // ============================================

    #[tokio::test]
    async fn test_bar_store_failure_isolated_per_rule() {
        let bar_source = MockBarSource {
            bars: HashMap::new(),
            fail: true,
        };

        let h = harness(
            vec![zscore_rule(1, Some(2.0), None), zscore_rule(2, Some(2.0), None)],
            bar_source,
            ok_registry(),
        );

        let summary = h.evaluator.evaluate_all().await.unwrap();

        // Both rules failed individually; the sweep itself completed
        assert_eq!(summary.total_rules, 2);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.triggered, 0);
    }

    #[tokio::test]
    async fn test_disabled_rule_is_skipped() {
        let (bars1, bars2) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let mut rule = zscore_rule(1, Some(2.0), None);
        rule.enabled = false;

        let h = harness(vec![rule], bar_source, ok_registry());
        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.triggered, 0);
    }

    #[tokio::test]
    async fn test_insufficient_aligned_data_is_a_quiet_no_trigger() {
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert(
            "AAAUSDT".to_string(),
            (0..10).map(|i| bar("AAAUSDT", i, 200.0 + i as f64)).collect(),
        );
        bar_source.bars.insert(
            "BBBUSDT".to_string(),
            (0..10).map(|i| bar("BBBUSDT", i, 100.0 + i as f64)).collect(),
        );

        let h = harness(vec![zscore_rule(1, Some(2.0), None)], bar_source, ok_registry());
        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.triggered, 0);
        assert_eq!(summary.errors, 0);
        assert!(h.history.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_symbol2_is_a_quiet_no_trigger() {
        let (bars1, _) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);

        let mut rule = zscore_rule(1, Some(2.0), None);
        rule.symbol2 = None;

        let h = harness(vec![rule], bar_source, ok_registry());
        let summary = h.evaluator.evaluate_all().await.unwrap();

        assert_eq!(summary.triggered, 0);
        assert_eq!(summary.errors, 0);
    }

    #[tokio::test]
    async fn test_history_snapshot_contains_analysis() {
        let (bars1, bars2) = spiked_pair(15.0);
        let mut bar_source = MockBarSource::default();
        bar_source.bars.insert("AAAUSDT".to_string(), bars1);
        bar_source.bars.insert("BBBUSDT".to_string(), bars2);

        let h = harness(vec![zscore_rule(1, Some(2.0), None)], bar_source, ok_registry());
        h.evaluator.evaluate_all().await.unwrap();

        let records = h.history.records.lock().await;
        let context = &records[0].context_data;
        assert_eq!(context["data_points"], 60);
        assert_eq!(context["analysis"]["symbol1"], "AAAUSDT");
        assert!(context["analysis"]["correlation"].is_object());
    }
}
