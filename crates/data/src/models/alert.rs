//! Alert rule and alert history models.
//!
//! A rule owns its cooldown state exclusively: only the evaluation sweep
//! mutates `last_triggered_at` / `trigger_count`, and only on a trigger.
//! History records are an append-only log; nothing but the `acknowledged`
//! flag is ever updated after insertion.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Kind of condition a rule evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Spread z-score crosses a configured threshold
    ZscoreThreshold,
    /// Reserved: correlation regime change
    CorrelationChange,
    /// Reserved: absolute price threshold
    PriceThreshold,
    /// Reserved: volatility spike
    VolatilitySpike,
}

impl AlertType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ZscoreThreshold => "zscore_threshold",
            Self::CorrelationChange => "correlation_change",
            Self::PriceThreshold => "price_threshold",
            Self::VolatilitySpike => "volatility_spike",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zscore_threshold" => Ok(Self::ZscoreThreshold),
            "correlation_change" => Ok(Self::CorrelationChange),
            "price_threshold" => Ok(Self::PriceThreshold),
            "volatility_spike" => Ok(Self::VolatilitySpike),
            other => Err(format!("unknown alert type: {other}")),
        }
    }
}

/// Rule lifecycle status. Rules are never hard-deleted; they are disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Disabled,
}

impl AlertStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

/// Notification channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Telegram,
    Webhook,
}

impl ChannelKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Telegram => "telegram",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "telegram" => Ok(Self::Telegram),
            "webhook" => Ok(Self::Webhook),
            other => Err(format!("unknown notification channel: {other}")),
        }
    }
}

/// A stored alert rule.
///
/// Enum-valued columns are kept as their string forms (the database
/// representation) with typed accessors, so an unknown value read from
/// storage degrades to a skipped rule instead of a failed sweep.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertRuleRecord {
    pub id: i64,
    pub name: String,
    pub alert_type: String,
    pub symbol1: String,
    /// Second leg of the pair; None for single-symbol rule types
    pub symbol2: Option<String>,
    pub timeframe: String,
    /// Trigger when the observed value >= this
    pub threshold_upper: Option<f64>,
    /// Trigger when the observed value <= this
    pub threshold_lower: Option<f64>,
    /// JSON array of channel names
    pub notification_channels: JsonValue,
    /// JSON object of per-channel settings
    pub notification_config: JsonValue,
    pub status: String,
    pub cooldown_minutes: i64,
    pub enabled: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRuleRecord {
    /// Returns the parsed alert type.
    #[must_use]
    pub fn parsed_type(&self) -> Option<AlertType> {
        self.alert_type.parse().ok()
    }

    /// Returns the parsed status.
    #[must_use]
    pub fn parsed_status(&self) -> Option<AlertStatus> {
        self.status.parse().ok()
    }

    /// Parses the configured notification channels, dropping unknown names.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelKind> {
        self.notification_channels
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Minimum interval between consecutive triggers.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes)
    }

    /// True while the rule must not trigger again.
    ///
    /// The boundary is inclusive on the eligible side: when exactly
    /// `cooldown` has elapsed since the last trigger the rule is eligible
    /// again, not one tick later.
    #[must_use]
    pub fn is_in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            Some(last) => now - last < self.cooldown(),
            None => false,
        }
    }

    /// True when the sweep should evaluate this rule at all.
    #[must_use]
    pub fn is_evaluable(&self) -> bool {
        self.enabled && self.parsed_status() == Some(AlertStatus::Active)
    }
}

/// Parameters for creating a rule. The storage layer assigns the id and
/// bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlertRule {
    pub name: String,
    pub alert_type: AlertType,
    pub symbol1: String,
    pub symbol2: Option<String>,
    pub timeframe: String,
    pub threshold_upper: Option<f64>,
    pub threshold_lower: Option<f64>,
    pub notification_channels: Vec<ChannelKind>,
    pub notification_config: JsonValue,
    pub cooldown_minutes: i64,
}

impl NewAlertRule {
    /// A rule with neither threshold can never fire.
    #[must_use]
    pub fn has_threshold(&self) -> bool {
        self.threshold_upper.is_some() || self.threshold_lower.is_some()
    }
}

/// A record of one triggered alert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertHistoryRecord {
    pub id: i64,
    /// Weak reference to the originating rule (lookup only, no ownership)
    pub rule_id: i64,
    pub alert_type: String,
    pub symbol1: String,
    pub symbol2: Option<String>,
    /// The observed value that fired the rule (e.g. the z-score)
    pub trigger_value: f64,
    /// The threshold that was breached
    pub threshold_breached: f64,
    /// Snapshot of the analysis at trigger time
    pub context_data: JsonValue,
    /// JSON array of channel names that delivered successfully
    pub notifications_sent: JsonValue,
    /// JSON array of per-channel error strings
    pub notification_errors: JsonValue,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Parameters for appending a history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlertHistory {
    pub rule_id: i64,
    pub alert_type: AlertType,
    pub symbol1: String,
    pub symbol2: Option<String>,
    pub trigger_value: f64,
    pub threshold_breached: f64,
    pub context_data: JsonValue,
    pub notifications_sent: Vec<String>,
    pub notification_errors: Vec<String>,
    pub triggered_at: DateTime<Utc>,
}
