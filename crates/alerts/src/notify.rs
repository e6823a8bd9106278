//! Notification payloads, per-channel formatting, and dispatch.
//!
//! The core builds the payload and selects channels; transports are
//! [`Notifier`] implementations behind the registry. Webhook and Telegram
//! ship here over reqwest; anything else (e.g. an SMTP relay for the email
//! channel) is registered by the embedder. Each dispatch is independent:
//! one channel failing never blocks another, and failures are reported
//! back per channel, not retried within the same trigger.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairwatch_analytics::Signal;
use pairwatch_data::ChannelKind;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything a channel needs to describe one trigger.
#[derive(Debug, Clone)]
pub struct AlertNotification {
    pub rule_name: String,
    pub symbol1: String,
    pub symbol2: String,
    pub zscore: f64,
    pub threshold: f64,
    pub signal: Signal,
    pub correlation: Option<f64>,
    pub hedge_ratio: Option<f64>,
    /// Serialized analysis snapshot attached to webhook payloads
    pub context: JsonValue,
    pub triggered_at: DateTime<Utc>,
}

/// A notification transport for one channel kind.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one formatted notification using the channel's settings
    /// from the rule's `notification_config`.
    async fn send(&self, notification: &AlertNotification, channel_config: &JsonValue)
        -> Result<()>;
}

/// JSON body for webhook consumers.
#[must_use]
pub fn webhook_payload(n: &AlertNotification) -> JsonValue {
    json!({
        "alert_type": "zscore_threshold",
        "rule": n.rule_name,
        "pair": {
            "symbol1": n.symbol1,
            "symbol2": n.symbol2,
        },
        "metrics": {
            "zscore": n.zscore,
            "threshold": n.threshold,
            "correlation": n.correlation,
            "hedge_ratio": n.hedge_ratio,
        },
        "signal": n.signal,
        "timestamp": n.triggered_at,
        "context": n.context,
    })
}

fn recommendation(signal: Signal) -> &'static str {
    match signal {
        Signal::LongSignal | Signal::CautionLong => "Consider going LONG the spread (buy spread)",
        Signal::ShortSignal | Signal::CautionShort => {
            "Consider going SHORT the spread (sell spread)"
        }
        Signal::Neutral | Signal::Unknown => "No strong signal - wait for better opportunity",
    }
}

/// HTML-formatted Telegram message.
#[must_use]
pub fn format_telegram_message(n: &AlertNotification) -> String {
    let correlation_line = n
        .correlation
        .map(|c| format!("\n<b>Correlation:</b> {c:.4}"))
        .unwrap_or_default();

    format!(
        "<b>PAIR ALERT</b>\n\n\
         <b>Pair:</b> {} vs {}\n\
         <b>Z-Score:</b> {:.4}\n\
         <b>Threshold:</b> {:.2}\n\
         <b>Signal:</b> {}{}\n\n\
         <b>Time:</b> {}\n\n\
         {}",
        n.symbol1,
        n.symbol2,
        n.zscore,
        n.threshold,
        n.signal,
        correlation_line,
        n.triggered_at.format("%Y-%m-%d %H:%M:%S UTC"),
        recommendation(n.signal),
    )
}

/// Subject line for the email channel.
#[must_use]
pub fn format_email_subject(n: &AlertNotification) -> String {
    format!(
        "Pair Alert: {} - {}/{}",
        n.signal.as_str().to_uppercase(),
        n.symbol1,
        n.symbol2
    )
}

/// HTML body for the email channel.
#[must_use]
pub fn format_email_html(n: &AlertNotification) -> String {
    let extra_rows: String = [
        n.correlation
            .map(|c| format!("<div class=\"metric\"><strong>Correlation:</strong> {c:.4}</div>")),
        n.hedge_ratio
            .map(|h| format!("<div class=\"metric\"><strong>Hedge Ratio:</strong> {h:.6}</div>")),
    ]
    .into_iter()
    .flatten()
    .collect();

    format!(
        "<html><body>\
         <h1>PAIR ALERT: {}</h1>\
         <h2>Pair: {} vs {}</h2>\
         <div class=\"metric\"><strong>Z-Score:</strong> {:.4}</div>\
         <div class=\"metric\"><strong>Threshold Breached:</strong> {:.2}</div>\
         <div class=\"metric\"><strong>Signal:</strong> {}</div>\
         {}\
         <div class=\"metric\"><strong>Triggered At:</strong> {}</div>\
         <h3>Recommended Action:</h3><p>{}</p>\
         </body></html>",
        n.signal.as_str().to_uppercase(),
        n.symbol1,
        n.symbol2,
        n.zscore,
        n.threshold,
        n.signal,
        extra_rows,
        n.triggered_at.format("%Y-%m-%d %H:%M:%S UTC"),
        recommendation(n.signal),
    )
}

/// Posts the JSON payload to the configured URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        notification: &AlertNotification,
        channel_config: &JsonValue,
    ) -> Result<()> {
        let Some(url) = channel_config.get("url").and_then(JsonValue::as_str) else {
            bail!("no webhook URL configured");
        };

        let mut request = self.client.post(url).json(&webhook_payload(notification));
        if let Some(headers) = channel_config.get("headers").and_then(JsonValue::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        let response = request.send().await.context("webhook request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("webhook returned {status}: {body}");
        }

        tracing::info!(url, "Webhook notification sent");
        Ok(())
    }
}

/// Sends an HTML message through the Telegram bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramNotifier {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_api_base(client, "https://api.telegram.org".to_string())
    }

    /// Overrides the API host (tests point this at a local server).
    #[must_use]
    pub fn with_api_base(client: reqwest::Client, api_base: String) -> Self {
        Self { client, api_base }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        notification: &AlertNotification,
        channel_config: &JsonValue,
    ) -> Result<()> {
        let token = channel_config.get("bot_token").and_then(JsonValue::as_str);
        let chat_id = channel_config.get("chat_id").and_then(JsonValue::as_str);
        let (Some(token), Some(chat_id)) = (token, chat_id) else {
            bail!("no Telegram bot token or chat id configured");
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let body = json!({
            "chat_id": chat_id,
            "text": format_telegram_message(notification),
            "parse_mode": "HTML",
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Telegram API returned {status}: {text}");
        }

        tracing::info!("Telegram notification sent");
        Ok(())
    }
}

/// Channel-kind to transport mapping.
pub struct NotifierRegistry {
    notifiers: HashMap<ChannelKind, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    /// An empty registry; register transports explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            notifiers: HashMap::new(),
        }
    }

    /// Registry with the built-in HTTP transports (webhook, Telegram),
    /// each request bounded by `timeout` so one slow endpoint cannot
    /// stall the evaluation sweep.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_defaults(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build notification HTTP client")?;

        let mut registry = Self::new();
        registry.register(ChannelKind::Webhook, Arc::new(WebhookNotifier::new(client.clone())));
        registry.register(ChannelKind::Telegram, Arc::new(TelegramNotifier::new(client)));
        Ok(registry)
    }

    /// Registers (or replaces) the transport for a channel kind.
    pub fn register(&mut self, kind: ChannelKind, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(kind, notifier);
    }

    /// Dispatches to every requested channel independently.
    ///
    /// # Returns
    /// `(sent, errors)`: channel names that delivered, and per-channel
    /// error strings for the ones that did not (including channels with
    /// no registered transport).
    pub async fn dispatch_all(
        &self,
        channels: &[ChannelKind],
        notification: &AlertNotification,
        notification_config: &JsonValue,
    ) -> (Vec<String>, Vec<String>) {
        let mut sent = Vec::new();
        let mut errors = Vec::new();

        for channel in channels {
            let Some(notifier) = self.notifiers.get(channel) else {
                errors.push(format!("{channel}: no transport registered"));
                continue;
            };

            let empty = json!({});
            let channel_config = notification_config.get(channel.as_str()).unwrap_or(&empty);

            match notifier.send(notification, channel_config).await {
                Ok(()) => sent.push(channel.to_string()),
                Err(e) => {
                    tracing::error!(channel = %channel, "Notification failed: {e:#}");
                    errors.push(format!("{channel}: {e:#}"));
                }
            }
        }

        (sent, errors)
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_notification() -> AlertNotification {
        AlertNotification {
            rule_name: "BTC/ETH divergence".to_string(),
            symbol1: "BTCUSDT".to_string(),
            symbol2: "ETHUSDT".to_string(),
            zscore: 2.3456,
            threshold: 2.0,
            signal: Signal::ShortSignal,
            correlation: Some(0.94),
            hedge_ratio: Some(15.2),
            context: json!({"data_points": 100}),
            triggered_at: Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap(),
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
    // Payload Formatting Tests
    // ============================================

    #[test]
    fn test_webhook_payload_shape() {
        let payload = webhook_payload(&sample_notification());

        assert_eq!(payload["alert_type"], "zscore_threshold");
        assert_eq!(payload["pair"]["symbol1"], "BTCUSDT");
        assert_eq!(payload["metrics"]["threshold"], 2.0);
        assert_eq!(payload["signal"], "short_signal");
        assert_eq!(payload["context"]["data_points"], 100);
    }

    #[test]
    fn test_telegram_message_contains_key_fields() {
        let text = format_telegram_message(&sample_notification());

        assert!(text.contains("BTCUSDT vs ETHUSDT"));
        assert!(text.contains("2.3456"));
        assert!(text.contains("short_signal"));
        assert!(text.contains("SHORT the spread"));
    }

    #[test]
    fn test_telegram_message_omits_missing_correlation() {
        let mut n = sample_notification();
        n.correlation = None;
        let text = format_telegram_message(&n);
        assert!(!text.contains("Correlation"));
    }

    #[test]
    fn test_email_formatting() {
        let n = sample_notification();
        assert_eq!(format_email_subject(&n), "Pair Alert: SHORT_SIGNAL - BTCUSDT/ETHUSDT");

        let html = format_email_html(&n);
        assert!(html.contains("<strong>Z-Score:</strong> 2.3456"));
        assert!(html.contains("Hedge Ratio"));
    }

    #[test]
    fn test_recommendation_by_signal() {
        assert!(recommendation(Signal::LongSignal).contains("LONG"));
        assert!(recommendation(Signal::ShortSignal).contains("SHORT"));
        assert!(recommendation(Signal::Unknown).contains("wait"));
    }

    // ============================================
    // Dispatch Tests
    // ============================================

    #[tokio::test]
    async fn test_dispatch_collects_success_and_failure_independently() {
        let mut registry = NotifierRegistry::new();
        registry.register(ChannelKind::Webhook, Arc::new(AlwaysOk));
        registry.register(ChannelKind::Telegram, Arc::new(AlwaysFail));

        let (sent, errors) = registry
            .dispatch_all(
                &[ChannelKind::Telegram, ChannelKind::Webhook],
                &sample_notification(),
                &json!({}),
            )
            .await;

        // The telegram failure did not block the webhook dispatch
        assert_eq!(sent, vec!["webhook"]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("telegram:"));
    }

    #[tokio::test]
    async fn test_dispatch_reports_unregistered_channel() {
        let registry = NotifierRegistry::new();

        let (sent, errors) = registry
            .dispatch_all(&[ChannelKind::Email], &sample_notification(), &json!({}))
            .await;

        assert!(sent.is_empty());
        assert_eq!(errors, vec!["email: no transport registered".to_string()]);
    }

    #[tokio::test]
    async fn test_webhook_notifier_requires_url() {
        let notifier = WebhookNotifier::new(reqwest::Client::new());
        let err = notifier
            .send(&sample_notification(), &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no webhook URL"));
    }

    #[tokio::test]
    async fn test_telegram_notifier_requires_credentials() {
        let notifier = TelegramNotifier::new(reqwest::Client::new());
        let err = notifier
            .send(&sample_notification(), &json!({"bot_token": "x"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat id"));
    }
}
