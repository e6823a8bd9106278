//! Alert rule evaluation and notification dispatch.
//!
//! The sweep ([`evaluator`]) reads recent bars, computes pair analytics,
//! applies each rule's thresholds behind its cooldown gate, and on a
//! trigger dispatches notifications ([`notify`]) and appends exactly one
//! history record. The [`monitor`] schedules sweeps periodically; storage
//! access goes through the narrow traits in [`stores`].

pub mod evaluator;
pub mod monitor;
pub mod notify;
pub mod stores;

pub use evaluator::{AlertEvaluator, EvaluatorConfig, SweepSummary};
pub use monitor::AlertMonitor;
pub use notify::{
    format_email_html, format_email_subject, format_telegram_message, webhook_payload,
    AlertNotification, Notifier, NotifierRegistry, TelegramNotifier, WebhookNotifier,
};
pub use stores::{BarSource, HistorySink, RuleStore};
