//! Data models for the pairwatch platform.
//!
//! All models use `rust_decimal::Decimal` for financial precision and
//! derive `sqlx::FromRow` for database compatibility. Floats only appear
//! on columns that feed the analytics boundary (thresholds, z-scores).

pub mod alert;
pub mod ohlcv_bar;
pub mod trade_tick;

pub use alert::{
    AlertHistoryRecord, AlertRuleRecord, AlertStatus, AlertType, ChannelKind, NewAlertHistory,
    NewAlertRule,
};
pub use ohlcv_bar::OhlcvBarRecord;
pub use trade_tick::TradeTickRecord;
