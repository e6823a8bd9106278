//! Data storage and repositories for the pairwatch platform.
//!
//! This crate provides:
//! - Database client and schema bootstrap for `PostgreSQL`
//! - Data models for ticks, bars, alert rules, and alert history
//! - Repositories for typed database access

pub mod database;
pub mod models;
pub mod repositories;

pub use database::DatabaseClient;

pub use models::{
    AlertHistoryRecord, AlertRuleRecord, AlertStatus, AlertType, ChannelKind, NewAlertHistory,
    NewAlertRule, OhlcvBarRecord, TradeTickRecord,
};

pub use repositories::{
    AlertHistoryRepository, AlertRuleRepository, BarRepository, TickRepository,
};
