//! Core types and configuration for the pairwatch platform.
//!
//! This crate holds the shared vocabulary used by every other member of the
//! workspace: the [`Timeframe`] enum that names bar intervals, and the
//! figment-backed application configuration.

pub mod config;
pub mod config_loader;
pub mod timeframe;

pub use config::{
    AlertsConfig, AnalyticsConfig, AppConfig, BinanceConfig, DatabaseConfig, IngestionConfig,
    ResamplerConfig,
};
pub use config_loader::ConfigLoader;
pub use timeframe::{ParseTimeframeError, Timeframe};
