//! Pair-trading statistics for the pairwatch platform.
//!
//! This crate is pure computation: no I/O, no async, no storage. It provides
//! - descriptive and rolling statistics ([`stats`])
//! - a QR-based least-squares solver ([`ols`])
//! - the Augmented Dickey-Fuller stationarity test ([`adf`])
//! - the pair analysis bundle ([`pairs`]) and z-score signal ([`signal`])
//!
//! NaN and infinity never escape this crate: results carry explicit
//! `Option` fields or [`pairs::Computed::Degenerate`] markers instead.

pub mod adf;
pub mod ols;
pub mod pairs;
pub mod signal;
pub mod stats;

pub use adf::{adf_test, AdfCriticalValues, AdfError, AdfResult};
pub use ols::{fit_ols, OlsError, OlsFit};
pub use pairs::{
    align_series, analyze_pair, CointegrationLabel, CointegrationStats, Computed,
    CorrelationStats, CorrelationStrength, HedgeRatioStats, PairAnalysisResult,
    RollingCorrelationStats, SpreadStats, ValidationError, ZscoreStats,
};
pub use signal::Signal;
