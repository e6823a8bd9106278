//! OHLCV bar model.
//!
//! One bar per (symbol, timeframe, interval start); that triple is the
//! upsert key, so resampling the same window again overwrites rather than
//! duplicates. Bars with zero trades are never created.

use chrono::{DateTime, Utc};
use pairwatch_core::Timeframe;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An aggregated open/high/low/close/volume bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OhlcvBarRecord {
    /// Interval start timestamp
    pub timestamp: DateTime<Utc>,
    /// Trading pair symbol
    pub symbol: String,
    /// Timeframe string ("1s", "1m", ...)
    pub timeframe: String,
    /// Price of the earliest tick in the interval
    pub open: Decimal,
    /// Highest tick price in the interval
    pub high: Decimal,
    /// Lowest tick price in the interval
    pub low: Decimal,
    /// Price of the latest tick in the interval
    pub close: Decimal,
    /// Sum of per-tick quote volume
    pub volume: Decimal,
    /// Number of ticks aggregated into the bar
    pub trade_count: i64,
    /// Volume-weighted average price; None when the interval had no volume
    pub vwap: Option<Decimal>,
}

impl OhlcvBarRecord {
    /// Returns the parsed timeframe, if the stored string is recognized.
    #[must_use]
    pub fn parsed_timeframe(&self) -> Option<Timeframe> {
        self.timeframe.parse().ok()
    }

    /// Close price as a float for the analytics boundary.
    #[must_use]
    pub fn close_f64(&self) -> Option<f64> {
        self.close.to_f64()
    }

    /// Checks the OHLC ordering invariant: low <= open, close <= high.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
            && self.trade_count >= 1
    }
}
