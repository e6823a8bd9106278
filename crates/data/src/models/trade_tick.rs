//! Raw trade tick model.
//!
//! A tick is a single trade execution observed on the exchange feed. Ticks
//! are immutable once observed; the derived `volume` column is materialized
//! at construction so downstream aggregation never recomputes it.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An individual trade execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradeTickRecord {
    /// Exchange timestamp of the trade
    pub timestamp: DateTime<Utc>,
    /// Trading pair symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Trade price
    pub price: Decimal,
    /// Trade quantity in base currency
    pub quantity: Decimal,
    /// Quote volume of the trade (price * quantity)
    pub volume: Decimal,
}

impl TradeTickRecord {
    /// Creates a new tick, materializing the quote volume.
    pub fn new(timestamp: DateTime<Utc>, symbol: String, price: Decimal, quantity: Decimal) -> Self {
        let volume = price * quantity;
        Self {
            timestamp,
            symbol,
            price,
            quantity,
            volume,
        }
    }

    /// True when price and quantity are both strictly positive.
    ///
    /// Ticks failing this check are data-integrity errors; the aggregator
    /// skips them with a logged warning rather than folding them into bars.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.price > Decimal::ZERO && self.quantity > Decimal::ZERO
    }

    /// Price as a float for the analytics boundary.
    #[must_use]
    pub fn price_f64(&self) -> Option<f64> {
        self.price.to_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_new_materializes_volume() {
        let tick = TradeTickRecord::new(
            sample_timestamp(),
            "BTCUSDT".to_string(),
            dec!(50000),
            dec!(0.5),
        );

        assert_eq!(tick.volume, dec!(25000));
    }

    #[test]
    fn test_validity_checks() {
        let good = TradeTickRecord::new(sample_timestamp(), "BTCUSDT".into(), dec!(100), dec!(1));
        assert!(good.is_valid());

        let zero_price =
            TradeTickRecord::new(sample_timestamp(), "BTCUSDT".into(), dec!(0), dec!(1));
        assert!(!zero_price.is_valid());

        let negative_qty =
            TradeTickRecord::new(sample_timestamp(), "BTCUSDT".into(), dec!(100), dec!(-1));
        assert!(!negative_qty.is_valid());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let tick = TradeTickRecord::new(
            sample_timestamp(),
            "ETHUSDT".to_string(),
            dec!(2500.25),
            dec!(1.5),
        );

        let json = serde_json::to_string(&tick).unwrap();
        let back: TradeTickRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back, tick);
    }
}
