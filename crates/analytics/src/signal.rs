//! Mean-reversion trading signal derived from the spread z-score.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete trading-signal label for a spread z-score.
///
/// Thresholds are fixed at |z| = 1 and |z| = 2. Boundary values are closed
/// toward neutral: exactly 1.0 is `Neutral`, exactly 2.0 is `CautionShort`.
/// This tie-break is preserved for compatibility with historical alert
/// behavior and must not be changed without migrating stored alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Spread overextended high; mean-reversion short.
    ShortSignal,
    /// Elevated but not actionable on the high side.
    CautionShort,
    /// Within one standard deviation of the rolling mean.
    Neutral,
    /// Depressed but not actionable on the low side.
    CautionLong,
    /// Spread overextended low; mean-reversion long.
    LongSignal,
    /// No usable z-score.
    Unknown,
}

impl Signal {
    /// Maps a (possibly missing) z-score to its signal label.
    #[must_use]
    pub fn classify(zscore: Option<f64>) -> Self {
        let Some(z) = zscore else {
            return Self::Unknown;
        };
        if z.is_nan() {
            return Self::Unknown;
        }
        if z > 2.0 {
            Self::ShortSignal
        } else if z > 1.0 {
            Self::CautionShort
        } else if z < -2.0 {
            Self::LongSignal
        } else if z < -1.0 {
            Self::CautionLong
        } else {
            Self::Neutral
        }
    }

    /// Returns the string form used in payloads and stored history.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ShortSignal => "short_signal",
            Self::CautionShort => "caution_short",
            Self::Neutral => "neutral",
            Self::CautionLong => "caution_long",
            Self::LongSignal => "long_signal",
            Self::Unknown => "unknown",
        }
    }

    /// True for the actionable labels on either side.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        matches!(self, Self::ShortSignal | Self::LongSignal)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_extremes() {
        assert_eq!(Signal::classify(Some(2.5)), Signal::ShortSignal);
        assert_eq!(Signal::classify(Some(-2.5)), Signal::LongSignal);
        assert_eq!(Signal::classify(Some(-2.000_000_1)), Signal::LongSignal);
    }

    #[test]
    fn test_classify_caution_bands() {
        assert_eq!(Signal::classify(Some(1.5)), Signal::CautionShort);
        assert_eq!(Signal::classify(Some(-1.5)), Signal::CautionLong);
    }

    #[test]
    fn test_classify_neutral_band() {
        assert_eq!(Signal::classify(Some(0.0)), Signal::Neutral);
        assert_eq!(Signal::classify(Some(0.99)), Signal::Neutral);
        assert_eq!(Signal::classify(Some(-0.99)), Signal::Neutral);
    }

    #[test]
    fn test_boundaries_close_toward_neutral() {
        // Pinned behavior: ties favor the less extreme label
        assert_eq!(Signal::classify(Some(1.0)), Signal::Neutral);
        assert_eq!(Signal::classify(Some(-1.0)), Signal::Neutral);
        assert_eq!(Signal::classify(Some(2.0)), Signal::CautionShort);
        assert_eq!(Signal::classify(Some(-2.0)), Signal::CautionLong);
    }

    #[test]
    fn test_classify_missing_or_nan_is_unknown() {
        assert_eq!(Signal::classify(None), Signal::Unknown);
        assert_eq!(Signal::classify(Some(f64::NAN)), Signal::Unknown);
    }

    #[test]
    fn test_serde_labels_match_history_format() {
        assert_eq!(
            serde_json::to_string(&Signal::ShortSignal).unwrap(),
            "\"short_signal\""
        );
        assert_eq!(
            serde_json::to_string(&Signal::CautionLong).unwrap(),
            "\"caution_long\""
        );
        let s: Signal = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(s, Signal::Unknown);
    }

    #[test]
    fn test_actionable_labels() {
        assert!(Signal::ShortSignal.is_actionable());
        assert!(Signal::LongSignal.is_actionable());
        assert!(!Signal::CautionShort.is_actionable());
        assert!(!Signal::Unknown.is_actionable());
    }
}
