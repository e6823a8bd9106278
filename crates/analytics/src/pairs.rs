//! Pair trading analytics: correlation, cointegration, hedge ratio, spread
//! and its rolling z-score.
//!
//! [`analyze_pair`] takes two aligned price series and produces a
//! [`PairAnalysisResult`] whose sub-results either carry values or an
//! explicit [`Computed::Degenerate`] marker. No NaN or infinity ever leaves
//! this module: every float is checked at the boundary and replaced with an
//! explicit `None` or a degenerate marker.
//!
//! Two different hedge ratios are in play on purpose: the spread (and its
//! z-score) uses the OLS slope, while the cointegration test builds its
//! spread from the ratio of means. Both estimates are preserved from the
//! platform's historical behavior; do not unify them without re-validating
//! stored alert thresholds.

use crate::adf::{adf_test, AdfCriticalValues, AdfError};
use crate::ols::fit_ols;
use crate::signal::Signal;
use crate::stats::{
    correlation_p_value, mean, pearson, rolling_mean, rolling_pearson, rolling_std, sample_std,
    spearman,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input that cannot be analyzed at all. Distinct from numeric degeneracy,
/// which is reported inline per sub-result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("series length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("series timestamps differ at index {index}")]
    MisalignedTimestamps { index: usize },
    #[error("need at least {required} data points, got {actual}")]
    InsufficientData { required: usize, actual: usize },
    #[error("rolling window must be positive")]
    ZeroWindow,
    #[error("rolling window {window} exceeds series length {len}")]
    WindowTooLarge { window: usize, len: usize },
    #[error("series contains a non-finite value at index {index}")]
    NonFiniteInput { index: usize },
}

/// A sub-result that either computed cleanly or hit a numeric degeneracy.
///
/// Degeneracy (zero variance, constant spread, rank-deficient regression)
/// is a property of the data, not a failure of the caller, so it is carried
/// inline and sibling sub-results still complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Computed<T> {
    Ok(T),
    Degenerate { reason: String },
}

impl<T> Computed<T> {
    /// Builds a degenerate marker.
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::Degenerate {
            reason: reason.into(),
        }
    }

    /// Returns the value when present.
    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Degenerate { .. } => None,
        }
    }

    /// True when this sub-result could not be computed.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. })
    }
}

/// Correlation strength label on the absolute Pearson coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    VeryWeak,
}

impl CorrelationStrength {
    /// Labels |r|: >= 0.9 very strong, >= 0.7 strong, >= 0.5 moderate,
    /// >= 0.3 weak, else very weak.
    #[must_use]
    pub fn from_coefficient(r: f64) -> Self {
        let abs = r.abs();
        if abs >= 0.9 {
            Self::VeryStrong
        } else if abs >= 0.7 {
            Self::Strong
        } else if abs >= 0.5 {
            Self::Moderate
        } else if abs >= 0.3 {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }
}

/// Pearson and Spearman correlation with two-sided p-values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub pearson: f64,
    pub pearson_pvalue: f64,
    pub spearman: f64,
    pub spearman_pvalue: f64,
    pub strength: CorrelationStrength,
}

/// OLS regression of series1 on series2: `series1 = intercept + ratio * series2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeRatioStats {
    pub ratio: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub residual_std: f64,
}

/// Cointegration interpretation buckets on the ADF p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CointegrationLabel {
    StronglyCointegrated,
    Cointegrated,
    WeaklyCointegrated,
    NotCointegrated,
}

impl CointegrationLabel {
    /// p < 0.01 strongly, p < 0.05 cointegrated, p < 0.10 weakly, else not.
    #[must_use]
    pub fn from_pvalue(pvalue: f64) -> Self {
        if pvalue < 0.01 {
            Self::StronglyCointegrated
        } else if pvalue < 0.05 {
            Self::Cointegrated
        } else if pvalue < 0.10 {
            Self::WeaklyCointegrated
        } else {
            Self::NotCointegrated
        }
    }
}

/// ADF test outcome on the ratio-of-means spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CointegrationStats {
    pub adf_statistic: f64,
    pub pvalue: f64,
    pub critical_values: AdfCriticalValues,
    pub is_cointegrated_1pct: bool,
    pub is_cointegrated_5pct: bool,
    pub interpretation: CointegrationLabel,
}

/// Descriptive statistics of the OLS-hedged spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub latest: f64,
    pub deviation_from_mean: f64,
}

/// Rolling z-score of the spread. `current` is `None` when the most recent
/// point has no defined z-score (insufficient trailing history or a flat
/// rolling window); the aggregate fields cover the defined points only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZscoreStats {
    pub current: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub signal: Signal,
}

/// Rolling Pearson correlation between the two price series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingCorrelationStats {
    pub current: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// The full analysis bundle for one pair over one bar window.
///
/// Transient: computed fresh from a window of aligned bars, serialized into
/// alert history as a snapshot, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairAnalysisResult {
    /// Timestamp of the most recent aligned bar.
    pub timestamp: Option<DateTime<Utc>>,
    pub symbol1: String,
    pub symbol2: String,
    pub data_points: usize,
    pub correlation: Computed<CorrelationStats>,
    pub hedge_ratio: Computed<HedgeRatioStats>,
    pub cointegration: Computed<CointegrationStats>,
    pub spread: Computed<SpreadStats>,
    pub zscore: Computed<ZscoreStats>,
    pub rolling_correlation: Computed<RollingCorrelationStats>,
}

impl PairAnalysisResult {
    /// The current z-score, when defined.
    #[must_use]
    pub fn current_zscore(&self) -> Option<f64> {
        self.zscore.ok().and_then(|z| z.current)
    }

    /// The z-score signal label (`Unknown` when unavailable).
    #[must_use]
    pub fn signal(&self) -> Signal {
        self.zscore.ok().map_or(Signal::Unknown, |z| z.signal)
    }
}

/// Replaces NaN/infinity with `None` at the module boundary.
fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Inner-joins two `(timestamp, value)` series on timestamp, preserving the
/// first series' order. Callers align before [`analyze_pair`].
#[must_use]
pub fn align_series(
    a: &[(DateTime<Utc>, f64)],
    b: &[(DateTime<Utc>, f64)],
) -> (Vec<(DateTime<Utc>, f64)>, Vec<(DateTime<Utc>, f64)>) {
    let b_by_ts: std::collections::HashMap<i64, f64> =
        b.iter().map(|(ts, v)| (ts.timestamp_millis(), *v)).collect();

    let mut left = Vec::new();
    let mut right = Vec::new();
    for (ts, v) in a {
        if let Some(&bv) = b_by_ts.get(&ts.timestamp_millis()) {
            left.push((*ts, *v));
            right.push((*ts, bv));
        }
    }
    (left, right)
}

/// Analyzes the statistical relationship between two aligned price series.
///
/// Preconditions: equal lengths, pairwise-equal timestamps, at least two
/// points, finite values, and `1 <= rolling_window <= len`. Callers clamp
/// the window (`min(requested, len / 2)`) before calling; this function
/// does not guess.
///
/// # Errors
/// Returns [`ValidationError`] when the preconditions fail. Numeric
/// degeneracy never errors: it lands inline in the affected sub-result.
pub fn analyze_pair(
    symbol1: &str,
    symbol2: &str,
    series1: &[(DateTime<Utc>, f64)],
    series2: &[(DateTime<Utc>, f64)],
    rolling_window: usize,
) -> Result<PairAnalysisResult, ValidationError> {
    validate_input(series1, series2, rolling_window)?;

    let prices1: Vec<f64> = series1.iter().map(|(_, p)| *p).collect();
    let prices2: Vec<f64> = series2.iter().map(|(_, p)| *p).collect();

    let correlation = compute_correlation(&prices1, &prices2);
    let hedge_ratio = compute_hedge_ratio(&prices1, &prices2);
    let cointegration = test_cointegration(&prices1, &prices2);

    // Spread and z-score hang off the OLS hedge ratio.
    let (spread, zscore) = match hedge_ratio.ok() {
        Some(hr) => {
            let spread_series: Vec<f64> = prices1
                .iter()
                .zip(prices2.iter())
                .map(|(p1, p2)| p1 - hr.ratio * p2)
                .collect();
            (
                compute_spread_stats(&spread_series),
                compute_zscore(&spread_series, rolling_window),
            )
        }
        None => (
            Computed::degenerate("hedge ratio unavailable"),
            Computed::degenerate("hedge ratio unavailable"),
        ),
    };

    let rolling_correlation = compute_rolling_correlation(&prices1, &prices2, rolling_window);

    Ok(PairAnalysisResult {
        timestamp: series1.last().map(|(ts, _)| *ts),
        symbol1: symbol1.to_string(),
        symbol2: symbol2.to_string(),
        data_points: series1.len(),
        correlation,
        hedge_ratio,
        cointegration,
        spread,
        zscore,
        rolling_correlation,
    })
}

fn validate_input(
    series1: &[(DateTime<Utc>, f64)],
    series2: &[(DateTime<Utc>, f64)],
    rolling_window: usize,
) -> Result<(), ValidationError> {
    if series1.len() != series2.len() {
        return Err(ValidationError::LengthMismatch {
            left: series1.len(),
            right: series2.len(),
        });
    }
    if series1.len() < 2 {
        return Err(ValidationError::InsufficientData {
            required: 2,
            actual: series1.len(),
        });
    }
    if rolling_window == 0 {
        return Err(ValidationError::ZeroWindow);
    }
    if rolling_window > series1.len() {
        return Err(ValidationError::WindowTooLarge {
            window: rolling_window,
            len: series1.len(),
        });
    }
    for (index, ((ts1, p1), (ts2, p2))) in series1.iter().zip(series2.iter()).enumerate() {
        if ts1 != ts2 {
            return Err(ValidationError::MisalignedTimestamps { index });
        }
        if !p1.is_finite() || !p2.is_finite() {
            return Err(ValidationError::NonFiniteInput { index });
        }
    }
    Ok(())
}

fn compute_correlation(prices1: &[f64], prices2: &[f64]) -> Computed<CorrelationStats> {
    let n = prices1.len();
    let var1 = crate::stats::variance(prices1, 0);
    let var2 = crate::stats::variance(prices2, 0);
    if var1 < f64::EPSILON || var2 < f64::EPSILON {
        return Computed::degenerate("zero variance in price series");
    }

    let pearson_r = pearson(prices1, prices2);
    let spearman_r = spearman(prices1, prices2);

    Computed::Ok(CorrelationStats {
        pearson: pearson_r,
        pearson_pvalue: correlation_p_value(pearson_r, n),
        spearman: spearman_r,
        spearman_pvalue: correlation_p_value(spearman_r, n),
        strength: CorrelationStrength::from_coefficient(pearson_r),
    })
}

fn compute_hedge_ratio(prices1: &[f64], prices2: &[f64]) -> Computed<HedgeRatioStats> {
    let ones = vec![1.0; prices2.len()];
    match fit_ols(prices1, &[ones, prices2.to_vec()]) {
        Ok(fit) => {
            let (Some(intercept), Some(ratio)) =
                (finite(fit.coefficients[0]), finite(fit.coefficients[1]))
            else {
                return Computed::degenerate("non-finite regression coefficients");
            };
            Computed::Ok(HedgeRatioStats {
                ratio,
                intercept,
                r_squared: finite(fit.r_squared).unwrap_or(0.0),
                residual_std: finite(fit.residual_std).unwrap_or(0.0),
            })
        }
        Err(e) => Computed::degenerate(e.to_string()),
    }
}

fn test_cointegration(prices1: &[f64], prices2: &[f64]) -> Computed<CointegrationStats> {
    // The ADF spread deliberately uses the ratio-of-means hedge, not the
    // OLS slope used for the tradeable spread.
    let mean2 = mean(prices2);
    if mean2.abs() < f64::EPSILON {
        return Computed::degenerate("second series has zero mean");
    }
    let hedge = mean(prices1) / mean2;
    let spread: Vec<f64> = prices1
        .iter()
        .zip(prices2.iter())
        .map(|(p1, p2)| p1 - hedge * p2)
        .collect();

    match adf_test(&spread) {
        Ok(result) => {
            let Some(statistic) = finite(result.statistic) else {
                return Computed::degenerate("non-finite ADF statistic");
            };
            Computed::Ok(CointegrationStats {
                adf_statistic: statistic,
                pvalue: result.pvalue,
                critical_values: result.critical_values,
                is_cointegrated_1pct: result.pvalue < 0.01,
                is_cointegrated_5pct: result.pvalue < 0.05,
                interpretation: CointegrationLabel::from_pvalue(result.pvalue),
            })
        }
        Err(AdfError::TooShort { required, actual }) => Computed::degenerate(format!(
            "need at least {required} observations for the ADF test, got {actual}"
        )),
        Err(AdfError::Degenerate(reason)) => {
            tracing::debug!(reason, "ADF test degenerate");
            Computed::degenerate(reason)
        }
    }
}

fn compute_spread_stats(spread: &[f64]) -> Computed<SpreadStats> {
    let (Some(m), Some(s)) = (finite(mean(spread)), finite(sample_std(spread))) else {
        return Computed::degenerate("spread statistics undefined");
    };
    let min = spread.iter().copied().fold(f64::INFINITY, f64::min);
    let max = spread.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let latest = *spread.last().expect("validated non-empty");

    Computed::Ok(SpreadStats {
        mean: m,
        std: s,
        min,
        max,
        latest,
        deviation_from_mean: latest - m,
    })
}

fn compute_zscore(spread: &[f64], window: usize) -> Computed<ZscoreStats> {
    if spread.len() < window {
        return Computed::degenerate(format!("need at least {window} data points"));
    }

    let means = rolling_mean(spread, window);
    let stds = rolling_std(spread, window);

    let zscores: Vec<Option<f64>> = spread
        .iter()
        .zip(means.iter().zip(stds.iter()))
        .map(|(value, (m, s))| match (m, s) {
            (Some(m), Some(s)) if *s > 0.0 => finite((value - m) / s),
            _ => None,
        })
        .collect();

    let defined: Vec<f64> = zscores.iter().flatten().copied().collect();
    if defined.is_empty() {
        return Computed::degenerate("zero variance in every rolling window");
    }

    let current = zscores.last().copied().flatten();
    let min = defined.iter().copied().fold(f64::INFINITY, f64::min);
    let max = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Computed::Ok(ZscoreStats {
        current,
        mean: finite(mean(&defined)),
        std: finite(sample_std(&defined)),
        min: finite(min),
        max: finite(max),
        signal: Signal::classify(current),
    })
}

fn compute_rolling_correlation(
    prices1: &[f64],
    prices2: &[f64],
    window: usize,
) -> Computed<RollingCorrelationStats> {
    if prices1.len() < window {
        return Computed::degenerate(format!("need at least {window} data points"));
    }

    let values = rolling_pearson(prices1, prices2, window);
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.is_empty() {
        return Computed::degenerate("correlation undefined in every window");
    }

    let min = defined.iter().copied().fold(f64::INFINITY, f64::min);
    let max = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Computed::Ok(RollingCorrelationStats {
        current: values.last().copied().flatten(),
        mean: finite(mean(&defined)),
        std: finite(sample_std(&defined)),
        min: finite(min),
        max: finite(max),
    })
}
