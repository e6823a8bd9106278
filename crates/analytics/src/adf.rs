//! Augmented Dickey-Fuller stationarity test.
//!
//! Constant-only regression with automatic lag-order selection by AIC, the
//! same configuration the reference pair-trading literature (and most
//! statistics packages) default to. P-values and finite-sample critical
//! values use the MacKinnon response-surface approximations.

use crate::ols::{fit_ols, OlsError};
use crate::stats::standard_normal_cdf;
use serde::{Deserialize, Serialize};

/// Critical values of the ADF distribution at conventional levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdfCriticalValues {
    #[serde(rename = "1%")]
    pub one_pct: f64,
    #[serde(rename = "5%")]
    pub five_pct: f64,
    #[serde(rename = "10%")]
    pub ten_pct: f64,
}

/// Outcome of an ADF test run.
#[derive(Debug, Clone)]
pub struct AdfResult {
    /// The tau test statistic.
    pub statistic: f64,
    /// MacKinnon approximate p-value.
    pub pvalue: f64,
    /// Lag order selected by AIC.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
    /// Finite-sample critical values at 1/5/10%.
    pub critical_values: AdfCriticalValues,
}

/// Reasons the test cannot produce a statistic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdfError {
    #[error("need at least {required} observations, got {actual}")]
    TooShort { required: usize, actual: usize },
    #[error("series is degenerate: {0}")]
    Degenerate(String),
}

/// Fewest raw observations the lag search can work with.
const MIN_OBSERVATIONS: usize = 8;

/// Runs the ADF test on `series`.
///
/// The test regresses the first difference on an intercept, the lagged
/// level, and `p` lagged differences, with `p` chosen by minimizing AIC
/// over `0..=maxlag` (Schwert's rule) on a common sample.
///
/// # Errors
/// Returns [`AdfError::TooShort`] when the series cannot support the
/// regression, and [`AdfError::Degenerate`] when it is constant or
/// otherwise rank deficient.
pub fn adf_test(series: &[f64]) -> Result<AdfResult, AdfError> {
    let n = series.len();
    if n < MIN_OBSERVATIONS {
        return Err(AdfError::TooShort {
            required: MIN_OBSERVATIONS,
            actual: n,
        });
    }

    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    let nd = diff.len();

    // Schwert's rule, bounded so the common autolag sample keeps more
    // observations than regressors.
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let hard_cap = (nd / 2).saturating_sub(2);
    let maxlag = schwert.min(hard_cap);

    // Candidate lags share the sample starting at `maxlag` so their AIC
    // values are comparable. Rank-deficient candidates (collinear lag
    // columns) are skipped rather than failing the whole test.
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=maxlag {
        let fit = match dickey_fuller_regression(series, &diff, maxlag, lag) {
            Ok(fit) => fit,
            Err(OlsError::RankDeficient { .. }) => continue,
            Err(e) => return Err(AdfError::Degenerate(e.to_string())),
        };

        let aic = akaike(fit.ssr, fit.nobs, lag + 2);
        if best.is_none_or(|(best_aic, _)| aic < best_aic) {
            best = Some((aic, lag));
        }
    }

    let (_, used_lag) = best.ok_or_else(|| {
        AdfError::Degenerate("every candidate regression is rank deficient (constant series?)".to_string())
    })?;

    // Refit at the chosen lag over the full usable sample.
    let fit = dickey_fuller_regression(series, &diff, used_lag, used_lag).map_err(|e| match e {
        OlsError::RankDeficient { .. } => AdfError::Degenerate(
            "regression matrix is rank deficient (constant series?)".to_string(),
        ),
        other => AdfError::Degenerate(other.to_string()),
    })?;

    let se = fit.std_errors[1];
    if !se.is_finite() || se <= 0.0 {
        return Err(AdfError::Degenerate(
            "zero standard error on the lagged level".to_string(),
        ));
    }
    let statistic = fit.coefficients[1] / se;
    if !statistic.is_finite() {
        return Err(AdfError::Degenerate("non-finite test statistic".to_string()));
    }

    Ok(AdfResult {
        statistic,
        pvalue: mackinnon_pvalue(statistic),
        used_lag,
        nobs: fit.nobs,
        critical_values: mackinnon_critical_values(fit.nobs),
    })
}

/// Fits `diff[t] = a + g*level[t] + b_1*diff[t-1] + .. + b_lag*diff[t-lag]`
/// over rows `start..`, where `level[t]` is the series value the difference
/// was taken from.
fn dickey_fuller_regression(
    series: &[f64],
    diff: &[f64],
    start: usize,
    lag: usize,
) -> Result<crate::ols::OlsFit, OlsError> {
    let nd = diff.len();
    let rows = nd - start;

    let y: Vec<f64> = diff[start..].to_vec();
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(lag + 2);
    columns.push(vec![1.0; rows]);
    columns.push(series[start..nd].to_vec());
    for i in 1..=lag {
        columns.push(diff[start - i..nd - i].to_vec());
    }

    fit_ols(&y, &columns)
}

/// Gaussian AIC from the residual sum of squares.
fn akaike(ssr: f64, nobs: usize, nparams: usize) -> f64 {
    let n = nobs as f64;
    let sigma2 = (ssr / n).max(f64::MIN_POSITIVE);
    let llf = -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + sigma2.ln() + 1.0);
    -2.0 * llf + 2.0 * nparams as f64
}

// MacKinnon (1994) approximate asymptotic p-value, constant-only case.
// The p-value is Phi(poly(tau)) with separate polynomials for the small-p
// and large-p regions.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALLP: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGEP: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

fn mackinnon_pvalue(tau: f64) -> f64 {
    if tau > TAU_MAX {
        return 1.0;
    }
    if tau < TAU_MIN {
        return 0.0;
    }
    let z = if tau <= TAU_STAR {
        polyval(&TAU_SMALLP, tau)
    } else {
        polyval(&TAU_LARGEP, tau)
    };
    standard_normal_cdf(z).clamp(0.0, 1.0)
}

/// Evaluates `c[0] + c[1] x + c[2] x^2 + ...`.
fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

// MacKinnon (2010) finite-sample response surface, constant-only case:
// crit = b0 + b1/n + b2/n^2 + b3/n^3.
const CRIT_1PCT: [f64; 4] = [-3.43035, -6.5393, -16.786, -79.433];
const CRIT_5PCT: [f64; 4] = [-2.86154, -2.8903, -4.234, -40.040];
const CRIT_10PCT: [f64; 4] = [-2.56677, -1.5384, -2.809, 0.0];

fn mackinnon_critical_values(nobs: usize) -> AdfCriticalValues {
    let surface = |b: &[f64; 4]| {
        let n = nobs as f64;
        b[0] + b[1] / n + b[2] / (n * n) + b[3] / (n * n * n)
    };
    AdfCriticalValues {
        one_pct: surface(&CRIT_1PCT),
        five_pct: surface(&CRIT_5PCT),
        ten_pct: surface(&CRIT_10PCT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    /// Deterministic pseudo-random walk via a simple LCG, so the test is
    /// reproducible without a rand dependency.
    fn pseudo_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                // Map the top bits to roughly [-0.5, 0.5)
                ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
            })
            .collect()
    }

    // ============================================
    // Stationary vs Non-Stationary Series
    // ============================================

    #[test]
    fn test_mean_reverting_series_rejects_unit_root() {
        // Strongly mean-reverting AR(1): x_t = 0.2 * x_{t-1} + e_t
        let noise = pseudo_noise(300, 42);
        let mut x = vec![0.0f64];
        for e in &noise {
            let prev = *x.last().unwrap();
            x.push(0.2 * prev + e);
        }

        let result = adf_test(&x).unwrap();

        assert!(
            result.statistic < result.critical_values.one_pct,
            "statistic {} not below 1% crit {}",
            result.statistic,
            result.critical_values.one_pct
        );
        assert!(result.pvalue < 0.01, "pvalue was {}", result.pvalue);
    }

    #[test]
    fn test_trending_series_fails_to_reject() {
        // A deterministic trend has no mean reversion toward a constant
        // level; the constant-only test must not reject the unit root.
        let noise = pseudo_noise(300, 7);
        let x: Vec<f64> = noise
            .iter()
            .enumerate()
            .map(|(i, e)| 0.1 * i as f64 + e)
            .collect();

        let result = adf_test(&x).unwrap();

        assert!(result.pvalue > 0.05, "pvalue was {}", result.pvalue);
    }

    #[test]
    fn test_oscillating_series_is_strongly_stationary() {
        // A noisy alternating sequence is the extreme of mean reversion
        let noise = pseudo_noise(120, 99);
        let x: Vec<f64> = noise
            .iter()
            .enumerate()
            .map(|(i, e)| if i % 2 == 0 { 1.0 + e * 0.1 } else { -1.0 + e * 0.1 })
            .collect();

        let result = adf_test(&x).unwrap();
        assert!(result.pvalue < 0.01);
    }

    // ============================================
    // Degenerate Inputs
    // ============================================

    #[test]
    fn test_constant_series_is_degenerate() {
        let x = vec![3.5; 100];
        let err = adf_test(&x).unwrap_err();
        assert!(matches!(err, AdfError::Degenerate(_)));
    }

    #[test]
    fn test_short_series_rejected() {
        let err = adf_test(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, AdfError::TooShort { .. }));
    }

    // ============================================
    // MacKinnon Approximation Reference Points
    // ============================================

    #[test]
    fn test_pvalue_at_critical_statistics() {
        // The approximation should return roughly the nominal level at the
        // asymptotic critical values.
        assert_close(mackinnon_pvalue(-3.43), 0.01, 0.003);
        assert_close(mackinnon_pvalue(-2.86), 0.05, 0.005);
        assert_close(mackinnon_pvalue(-2.57), 0.10, 0.01);
    }

    #[test]
    fn test_pvalue_is_monotone_in_tau() {
        let taus = [-6.0, -4.0, -3.0, -2.0, -1.0, 0.0, 1.0];
        let ps: Vec<f64> = taus.iter().map(|t| mackinnon_pvalue(*t)).collect();
        for pair in ps.windows(2) {
            assert!(pair[0] <= pair[1], "p-values not monotone: {ps:?}");
        }
    }

    #[test]
    fn test_pvalue_clamps_at_extremes() {
        assert_eq!(mackinnon_pvalue(-30.0), 0.0);
        assert_eq!(mackinnon_pvalue(5.0), 1.0);
    }

    #[test]
    fn test_critical_values_ordering() {
        let crits = mackinnon_critical_values(100);
        assert!(crits.one_pct < crits.five_pct);
        assert!(crits.five_pct < crits.ten_pct);
        // Near the textbook asymptotic values for n = 100
        assert_close(crits.one_pct, -3.50, 0.05);
        assert_close(crits.five_pct, -2.89, 0.05);
    }

    #[test]
    fn test_critical_values_tighten_with_sample_size() {
        let small = mackinnon_critical_values(25);
        let large = mackinnon_critical_values(500);
        assert!(small.one_pct < large.one_pct);
    }

    #[test]
    fn test_critical_values_serialize_with_percent_keys() {
        let crits = mackinnon_critical_values(100);
        let json = serde_json::to_value(crits).unwrap();
        assert!(json.get("1%").is_some());
        assert!(json.get("5%").is_some());
        assert!(json.get("10%").is_some());
    }
}
