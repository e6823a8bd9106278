//! Ordinary least squares via Householder QR.
//!
//! The solve goes through an orthogonal factorization of the design matrix
//! rather than the normal equations, so conditioning is that of X itself
//! and near-collinear regressors are detected instead of silently producing
//! garbage coefficients. Dimensions here are tiny (a handful of regressors
//! over at most a few hundred rows), so no blocking or pivoting heuristics
//! beyond a rank tolerance are needed.

use crate::stats::{mean, population_std};

/// A fitted least-squares regression.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients, one per design column in input order.
    pub coefficients: Vec<f64>,
    /// Standard error of each coefficient.
    pub std_errors: Vec<f64>,
    /// Per-row residuals `y - X b`.
    pub residuals: Vec<f64>,
    /// Sum of squared residuals.
    pub ssr: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// Population standard deviation of the residuals.
    pub residual_std: f64,
    /// Number of observations.
    pub nobs: usize,
}

/// Reasons a least-squares fit cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OlsError {
    #[error("need more observations ({nobs}) than regressors ({k})")]
    TooFewObservations { nobs: usize, k: usize },
    #[error("design matrix is rank deficient at column {column}")]
    RankDeficient { column: usize },
    #[error("design matrix columns must all have {expected} rows")]
    RaggedColumns { expected: usize },
}

const RANK_TOL: f64 = 1e-10;

/// Fits `y = X b` by QR decomposition, where `columns` are the columns of X.
///
/// Include an all-ones column explicitly if an intercept is wanted.
///
/// # Errors
/// Fails when there are not strictly more rows than columns, when column
/// lengths disagree, or when X is numerically rank deficient (e.g. a
/// constant regressor alongside an intercept).
pub fn fit_ols(y: &[f64], columns: &[Vec<f64>]) -> Result<OlsFit, OlsError> {
    let n = y.len();
    let k = columns.len();

    if k == 0 || n <= k {
        return Err(OlsError::TooFewObservations { nobs: n, k });
    }
    if columns.iter().any(|c| c.len() != n) {
        return Err(OlsError::RaggedColumns { expected: n });
    }

    // Working copy, column-major. Householder reflections are applied in
    // place, leaving R in the upper triangle and Q' y in qty.
    let mut r: Vec<Vec<f64>> = columns.to_vec();
    let mut qty: Vec<f64> = y.to_vec();

    let col_scales: Vec<f64> = r
        .iter()
        .map(|c| {
            let norm = c.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        })
        .collect();

    for j in 0..k {
        let norm = r[j][j..n].iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm <= RANK_TOL * col_scales[j] {
            return Err(OlsError::RankDeficient { column: j });
        }

        let alpha = if r[j][j] >= 0.0 { -norm } else { norm };
        let mut v: Vec<f64> = r[j][j..n].to_vec();
        v[0] -= alpha;
        let vnorm2: f64 = v.iter().map(|x| x * x).sum();
        if vnorm2 <= RANK_TOL * RANK_TOL {
            return Err(OlsError::RankDeficient { column: j });
        }

        // Reflect the remaining columns and the target vector.
        for col in r.iter_mut().skip(j) {
            reflect(&v, vnorm2, &mut col[j..n]);
        }
        reflect(&v, vnorm2, &mut qty[j..n]);

        // Numerically the reflection already produced alpha at the pivot;
        // pin it exactly and clear the annihilated entries.
        r[j][j] = alpha;
        for i in (j + 1)..n {
            r[j][i] = 0.0;
        }
    }

    // Back-substitute R b = Q' y.
    let mut coefficients = vec![0.0; k];
    for j in (0..k).rev() {
        let mut acc = qty[j];
        for m in (j + 1)..k {
            acc -= r[m][j] * coefficients[m];
        }
        coefficients[j] = acc / r[j][j];
    }

    // Residuals from the original (unreflected) columns.
    let residuals: Vec<f64> = (0..n)
        .map(|i| {
            let fitted: f64 = (0..k).map(|j| columns[j][i] * coefficients[j]).sum();
            y[i] - fitted
        })
        .collect();

    let ssr: f64 = residuals.iter().map(|e| e * e).sum();
    let y_mean = mean(y);
    let ss_tot: f64 = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum();
    let r_squared = if ss_tot > f64::EPSILON {
        1.0 - ssr / ss_tot
    } else {
        0.0
    };

    // Var(b) = sigma^2 (X'X)^-1 = sigma^2 R^-1 R^-T, so each standard error
    // is sigma times the norm of a row of R^-1.
    let sigma2 = ssr / (n - k) as f64;
    let r_inv = invert_upper_triangular(&r, k);
    let std_errors: Vec<f64> = (0..k)
        .map(|j| {
            let row_norm2: f64 = (j..k).map(|m| r_inv[m][j] * r_inv[m][j]).sum();
            (sigma2 * row_norm2).sqrt()
        })
        .collect();

    Ok(OlsFit {
        coefficients,
        std_errors,
        residual_std: population_std(&residuals),
        residuals,
        ssr,
        r_squared,
        nobs: n,
    })
}

/// Applies the Householder reflection `(I - 2 v v' / |v|^2)` to `target`.
fn reflect(v: &[f64], vnorm2: f64, target: &mut [f64]) {
    let dot: f64 = v.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    let scale = 2.0 * dot / vnorm2;
    for (t, vi) in target.iter_mut().zip(v.iter()) {
        *t -= scale * vi;
    }
}

/// Inverts the leading k-by-k upper triangle of `r` (column-major) by
/// back substitution against the identity.
fn invert_upper_triangular(r: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut inv = vec![vec![0.0; k]; k];
    for col in 0..k {
        for j in (0..=col).rev() {
            let mut acc = if j == col { 1.0 } else { 0.0 };
            for m in (j + 1)..=col {
                acc -= r[m][j] * inv[col][m];
            }
            inv[col][j] = acc / r[j][j];
        }
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    fn with_intercept(x: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![1.0; x.len()], x.to_vec()]
    }

    // ============================================
    // Exact Recovery Tests
    // ============================================

    #[test]
    fn test_recovers_noiseless_line() {
        let x: Vec<f64> = (0..50).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 5.0 + 2.0 * v).collect();

        let fit = fit_ols(&y, &with_intercept(&x)).unwrap();

        assert_close(fit.coefficients[0], 5.0, 1e-9);
        assert_close(fit.coefficients[1], 2.0, 1e-9);
        assert_close(fit.r_squared, 1.0, 1e-12);
        assert!(fit.residual_std < 1e-9);
    }

    #[test]
    fn test_recovers_line_under_small_noise() {
        // Deterministic pseudo-noise, alternating and mean-free
        let x: Vec<f64> = (0..100).map(f64::from).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 5.0 + 2.0 * v + if i % 2 == 0 { 1e-4 } else { -1e-4 })
            .collect();

        let fit = fit_ols(&y, &with_intercept(&x)).unwrap();

        assert_close(fit.coefficients[0], 5.0, 1e-3);
        assert_close(fit.coefficients[1], 2.0, 1e-5);
        assert!(fit.r_squared > 0.999999);
    }

    #[test]
    fn test_multiple_regressors() {
        // y = 1 + 2*x1 - 3*x2
        let x1: Vec<f64> = (0..30).map(f64::from).collect();
        let x2: Vec<f64> = (0..30).map(|i| f64::from(i * i % 7)).collect();
        let y: Vec<f64> = x1
            .iter()
            .zip(x2.iter())
            .map(|(a, b)| 1.0 + 2.0 * a - 3.0 * b)
            .collect();

        let fit = fit_ols(&y, &[vec![1.0; 30], x1, x2]).unwrap();

        assert_close(fit.coefficients[0], 1.0, 1e-8);
        assert_close(fit.coefficients[1], 2.0, 1e-9);
        assert_close(fit.coefficients[2], -3.0, 1e-9);
    }

    // ============================================
    // Conditioning / Degeneracy Tests
    // ============================================

    #[test]
    fn test_constant_regressor_with_intercept_is_rank_deficient() {
        let x = vec![4.0; 10];
        let y: Vec<f64> = (0..10).map(f64::from).collect();

        let err = fit_ols(&y, &with_intercept(&x)).unwrap_err();
        assert!(matches!(err, OlsError::RankDeficient { .. }));
    }

    #[test]
    fn test_duplicate_columns_are_rank_deficient() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let err = fit_ols(&x, &[x.clone(), x.clone()]).unwrap_err();
        assert!(matches!(err, OlsError::RankDeficient { .. }));
    }

    #[test]
    fn test_large_offset_regressor_stays_accurate() {
        // Centered solve through QR keeps precision despite the huge offset
        let x: Vec<f64> = (0..100).map(|i| 1.0e8 + f64::from(i)).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v - 7.0).collect();

        let fit = fit_ols(&y, &with_intercept(&x)).unwrap();

        assert_close(fit.coefficients[1], 3.0, 1e-5);
    }

    #[test]
    fn test_too_few_observations() {
        let err = fit_ols(&[1.0, 2.0], &[vec![1.0, 1.0], vec![0.0, 1.0]]).unwrap_err();
        assert!(matches!(err, OlsError::TooFewObservations { .. }));
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let err = fit_ols(&[1.0, 2.0, 3.0], &[vec![1.0, 1.0, 1.0], vec![0.0, 1.0]]).unwrap_err();
        assert!(matches!(err, OlsError::RaggedColumns { expected: 3 }));
    }

    // ============================================
    // Inference Tests
    // ============================================

    #[test]
    fn test_std_errors_shrink_with_sample_size() {
        let make = |n: usize| {
            let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let y: Vec<f64> = x
                .iter()
                .enumerate()
                .map(|(i, v)| 2.0 * v + if i % 2 == 0 { 0.5 } else { -0.5 })
                .collect();
            fit_ols(&y, &with_intercept(&x)).unwrap()
        };

        let small = make(20);
        let large = make(200);
        assert!(large.std_errors[1] < small.std_errors[1]);
    }

    #[test]
    fn test_residuals_sum_to_zero_with_intercept() {
        let x: Vec<f64> = (0..40).map(f64::from).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 1.5 * v + (i % 5) as f64)
            .collect();

        let fit = fit_ols(&y, &with_intercept(&x)).unwrap();
        let resid_sum: f64 = fit.residuals.iter().sum();
        assert!(resid_sum.abs() < 1e-7, "residual sum {resid_sum}");
    }
}
