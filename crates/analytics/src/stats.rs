//! Descriptive statistics and rolling-window primitives.
//!
//! Everything in this module is a pure function over `f64` slices. Rolling
//! outputs are backward-looking: position `t` covers `[t - window + 1, t]`,
//! so the first `window - 1` positions are `None`.

/// Arithmetic mean. Returns NaN for an empty slice; callers guard length.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance with the given delta degrees of freedom.
///
/// `ddof = 1` matches the sample variance (pandas default), `ddof = 0` the
/// population variance (numpy default). Returns NaN when `len <= ddof`.
#[must_use]
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    ss / (values.len() - ddof) as f64
}

/// Sample standard deviation (ddof = 1).
#[must_use]
pub fn sample_std(values: &[f64]) -> f64 {
    variance(values, 1).sqrt()
}

/// Population standard deviation (ddof = 0).
#[must_use]
pub fn population_std(values: &[f64]) -> f64 {
    variance(values, 0).sqrt()
}

/// Backward-looking rolling mean.
#[must_use]
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, mean)
}

/// Backward-looking rolling sample standard deviation.
///
/// A window of 1 has no sample deviation and yields `None` everywhere.
#[must_use]
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, sample_std)
}

/// Applies `f` over each full backward window. Each window is recomputed
/// from scratch rather than maintained as running sums, which keeps the
/// result free of accumulated cancellation error on long series.
fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || window > values.len() {
        return out;
    }
    for t in (window - 1)..values.len() {
        let v = f(&values[t + 1 - window..=t]);
        out[t] = v.is_finite().then_some(v);
    }
    out
}

/// Pearson correlation coefficient between two equal-length series.
///
/// Returns 0.0 when either series is shorter than 2 points or has zero
/// variance, so the result is always finite.
#[must_use]
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }

    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator < f64::EPSILON {
        return 0.0;
    }

    covariance / denominator
}

/// Spearman rank correlation: Pearson correlation of the average ranks.
#[must_use]
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    pearson(&rank_average_ties(x), &rank_average_ties(y))
}

/// Assigns 1-based ranks, averaging ties (the convention Spearman needs).
#[must_use]
pub fn rank_average_ties(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Average the ranks i+1..=j+1 across the tie group.
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Two-sided p-value for a correlation coefficient.
///
/// Uses the transformation `t = r * sqrt(n-2) / sqrt(1 - r^2)`, which
/// follows a t-distribution with n-2 degrees of freedom, then a normal
/// approximation of the tail. Accurate for large samples and conservative
/// for small ones.
#[must_use]
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 {
        return 1.0;
    }

    let r_clamped = r.clamp(-0.9999, 0.9999); // Avoid division by zero
    let df = n as f64 - 2.0;
    let t_stat = r_clamped * (df / (1.0 - r_clamped * r_clamped)).sqrt();

    let p = 2.0 * (1.0 - standard_normal_cdf(t_stat.abs()));
    p.clamp(0.0, 1.0)
}

/// Standard normal CDF, Abramowitz & Stegun polynomial approximation.
#[must_use]
pub fn standard_normal_cdf(x: f64) -> f64 {
    if x < 0.0 {
        return 1.0 - standard_normal_cdf(-x);
    }

    let b1 = 0.319_381_530;
    let b2 = -0.356_563_782;
    let b3 = 1.781_477_937;
    let b4 = -1.821_255_978;
    let b5 = 1.330_274_429;
    let p = 0.231_641_9;

    let t = 1.0 / (1.0 + p * x);
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t3 * t;
    let t5 = t4 * t;

    let pdf = (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    1.0 - pdf * (b1 * t + b2 * t2 + b3 * t3 + b4 * t4 + b5 * t5)
}

/// Backward-looking rolling Pearson correlation between two series.
///
/// A window with zero variance on either side has no defined correlation
/// and yields `None` at that position.
#[must_use]
pub fn rolling_pearson(x: &[f64], y: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = x.len().min(y.len());
    let mut out = vec![None; n];
    if window < 2 || window > n {
        return out;
    }
    for t in (window - 1)..n {
        let wx = &x[t + 1 - window..=t];
        let wy = &y[t + 1 - window..=t];
        if variance(wx, 0) < f64::EPSILON || variance(wy, 0) < f64::EPSILON {
            continue;
        }
        let r = pearson(wx, wy);
        out[t] = r.is_finite().then_some(r);
    }
    out
}
