//! Shared statistical primitives
//!
//! Small numeric helpers used by the planner and the decision engine:
//! sample moments, Pearson correlation, standard-normal quantiles, and a
//! two-sample pooled-variance Student t-test.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::constants::P_VALUE_DECIMALS;
use crate::errors::{ExperimentError, Result};

/// Outcome of a two-sample t-test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTestOutcome {
    /// t statistic (control minus treatment over the pooled standard error)
    pub statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
}

impl TTestOutcome {
    /// Neutral outcome used when the test is degenerate (too few samples or
    /// zero pooled variance): no evidence against the null.
    const NEUTRAL: TTestOutcome = TTestOutcome {
        statistic: 0.0,
        p_value: 1.0,
    };
}

/// Arithmetic mean; 0 for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}

/// Unbiased sample variance (ddof = 1); 0 for fewer than two samples
pub fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Unbiased sample standard deviation
pub fn sample_std(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

/// Unbiased sample covariance (ddof = 1); 0 for fewer than two pairs
pub fn sample_covariance(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    if x.len() < 2 {
        return 0.0;
    }
    let mx = mean(x);
    let my = mean(y);
    x.iter()
        .zip(y)
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (x.len() - 1) as f64
}

/// Pearson correlation coefficient, clamped to [-1, 1]
///
/// Returns `None` when either series has zero variance, which the caller
/// must treat as "no usable covariate signal".
pub fn pearson_corr(x: &[f64], y: &[f64]) -> Option<f64> {
    let sx = sample_std(x);
    let sy = sample_std(y);
    if sx == 0.0 || sy == 0.0 {
        return None;
    }
    Some((sample_covariance(x, y) / (sx * sy)).clamp(-1.0, 1.0))
}

/// Standard-normal quantile, for z_{1-alpha/2} and z_power lookups
pub fn normal_quantile(p: f64) -> Result<f64> {
    if !(0.0..1.0).contains(&p) || p == 0.0 {
        return Err(ExperimentError::invalid(
            "quantile",
            format!("probability {p} must lie strictly inside (0, 1)"),
        ));
    }
    let standard = Normal::new(0.0, 1.0)
        .map_err(|e| ExperimentError::Distribution(e.to_string()))?;
    Ok(standard.inverse_cdf(p))
}

/// Two-sample Student t-test with pooled variance
///
/// Matches the classic equal-variance formulation: the statistic is the mean
/// difference over the pooled standard error with n1 + n2 - 2 degrees of
/// freedom, and the p-value is two-sided. Degenerate inputs (fewer than two
/// samples on either side, or zero pooled variance) yield the neutral
/// outcome (t = 0, p = 1) rather than an error, since they carry no
/// evidence either way.
pub fn students_t_test(a: &[f64], b: &[f64]) -> TTestOutcome {
    let n1 = a.len();
    let n2 = b.len();
    if n1 < 2 || n2 < 2 {
        return TTestOutcome::NEUTRAL;
    }

    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let v1 = sample_variance(a);
    let v2 = sample_variance(b);
    let df = n1f + n2f - 2.0;

    let pooled_var = ((n1f - 1.0) * v1 + (n2f - 1.0) * v2) / df;
    let se = (pooled_var * (1.0 / n1f + 1.0 / n2f)).sqrt();
    if se == 0.0 {
        return TTestOutcome::NEUTRAL;
    }

    let statistic = (mean(a) - mean(b)) / se;
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => {
            let p_value = 2.0 * (1.0 - dist.cdf(statistic.abs()));
            TTestOutcome { statistic, p_value }
        }
        Err(_) => TTestOutcome::NEUTRAL,
    }
}

/// Round a p-value to the reporting precision
pub fn round_p(p: f64) -> f64 {
    let scale = 10f64.powi(P_VALUE_DECIMALS as i32);
    (p * scale).round() / scale
}
