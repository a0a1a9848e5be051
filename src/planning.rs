//! Pre-experiment planning: CUPED coefficients and required sample sizes
//!
//! The planner runs before any experiment exists. A zero-effect pilot
//! simulation characterizes how strongly each user's pre-period activity
//! predicts their post-period activity (the CUPED correlation and theta),
//! and the classic two-sample mean-difference formula converts a pilot
//! population's totals into per-arm required sample sizes for each of the
//! four test variants.

use rand::Rng;

use crate::constants::{DEFAULT_ALPHA, DEFAULT_MDE, DEFAULT_POWER, SEQ_FINAL_ALPHA};
use crate::errors::{ExperimentError, Result};
use crate::simulation::simulate_users;
use crate::stats::{
    mean, normal_quantile, pearson_corr, sample_covariance, sample_variance,
};

/// CUPED adjustment coefficients estimated once from a pilot simulation
///
/// `corr_coef` is the Pearson correlation between a user's pre-period and
/// post-period session totals; `theta` is the regression slope of post on
/// pre (cov / var), the multiplier on the centered covariate. Both are
/// estimated from held-out pilot data and held fixed for the life of an
/// experiment — re-estimating theta per look from the data under test would
/// introduce look-ahead bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CupedCoefficients {
    pub corr_coef: f64,
    pub theta: f64,
}

/// Estimate CUPED coefficients from a zero-effect pilot population
///
/// Simulates `pilot_n` users over `n_periods` pre and post periods with no
/// treatment effect, sums each user's windows, and measures how much of the
/// post-period variance the pre-period covariate explains.
pub fn estimate_cuped_stats(
    pilot_n: usize,
    n_periods: usize,
    sigma: f64,
    rng: &mut impl Rng,
) -> Result<CupedCoefficients> {
    let pilot = simulate_users(pilot_n, n_periods, sigma, 0.0, rng)?;
    let pre = pilot.pooled_pre_totals();
    let post = pilot.pooled_post_totals();

    let corr_coef = pearson_corr(&pre, &post).ok_or_else(|| {
        ExperimentError::DegenerateStatistics(
            "pilot session totals have zero variance".to_string(),
        )
    })?;
    let pre_var = sample_variance(&pre);
    let theta = sample_covariance(&pre, &post) / pre_var;

    Ok(CupedCoefficients { corr_coef, theta })
}

/// Inputs to [`required_sample_size`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanningParams {
    /// Two-sided false-positive rate for the fixed-sample tests
    pub alpha: f64,
    /// Target power (chance of detecting a real effect of size `mde`)
    pub power: f64,
    /// Minimum detectable effect as a relative difference from the mean
    pub mde: f64,
    /// Pilot-estimated CUPED correlation; 0 disables the CUPED discount
    pub corr_coef: f64,
    /// Final-look alpha of the sequential design (stricter than `alpha`)
    pub seq_final_alpha: f64,
}

impl Default for PlanningParams {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            power: DEFAULT_POWER,
            mde: DEFAULT_MDE,
            corr_coef: 0.0,
            seq_final_alpha: SEQ_FINAL_ALPHA,
        }
    }
}

/// Per-arm required sample sizes for the four test variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredSampleSizes {
    pub t_test: usize,
    pub t_test_cuped: usize,
    pub seq_test: usize,
    pub seq_test_cuped: usize,
}

impl RequiredSampleSizes {
    /// Largest requirement across all four variants
    pub fn largest(&self) -> usize {
        self.t_test
            .max(self.t_test_cuped)
            .max(self.seq_test)
            .max(self.seq_test_cuped)
    }

    /// Pad the CUPED sizes by a relative safety margin
    ///
    /// The CUPED discount assumes the pilot correlation transfers exactly to
    /// the experiment's own cohort; the padding hedges that transfer.
    pub fn with_cuped_padding(mut self, adjustment: f64) -> Self {
        self.t_test_cuped = pad(self.t_test_cuped, adjustment);
        self.seq_test_cuped = pad(self.seq_test_cuped, adjustment);
        self
    }
}

fn pad(n: usize, adjustment: f64) -> usize {
    (n as f64 * (1.0 + adjustment)).round() as usize
}

/// Per-arm sample sizes from a pilot population's per-user session totals
///
/// Classic two-sample mean-difference planning:
/// `n = 2 * (z_{1-alpha/2} + z_power)^2 * sigma^2 / (mde * mu)^2`
/// with `mu` and `sigma` taken empirically from `population_totals`. The
/// sequential variant substitutes the stricter final-look alpha, and the
/// CUPED variants apply the `(1 - rho^2)` variance-reduction factor. All
/// results are rounded to the nearest integer.
pub fn required_sample_size(
    population_totals: &[f64],
    params: &PlanningParams,
) -> Result<RequiredSampleSizes> {
    if population_totals.len() < 2 {
        return Err(ExperimentError::DegenerateStatistics(
            "population totals need at least two users".to_string(),
        ));
    }
    if !(params.mde > 0.0 && params.mde.is_finite()) {
        return Err(ExperimentError::invalid("mde", "must be positive"));
    }

    let mu = mean(population_totals);
    if mu == 0.0 {
        return Err(ExperimentError::DegenerateStatistics(
            "population mean is zero; a relative MDE is undefined".to_string(),
        ));
    }
    let var = sample_variance(population_totals);

    let z_alpha = normal_quantile(1.0 - params.alpha / 2.0)?;
    let z_seq = normal_quantile(1.0 - params.seq_final_alpha / 2.0)?;
    let z_power = normal_quantile(params.power)?;

    let denom = (params.mde * mu).powi(2);
    let t_test_n = 2.0 * (z_alpha + z_power).powi(2) * var / denom;
    let seq_test_n = 2.0 * (z_seq + z_power).powi(2) * var / denom;

    let cuped_factor = 1.0 - params.corr_coef.powi(2);

    Ok(RequiredSampleSizes {
        t_test: t_test_n.round() as usize,
        t_test_cuped: (t_test_n * cuped_factor).round() as usize,
        seq_test: seq_test_n.round() as usize,
        seq_test_cuped: (seq_test_n * cuped_factor).round() as usize,
    })
}
