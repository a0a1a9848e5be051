//! Stochastic user-session generator
//!
//! Produces per-user weekly session counts for control and treatment arms
//! across pre- and post-experiment windows. Each user owns a latent Poisson
//! rate drawn from a Gamma prior and evolved by a mean-reverting log-domain
//! random walk with reflecting boundaries, which yields realistic
//! autocorrelated, bounded-variance count series instead of i.i.d. noise.
//!
//! The treatment effect enters exactly once: at the pre/post boundary the
//! treatment arm's carried-over rate is scaled by (1 + effect). The control
//! arm never sees the effect.

use rand::Rng;
use rand_distr::{Distribution, Gamma, Normal, Poisson};

use crate::constants::{
    GAMMA_SCALE, GAMMA_SHAPE, MAX_WALK_STEP, RATE_BAND_LOG_HALF_WIDTH,
};
use crate::errors::{ExperimentError, Result};

/// Row-major grid of non-negative session counts: rows = users, cols = periods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMatrix {
    rows: usize,
    cols: usize,
    data: Vec<u32>,
}

impl SessionMatrix {
    /// All-zero matrix of the given shape
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.row(row)[col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: u32) {
        let cols = self.cols;
        self.data[row * cols + col] = value;
    }

    /// One user's per-period counts
    pub fn row(&self, row: usize) -> &[u32] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Sum of one user's counts across all periods
    pub fn row_total(&self, row: usize) -> u64 {
        self.row(row).iter().map(|&c| u64::from(c)).sum()
    }

    /// Per-user totals across all periods, as floats for downstream stats
    pub fn row_totals(&self) -> Vec<f64> {
        (0..self.rows).map(|r| self.row_total(r) as f64).collect()
    }
}

/// The four matrices one simulation run produces
///
/// Each matrix has shape (n_users / 2, n_periods); users occupy the same row
/// index in their arm's pre and post matrices, which is what makes the CUPED
/// covariate linkage a plain row lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPopulation {
    pub pre_control: SessionMatrix,
    pub post_control: SessionMatrix,
    pub pre_treatment: SessionMatrix,
    pub post_treatment: SessionMatrix,
}

impl SimulatedPopulation {
    /// Users in each arm (half the simulated population)
    pub fn users_per_arm(&self) -> usize {
        self.post_control.rows()
    }

    /// Periods per window
    pub fn n_periods(&self) -> usize {
        self.post_control.cols()
    }

    /// Pre-period totals of every user in both arms, control rows first
    ///
    /// This is the planner's input: the effect never touches pre-period data,
    /// so pooling both arms is safe.
    pub fn pooled_pre_totals(&self) -> Vec<f64> {
        let mut totals = self.pre_control.row_totals();
        totals.extend(self.pre_treatment.row_totals());
        totals
    }

    /// Post-period totals of every user in both arms, control rows first
    pub fn pooled_post_totals(&self) -> Vec<f64> {
        let mut totals = self.post_control.row_totals();
        totals.extend(self.post_treatment.row_totals());
        totals
    }
}

/// Latent-rate walk for one window (pre or post), anchored at its start rate
///
/// State lives in log space. Each step adds a clipped normal increment and
/// reflects the result back into the band around the window-start log rate;
/// reflection mirrors the overshoot distance instead of clamping, so the
/// walk does not pile up on the boundary. exp() of the state is always a
/// strictly positive Poisson rate.
struct RateWalk {
    log_rate: f64,
    lo: f64,
    hi: f64,
    step: Normal<f64>,
}

impl RateWalk {
    fn anchored(rate: f64, step: Normal<f64>) -> Self {
        let log_rate = rate.ln();
        Self {
            log_rate,
            lo: log_rate - RATE_BAND_LOG_HALF_WIDTH,
            hi: log_rate + RATE_BAND_LOG_HALF_WIDTH,
            step,
        }
    }

    /// Advance one period and return the new rate
    fn advance(&mut self, rng: &mut impl Rng) -> f64 {
        let delta = self.step.sample(rng).clamp(-MAX_WALK_STEP, MAX_WALK_STEP);
        self.log_rate += delta;
        if self.log_rate < self.lo {
            self.log_rate = self.lo + (self.lo - self.log_rate);
        } else if self.log_rate > self.hi {
            self.log_rate = self.hi - (self.log_rate - self.hi);
        }
        self.log_rate.exp()
    }
}

/// Simulate per-user weekly sessions for both arms across pre and post windows
///
/// `n_users` is the whole population; it must be even and is split exactly
/// half control, half treatment. `sigma` is the walk volatility, `effect`
/// the relative treatment effect applied at the pre/post boundary.
///
/// Session counts are raw Poisson draws from the latent rate; the rate is
/// strictly positive at every step by construction.
pub fn simulate_users(
    n_users: usize,
    n_periods: usize,
    sigma: f64,
    effect: f64,
    rng: &mut impl Rng,
) -> Result<SimulatedPopulation> {
    if n_users == 0 {
        return Err(ExperimentError::invalid("n_users", "must be at least 2"));
    }
    if n_users % 2 != 0 {
        return Err(ExperimentError::OddPopulation(n_users));
    }
    if n_periods == 0 {
        return Err(ExperimentError::invalid("n_periods", "must be at least 1"));
    }
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(ExperimentError::invalid(
            "sigma",
            format!("{sigma} must be positive and finite"),
        ));
    }
    if !(effect > -1.0 && effect.is_finite()) {
        return Err(ExperimentError::invalid(
            "effect",
            format!("{effect} must be finite and greater than -1"),
        ));
    }

    // Zero-drift in level space: E[exp(step)] = 1 when mu = -sigma^2 / 2.
    let drift = -0.5 * sigma * sigma;
    let step = Normal::new(drift, sigma)
        .map_err(|e| ExperimentError::Distribution(e.to_string()))?;
    let prior = Gamma::new(GAMMA_SHAPE, GAMMA_SCALE)
        .map_err(|e| ExperimentError::Distribution(e.to_string()))?;

    let half = n_users / 2;
    let mut pre_control = SessionMatrix::zeros(half, n_periods);
    let mut post_control = SessionMatrix::zeros(half, n_periods);
    let mut pre_treatment = SessionMatrix::zeros(half, n_periods);
    let mut post_treatment = SessionMatrix::zeros(half, n_periods);

    let arms: [(&mut SessionMatrix, &mut SessionMatrix, bool); 2] = [
        (&mut pre_control, &mut post_control, false),
        (&mut pre_treatment, &mut post_treatment, true),
    ];

    for (pre, post, treated) in arms {
        for user in 0..half {
            let initial = draw_positive_rate(&prior, rng);

            let mut rate = fill_window(pre, user, initial, step, rng)?;
            if treated {
                rate *= 1.0 + effect;
            }
            fill_window(post, user, rate, step, rng)?;
        }
    }

    Ok(SimulatedPopulation {
        pre_control,
        post_control,
        pre_treatment,
        post_treatment,
    })
}

/// Draw an initial rate from the Gamma prior, rejecting non-positive values
///
/// A Gamma draw of exactly zero is astronomically rare but would poison the
/// log-domain walk, so it is redrawn.
fn draw_positive_rate(prior: &Gamma<f64>, rng: &mut impl Rng) -> f64 {
    loop {
        let rate = prior.sample(rng);
        if rate > 0.0 {
            return rate;
        }
    }
}

/// Run one window of the walk, filling a matrix row; returns the final rate
fn fill_window(
    matrix: &mut SessionMatrix,
    user: usize,
    start_rate: f64,
    step: Normal<f64>,
    rng: &mut impl Rng,
) -> Result<f64> {
    let mut walk = RateWalk::anchored(start_rate, step);
    let mut rate = start_rate;
    for period in 0..matrix.cols() {
        rate = walk.advance(rng);
        let draws = Poisson::new(rate)
            .map_err(|e| ExperimentError::Distribution(e.to_string()))?;
        let sessions: f64 = draws.sample(rng);
        matrix.set(user, period, sessions as u32);
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_SIGMA;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_matrix_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let pop = simulate_users(100, 4, DEFAULT_SIGMA, 0.0, &mut rng).unwrap();

        for m in [
            &pop.pre_control,
            &pop.post_control,
            &pop.pre_treatment,
            &pop.post_treatment,
        ] {
            assert_eq!(m.rows(), 50);
            assert_eq!(m.cols(), 4);
        }
        assert_eq!(pop.users_per_arm(), 50);
        assert_eq!(pop.n_periods(), 4);
    }

    #[test]
    fn test_odd_population_rejected() {
        let mut rng = StdRng::seed_from_u64(7);
        let err = simulate_users(101, 4, DEFAULT_SIGMA, 0.0, &mut rng).unwrap_err();
        assert!(matches!(err, ExperimentError::OddPopulation(101)));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(simulate_users(10, 0, DEFAULT_SIGMA, 0.0, &mut rng).is_err());
        assert!(simulate_users(10, 4, 0.0, 0.0, &mut rng).is_err());
        assert!(simulate_users(10, 4, -0.2, 0.0, &mut rng).is_err());
        assert!(simulate_users(10, 4, DEFAULT_SIGMA, -1.0, &mut rng).is_err());
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = simulate_users(200, 4, DEFAULT_SIGMA, 0.01, &mut rng_a).unwrap();
        let b = simulate_users(200, 4, DEFAULT_SIGMA, 0.01, &mut rng_b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reflection_keeps_rate_in_band() {
        let mut rng = StdRng::seed_from_u64(11);
        let step = Normal::new(0.0, 0.5).unwrap();
        let mut walk = RateWalk::anchored(3.0, step);
        // The band is [lo, hi] in log space. A clipped step can, at worst,
        // reflect a hair past the far boundary, so allow that slack.
        let slack = MAX_WALK_STEP - 2.0 * RATE_BAND_LOG_HALF_WIDTH;
        for _ in 0..10_000 {
            let rate = walk.advance(&mut rng);
            assert!(rate > 0.0);
            assert!(walk.log_rate >= walk.lo - slack - 1e-9);
            assert!(walk.log_rate <= walk.hi + slack + 1e-9);
        }
    }

    #[test]
    fn test_effect_shifts_treatment_only() {
        // A large positive effect should raise treatment post-period totals
        // well above control's while leaving pre-periods comparable.
        let mut rng = StdRng::seed_from_u64(3);
        let pop = simulate_users(2000, 4, DEFAULT_SIGMA, 0.5, &mut rng).unwrap();

        let pre_c = crate::stats::mean(&pop.pre_control.row_totals());
        let pre_t = crate::stats::mean(&pop.pre_treatment.row_totals());
        let post_c = crate::stats::mean(&pop.post_control.row_totals());
        let post_t = crate::stats::mean(&pop.post_treatment.row_totals());

        assert!((pre_c - pre_t).abs() / pre_c < 0.15);
        assert!(post_t > post_c * 1.2, "post_t={post_t} post_c={post_c}");
    }
}
