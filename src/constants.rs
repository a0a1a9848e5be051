//! Documented constants for the evaluation harness
//!
//! This module contains all tunable parameters with justification for their
//! values. Centralizing constants prevents magic numbers and makes tuning
//! easier.

// =============================================================================
// SEQUENTIAL DESIGN
// O'Brien-Fleming style alpha spending over a fixed number of interim looks.
// =============================================================================

/// Number of sequential analysis looks per experiment
///
/// Each look corresponds to one post-experiment time period, so an experiment
/// accumulates data over exactly this many periods. Cohort entry periods are
/// also drawn from 1..=NUM_LOOKS.
///
/// Justification:
/// - 4 looks is the standard weekly cadence for a month-long experiment
/// - Matches the published O'Brien-Fleming boundary table used below
pub const NUM_LOOKS: usize = 4;

/// Per-look significance thresholds (O'Brien-Fleming style)
///
/// At look k the sequential test stops early when p < SEQ_LOOK_ALPHAS[k-1].
///
/// Justification:
/// - Conservative early, liberal late: an early stop requires overwhelming
///   evidence, preserving the overall alpha budget
/// - The cumulative boundary schedule keeps the total false-positive rate
///   of the 4-look procedure at approximately 5%
pub const SEQ_LOOK_ALPHAS: [f64; NUM_LOOKS] = [0.001, 0.0039, 0.0185, 0.045];

/// Final-look alpha, also used when planning sequential sample sizes
///
/// The sequential test's worst case is rejecting only at the last look, so
/// its sample size is planned against this stricter threshold rather than
/// the nominal 0.05. A smaller final alpha means a larger required n.
pub const SEQ_FINAL_ALPHA: f64 = SEQ_LOOK_ALPHAS[NUM_LOOKS - 1];

// =============================================================================
// FIXED-SAMPLE DESIGN
// =============================================================================

/// Nominal two-sided significance level for the fixed-sample t-tests
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Default target power for sample-size planning
pub const DEFAULT_POWER: f64 = 0.8;

/// Default minimum detectable effect (relative difference from the mean)
pub const DEFAULT_MDE: f64 = 0.02;

// =============================================================================
// SESSION GENERATOR
// Per-user weekly session counts: Poisson observations around a latent rate
// that follows a bounded log-domain random walk.
// =============================================================================

/// Shape parameter of the Gamma prior on a user's initial session rate
///
/// Together with [`GAMMA_SCALE`] this gives a mean weekly rate of 3 sessions
/// with substantial heterogeneity across users (variance 3), matching the
/// heavy-tailed engagement profile of a consumer product.
pub const GAMMA_SHAPE: f64 = 3.0;

/// Scale parameter of the Gamma prior on a user's initial session rate
pub const GAMMA_SCALE: f64 = 1.0;

/// Default per-step volatility of the latent-rate walk (log domain)
///
/// At sigma = 0.2, roughly 68% of single steps stay within 82%..122% of the
/// period-start rate and 95% within 67%..149%, before reflection.
pub const DEFAULT_SIGMA: f64 = 0.2;

/// Half-width of the reflecting band around the period-start log rate
///
/// ln 2, so the latent rate is reflected back whenever it would leave
/// [50%, 200%] of its value at the start of the pre or post period. The band
/// is re-anchored at the pre/post boundary.
pub const RATE_BAND_LOG_HALF_WIDTH: f64 = std::f64::consts::LN_2;

/// Largest single log-domain step the walk may take
///
/// Caps a step at roughly the full width of the reflecting band so one draw
/// cannot jump from one boundary far past the other.
pub const MAX_WALK_STEP: f64 = 1.4;

// =============================================================================
// P-VALUE REPORTING
// =============================================================================

/// Decimal places kept when recording a p-value in a test result
///
/// Significance is always decided on the raw p-value; rounding applies only
/// to the stored figure.
pub const P_VALUE_DECIMALS: u32 = 3;
