//! expsim: a Monte Carlo harness for evaluating A/B testing procedures
//!
//! Simulates user session behavior as a mean-reverting random walk on a
//! latent Poisson rate, plans sample sizes from pilot data, and runs
//! head-to-head comparisons of four decision procedures:
//!
//! - fixed-horizon Student's t-test
//! - fixed-horizon t-test with CUPED variance reduction
//! - group-sequential test with O'Brien-Fleming-style alpha spending
//! - group-sequential test with CUPED variance reduction
//!
//! Sweeping a grid of true effect sizes yields empirical false-positive and
//! detection rates per procedure, which is the output a team needs when
//! deciding which testing methodology to standardize on.
//!
//! All randomness flows through caller-supplied [`rand::Rng`] handles, so a
//! seeded [`rand::rngs::StdRng`] reproduces an entire sweep bit for bit.

pub mod cohort;
pub mod config;
pub mod constants;
pub mod errors;
pub mod evaluation;
pub mod experiment;
pub mod planning;
pub mod simulation;
pub mod stats;

pub use config::SweepConfig;
pub use errors::{ExperimentError, Result};
pub use evaluation::{evaluate_experiments, summarize_results, OutcomeRow, SummaryRow};
pub use experiment::{Experiment, ExperimentResults, TestKind, TestResult};
pub use planning::{
    estimate_cuped_stats, required_sample_size, CupedCoefficients, PlanningParams,
    RequiredSampleSizes,
};
pub use simulation::{simulate_users, SessionMatrix, SimulatedPopulation};

// Re-exported so binaries and tests seed the exact generator the library
// was written against.
pub use rand;
