//! Sweep configuration with environment overrides
//!
//! Every knob has a production default and can be overridden through an
//! `EXPSIM_`-prefixed environment variable. Unparseable values are logged
//! and ignored rather than aborting the sweep.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{DEFAULT_ALPHA, DEFAULT_POWER, DEFAULT_SIGMA, NUM_LOOKS};
use crate::errors::{ExperimentError, Result};

/// Full configuration for one evaluation sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    /// Total simulated users per evaluation run, split evenly across arms
    pub population_per_test: usize,
    /// Periods in each of the pre and post windows
    pub periods_per_test: usize,
    /// Volatility of the per-user session-rate walk
    pub sigma: f64,
    /// Minimum detectable effect used for sample-size planning
    pub mde: f64,
    /// Two-sided false-positive rate for planning and fixed tests
    pub alpha: f64,
    /// Target power for sample-size planning
    pub power: f64,
    /// Fractional padding applied to CUPED sample sizes
    pub cuped_ss_adj: f64,
    /// Total users in the pilot used to estimate CUPED coefficients
    pub pilot_population: usize,
    /// Monte Carlo repetitions per effect-grid point
    pub tests_per_effect: usize,
    /// Effect grid, inclusive start to exclusive end
    pub effect_start: f64,
    pub effect_end: f64,
    pub effect_step: f64,
    /// Fixed RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
    /// Directory for result CSVs
    pub output_dir: PathBuf,
    /// Whether to write result CSVs at all
    pub write_output: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            population_per_test: 100_000,
            periods_per_test: NUM_LOOKS,
            sigma: DEFAULT_SIGMA,
            mde: 0.015,
            alpha: DEFAULT_ALPHA,
            power: DEFAULT_POWER,
            cuped_ss_adj: 0.1,
            pilot_population: 10_000,
            tests_per_effect: 100,
            effect_start: -0.03,
            effect_end: 0.031,
            effect_step: 0.005,
            seed: None,
            output_dir: PathBuf::from("data"),
            write_output: true,
        }
    }
}

impl SweepConfig {
    /// Build a configuration from defaults plus `EXPSIM_*` overrides
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            population_per_test: env_parse("EXPSIM_POPULATION_PER_TEST", defaults.population_per_test),
            periods_per_test: env_parse("EXPSIM_PERIODS_PER_TEST", defaults.periods_per_test),
            sigma: env_parse("EXPSIM_SIGMA", defaults.sigma),
            mde: env_parse("EXPSIM_MDE", defaults.mde),
            alpha: env_parse("EXPSIM_ALPHA", defaults.alpha),
            power: env_parse("EXPSIM_POWER", defaults.power),
            cuped_ss_adj: env_parse("EXPSIM_CUPED_SS_ADJ", defaults.cuped_ss_adj),
            pilot_population: env_parse("EXPSIM_PILOT_POPULATION", defaults.pilot_population),
            tests_per_effect: env_parse("EXPSIM_TESTS_PER_EFFECT", defaults.tests_per_effect),
            effect_start: env_parse("EXPSIM_EFFECT_START", defaults.effect_start),
            effect_end: env_parse("EXPSIM_EFFECT_END", defaults.effect_end),
            effect_step: env_parse("EXPSIM_EFFECT_STEP", defaults.effect_step),
            seed: env::var("EXPSIM_SEED")
                .ok()
                .and_then(|raw| match raw.parse() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!(var = "EXPSIM_SEED", value = %raw, "ignoring unparseable value");
                        None
                    }
                }),
            output_dir: env::var("EXPSIM_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            write_output: env_parse("EXPSIM_WRITE_OUTPUT", defaults.write_output),
        }
    }

    /// Reject configurations the pipeline cannot run
    pub fn validate(&self) -> Result<()> {
        if self.population_per_test == 0 || self.population_per_test % 2 != 0 {
            return Err(ExperimentError::invalid(
                "population_per_test",
                format!("must be positive and even, got {}", self.population_per_test),
            ));
        }
        if self.pilot_population == 0 || self.pilot_population % 2 != 0 {
            return Err(ExperimentError::invalid(
                "pilot_population",
                format!("must be positive and even, got {}", self.pilot_population),
            ));
        }
        if self.periods_per_test != NUM_LOOKS {
            return Err(ExperimentError::invalid(
                "periods_per_test",
                format!("must equal {NUM_LOOKS}, got {}", self.periods_per_test),
            ));
        }
        if !(self.sigma > 0.0 && self.sigma.is_finite()) {
            return Err(ExperimentError::invalid(
                "sigma",
                format!("must be positive and finite, got {}", self.sigma),
            ));
        }
        if !(self.mde > 0.0) {
            return Err(ExperimentError::invalid(
                "mde",
                format!("must be positive, got {}", self.mde),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ExperimentError::invalid(
                "alpha",
                format!("must lie in (0, 1), got {}", self.alpha),
            ));
        }
        if !(self.power > 0.0 && self.power < 1.0) {
            return Err(ExperimentError::invalid(
                "power",
                format!("must lie in (0, 1), got {}", self.power),
            ));
        }
        if self.cuped_ss_adj < 0.0 {
            return Err(ExperimentError::invalid(
                "cuped_ss_adj",
                format!("must be non-negative, got {}", self.cuped_ss_adj),
            ));
        }
        if self.tests_per_effect == 0 {
            return Err(ExperimentError::invalid(
                "tests_per_effect",
                "must be at least 1".to_string(),
            ));
        }
        if !(self.effect_step > 0.0) {
            return Err(ExperimentError::invalid(
                "effect_step",
                format!("must be positive, got {}", self.effect_step),
            ));
        }
        if self.effect_end <= self.effect_start {
            return Err(ExperimentError::invalid(
                "effect_end",
                format!(
                    "must exceed effect_start ({} <= {})",
                    self.effect_end, self.effect_start
                ),
            ));
        }
        Ok(())
    }

    /// The effect grid this sweep evaluates, rounded to three decimals
    pub fn effect_grid(&self) -> Vec<f64> {
        let mut effects = Vec::new();
        let mut step = 0usize;
        loop {
            let effect = self.effect_start + step as f64 * self.effect_step;
            if effect >= self.effect_end {
                break;
            }
            effects.push((effect * 1000.0).round() / 1000.0);
            step += 1;
        }
        effects
    }
}

fn env_parse<T: FromStr + Copy>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var, value = %raw, "ignoring unparseable value");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        SweepConfig::default().validate().unwrap();
    }

    #[test]
    fn test_odd_population_rejected() {
        let cfg = SweepConfig {
            population_per_test: 99_999,
            ..SweepConfig::default()
        };
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ExperimentError::InvalidParameter { name: "population_per_test", .. }
        ));
    }

    #[test]
    fn test_wrong_period_count_rejected() {
        let cfg = SweepConfig {
            periods_per_test: 5,
            ..SweepConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_degenerate_bounds_rejected() {
        for cfg in [
            SweepConfig { sigma: 0.0, ..SweepConfig::default() },
            SweepConfig { mde: -0.01, ..SweepConfig::default() },
            SweepConfig { alpha: 1.0, ..SweepConfig::default() },
            SweepConfig { power: 0.0, ..SweepConfig::default() },
            SweepConfig { effect_step: 0.0, ..SweepConfig::default() },
            SweepConfig { effect_end: -1.0, ..SweepConfig::default() },
            SweepConfig { tests_per_effect: 0, ..SweepConfig::default() },
        ] {
            assert!(cfg.validate().is_err(), "{cfg:?} should not validate");
        }
    }

    #[test]
    fn test_default_effect_grid() {
        let grid = SweepConfig::default().effect_grid();
        assert_eq!(grid.len(), 13);
        assert_eq!(grid[0], -0.03);
        assert_eq!(*grid.last().unwrap(), 0.03);
        assert!(grid.contains(&0.0));
    }

    #[test]
    fn test_effect_grid_rounding() {
        let cfg = SweepConfig {
            effect_start: -0.001,
            effect_end: 0.0015,
            effect_step: 0.001,
            ..SweepConfig::default()
        };
        assert_eq!(cfg.effect_grid(), vec![-0.001, 0.0, 0.001]);
    }
}
