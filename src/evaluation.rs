//! Monte Carlo sweep over the effect grid and result summarization
//!
//! One sweep estimates CUPED coefficients from a single pilot, then runs
//! `tests_per_effect` independent experiments at every effect-grid point.
//! Each experiment yields one [`OutcomeRow`] per test procedure, and
//! [`summarize_results`] folds those rows into empirical false-positive and
//! detection rates per procedure and effect.

use std::collections::BTreeMap;
use std::path::Path;

use rand::Rng;
use serde::Serialize;

use crate::config::SweepConfig;
use crate::constants::DEFAULT_ALPHA;
use crate::errors::{ExperimentError, Result};
use crate::experiment::{Experiment, TestKind, TestResult};
use crate::planning::{estimate_cuped_stats, required_sample_size, PlanningParams};
use crate::simulation::simulate_users;

/// Confusion-matrix class of one test outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    TruePositive,
    FalsePositive,
    TrueNegative,
    FalseNegative,
}

impl Outcome {
    /// Classify a reported p-value against the true simulated effect
    ///
    /// Classification always uses the conventional 0.05 cutoff on the
    /// reported p-value, for every procedure, so the sequential variants'
    /// stricter stopping rules show up as a rate difference rather than a
    /// labeling difference.
    pub fn classify(effect: f64, p_value: f64) -> Self {
        match (effect != 0.0, p_value < DEFAULT_ALPHA) {
            (true, true) => Outcome::TruePositive,
            (true, false) => Outcome::FalseNegative,
            (false, true) => Outcome::FalsePositive,
            (false, false) => Outcome::TrueNegative,
        }
    }
}

/// One test procedure's outcome in one simulated experiment
///
/// The four confusion-matrix columns are 0/1 indicators with exactly one
/// set per row, which keeps the CSV directly groupable into rates without
/// re-deriving the classification downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRow {
    pub rep: usize,
    pub test: TestKind,
    pub true_effect: f64,
    pub p_value: f64,
    pub significant: bool,
    pub sample_size: usize,
    pub true_pos: u8,
    pub false_pos: u8,
    pub true_neg: u8,
    pub false_neg: u8,
}

impl OutcomeRow {
    fn from_result(rep: usize, true_effect: f64, result: &TestResult) -> Self {
        let outcome = Outcome::classify(true_effect, result.p_value);
        Self {
            rep,
            test: result.test,
            true_effect,
            p_value: result.p_value,
            significant: result.significant,
            sample_size: result.sample_size,
            true_pos: u8::from(outcome == Outcome::TruePositive),
            false_pos: u8::from(outcome == Outcome::FalsePositive),
            true_neg: u8::from(outcome == Outcome::TrueNegative),
            false_neg: u8::from(outcome == Outcome::FalseNegative),
        }
    }
}

/// Run the full Monte Carlo sweep described by `config`
///
/// The pilot is simulated once and its CUPED coefficients are reused for
/// every experiment in the sweep, the same way a production team would
/// plan a quarter of experiments from one historical dataset.
pub fn evaluate_experiments(
    config: &SweepConfig,
    rng: &mut impl Rng,
) -> Result<Vec<OutcomeRow>> {
    let cuped = estimate_cuped_stats(
        config.pilot_population,
        config.periods_per_test,
        config.sigma,
        rng,
    )?;
    tracing::info!(
        corr_coef = cuped.corr_coef,
        theta = cuped.theta,
        "estimated CUPED coefficients from pilot"
    );

    let effects = config.effect_grid();
    let mut rows = Vec::with_capacity(
        effects.len() * config.tests_per_effect * TestKind::ALL.len(),
    );

    for &effect in &effects {
        tracing::info!(effect, reps = config.tests_per_effect, "evaluating effect");
        for rep in 0..config.tests_per_effect {
            let population = simulate_users(
                config.population_per_test,
                config.periods_per_test,
                config.sigma,
                effect,
                rng,
            )?;

            let params = PlanningParams {
                alpha: config.alpha,
                power: config.power,
                mde: config.mde,
                corr_coef: cuped.corr_coef,
                ..PlanningParams::default()
            };
            let sizes = required_sample_size(&population.pooled_pre_totals(), &params)?
                .with_cuped_padding(config.cuped_ss_adj);

            let results = Experiment::new(&population, sizes, cuped)?.run(rng)?;
            for result in results.iter() {
                rows.push(OutcomeRow::from_result(rep, effect, result));
            }
            tracing::debug!(effect, rep, "experiment complete");
        }
    }

    Ok(rows)
}

/// Aggregate rates for one test procedure at one effect size
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub test: TestKind,
    pub true_effect: f64,
    /// Empirical false-positive rate, fp / (fp + tn)
    pub alpha: f64,
    /// Empirical detection rate, tp / (tp + fn)
    pub power: f64,
    pub avg_sample_size: f64,
    pub runs: usize,
}

/// Fold outcome rows into per-(test, effect) rates
///
/// Rows are grouped on the effect rounded to three decimals, matching the
/// grid resolution, so floating-point noise cannot split a group. Rates
/// whose denominator is empty report as zero.
pub fn summarize_results(rows: &[OutcomeRow]) -> Vec<SummaryRow> {
    #[derive(Default)]
    struct Tally {
        tp: usize,
        fp: usize,
        tn: usize,
        fneg: usize,
        sample_total: usize,
        runs: usize,
    }

    let mut groups: BTreeMap<(TestKind, i64), (f64, Tally)> = BTreeMap::new();
    for row in rows {
        let key = (row.test, (row.true_effect * 1000.0).round() as i64);
        let (_, tally) = groups
            .entry(key)
            .or_insert((row.true_effect, Tally::default()));
        tally.tp += usize::from(row.true_pos);
        tally.fp += usize::from(row.false_pos);
        tally.tn += usize::from(row.true_neg);
        tally.fneg += usize::from(row.false_neg);
        tally.sample_total += row.sample_size;
        tally.runs += 1;
    }

    groups
        .into_iter()
        .map(|((test, _), (true_effect, tally))| SummaryRow {
            test,
            true_effect,
            alpha: rate(tally.fp, tally.fp + tally.tn),
            power: rate(tally.tp, tally.tp + tally.fneg),
            avg_sample_size: tally.sample_total as f64 / tally.runs as f64,
            runs: tally.runs,
        })
        .collect()
}

fn rate(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// Serialize rows to a CSV file with a header row
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let wrap = |source: csv::Error| ExperimentError::Output {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(wrap)?;
    for row in rows {
        writer.serialize(row).map_err(wrap)?;
    }
    writer.flush().map_err(|e| wrap(e.into()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "wrote results");
    Ok(())
}
