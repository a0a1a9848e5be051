//! Experiment pipeline: cohort drawing, staggered entry, and significance
//! decisions for all four test variants
//!
//! The pipeline is a linear typestate chain. Each stage consumes the
//! previous one and returns the next, so an experiment cannot reach the
//! decision step with entries unassigned or totals unaccumulated, and no
//! stage can run twice:
//!
//! ```text
//! Experiment::new -> assign_cohorts -> assign_entries -> accumulate -> decide
//! ```
//!
//! `Experiment::run` walks the whole chain for callers that do not need to
//! inspect intermediate stages.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cohort::{
    accumulate, assign_entry_periods, draw_cohort, AccumulatedCohort, CohortMember,
    DrawnCohort,
};
use crate::constants::{DEFAULT_ALPHA, NUM_LOOKS, SEQ_LOOK_ALPHAS};
use crate::errors::{ExperimentError, Result};
use crate::planning::{CupedCoefficients, RequiredSampleSizes};
use crate::simulation::SimulatedPopulation;
use crate::stats::{mean, round_p, students_t_test};

/// The four evaluated test procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestKind {
    #[serde(rename = "ttest")]
    TTest,
    #[serde(rename = "ttest_cuped")]
    TTestCuped,
    #[serde(rename = "seq")]
    Seq,
    #[serde(rename = "seq_cuped")]
    SeqCuped,
}

impl TestKind {
    pub const ALL: [TestKind; 4] = [
        TestKind::TTest,
        TestKind::TTestCuped,
        TestKind::Seq,
        TestKind::SeqCuped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::TTest => "ttest",
            TestKind::TTestCuped => "ttest_cuped",
            TestKind::Seq => "seq",
            TestKind::SeqCuped => "seq_cuped",
        }
    }

    fn uses_cuped(&self) -> bool {
        matches!(self, TestKind::TTestCuped | TestKind::SeqCuped)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one test procedure within one experiment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub test: TestKind,
    /// Users across both arms contributing to the deciding comparison
    pub sample_size: usize,
    /// Two-sided p-value at the deciding look, rounded to three decimals
    pub p_value: f64,
    pub significant: bool,
}

/// Per-variant storage, one slot for each test procedure
#[derive(Debug, Clone)]
struct VariantSet<T> {
    t_test: T,
    t_test_cuped: T,
    seq: T,
    seq_cuped: T,
}

impl<T> VariantSet<T> {
    fn map<U>(self, mut f: impl FnMut(TestKind, T) -> U) -> VariantSet<U> {
        VariantSet {
            t_test: f(TestKind::TTest, self.t_test),
            t_test_cuped: f(TestKind::TTestCuped, self.t_test_cuped),
            seq: f(TestKind::Seq, self.seq),
            seq_cuped: f(TestKind::SeqCuped, self.seq_cuped),
        }
    }
}

/// One test procedure's control and treatment cohorts
#[derive(Debug, Clone)]
struct ArmPair<T> {
    control: T,
    treatment: T,
}

/// Entry stage: configured experiment, nothing drawn yet
#[derive(Debug)]
pub struct Experiment<'a> {
    population: &'a SimulatedPopulation,
    sizes: RequiredSampleSizes,
    cuped: CupedCoefficients,
}

impl<'a> Experiment<'a> {
    /// Configure an experiment over a simulated population
    ///
    /// Fails when the population cannot supply the largest per-arm cohort
    /// any procedure requires, or when its post window does not line up
    /// with the number of interim looks.
    pub fn new(
        population: &'a SimulatedPopulation,
        sizes: RequiredSampleSizes,
        cuped: CupedCoefficients,
    ) -> Result<Self> {
        if population.n_periods() != NUM_LOOKS {
            return Err(ExperimentError::invalid(
                "n_periods",
                format!(
                    "population has {} periods, expected {NUM_LOOKS}",
                    population.n_periods()
                ),
            ));
        }
        if population.users_per_arm() < sizes.largest() {
            return Err(ExperimentError::InsufficientPopulation {
                available: population.users_per_arm(),
                required: sizes.largest(),
            });
        }
        Ok(Self {
            population,
            sizes,
            cuped,
        })
    }

    /// Draw each procedure's control and treatment cohorts
    ///
    /// Fixed and sequential t-test cohorts carry no covariate rows; the
    /// CUPED variants pull matching pre-period rows for the same users.
    pub fn assign_cohorts(self, rng: &mut impl Rng) -> Result<CohortStage> {
        let pop = self.population;
        let mut draw = |kind: TestKind, n: usize| -> Result<ArmPair<DrawnCohort>> {
            let pre_c = kind.uses_cuped().then_some(&pop.pre_control);
            let pre_t = kind.uses_cuped().then_some(&pop.pre_treatment);
            Ok(ArmPair {
                control: draw_cohort(&pop.post_control, pre_c, n, rng)?,
                treatment: draw_cohort(&pop.post_treatment, pre_t, n, rng)?,
            })
        };

        let cohorts = VariantSet {
            t_test: draw(TestKind::TTest, self.sizes.t_test)?,
            t_test_cuped: draw(TestKind::TTestCuped, self.sizes.t_test_cuped)?,
            seq: draw(TestKind::Seq, self.sizes.seq_test)?,
            seq_cuped: draw(TestKind::SeqCuped, self.sizes.seq_test_cuped)?,
        };

        Ok(CohortStage {
            theta: self.cuped.theta,
            cohorts,
        })
    }

    /// Run the full pipeline in one call
    pub fn run(self, rng: &mut impl Rng) -> Result<ExperimentResults> {
        Ok(self
            .assign_cohorts(rng)?
            .assign_entries(rng)
            .accumulate()
            .decide())
    }
}

/// Cohorts drawn, entries not yet assigned
#[derive(Debug)]
pub struct CohortStage {
    theta: f64,
    cohorts: VariantSet<ArmPair<DrawnCohort>>,
}

impl CohortStage {
    /// Assign balanced staggered entry periods to every cohort independently
    pub fn assign_entries(self, rng: &mut impl Rng) -> EntryStage {
        let cohorts = self.cohorts.map(|_, pair| ArmPair {
            control: {
                let entries = assign_entry_periods(pair.control.len(), rng);
                (pair.control, entries)
            },
            treatment: {
                let entries = assign_entry_periods(pair.treatment.len(), rng);
                (pair.treatment, entries)
            },
        });
        EntryStage {
            theta: self.theta,
            cohorts,
        }
    }
}

/// Entries assigned, totals not yet accumulated
#[derive(Debug)]
pub struct EntryStage {
    theta: f64,
    cohorts: VariantSet<ArmPair<(DrawnCohort, Vec<u8>)>>,
}

impl EntryStage {
    /// Turn raw per-period counts into cumulative per-look totals
    pub fn accumulate(self) -> AccumulatedStage {
        let cohorts = self.cohorts.map(|_, pair| ArmPair {
            control: accumulate(&pair.control.0, &pair.control.1),
            treatment: accumulate(&pair.treatment.0, &pair.treatment.1),
        });
        AccumulatedStage {
            theta: self.theta,
            cohorts,
        }
    }
}

/// Totals accumulated, ready for significance decisions
#[derive(Debug)]
pub struct AccumulatedStage {
    theta: f64,
    cohorts: VariantSet<ArmPair<AccumulatedCohort>>,
}

impl AccumulatedStage {
    /// Decide every test procedure and collect the outcomes
    pub fn decide(self) -> ExperimentResults {
        let theta = self.theta;
        let mut results = Vec::with_capacity(TestKind::ALL.len());
        let decided = self.cohorts.map(|kind, pair| match kind {
            TestKind::TTest | TestKind::TTestCuped => {
                decide_fixed(kind, &pair.control, &pair.treatment, theta)
            }
            TestKind::Seq | TestKind::SeqCuped => {
                decide_sequential(kind, &pair.control, &pair.treatment, theta)
            }
        });
        results.push(decided.t_test);
        results.push(decided.t_test_cuped);
        results.push(decided.seq);
        results.push(decided.seq_cuped);
        ExperimentResults { results }
    }
}

/// Final per-look outcome values for one arm's members at a given look
///
/// For CUPED procedures the covariate mean must be pooled across both arms
/// before either arm is adjusted, so adjustment happens after both arms'
/// raw values are gathered.
fn look_values(members: &[&CohortMember], look: usize) -> (Vec<f64>, Vec<f64>) {
    let post = members.iter().map(|m| m.look_totals[look - 1]).collect();
    let cov = members
        .iter()
        .map(|m| {
            m.covariate_totals
                .map(|c| c[look - 1])
                .unwrap_or_default()
        })
        .collect();
    (post, cov)
}

fn cuped_adjust(post: &[f64], cov: &[f64], theta: f64, pooled_cov_mean: f64) -> Vec<f64> {
    post.iter()
        .zip(cov)
        .map(|(&y, &x)| y - theta * (x - pooled_cov_mean))
        .collect()
}

fn decide_fixed(
    kind: TestKind,
    control: &AccumulatedCohort,
    treatment: &AccumulatedCohort,
    theta: f64,
) -> TestResult {
    let c_refs: Vec<&CohortMember> = control.members.iter().collect();
    let t_refs: Vec<&CohortMember> = treatment.members.iter().collect();
    let (c_post, c_cov) = look_values(&c_refs, NUM_LOOKS);
    let (t_post, t_cov) = look_values(&t_refs, NUM_LOOKS);

    let outcome = if kind.uses_cuped() {
        let pooled: Vec<f64> = c_cov.iter().chain(&t_cov).copied().collect();
        let cov_mean = mean(&pooled);
        students_t_test(
            &cuped_adjust(&c_post, &c_cov, theta, cov_mean),
            &cuped_adjust(&t_post, &t_cov, theta, cov_mean),
        )
    } else {
        students_t_test(&c_post, &t_post)
    };

    TestResult {
        test: kind,
        sample_size: c_post.len() + t_post.len(),
        p_value: round_p(outcome.p_value),
        significant: outcome.p_value < DEFAULT_ALPHA,
    }
}

/// Group-sequential decision with O'Brien-Fleming-style thresholds
///
/// At each look only members whose entry period has arrived contribute.
/// The test stops significant the first time the look p-value crosses the
/// look's spending threshold; reaching the final look without crossing it
/// ends the experiment not significant at the full sample.
fn decide_sequential(
    kind: TestKind,
    control: &AccumulatedCohort,
    treatment: &AccumulatedCohort,
    theta: f64,
) -> TestResult {
    let mut last = None;
    for look in 1..=NUM_LOOKS {
        let c_refs: Vec<&CohortMember> = control
            .members
            .iter()
            .filter(|m| usize::from(m.entry_period) <= look)
            .collect();
        let t_refs: Vec<&CohortMember> = treatment
            .members
            .iter()
            .filter(|m| usize::from(m.entry_period) <= look)
            .collect();

        let (c_post, c_cov) = look_values(&c_refs, look);
        let (t_post, t_cov) = look_values(&t_refs, look);

        let outcome = if kind.uses_cuped() {
            let pooled: Vec<f64> = c_cov.iter().chain(&t_cov).copied().collect();
            let cov_mean = mean(&pooled);
            students_t_test(
                &cuped_adjust(&c_post, &c_cov, theta, cov_mean),
                &cuped_adjust(&t_post, &t_cov, theta, cov_mean),
            )
        } else {
            students_t_test(&c_post, &t_post)
        };

        let result = TestResult {
            test: kind,
            sample_size: c_post.len() + t_post.len(),
            p_value: round_p(outcome.p_value),
            significant: outcome.p_value < SEQ_LOOK_ALPHAS[look - 1],
        };
        if result.significant {
            return result;
        }
        last = Some(result);
    }
    last.expect("NUM_LOOKS is nonzero")
}

/// Outcomes of all four test procedures, in a fixed order
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentResults {
    results: Vec<TestResult>,
}

impl ExperimentResults {
    pub fn get(&self, kind: TestKind) -> &TestResult {
        self.results
            .iter()
            .find(|r| r.test == kind)
            .expect("all test kinds are always decided")
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter()
    }
}
