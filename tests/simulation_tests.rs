//! Integration tests for session simulation and sample-size planning
//!
//! These exercise the library surface end to end with seeded RNGs, using
//! scaled-down populations so the statistical assertions stay fast while
//! leaving wide tolerances around the expected rates.

use expsim::rand::rngs::StdRng;
use expsim::rand::SeedableRng;
use expsim::planning::PlanningParams;
use expsim::{estimate_cuped_stats, required_sample_size, simulate_users};

const PERIODS: usize = 4;
const SIGMA: f64 = 0.2;

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

#[test]
fn test_population_shapes_are_consistent() {
    let mut rng = StdRng::seed_from_u64(11);
    let pop = simulate_users(200, PERIODS, SIGMA, 0.0, &mut rng).unwrap();

    assert_eq!(pop.users_per_arm(), 100);
    assert_eq!(pop.n_periods(), PERIODS);
    for matrix in [
        &pop.pre_control,
        &pop.post_control,
        &pop.pre_treatment,
        &pop.post_treatment,
    ] {
        assert_eq!(matrix.rows(), 100);
        assert_eq!(matrix.cols(), PERIODS);
    }
    assert_eq!(pop.pooled_pre_totals().len(), 200);
}

#[test]
fn test_odd_population_is_rejected() {
    let mut rng = StdRng::seed_from_u64(11);
    assert!(simulate_users(201, PERIODS, SIGMA, 0.0, &mut rng).is_err());
}

#[test]
fn test_same_seed_reproduces_population() {
    let mut a = StdRng::seed_from_u64(77);
    let mut b = StdRng::seed_from_u64(77);
    let pop_a = simulate_users(100, PERIODS, SIGMA, 0.01, &mut a).unwrap();
    let pop_b = simulate_users(100, PERIODS, SIGMA, 0.01, &mut b).unwrap();
    assert_eq!(pop_a, pop_b);
}

#[test]
fn test_treatment_effect_lifts_only_post_window() {
    // A 30% lift on a few thousand users is far outside sampling noise
    let mut rng = StdRng::seed_from_u64(3);
    let pop = simulate_users(4000, PERIODS, SIGMA, 0.3, &mut rng).unwrap();

    let pre_c = mean(&pop.pre_control.row_totals());
    let pre_t = mean(&pop.pre_treatment.row_totals());
    let post_c = mean(&pop.post_control.row_totals());
    let post_t = mean(&pop.post_treatment.row_totals());

    assert!(
        post_t > post_c * 1.1,
        "treatment post mean {post_t} not lifted over control {post_c}"
    );
    assert!(
        (pre_t - pre_c).abs() < pre_c * 0.15,
        "pre-window means should match: control {pre_c}, treatment {pre_t}"
    );
}

#[test]
fn test_pilot_covariate_is_informative() {
    let mut rng = StdRng::seed_from_u64(19);
    let cuped = estimate_cuped_stats(2000, PERIODS, SIGMA, &mut rng).unwrap();

    // Pre and post totals share the user's base rate, so the pilot must
    // find a solidly positive correlation
    assert!(
        cuped.corr_coef > 0.3,
        "pilot correlation too weak: {}",
        cuped.corr_coef
    );
    assert!(cuped.theta > 0.0);
}

#[test]
fn test_planning_orderings_hold_across_mde_grid() {
    let mut rng = StdRng::seed_from_u64(23);
    let pop = simulate_users(2000, PERIODS, SIGMA, 0.0, &mut rng).unwrap();
    let totals = pop.pooled_pre_totals();

    for mde in [0.02, 0.05, 0.1, 0.2] {
        let params = PlanningParams {
            mde,
            corr_coef: 0.6,
            ..PlanningParams::default()
        };
        let sizes = required_sample_size(&totals, &params).unwrap();

        // The sequential design pays for its interim looks with a stricter
        // final alpha, and CUPED discounts by the explained variance
        assert!(sizes.seq_test >= sizes.t_test, "mde={mde}: {sizes:?}");
        assert!(sizes.t_test_cuped <= sizes.t_test, "mde={mde}: {sizes:?}");
        assert!(sizes.seq_test_cuped <= sizes.seq_test, "mde={mde}: {sizes:?}");
    }
}

#[test]
fn test_planning_mde_shrinks_requirements() {
    let mut rng = StdRng::seed_from_u64(29);
    let pop = simulate_users(2000, PERIODS, SIGMA, 0.0, &mut rng).unwrap();
    let totals = pop.pooled_pre_totals();

    let small = required_sample_size(
        &totals,
        &PlanningParams {
            mde: 0.02,
            ..PlanningParams::default()
        },
    )
    .unwrap();
    let large = required_sample_size(
        &totals,
        &PlanningParams {
            mde: 0.2,
            ..PlanningParams::default()
        },
    )
    .unwrap();

    assert!(large.t_test < small.t_test);
    // A tenfold MDE increase divides the requirement by roughly a hundred
    assert!(large.t_test <= small.t_test / 50);
}
