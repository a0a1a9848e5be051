//! Cohort sampling, staggered entry assignment, and period accumulation
//!
//! A cohort is a without-replacement subsample of one arm's post-period
//! matrix, optionally paired with the same users' pre-period (covariate)
//! rows. Every member gets a staggered entry period in 1..=NUM_LOOKS, and
//! accumulation turns raw per-period counts into the cumulative totals each
//! sequential look observes. Linking post rows to covariate rows by shared
//! draw index keeps the pairing one-to-one by construction.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::constants::NUM_LOOKS;
use crate::errors::{ExperimentError, Result};
use crate::simulation::SessionMatrix;

/// A without-replacement sample of users from one arm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawnCohort {
    /// Stable user identifiers (row indices into the source matrix)
    pub user_ids: Vec<usize>,
    /// Post-period counts, one row per sampled user
    pub rows: Vec<Vec<u32>>,
    /// Matching pre-period rows for CUPED variants, same order as `rows`
    pub covariate_rows: Option<Vec<Vec<u32>>>,
}

impl DrawnCohort {
    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }
}

/// Draw `n` users without replacement from one arm's post-period matrix
///
/// When `covariate` is given, the same users' pre-period rows are captured
/// alongside. Asking for more users than the matrix holds is a fatal
/// precondition failure.
pub fn draw_cohort(
    post: &SessionMatrix,
    covariate: Option<&SessionMatrix>,
    n: usize,
    rng: &mut impl Rng,
) -> Result<DrawnCohort> {
    if n > post.rows() {
        return Err(ExperimentError::InsufficientPopulation {
            available: post.rows(),
            required: n,
        });
    }

    let user_ids = rand::seq::index::sample(rng, post.rows(), n).into_vec();
    let rows = user_ids.iter().map(|&u| post.row(u).to_vec()).collect();
    let covariate_rows = covariate
        .map(|pre| user_ids.iter().map(|&u| pre.row(u).to_vec()).collect());

    Ok(DrawnCohort {
        user_ids,
        rows,
        covariate_rows,
    })
}

/// Balanced staggered entry periods for a cohort of `n` users
///
/// Lays down `n / NUM_LOOKS` full cycles of [1, 2, 3, 4], appends the
/// remainder as 1..=(n mod NUM_LOOKS), then shuffles uniformly. Counts per
/// period therefore differ by at most one.
pub fn assign_entry_periods(n: usize, rng: &mut impl Rng) -> Vec<u8> {
    let mut entries = Vec::with_capacity(n);
    for _ in 0..n / NUM_LOOKS {
        entries.extend(1..=NUM_LOOKS as u8);
    }
    entries.extend(1..=(n % NUM_LOOKS) as u8);
    entries.shuffle(rng);
    entries
}

/// Cumulative sessions observed at look `look` for a user entering at
/// `entry`, reading periods forward from the entry period
///
/// A user who has not entered yet (entry > look) has observed nothing.
pub fn forward_total(periods: &[u32], entry: u8, look: usize) -> u64 {
    let entry = entry as usize;
    if entry > look {
        return 0;
    }
    periods[entry - 1..look].iter().map(|&c| u64::from(c)).sum()
}

/// Covariate sessions available at look `look` for a user entering at
/// `entry`, reading periods backward from the experiment start
///
/// Covariate history is measured in reverse: a user contributing k periods
/// of experiment data has k periods of immediately-preceding history, i.e.
/// the last k columns of their pre-period row.
pub fn reverse_total(periods: &[u32], entry: u8, look: usize) -> u64 {
    let entry = entry as usize;
    if entry > look {
        return 0;
    }
    let count = look + 1 - entry;
    periods[periods.len() - count..]
        .iter()
        .map(|&c| u64::from(c))
        .sum()
}

/// One cohort member with all accumulation done: a fixed-width record
/// replacing positional column lookups
#[derive(Debug, Clone, PartialEq)]
pub struct CohortMember {
    pub user_id: usize,
    pub entry_period: u8,
    /// Cumulative post-period sessions at each look
    pub look_totals: [f64; NUM_LOOKS],
    /// Cumulative covariate sessions at each look, for CUPED cohorts
    pub covariate_totals: Option<[f64; NUM_LOOKS]>,
}

/// A cohort with entries assigned and per-look totals computed
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedCohort {
    pub members: Vec<CohortMember>,
}

/// Compute per-look cumulative totals for every cohort member
///
/// `entries` must be the entry periods assigned to this cohort, in member
/// order. Post rows accumulate forward from the entry period; covariate
/// rows accumulate in reverse.
pub fn accumulate(cohort: &DrawnCohort, entries: &[u8]) -> AccumulatedCohort {
    debug_assert_eq!(cohort.len(), entries.len());

    let members = cohort
        .user_ids
        .iter()
        .zip(&cohort.rows)
        .zip(entries)
        .enumerate()
        .map(|(idx, ((&user_id, row), &entry_period))| {
            let mut look_totals = [0.0; NUM_LOOKS];
            for look in 1..=NUM_LOOKS {
                look_totals[look - 1] = forward_total(row, entry_period, look) as f64;
            }

            let covariate_totals = cohort.covariate_rows.as_ref().map(|covs| {
                let mut totals = [0.0; NUM_LOOKS];
                for look in 1..=NUM_LOOKS {
                    totals[look - 1] =
                        reverse_total(&covs[idx], entry_period, look) as f64;
                }
                totals
            });

            CohortMember {
                user_id,
                entry_period,
                look_totals,
                covariate_totals,
            }
        })
        .collect();

    AccumulatedCohort { members }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matrix_from_rows(rows: &[[u32; 4]]) -> SessionMatrix {
        let mut m = SessionMatrix::zeros(rows.len(), 4);
        for (r, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                m.set(r, c, v);
            }
        }
        m
    }

    #[test]
    fn test_draw_without_replacement() {
        let post = matrix_from_rows(&[[1; 4], [2; 4], [3; 4], [4; 4], [5; 4], [6; 4]]);
        let mut rng = StdRng::seed_from_u64(5);
        let cohort = draw_cohort(&post, None, 4, &mut rng).unwrap();

        assert_eq!(cohort.len(), 4);
        let mut ids = cohort.user_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4, "duplicate users drawn");
        for (&id, row) in cohort.user_ids.iter().zip(&cohort.rows) {
            assert_eq!(row, &post.row(id).to_vec());
        }
    }

    #[test]
    fn test_draw_links_covariates_by_user() {
        let post = matrix_from_rows(&[[10; 4], [20; 4], [30; 4], [40; 4]]);
        let pre = matrix_from_rows(&[[1; 4], [2; 4], [3; 4], [4; 4]]);
        let mut rng = StdRng::seed_from_u64(5);
        let cohort = draw_cohort(&post, Some(&pre), 3, &mut rng).unwrap();

        let covs = cohort.covariate_rows.as_ref().unwrap();
        for (i, &id) in cohort.user_ids.iter().enumerate() {
            assert_eq!(covs[i], pre.row(id).to_vec());
        }
    }

    #[test]
    fn test_draw_oversized_request_fails() {
        let post = matrix_from_rows(&[[1; 4], [2; 4]]);
        let mut rng = StdRng::seed_from_u64(5);
        let err = draw_cohort(&post, None, 3, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::InsufficientPopulation {
                available: 2,
                required: 3
            }
        ));
    }

    #[test]
    fn test_entry_periods_balanced() {
        let mut rng = StdRng::seed_from_u64(9);
        for n in [4, 7, 10, 23, 100] {
            let entries = assign_entry_periods(n, &mut rng);
            assert_eq!(entries.len(), n);

            let mut counts = [0usize; NUM_LOOKS];
            for &e in &entries {
                assert!((1..=NUM_LOOKS as u8).contains(&e));
                counts[e as usize - 1] += 1;
            }
            let max = counts.iter().max().unwrap();
            let min = counts.iter().min().unwrap();
            assert!(max - min <= 1, "n={n}: counts {counts:?}");
        }
    }

    #[test]
    fn test_entry_remainder_goes_to_early_periods() {
        let mut rng = StdRng::seed_from_u64(9);
        let entries = assign_entry_periods(10, &mut rng);
        let mut counts = [0usize; NUM_LOOKS];
        for &e in &entries {
            counts[e as usize - 1] += 1;
        }
        // 10 = 2 full cycles + remainder [1, 2]
        assert_eq!(counts, [3, 3, 2, 2]);
    }

    #[test]
    fn test_forward_total_respects_entry() {
        let periods = [5u32, 7, 11, 13];
        // Entering at period 3: nothing at looks 1-2, then period 3 onward
        assert_eq!(forward_total(&periods, 3, 1), 0);
        assert_eq!(forward_total(&periods, 3, 2), 0);
        assert_eq!(forward_total(&periods, 3, 3), 11);
        assert_eq!(forward_total(&periods, 3, 4), 24);
        // Entering at period 1 sees everything
        assert_eq!(forward_total(&periods, 1, 4), 36);
        assert_eq!(forward_total(&periods, 1, 1), 5);
    }

    #[test]
    fn test_reverse_total_reads_recent_history_first() {
        let periods = [5u32, 7, 11, 13];
        // One observed period means one period of history: the most recent
        assert_eq!(reverse_total(&periods, 3, 3), 13);
        assert_eq!(reverse_total(&periods, 3, 4), 24);
        assert_eq!(reverse_total(&periods, 1, 4), 36);
        assert_eq!(reverse_total(&periods, 1, 1), 13);
        assert_eq!(reverse_total(&periods, 4, 2), 0);
    }

    #[test]
    fn test_accumulate_builds_member_records() {
        let post = matrix_from_rows(&[[5, 7, 11, 13], [1, 2, 3, 4]]);
        let pre = matrix_from_rows(&[[2, 4, 6, 8], [9, 9, 9, 9]]);
        let cohort = DrawnCohort {
            user_ids: vec![0, 1],
            rows: vec![post.row(0).to_vec(), post.row(1).to_vec()],
            covariate_rows: Some(vec![pre.row(0).to_vec(), pre.row(1).to_vec()]),
        };
        let acc = accumulate(&cohort, &[3, 1]);

        let first = &acc.members[0];
        assert_eq!(first.entry_period, 3);
        assert_eq!(first.look_totals, [0.0, 0.0, 11.0, 24.0]);
        assert_eq!(first.covariate_totals.unwrap(), [0.0, 0.0, 8.0, 14.0]);

        let second = &acc.members[1];
        assert_eq!(second.look_totals, [1.0, 3.0, 6.0, 10.0]);
        assert_eq!(second.covariate_totals.unwrap(), [9.0, 18.0, 27.0, 36.0]);
    }
}
