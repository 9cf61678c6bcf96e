//! Two-fold cross-validation of the tree growth thresholds.
use itertools::Itertools;
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};

#[cfg(feature = "use-rayon")]
use rayon::prelude::*;

use crate::error::{ForestError, Result};
use crate::lens::DataLens;
use crate::moment::MomentSpecification;

use super::{grow_forest, with_pool, ForestParams};

/// Candidate values; every combination is scored.
#[derive(Debug, Clone)]
pub struct CvGrid {
    pub min_counts: Vec<usize>,
    pub min_improvements: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CvCell {
    pub min_count: usize,
    pub min_mse_improvement: f64,
    /// Average of the two held-out fits; `+inf` when a fold could not be
    /// predicted.
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct CvOutcome {
    pub best: CvCell,
    pub cells: Vec<CvCell>,
}

impl CvOutcome {
    /// `base` with the winning thresholds.
    pub fn apply(&self, base: &ForestParams) -> ForestParams {
        let mut params = base.clone();
        params.tree_options.min_count = self.best.min_count;
        params.tree_options.min_mse_improvement = self.best.min_mse_improvement;
        params
    }
}

/// Splits `lens` in two halves and, for every grid cell, grows a forest on
/// each half and scores it on the other. The lowest finite score wins; ties
/// go to the cell listed first.
pub fn cross_validate<S: MomentSpecification>(
    spec: &S,
    lens: &DataLens,
    base: &ForestParams,
    grid: &CvGrid,
) -> Result<CvOutcome> {
    if grid.min_counts.is_empty() || grid.min_improvements.is_empty() {
        return Err(ForestError::config("cross-validation grid is empty"));
    }
    base.validate()?;

    let mut rng = StdRng::seed_from_u64(base.seed);
    let (fold_a, fold_b) = lens.split(0.5, &mut rng);
    let seed_a: u64 = rng.gen();
    let seed_b: u64 = rng.gen();

    let cells: Vec<(usize, f64)> = grid
        .min_counts
        .iter()
        .cartesian_product(grid.min_improvements.iter())
        .map(|(&c, &m)| (c, m))
        .collect();

    let evaluate = |&(min_count, min_mse_improvement): &(usize, f64)| -> Result<CvCell> {
        let mut params = base.clone();
        params.tree_options.min_count = min_count;
        params.tree_options.min_mse_improvement = min_mse_improvement;
        params.num_threads = None;

        params.seed = seed_a;
        let on_a = grow_forest(spec, &fold_a, &params)?.out_of_sample_fit(spec, &fold_b);
        params.seed = seed_b;
        let on_b = grow_forest(spec, &fold_b, &params)?.out_of_sample_fit(spec, &fold_a);
        let score = 0.5 * (on_a + on_b);
        info!(
            "cv cell min_count={} min_mse_improvement={}: score {}",
            min_count, min_mse_improvement, score
        );
        Ok(CvCell {
            min_count,
            min_mse_improvement,
            score,
        })
    };

    let scored: Result<Vec<CvCell>> = with_pool(base.num_threads, || {
        #[cfg(not(feature = "use-rayon"))]
        {
            cells.iter().map(evaluate).collect()
        }
        #[cfg(feature = "use-rayon")]
        {
            cells.par_iter().map(evaluate).collect()
        }
    })?;
    let scored = scored?;

    let best = scored
        .iter()
        .filter(|cell| cell.score.is_finite())
        .fold(None::<&CvCell>, |best, cell| match best {
            Some(b) if b.score <= cell.score => Some(b),
            _ => Some(cell),
        })
        .cloned()
        .ok_or(ForestError::NoValidConfiguration)?;
    info!(
        "cv selected min_count={} min_mse_improvement={} (score {})",
        best.min_count, best.min_mse_improvement, best.score
    );
    Ok(CvOutcome {
        best,
        cells: scored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestParamsBuilder;
    use crate::models::LinearMomentSpecification;
    use crate::test_data::step_effect;

    #[test]
    fn test_cv_picks_finite_cell() {
        let lens = step_effect(1200, 0.5, 31).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let base = ForestParamsBuilder::new().num_trees(4).seed(31).build();
        let grid = CvGrid {
            min_counts: vec![25, 100],
            min_improvements: vec![0.01, 1e6],
        };
        let outcome = cross_validate(&spec, &lens, &base, &grid).unwrap();
        assert_eq!(outcome.cells.len(), 4);
        assert!(outcome.best.score.is_finite());
        assert!(outcome
            .cells
            .iter()
            .all(|cell| cell.score >= outcome.best.score));
        // A threshold nothing can beat leaves single-leaf trees, which miss
        // the step.
        let stumps: Vec<&CvCell> = outcome
            .cells
            .iter()
            .filter(|c| c.min_mse_improvement > 1.0)
            .collect();
        assert!(stumps.iter().all(|c| c.score > outcome.best.score));

        let tuned = outcome.apply(&base);
        assert_eq!(tuned.tree_options.min_count, outcome.best.min_count);
    }

    #[test]
    fn test_cv_without_finite_cell_fails() {
        // Leaves need more observations than a fold can offer.
        let lens = step_effect(60, 0.5, 2).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]).with_min_obs(1000);
        let base = ForestParamsBuilder::new().num_trees(2).build();
        let grid = CvGrid {
            min_counts: vec![5],
            min_improvements: vec![0.01],
        };
        let result = cross_validate(&spec, &lens, &base, &grid);
        assert_eq!(result.unwrap_err(), ForestError::NoValidConfiguration);
    }

    #[test]
    fn test_cv_empty_grid_rejected() {
        let lens = step_effect(60, 0.5, 2).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let grid = CvGrid {
            min_counts: vec![],
            min_improvements: vec![0.01],
        };
        assert!(cross_validate(&spec, &lens, &ForestParams::default(), &grid).is_err());
    }
}
