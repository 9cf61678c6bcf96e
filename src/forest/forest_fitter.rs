use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[cfg(feature = "use-rayon")]
use rayon::prelude::*;

use crate::error::Result;
use crate::lens::DataLens;
use crate::moment::MomentSpecification;
use crate::tree::TreeMoment;

use super::{draw_tree_lenses, with_pool, ForestParams, MomentForest, TreeSeeds};

/// Grows `params.num_trees` honest trees on bootstrap draws of `lens`.
///
/// All randomness comes from seeds drawn up front from `params.seed`, so the
/// forest is the same whatever the number of worker threads.
pub fn grow_forest<S: MomentSpecification>(
    spec: &S,
    lens: &DataLens,
    params: &ForestParams,
) -> Result<MomentForest> {
    params.validate()?;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let seeds: Vec<TreeSeeds> = (0..params.num_trees)
        .map(|_| TreeSeeds {
            resample: rng.gen(),
            split: rng.gen(),
            grow: rng.gen(),
        })
        .collect();

    let grow_one = |(b, tree_seeds): (usize, &TreeSeeds)| -> Result<TreeMoment> {
        let (structure, honest) = draw_tree_lenses(lens, tree_seeds, params);
        let mut tree_rng = StdRng::seed_from_u64(tree_seeds.grow);
        let mut tree = TreeMoment::grow(spec, &structure, &params.tree_options, &mut tree_rng)?;
        if params.honest {
            tree.estimate_honest_tree(spec, &honest);
        }
        debug!(
            "tree {}: {} leaves, depth {}, {} structure / {} honest observations",
            b,
            tree.num_leaves(),
            tree.depth(),
            structure.num_obs(),
            honest.num_obs()
        );
        Ok(tree)
    };

    let trees: Result<Vec<TreeMoment>> = with_pool(params.num_threads, || {
        #[cfg(not(feature = "use-rayon"))]
        {
            seeds.iter().enumerate().map(grow_one).collect()
        }
        #[cfg(feature = "use-rayon")]
        {
            seeds.par_iter().enumerate().map(grow_one).collect()
        }
    })?;
    let trees = trees?;

    let null_trees = trees.iter().filter(|t| t.root().estimate.is_none()).count();
    info!(
        "grew forest of {} trees on {} observations ({} with a null root)",
        trees.len(),
        lens.num_obs(),
        null_trees
    );
    Ok(MomentForest::new(trees, seeds, params.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestParamsBuilder;
    use crate::models::LinearMomentSpecification;
    use crate::test_data::step_effect;
    use ndarray::array;
    use std::collections::HashSet;

    fn small_params(seed: u64) -> ForestParams {
        ForestParamsBuilder::new()
            .num_trees(8)
            .min_count(40)
            .seed(seed)
            .build()
    }

    #[test]
    fn test_forest_recovers_step() {
        let lens = step_effect(2000, 0.5, 42).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let forest = grow_forest(&spec, &lens, &small_params(42)).unwrap();
        assert_eq!(forest.num_trees(), 8);

        let low = forest.estimated_beta(array![2.0].view()).unwrap();
        let high = forest.estimated_beta(array![8.0].view()).unwrap();
        assert!((low[1] - 1.0).abs() < 0.3, "low slope {}", low[1]);
        assert!((high[1] - 3.0).abs() < 0.3, "high slope {}", high[1]);
    }

    #[test]
    fn test_forest_reproducibility() {
        let lens = step_effect(800, 0.5, 7).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let forest1 = grow_forest(&spec, &lens, &small_params(42)).unwrap();
        let forest2 = grow_forest(&spec, &lens, &small_params(42)).unwrap();

        for z in [0.5, 2.5, 4.9, 5.1, 7.5, 9.9] {
            let b1 = forest1.estimated_beta(array![z].view()).unwrap();
            let b2 = forest2.estimated_beta(array![z].view()).unwrap();
            let diff = &b1 - &b2;
            assert!(
                diff.iter().all(|d| d.abs() < 1e-12),
                "Forests with same seed produced different estimates"
            );
        }
    }

    #[test]
    fn test_forest_different_seeds() {
        let lens = step_effect(800, 0.5, 7).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let forest1 = grow_forest(&spec, &lens, &small_params(42)).unwrap();
        let forest2 = grow_forest(&spec, &lens, &small_params(43)).unwrap();

        let differs = [0.5, 2.5, 7.5].iter().any(|&z| {
            let b1 = forest1.estimated_beta(array![z].view()).unwrap();
            let b2 = forest2.estimated_beta(array![z].view()).unwrap();
            (&b1 - &b2).iter().any(|d| d.abs() > 1e-10)
        });
        assert!(differs, "Forests with different seeds produced identical estimates");
    }

    #[test]
    fn test_thread_count_does_not_change_forest() {
        let lens = step_effect(600, 0.5, 19).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let mut params = small_params(5);
        params.num_threads = Some(1);
        let single = grow_forest(&spec, &lens, &params).unwrap();
        params.num_threads = Some(3);
        let multi = grow_forest(&spec, &lens, &params).unwrap();
        for z in [1.0, 6.0] {
            assert_eq!(
                single.estimated_beta(array![z].view()),
                multi.estimated_beta(array![z].view())
            );
        }
    }

    #[test]
    fn test_tree_lenses_regenerate_samples() {
        let lens = step_effect(500, 0.5, 23).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let params = small_params(23);
        let forest = grow_forest(&spec, &lens, &params).unwrap();
        let (structure, honest) = forest.tree_lenses(3, &lens).unwrap();
        let (structure2, honest2) = forest.tree_lenses(3, &lens).unwrap();
        assert_eq!(structure.indices(), structure2.indices());
        assert_eq!(honest.indices(), honest2.indices());
        assert_eq!(structure.num_obs() + honest.num_obs(), lens.num_obs());
        assert!(forest.tree_lenses(8, &lens).is_none());
    }

    #[test]
    fn test_bootstrapped_samples_keep_honesty_disjoint() {
        let lens = step_effect(500, 0.5, 29).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let params = ForestParamsBuilder::new().num_trees(6).bootstrap(true).seed(29).build();
        let forest = grow_forest(&spec, &lens, &params).unwrap();
        for i in 0..forest.num_trees() {
            let (structure, honest) = forest.tree_lenses(i, &lens).unwrap();
            let structure_rows: HashSet<usize> = structure.indices().iter().copied().collect();
            assert!(
                honest.indices().iter().all(|row| !structure_rows.contains(row)),
                "tree {} shares backing rows between structure and honesty",
                i
            );
            let honest_rows: HashSet<usize> = honest.indices().iter().copied().collect();
            assert_eq!(honest_rows.len(), honest.num_obs(), "tree {} repeats honest rows", i);
        }
    }

    #[test]
    fn test_zero_trees_rejected() {
        let lens = step_effect(100, 0.5, 1).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let params = ForestParamsBuilder::new().num_trees(0).build();
        assert!(grow_forest(&spec, &lens, &params).is_err());
    }
}
