#[cfg(test)]
mod tests {
    use momentforest::models::LinearMomentSpecification;
    use momentforest::test_data::{discrete_effect, step_effect, step_slope, DISCRETE_LOW_LEVELS, INTERCEPT};
    use momentforest::tree::NodeKind;
    use momentforest::{SplitRule, TreeMoment, TreeOptionsBuilder};
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_step_function_scenario() {
        let lens = step_effect(2000, 0.5, 42).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let mut rng = StdRng::seed_from_u64(42);
        let (structure, honest) = lens.split(0.5, &mut rng);
        let options = TreeOptionsBuilder::new().min_count(50).build();
        let mut tree = TreeMoment::grow(&spec, &structure, &options, &mut rng).unwrap();
        tree.estimate_honest_tree(&spec, &honest);
        println!("{}", tree);

        for z in [1.0, 2.5, 7.5, 9.0] {
            let beta = tree.estimated_beta(array![z].view()).unwrap();
            assert!(
                (beta[1] - step_slope(z)).abs() < 0.3,
                "slope at z = {}: {}",
                z,
                beta[1]
            );
            assert!((beta[0] - INTERCEPT).abs() < 0.3, "intercept at z = {}: {}", z, beta[0]);
        }
    }

    #[test]
    fn test_tree_reproducibility() {
        let lens = step_effect(800, 1.0, 5).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let options = TreeOptionsBuilder::new().num_random_variables(1).build();

        let tree1 = TreeMoment::grow(&spec, &lens, &options, &mut StdRng::seed_from_u64(42)).unwrap();
        let tree2 = TreeMoment::grow(&spec, &lens, &options, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(tree1.to_string(), tree2.to_string(), "Trees with same seed differ");
    }

    #[test]
    fn test_every_leaf_reachable_after_pruning() {
        let lens = step_effect(1000, 0.5, 8).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![false]);
        let mut rng = StdRng::seed_from_u64(8);
        let options = TreeOptionsBuilder::new().min_count(20).build();
        let mut tree = TreeMoment::grow(&spec, &lens, &options, &mut rng).unwrap();
        // A tiny honest sample leaves many leaves empty.
        tree.estimate_honest_tree(&spec, &lens.slice(0..60));
        for id in tree.leaves() {
            let node = tree.node(id);
            assert!(node.estimate.is_some() || id == 0);
            assert!(matches!(node.kind, NodeKind::Terminal | NodeKind::Pruned));
        }
        for z in [0.1, 3.3, 5.0, 9.9] {
            assert!(tree.estimated_beta(array![z].view()).is_some());
        }
    }

    #[test]
    fn test_discrete_split_separates_level_groups() {
        let lens = discrete_effect(2000, 0.5, 17).unwrap();
        let spec = LinearMomentSpecification::new(2, vec![true, false]);
        let options = TreeOptionsBuilder::new().max_depth(1).build();
        let tree = TreeMoment::grow(&spec, &lens, &options, &mut StdRng::seed_from_u64(17)).unwrap();

        match &tree.root().rule {
            Some(SplitRule::Discrete { variable, partition }) => {
                assert_eq!(*variable, 0);
                let low_side = partition.is_left(DISCRETE_LOW_LEVELS[0]);
                for level in 0..5i64 {
                    assert_eq!(
                        partition.is_left(level) == low_side,
                        DISCRETE_LOW_LEVELS.contains(&level),
                        "level {} on the wrong side of {:?}",
                        level,
                        partition
                    );
                }
            }
            other => panic!("expected a discrete root split, got {:?}", other),
        }
    }
}
