use super::*;
use crate::models::LinearMomentSpecification;
use crate::test_data::{discrete_effect, homogeneous_effect, step_effect};
use ndarray::array;
use rand::{rngs::StdRng, SeedableRng};

fn spec_one_continuous() -> LinearMomentSpecification {
    LinearMomentSpecification::new(2, vec![false])
}

#[test]
fn test_tree_splits_near_five() {
    let lens = step_effect(1000, 0.5, 42).unwrap();
    let spec = spec_one_continuous();
    let options = TreeOptionsBuilder::new()
        .min_count(50)
        .min_mse_improvement(0.01)
        .build();
    let mut rng = StdRng::seed_from_u64(1);
    let tree = TreeMoment::grow(&spec, &lens, &options, &mut rng).unwrap();

    match &tree.root().rule {
        Some(SplitRule::Continuous {
            variable,
            threshold,
        }) => {
            assert_eq!(*variable, 0);
            assert!((threshold - 5.0).abs() < 0.5, "threshold {}", threshold);
        }
        other => panic!("expected a continuous root split, got {:?}", other),
    }

    let low = tree.estimated_beta(array![2.0].view()).unwrap();
    let high = tree.estimated_beta(array![8.0].view()).unwrap();
    assert!((low[1] - 1.0).abs() < 0.3, "low slope {}", low[1]);
    assert!((high[1] - 3.0).abs() < 0.3, "high slope {}", high[1]);
}

#[test]
fn test_children_depth_and_parent() {
    let lens = step_effect(600, 0.5, 3).unwrap();
    let spec = spec_one_continuous();
    let mut rng = StdRng::seed_from_u64(3);
    let tree = TreeMoment::grow(&spec, &lens, &TreeOptions::default(), &mut rng).unwrap();
    assert_eq!(tree.root().depth, 0);
    assert!(tree.root().parent.is_none());
    for (id, node) in tree.nodes().iter().enumerate() {
        if let Some((l, r)) = node.children {
            assert_eq!(tree.node(l).depth, node.depth + 1);
            assert_eq!(tree.node(r).depth, node.depth + 1);
            assert_eq!(tree.node(l).parent, Some(id));
            assert!(node.rule.is_some());
        } else {
            assert!(node.rule.is_none());
        }
    }
}

#[test]
fn test_split_fit_never_exceeds_baseline() {
    let lens = step_effect(800, 1.0, 11).unwrap();
    let spec = spec_one_continuous();
    let options = TreeOptionsBuilder::new().min_count(30).build();
    let mut rng = StdRng::seed_from_u64(11);
    let tree = TreeMoment::grow(&spec, &lens, &options, &mut rng).unwrap();
    for node in tree.nodes() {
        if let (Some(split_fit), Some((l, r))) = (node.split_fit, node.children) {
            assert!(split_fit <= node.fit);
            let children_fit = tree.node(l).fit + tree.node(r).fit;
            assert!((children_fit - split_fit).abs() <= 1e-8 * split_fit.max(1.0));
        }
    }
}

#[test]
fn test_no_admissible_split_is_terminal() {
    let lens = step_effect(80, 0.5, 5).unwrap();
    let spec = spec_one_continuous();
    // Both sides would need 50 observations out of 80.
    let options = TreeOptionsBuilder::new().min_count(50).max_depth(10).build();
    let mut rng = StdRng::seed_from_u64(5);
    let tree = TreeMoment::grow(&spec, &lens, &options, &mut rng).unwrap();
    assert_eq!(tree.num_leaves(), 1);
    assert!(tree.root().is_terminal());
    assert_eq!(tree.root().kind, NodeKind::Terminal);
    assert!(tree.root().estimate.is_some());
}

#[test]
fn test_max_depth_zero_is_stump() {
    let lens = step_effect(500, 0.5, 8).unwrap();
    let spec = spec_one_continuous();
    let options = TreeOptionsBuilder::new().max_depth(0).build();
    let mut rng = StdRng::seed_from_u64(8);
    let tree = TreeMoment::grow(&spec, &lens, &options, &mut rng).unwrap();
    assert_eq!(tree.num_leaves(), 1);
    assert_eq!(tree.depth(), 0);
}

#[test]
fn test_discrete_split_recovers_partition() {
    let lens = discrete_effect(1000, 0.5, 21).unwrap();
    let spec = LinearMomentSpecification::new(2, vec![true, false]).with_variables_to_search(vec![0]);
    let options = TreeOptionsBuilder::new().min_count(50).build();
    let mut rng = StdRng::seed_from_u64(21);
    let tree = TreeMoment::grow(&spec, &lens, &options, &mut rng).unwrap();
    match &tree.root().rule {
        Some(SplitRule::Discrete { variable, partition }) => {
            assert_eq!(*variable, 0);
            let low: std::collections::BTreeSet<i64> = [0, 2].into_iter().collect();
            let high: std::collections::BTreeSet<i64> = [1, 3, 4].into_iter().collect();
            assert!(
                (partition.left() == &low && partition.right() == &high)
                    || (partition.left() == &high && partition.right() == &low),
                "unexpected partition {:?}",
                partition
            );
        }
        other => panic!("expected a discrete root split, got {:?}", other),
    }
}

#[test]
fn test_random_subspace_searches_subset() {
    let lens = homogeneous_effect(400, 1.0, 4).unwrap();
    let spec = LinearMomentSpecification::new(2, vec![false, false]);
    let options = TreeOptionsBuilder::new().num_random_variables(1).build();
    let mut rng = StdRng::seed_from_u64(4);
    let tree = TreeMoment::grow(&spec, &lens, &options, &mut rng).unwrap();
    assert!(tree.root().estimate.is_some());
}

#[test]
fn test_invalid_options_rejected() {
    let lens = step_effect(100, 0.5, 1).unwrap();
    let spec = spec_one_continuous();
    let options = TreeOptionsBuilder::new().min_proportion(0.7).build();
    let mut rng = StdRng::seed_from_u64(1);
    assert!(TreeMoment::grow(&spec, &lens, &options, &mut rng).is_err());
}

#[test]
fn test_honest_estimates_replace_structure_estimates() {
    let lens = step_effect(1200, 0.5, 9).unwrap();
    let spec = spec_one_continuous();
    let mut rng = StdRng::seed_from_u64(9);
    let (structure, honest) = lens.split(0.5, &mut rng);
    let mut tree = TreeMoment::grow(&spec, &structure, &TreeOptions::default(), &mut rng).unwrap();
    let before = tree.estimated_beta(array![2.0].view()).cloned().unwrap();
    tree.estimate_honest_tree(&spec, &honest);
    assert!(tree.is_honest());
    let after = tree.estimated_beta(array![2.0].view()).cloned().unwrap();
    assert_ne!(before, after);
    assert!((after[1] - 1.0).abs() < 0.3);
    let honest_total: usize = tree.leaves().iter().map(|&id| tree.node(id).num_honest_obs).sum();
    assert_eq!(honest_total, honest.num_obs());
}

#[test]
fn test_pruning_when_leaf_gets_no_honest_data() {
    let lens = step_effect(1000, 0.5, 13).unwrap();
    let spec = spec_one_continuous();
    let mut rng = StdRng::seed_from_u64(13);
    let mut tree = TreeMoment::grow(&spec, &lens, &TreeOptions::default(), &mut rng).unwrap();
    assert!(tree.num_leaves() >= 2);

    // Honest sample confined to z < 1: every leaf above that is empty.
    let (honest, _) = lens.subset_by_rule(&SplitRule::Continuous {
        variable: 0,
        threshold: 1.0,
    });
    tree.estimate_honest_tree(&spec, &honest);

    assert!(tree.nodes().iter().any(|n| n.kind == NodeKind::Pruned));
    for id in tree.leaves() {
        assert!(tree.node(id).estimate.is_some(), "leaf {} has no estimate", id);
    }
    assert!(tree.estimated_beta(array![9.0].view()).is_some());
}

#[test]
fn test_empty_honest_sample_gives_null_root() {
    let lens = step_effect(300, 0.5, 2).unwrap();
    let spec = spec_one_continuous();
    let mut rng = StdRng::seed_from_u64(2);
    let mut tree = TreeMoment::grow(&spec, &lens, &TreeOptions::default(), &mut rng).unwrap();
    tree.estimate_honest_tree(&spec, &lens.slice(0..0));
    assert_eq!(tree.num_leaves(), 1);
    assert!(tree.root().estimate.is_none());
    assert!(tree.estimated_beta(array![3.0].view()).is_none());
}

#[test]
fn test_partition_lens_covers_every_observation() {
    let lens = step_effect(700, 0.5, 17).unwrap();
    let spec = spec_one_continuous();
    let mut rng = StdRng::seed_from_u64(17);
    let tree = TreeMoment::grow(&spec, &lens, &TreeOptions::default(), &mut rng).unwrap();
    let parts = tree.partition_lens(&lens);
    assert_eq!(parts.len(), tree.num_leaves());
    let total: usize = parts.iter().map(|(_, l)| l.num_obs()).sum();
    assert_eq!(total, lens.num_obs());
    for (id, part) in &parts {
        for i in 0..part.num_obs() {
            assert_eq!(tree.leaf_for(part.z_row(i)), *id);
        }
    }
}

#[test]
fn test_display_lists_leaves() {
    let lens = step_effect(600, 0.5, 6).unwrap();
    let spec = spec_one_continuous();
    let mut rng = StdRng::seed_from_u64(6);
    let tree = TreeMoment::grow(&spec, &lens, &TreeOptions::default(), &mut rng).unwrap();
    let printed = tree.to_string();
    assert_eq!(printed.matches("leaf").count(), tree.num_leaves());
}
