use log::{info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[cfg(feature = "use-rayon")]
use rayon::prelude::*;

use crate::error::{ForestError, Result};
use crate::forest::{with_pool, MomentForest};
use crate::lens::DataLens;
use crate::moment::{ContainerMoment, MomentSpecification};
use crate::tree::TreeMoment;

use super::params::{CriticalValueMethod, HomogeneityTestOptions};
use super::statistics::compute_statistic;
use super::subsample::{asymptotic_p_value, subsample_p_value};

/// Outcome of testing one parameter in one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTest {
    pub parameter: usize,
    pub statistic: f64,
    pub p_value: f64,
    pub draws: usize,
    pub reject: bool,
    /// Constrained estimate of the common value.
    pub shared_value: f64,
    pub num_leaves: usize,
}

/// Tests every parameter of `spec` for homogeneity across the leaves of
/// `tree`, using `honest` (the tree's estimation sample).
///
/// Leaves with fewer than `min_leaf_obs` observations or a failed fit are
/// left out. With fewer than two testable leaves nothing can be rejected and
/// every parameter is accepted at its single-region estimate. A parameter
/// whose fits do not converge gets no entry.
pub fn test_tree_homogeneity<S, R>(
    spec: &S,
    tree: &TreeMoment,
    honest: &DataLens,
    options: &HomogeneityTestOptions,
    rng: &mut R,
) -> Result<Vec<ParameterTest>>
where
    S: MomentSpecification,
    R: Rng + ?Sized,
{
    let mut lenses = Vec::new();
    let mut containers = Vec::new();
    for (_, leaf) in tree.partition_lens(honest) {
        if leaf.num_obs() < options.min_leaf_obs {
            continue;
        }
        let container = spec.compute_optimal_beta(&leaf, true);
        if container.is_valid() {
            lenses.push(leaf);
            containers.push(container);
        }
    }

    if containers.len() < 2 {
        let pooled;
        let container = match containers.first() {
            Some(c) => c,
            None => {
                pooled = spec.compute_optimal_beta(honest, true);
                &pooled
            }
        };
        let beta = container
            .beta()
            .ok_or_else(|| ForestError::homogeneity("tree has no usable honest fit"))?;
        return Ok(beta
            .iter()
            .enumerate()
            .map(|(k, &value)| ParameterTest {
                parameter: k,
                statistic: 0.0,
                p_value: 1.0,
                draws: 0,
                reject: false,
                shared_value: value,
                num_leaves: containers.len(),
            })
            .collect());
    }

    let mut tests = Vec::with_capacity(spec.num_params());
    for k in 0..spec.num_params() {
        let full = compute_statistic(&containers, k, options)?;
        if !full.converged() {
            warn!("parameter {}: GMM fit did not converge, no vote from this tree", k);
            continue;
        }
        let value = full.value(options.statistic);
        let p = match options.critical_values {
            CriticalValueMethod::Asymptotic => asymptotic_p_value(value, full.degrees_of_freedom)?,
            CriticalValueMethod::Subsampling => subsample_p_value(spec, &lenses, k, value, options, &mut *rng)?,
        };
        tests.push(ParameterTest {
            parameter: k,
            statistic: value,
            p_value: p.p_value,
            draws: p.draws,
            reject: p.p_value < options.alpha,
            shared_value: full.shared_value,
            num_leaves: containers.len(),
        });
    }
    Ok(tests)
}

/// Tally for one parameter across the trees of a forest.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterVote {
    pub parameter: usize,
    pub accept: usize,
    pub reject: usize,
    /// Strict majority of accept votes.
    pub homogeneous: bool,
    /// Mean constrained estimate over the accepting trees.
    pub starting_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomogeneityReport {
    votes: Vec<ParameterVote>,
    trees_tested: usize,
}

impl HomogeneityReport {
    /// Tallies per-tree outcomes; every inner vector has one entry per
    /// parameter.
    pub fn from_tree_tests(num_params: usize, tests: &[Vec<ParameterTest>]) -> Self {
        let votes = (0..num_params)
            .map(|k| {
                let outcomes: Vec<&ParameterTest> = tests
                    .iter()
                    .filter_map(|tree| tree.iter().find(|t| t.parameter == k))
                    .collect();
                let accepted: Vec<f64> = outcomes
                    .iter()
                    .filter(|t| !t.reject)
                    .map(|t| t.shared_value)
                    .collect();
                let accept = accepted.len();
                let reject = outcomes.len() - accept;
                ParameterVote {
                    parameter: k,
                    accept,
                    reject,
                    homogeneous: 2 * accept > outcomes.len(),
                    starting_value: if accepted.is_empty() {
                        None
                    } else {
                        Some(accepted.iter().sum::<f64>() / accept as f64)
                    },
                }
            })
            .collect();
        Self {
            votes,
            trees_tested: tests.len(),
        }
    }

    pub fn votes(&self) -> &[ParameterVote] {
        &self.votes
    }

    pub fn trees_tested(&self) -> usize {
        self.trees_tested
    }

    /// Parameters voted homogeneous with their starting values.
    pub fn homogeneous_parameters(&self) -> Vec<(usize, f64)> {
        self.votes
            .iter()
            .filter(|v| v.homogeneous)
            .filter_map(|v| v.starting_value.map(|value| (v.parameter, value)))
            .collect()
    }
}

/// Runs [`test_tree_homogeneity`] on every tree of `forest` against its own
/// honest sample, regenerated from `lens`, and tallies the votes. Trees whose
/// test fails are logged and left out.
pub fn test_forest_homogeneity<S: MomentSpecification>(
    spec: &S,
    forest: &MomentForest,
    lens: &DataLens,
    options: &HomogeneityTestOptions,
) -> Result<HomogeneityReport> {
    options.validate()?;
    let mut rng = StdRng::seed_from_u64(options.seed);
    let seeds: Vec<u64> = (0..forest.num_trees()).map(|_| rng.gen()).collect();

    let test_one = |(i, seed): (usize, &u64)| -> Result<Option<Vec<ParameterTest>>> {
        let (_, honest) = forest
            .tree_lenses(i, lens)
            .ok_or_else(|| ForestError::config("forest carries no sampling seeds"))?;
        let mut tree_rng = StdRng::seed_from_u64(*seed);
        match test_tree_homogeneity(spec, &forest.trees()[i], &honest, options, &mut tree_rng) {
            Ok(tests) => Ok(Some(tests)),
            Err(e) => {
                warn!("tree {} left out of the homogeneity vote: {}", i, e);
                Ok(None)
            }
        }
    };

    let outcomes: Result<Vec<Option<Vec<ParameterTest>>>> = with_pool(options.num_threads, || {
        #[cfg(not(feature = "use-rayon"))]
        {
            seeds.iter().enumerate().map(test_one).collect()
        }
        #[cfg(feature = "use-rayon")]
        {
            seeds.par_iter().enumerate().map(test_one).collect()
        }
    })?;
    let tests: Vec<Vec<ParameterTest>> = outcomes?.into_iter().flatten().collect();
    if tests.is_empty() {
        return Err(ForestError::homogeneity("no tree produced a homogeneity test"));
    }

    let report = HomogeneityReport::from_tree_tests(spec.num_params(), &tests);
    for vote in report.votes() {
        info!(
            "parameter {}: {} accept / {} reject -> {}",
            vote.parameter,
            vote.accept,
            vote.reject,
            if vote.homogeneous { "homogeneous" } else { "heterogeneous" }
        );
    }
    Ok(report)
}
