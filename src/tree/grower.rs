use log::debug;
use rand::{seq::index::sample, Rng};

use crate::lens::DataLens;
use crate::moment::{ContainerMoment, MomentSpecification};
use crate::optim::line_search;
use crate::partition::enumerate_partitions;
use crate::split::{SplitContainer, SplitRule};

use super::{LeafEstimate, Node, NodeId, NodeKind, TreeOptions};

#[cfg(feature = "use-rayon")]
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub(crate) struct SplitCandidate {
    pub rule: SplitRule,
    pub fit: f64,
}

/// Growth phase of a tree. Owns the lens of the node being split; lenses are
/// dropped as soon as both children have been grown.
pub(crate) struct TreeGrower<'a, S: MomentSpecification, R: Rng + ?Sized> {
    spec: &'a S,
    options: &'a TreeOptions,
    rng: &'a mut R,
    nodes: Vec<Node>,
}

impl<'a, S: MomentSpecification, R: Rng + ?Sized> TreeGrower<'a, S, R> {
    pub fn new(spec: &'a S, options: &'a TreeOptions, rng: &'a mut R) -> Self {
        Self {
            spec,
            options,
            rng,
            nodes: Vec::new(),
        }
    }

    pub fn grow(mut self, lens: DataLens) -> Vec<Node> {
        self.determine_split(lens, 0, None);
        self.nodes
    }

    fn determine_split(&mut self, lens: DataLens, depth: usize, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        let baseline = self.spec.compute_optimal_beta(&lens, false);
        let baseline_fit = baseline.goodness_of_fit();
        self.nodes.push(Node::terminal(
            depth,
            parent,
            lens.num_obs(),
            baseline_fit,
            LeafEstimate::from_container(&baseline),
        ));

        if depth >= self.options.max_depth || !baseline_fit.is_finite() || baseline_fit == 0.0 {
            debug!(
                "node {} terminal at depth {} (n = {}, baseline fit {:.6e})",
                id,
                depth,
                lens.num_obs(),
                baseline_fit
            );
            return id;
        }

        let variables = self.candidate_variables(&lens);
        let Some(best) = search_variables(self.spec, self.options, &lens, &variables) else {
            debug!("node {} terminal: no admissible split (n = {})", id, lens.num_obs());
            return id;
        };

        let improvement = (baseline_fit - best.fit) / baseline_fit;
        if improvement < self.options.min_mse_improvement {
            debug!(
                "node {} terminal: improvement {:.4} below {:.4}",
                id, improvement, self.options.min_mse_improvement
            );
            return id;
        }

        let SplitContainer { rule, left, right } = SplitContainer::new(&lens, best.rule);
        if left.is_empty() || right.is_empty() {
            return id;
        }
        drop(lens);
        debug!(
            "node {} splits on {:?} (improvement {:.4}, n = {} / {})",
            id,
            rule,
            improvement,
            left.num_obs(),
            right.num_obs()
        );

        let left_id = self.determine_split(left, depth + 1, Some(id));
        let right_id = self.determine_split(right, depth + 1, Some(id));
        let node = &mut self.nodes[id];
        node.children = Some((left_id, right_id));
        node.rule = Some(rule);
        node.kind = NodeKind::Internal;
        node.split_fit = Some(best.fit);
        id
    }

    /// Searchable variables present in `z`, optionally a random subset of
    /// them. The subset keeps the specification's ordering.
    fn candidate_variables(&mut self, lens: &DataLens) -> Vec<usize> {
        let mut variables: Vec<usize> = self
            .spec
            .variables_to_search()
            .iter()
            .copied()
            .filter(|&v| v < lens.num_z_cols())
            .collect();
        if let Some(m) = self.options.num_random_variables {
            if m < variables.len() {
                let mut picked: Vec<usize> = sample(&mut *self.rng, variables.len(), m).into_vec();
                picked.sort_unstable();
                variables = picked.into_iter().map(|p| variables[p]).collect();
            }
        }
        variables
    }
}

/// Best split over `variables`, or `None` when no variable admits a split
/// satisfying the leaf-size constraints. Ties keep the first candidate found.
pub(crate) fn search_variables<S: MomentSpecification>(
    spec: &S,
    options: &TreeOptions,
    lens: &DataLens,
    variables: &[usize],
) -> Option<SplitCandidate> {
    let search_one = |&variable: &usize| {
        if spec.discrete_vector().get(variable).copied().unwrap_or(false) {
            search_discrete(spec, options, lens, variable)
        } else {
            search_continuous(spec, options, lens, variable)
        }
    };

    #[cfg(not(feature = "use-rayon"))]
    let candidates: Vec<Option<SplitCandidate>> = variables.iter().map(search_one).collect();

    #[cfg(feature = "use-rayon")]
    let candidates: Vec<Option<SplitCandidate>> = variables.par_iter().map(search_one).collect();

    let mut best: Option<SplitCandidate> = None;
    for candidate in candidates.into_iter().flatten() {
        if best.as_ref().map_or(true, |b| candidate.fit < b.fit) {
            best = Some(candidate);
        }
    }
    best
}

/// Sum of the fits of both sides of `rule`; `+inf` when a side is too small
/// or its fit fails.
pub(crate) fn split_fit<S: MomentSpecification>(
    spec: &S,
    options: &TreeOptions,
    lens: &DataLens,
    rule: &SplitRule,
) -> f64 {
    let (left, right) = lens.subset_by_rule(rule);
    let n = lens.num_obs() as f64;
    let admissible = |side: &DataLens| {
        side.num_obs() >= options.min_count
            && side.num_obs() > 0
            && side.num_obs() as f64 / n >= options.min_proportion
    };
    if !admissible(&left) || !admissible(&right) {
        return f64::INFINITY;
    }
    let left_fit = spec.compute_optimal_beta(&left, false).goodness_of_fit();
    if !left_fit.is_finite() {
        return f64::INFINITY;
    }
    let right_fit = spec.compute_optimal_beta(&right, false).goodness_of_fit();
    if !right_fit.is_finite() {
        return f64::INFINITY;
    }
    left_fit + right_fit
}

fn search_continuous<S: MomentSpecification>(
    spec: &S,
    options: &TreeOptions,
    lens: &DataLens,
    variable: usize,
) -> Option<SplitCandidate> {
    let (lo, hi) = lens.z_range(variable)?;
    if !(lo < hi) {
        return None;
    }
    let objective = |threshold: f64| {
        split_fit(
            spec,
            options,
            lens,
            &SplitRule::Continuous {
                variable,
                threshold,
            },
        )
    };

    let mut best: Option<(f64, f64)> = None;
    let mut consider = |threshold: f64, fit: f64| {
        if fit.is_finite() && best.map_or(true, |(_, b)| fit < b) {
            best = Some((threshold, fit));
            true
        } else {
            false
        }
    };

    match line_search(&objective, lo, hi, options.line_search_iters) {
        Ok((threshold, fit)) => {
            consider(threshold, fit);
        }
        Err(err) => debug!("line search on z[{}] failed: {}", variable, err),
    }

    // The objective is piecewise constant in the threshold, so the line search
    // can stall on a plateau; a grid pass and a local polish guard against it.
    let step = (hi - lo) / (options.grid_points + 1) as f64;
    let mut grid_best = None;
    for g in 1..=options.grid_points {
        let threshold = lo + g as f64 * step;
        if consider(threshold, objective(threshold)) {
            grid_best = Some(threshold);
        }
    }
    if let Some(center) = grid_best {
        let (a, b) = ((center - step).max(lo), (center + step).min(hi));
        if let Ok((threshold, fit)) = line_search(&objective, a, b, options.line_search_iters) {
            consider(threshold, fit);
        }
    }

    best.map(|(threshold, fit)| SplitCandidate {
        rule: SplitRule::Continuous {
            variable,
            threshold,
        },
        fit,
    })
}

fn search_discrete<S: MomentSpecification>(
    spec: &S,
    options: &TreeOptions,
    lens: &DataLens,
    variable: usize,
) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;
    for partition in enumerate_partitions(&lens.discrete_levels(variable)) {
        let rule = SplitRule::Discrete {
            variable,
            partition,
        };
        let fit = split_fit(spec, options, lens, &rule);
        if fit.is_finite() && best.as_ref().map_or(true, |b| fit < b.fit) {
            best = Some(SplitCandidate { rule, fit });
        }
    }
    best
}
