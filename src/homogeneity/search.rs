//! Joint estimation of the common values of parameters voted homogeneous.
use log::{debug, info};
use ndarray::Array1;

use crate::error::{ForestError, Result};
use crate::forest::grow_forest;
use crate::lens::DataLens;
use crate::moment::{ContainerMoment, MomentSpecification};
use crate::optim::{minimize, GlobalRefiner};
use crate::tree::TreeMoment;

use super::params::HomogeneousSearchParams;
use super::voting::HomogeneityReport;

#[derive(Debug, Clone, PartialEq)]
pub struct HomogeneousSearchOutcome {
    pub values: Vec<(usize, f64)>,
    pub objective: f64,
    pub converged: bool,
}

impl HomogeneousSearchOutcome {
    /// Registers the estimated values as the specification's homogeneous
    /// parameters, replacing any earlier ones.
    pub fn apply<S: MomentSpecification>(&self, spec: &mut S) {
        spec.clear_homogeneous();
        for &(k, value) in &self.values {
            spec.set_homogeneous_parameter(k, value);
        }
    }
}

/// Minimises, over the common values of `indices`, the identity-weighted
/// moment objective of a small forest grown with those values imposed. The
/// forest seed is fixed so the objective is a deterministic function of the
/// values.
pub struct HomogeneousSearchContainer<'a, S: MomentSpecification + Clone> {
    spec: &'a S,
    lens: &'a DataLens,
    indices: Vec<usize>,
    start: Array1<f64>,
    params: HomogeneousSearchParams,
}

impl<'a, S: MomentSpecification + Clone> HomogeneousSearchContainer<'a, S> {
    pub fn new(spec: &'a S, lens: &'a DataLens, start: &[(usize, f64)], params: HomogeneousSearchParams) -> Result<Self> {
        params.validate()?;
        if start.is_empty() {
            return Err(ForestError::config("no homogeneous parameter to search over"));
        }
        if let Some(&(k, _)) = start.iter().find(|(k, _)| *k >= spec.num_params()) {
            return Err(ForestError::config(format!(
                "parameter {} out of range for {} parameters",
                k,
                spec.num_params()
            )));
        }
        Ok(Self {
            spec,
            lens,
            indices: start.iter().map(|&(k, _)| k).collect(),
            start: start.iter().map(|&(_, v)| v).collect(),
            params,
        })
    }

    /// Search over the parameters `report` voted homogeneous, starting from
    /// their voted values.
    pub fn from_report(
        spec: &'a S,
        lens: &'a DataLens,
        report: &HomogeneityReport,
        params: HomogeneousSearchParams,
    ) -> Result<Self> {
        Self::new(spec, lens, &report.homogeneous_parameters(), params)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn constrained_spec(&self, values: &[f64]) -> S {
        let mut spec = self.spec.clone();
        spec.clear_homogeneous();
        for (&k, &value) in self.indices.iter().zip(values) {
            spec.set_homogeneous_parameter(k, value);
        }
        spec
    }

    /// Average over trees of `1/2 sum_l g_l' g_l`, `g_l` the leaf moment sums
    /// of the tree's honest sample divided by its size. `+inf` when no tree
    /// can be evaluated.
    pub fn objective(&self, values: &[f64]) -> f64 {
        let spec = self.constrained_spec(values);
        let forest = match grow_forest(&spec, self.lens, &self.params.forest) {
            Ok(forest) => forest,
            Err(e) => {
                debug!("search forest failed at {:?}: {}", values, e);
                return f64::INFINITY;
            }
        };
        let per_tree: Vec<f64> = forest
            .trees()
            .iter()
            .enumerate()
            .filter_map(|(i, tree)| {
                let (_, honest) = forest.tree_lenses(i, self.lens)?;
                tree_objective(&spec, tree, &honest)
            })
            .collect();
        if per_tree.is_empty() {
            f64::INFINITY
        } else {
            per_tree.iter().sum::<f64>() / per_tree.len() as f64
        }
    }

    pub fn execute_search(&self) -> Result<HomogeneousSearchOutcome> {
        self.search_from(&self.start)
    }

    /// Runs `refiner` from the starting values first, then the local search
    /// from its result.
    pub fn execute_search_with_refiner(&self, refiner: &dyn GlobalRefiner) -> Result<HomogeneousSearchOutcome> {
        let objective = |v: &[f64]| self.objective(v);
        let refined = refiner.refine(&self.start, &objective);
        self.search_from(&refined)
    }

    fn search_from(&self, start: &Array1<f64>) -> Result<HomogeneousSearchOutcome> {
        let outcome = minimize(|v: &[f64]| self.objective(v), start, &self.params.minimizer)?;
        if !outcome.value.is_finite() {
            return Err(ForestError::optimization(
                "homogeneous search found no point with a finite objective",
            ));
        }
        let values: Vec<(usize, f64)> = self
            .indices
            .iter()
            .copied()
            .zip(outcome.param.iter().copied())
            .collect();
        info!(
            "homogeneous search: {:?} (objective {:.6e}, converged {})",
            values, outcome.value, outcome.converged
        );
        Ok(HomogeneousSearchOutcome {
            values,
            objective: outcome.value,
            converged: outcome.converged,
        })
    }
}

fn tree_objective<S: MomentSpecification>(spec: &S, tree: &TreeMoment, honest: &DataLens) -> Option<f64> {
    let n = honest.num_obs() as f64;
    let mut total = 0.0;
    let mut any = false;
    for (_, leaf) in tree.partition_lens(honest) {
        if leaf.is_empty() {
            continue;
        }
        let container = spec.compute_optimal_beta(&leaf, false);
        if let Some(beta) = container.beta().filter(|_| container.is_valid()) {
            let g = container.moment_g(beta.view()) / n;
            total += 0.5 * g.dot(&g);
            any = true;
        }
    }
    any.then_some(total)
}

/// Tests, then searches: runs the search for the parameters `report` flags and
/// writes the estimates into `spec`. Leaves `spec` untouched and returns
/// `None` when nothing was voted homogeneous; a search that does not
/// converge is an error and also leaves `spec` untouched.
pub fn impose_homogeneity<S: MomentSpecification + Clone>(
    spec: &mut S,
    lens: &DataLens,
    report: &HomogeneityReport,
    params: HomogeneousSearchParams,
) -> Result<Option<HomogeneousSearchOutcome>> {
    if report.homogeneous_parameters().is_empty() {
        return Ok(None);
    }
    let outcome = {
        let container = HomogeneousSearchContainer::from_report(spec, lens, report, params)?;
        container.execute_search()?
    };
    if !outcome.converged {
        return Err(ForestError::optimization(format!(
            "homogeneous search did not converge (best {:?}, objective {:.6e})",
            outcome.values, outcome.objective
        )));
    }
    outcome.apply(spec);
    Ok(Some(outcome))
}
