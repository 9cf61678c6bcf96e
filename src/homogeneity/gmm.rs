//! Stacked GMM over the leaves of one tree.
//!
//! Each leaf `l` contributes its own moment block `g_l = moment_g(beta_l) / N`
//! where `N` is the total number of observations over all leaves. The
//! objective is `Q = 1/2 sum_l g_l' W_l g_l` with one weighting block per
//! leaf; the stacked weighting matrix is block diagonal because an
//! observation only enters the moments of its own leaf.
//!
//! Both fits are solved by Gauss–Newton on the linearised moments, which is
//! exact in one step for moments linear in `beta`. The constrained fit shares
//! one coordinate across all leaves.
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{ForestError, Result};
use crate::linalg::{invert_spd, quadratic_form, solve_spd};
use crate::moment::ContainerMoment;
use crate::optim::{minimize, MinimizerOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightingScheme {
    /// Identity first stage, then the inverse moment covariance at the
    /// first-stage unconstrained estimates, held fixed for both fits.
    TwoStep,
    /// Weighting recomputed at every parameter value.
    ContinuouslyUpdated,
}

/// Estimates of one stacked fit, one `beta` per leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct GmmFit {
    pub betas: Vec<Array1<f64>>,
    pub objective: f64,
    pub converged: bool,
}

/// Per-leaf weighting blocks.
pub(crate) type Weights = Vec<Array2<f64>>;

pub(crate) struct StackedGmm<'a, C: ContainerMoment> {
    leaves: &'a [C],
    total_obs: f64,
    num_params: usize,
    num_moments: usize,
    max_iters: usize,
    tolerance: f64,
}

impl<'a, C: ContainerMoment> StackedGmm<'a, C> {
    /// Every leaf must hold a valid fit.
    pub fn new(leaves: &'a [C], max_iters: usize, tolerance: f64) -> Result<Self> {
        let first = leaves
            .first()
            .and_then(|c| c.beta())
            .ok_or_else(|| ForestError::homogeneity("no leaf with a valid fit"))?;
        if leaves.iter().any(|c| !c.is_valid()) {
            return Err(ForestError::homogeneity("leaf without a valid fit"));
        }
        let num_params = first.len();
        let num_moments = leaves[0].moment_g(first.view()).len();
        if num_moments < num_params {
            return Err(ForestError::homogeneity(format!(
                "{} moments cannot identify {} parameters",
                num_moments, num_params
            )));
        }
        Ok(Self {
            leaves,
            total_obs: leaves.iter().map(|c| c.num_obs()).sum::<usize>() as f64,
            num_params,
            num_moments,
            max_iters,
            tolerance,
        })
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    pub fn total_obs(&self) -> f64 {
        self.total_obs
    }

    /// The leaves' own estimates.
    pub fn leaf_betas(&self) -> Vec<Array1<f64>> {
        self.leaves
            .iter()
            .filter_map(|c| c.beta().cloned())
            .collect()
    }

    fn gbar(&self, l: usize, beta: ArrayView1<f64>) -> Array1<f64> {
        self.leaves[l].moment_g(beta) / self.total_obs
    }

    /// `A_l = J_l / N`, the leaf block of the stacked Jacobian.
    fn scaled_jacobian(&self, l: usize, beta: ArrayView1<f64>) -> Array2<f64> {
        self.leaves[l].jacobian(beta) / self.total_obs
    }

    fn omega(&self, l: usize, beta: ArrayView1<f64>) -> Array2<f64> {
        let leaf = &self.leaves[l];
        let mut omega = Array2::zeros((self.num_moments, self.num_moments));
        for i in 0..leaf.num_obs() {
            let gi = leaf.moment_gi(beta, i);
            for a in 0..self.num_moments {
                for b in 0..self.num_moments {
                    omega[[a, b]] += gi[a] * gi[b];
                }
            }
        }
        omega / self.total_obs
    }

    pub fn identity_weights(&self) -> Weights {
        vec![Array2::eye(self.num_moments); self.leaves.len()]
    }

    /// Inverse moment covariance at `betas`; `None` when a block is singular.
    pub fn efficient_weights(&self, betas: &[Array1<f64>]) -> Option<Weights> {
        betas
            .iter()
            .enumerate()
            .map(|(l, beta)| invert_spd(self.omega(l, beta.view()).view()))
            .collect()
    }

    pub fn objective(&self, betas: &[Array1<f64>], weights: &[Array2<f64>]) -> f64 {
        betas
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(l, (beta, w))| {
                let g = self.gbar(l, beta.view());
                0.5 * quadratic_form(g.view(), w.view())
            })
            .sum()
    }

    pub fn cue_objective(&self, betas: &[Array1<f64>]) -> f64 {
        match self.efficient_weights(betas) {
            Some(weights) => self.objective(betas, &weights),
            None => f64::INFINITY,
        }
    }

    /// `N sum_l d_l' (A_l' W_l A_l) d_l` for `d_l = a_l - b_l`, the Jacobians
    /// evaluated at `a`.
    pub fn wald(&self, a: &[Array1<f64>], b: &[Array1<f64>], weights: &[Array2<f64>]) -> f64 {
        let total: f64 = (0..self.leaves.len())
            .map(|l| {
                let jac = self.scaled_jacobian(l, a[l].view());
                let bread = jac.t().dot(&weights[l]).dot(&jac);
                let d = &a[l] - &b[l];
                quadratic_form(d.view(), bread.view())
            })
            .sum();
        self.total_obs * total
    }

    fn num_free(&self, shared: Option<usize>) -> usize {
        match shared {
            Some(_) => 1 + self.leaves.len() * (self.num_params - 1),
            None => self.leaves.len() * self.num_params,
        }
    }

    /// Position of coordinate `j` of leaf `l` in the free vector.
    fn free_index(&self, shared: Option<usize>, l: usize, j: usize) -> usize {
        match shared {
            Some(k) if j == k => 0,
            Some(k) => 1 + l * (self.num_params - 1) + if j < k { j } else { j - 1 },
            None => l * self.num_params + j,
        }
    }

    fn apply_step(&self, betas: &[Array1<f64>], step: &Array1<f64>, scale: f64, shared: Option<usize>) -> Vec<Array1<f64>> {
        betas
            .iter()
            .enumerate()
            .map(|(l, beta)| {
                let mut next = beta.clone();
                for j in 0..self.num_params {
                    next[j] += scale * step[self.free_index(shared, l, j)];
                }
                next
            })
            .collect()
    }

    /// Starting values: the leaves' own estimates, with the shared coordinate
    /// set to their observation-weighted mean.
    pub fn start(&self, shared: Option<usize>) -> Vec<Array1<f64>> {
        let mut betas = self.leaf_betas();
        if let Some(k) = shared {
            let pooled = self
                .leaves
                .iter()
                .zip(&betas)
                .map(|(c, b)| c.num_obs() as f64 * b[k])
                .sum::<f64>()
                / self.total_obs;
            for beta in betas.iter_mut() {
                beta[k] = pooled;
            }
        }
        betas
    }

    /// Gauss–Newton with fixed weights from `start`, which must already
    /// satisfy the constraint. Halves the step while the objective rises.
    pub fn fit_fixed(&self, start: Vec<Array1<f64>>, weights: &[Array2<f64>], shared: Option<usize>) -> Result<GmmFit> {
        let dim = self.num_free(shared);
        let mut betas = start;
        let mut value = self.objective(&betas, weights);

        for iter in 0..self.max_iters {
            let mut hessian = Array2::<f64>::zeros((dim, dim));
            let mut rhs = Array1::<f64>::zeros(dim);
            for (l, beta) in betas.iter().enumerate() {
                let jac = self.scaled_jacobian(l, beta.view());
                let g = self.gbar(l, beta.view());
                let jw = jac.t().dot(&weights[l]);
                let block = jw.dot(&jac);
                let grad = jw.dot(&g);
                for i in 0..self.num_params {
                    let fi = self.free_index(shared, l, i);
                    rhs[fi] -= grad[i];
                    for j in 0..self.num_params {
                        hessian[[fi, self.free_index(shared, l, j)]] += block[[i, j]];
                    }
                }
            }
            let step = solve_spd(hessian.view(), rhs.view())
                .ok_or_else(|| ForestError::homogeneity("singular Gauss-Newton system"))?;

            let mut scale = 1.0;
            let mut next = self.apply_step(&betas, &step, scale, shared);
            let mut next_value = self.objective(&next, weights);
            while !(next_value <= value) && scale > 1e-6 {
                scale *= 0.5;
                next = self.apply_step(&betas, &step, scale, shared);
                next_value = self.objective(&next, weights);
            }
            if !(next_value <= value) {
                // Only a rounding-level Newton step means the start is stationary.
                let full_step = step.iter().fold(0.0f64, |m, v| m.max(v.abs()));
                let magnitude = betas.iter().flat_map(|b| b.iter()).fold(0.0f64, |m, v| m.max(v.abs()));
                let stationary = full_step <= self.tolerance.sqrt() * (1.0 + magnitude);
                if stationary {
                    debug!("Gauss-Newton stationary after {} iterations", iter);
                } else {
                    warn!(
                        "Gauss-Newton could not decrease the objective after {} iterations (step {:.3e})",
                        iter, full_step
                    );
                }
                return Ok(GmmFit {
                    betas,
                    objective: value,
                    converged: stationary,
                });
            }

            let size = step.iter().fold(0.0f64, |m, v| m.max(scale * v.abs()));
            let magnitude = next.iter().flat_map(|b| b.iter()).fold(0.0f64, |m, v| m.max(v.abs()));
            betas = next;
            value = next_value;
            if size <= self.tolerance * (1.0 + magnitude) {
                return Ok(GmmFit {
                    betas,
                    objective: value,
                    converged: true,
                });
            }
        }

        warn!(
            "Gauss-Newton stopped after {} iterations without converging (objective {:.6e})",
            self.max_iters, value
        );
        Ok(GmmFit {
            betas,
            objective: value,
            converged: false,
        })
    }

    /// Continuously updated fit: iterated weighting to get close, then a
    /// Nelder–Mead polish of the objective with weights recomputed at every
    /// point.
    pub fn fit_cue(&self, shared: Option<usize>, minimizer: &MinimizerOptions) -> Result<GmmFit> {
        let mut betas = self.start(shared);
        for _ in 0..3 {
            let weights = self
                .efficient_weights(&betas)
                .ok_or_else(|| ForestError::homogeneity("singular moment covariance"))?;
            betas = self.fit_fixed(betas, &weights, shared)?.betas;
        }

        let base = betas.clone();
        let dim = self.num_free(shared);
        let objective = |v: &[f64]| {
            let step = Array1::from(v.to_vec());
            self.cue_objective(&self.apply_step(&base, &step, 1.0, shared))
        };
        let outcome = minimize(objective, &Array1::zeros(dim), minimizer)?;
        let polished = self.apply_step(&base, &outcome.param, 1.0, shared);
        let value = self.cue_objective(&polished);
        if !value.is_finite() {
            return Err(ForestError::homogeneity("continuously updated objective is not finite"));
        }
        Ok(GmmFit {
            betas: polished,
            objective: value,
            converged: outcome.converged,
        })
    }
}
