//! Thin adapters around the `argmin` solvers used by the tree search and the
//! homogeneity estimators.
//!
//! Objectives are plain closures returning `f64`. Non-finite values are
//! mapped to [`PENALTY`] so the simplex and Brent updates stay finite; a
//! region where every evaluation is penalised simply never wins.
use argmin::core::{CostFunction, Error, Executor, State, TerminationReason};
use argmin::solver::brent::BrentOpt;
use argmin::solver::neldermead::NelderMead;
use log::{debug, warn};
use ndarray::Array1;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{ForestError, Result};

/// Finite stand-in for `+inf` objective values.
pub const PENALTY: f64 = 1e20;

fn finite_or_penalty(value: f64) -> f64 {
    if value.is_finite() {
        value.min(PENALTY)
    } else {
        PENALTY
    }
}

#[derive(Debug, Clone)]
pub struct MinimizerOptions {
    pub max_iters: u64,
    pub sd_tolerance: f64,
    /// Relative size of the initial simplex around the starting point.
    pub initial_step: f64,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            max_iters: 500,
            sd_tolerance: 1e-10,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MinimizeOutcome {
    pub param: Array1<f64>,
    pub value: f64,
    pub converged: bool,
    pub iterations: u64,
}

struct VectorObjective<'a, F: Fn(&[f64]) -> f64> {
    f: &'a F,
}

impl<F: Fn(&[f64]) -> f64> CostFunction for VectorObjective<'_, F> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok(finite_or_penalty((self.f)(param)))
    }
}

struct ScalarObjective<'a, F: Fn(f64) -> f64> {
    f: &'a F,
}

impl<F: Fn(f64) -> f64> CostFunction for ScalarObjective<'_, F> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok(finite_or_penalty((self.f)(*param)))
    }
}

fn initial_simplex(start: &Array1<f64>, step: f64) -> Vec<Vec<f64>> {
    let base: Vec<f64> = start.to_vec();
    let mut simplex = Vec::with_capacity(base.len() + 1);
    simplex.push(base.clone());
    for i in 0..base.len() {
        let mut vertex = base.clone();
        let delta = if vertex[i].abs() > 1e-8 {
            step * vertex[i].abs()
        } else {
            step
        };
        vertex[i] += delta;
        simplex.push(vertex);
    }
    simplex
}

/// Derivative-free minimisation (Nelder–Mead) starting from `start`.
///
/// Running out of iterations is not an error; it is reported through
/// `converged == false` and logged.
pub fn minimize<F>(objective: F, start: &Array1<f64>, options: &MinimizerOptions) -> Result<MinimizeOutcome>
where
    F: Fn(&[f64]) -> f64,
{
    if start.is_empty() {
        let value = objective(&[]);
        return Ok(MinimizeOutcome {
            param: start.clone(),
            value,
            converged: true,
            iterations: 0,
        });
    }

    let solver = NelderMead::new(initial_simplex(start, options.initial_step))
        .with_sd_tolerance(options.sd_tolerance)?;
    let problem = VectorObjective { f: &objective };
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(options.max_iters))
        .run()?;

    let state = res.state();
    let converged = !matches!(
        state.get_termination_reason(),
        Some(TerminationReason::MaxItersReached) | None
    );
    let param = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| ForestError::optimization("Nelder-Mead returned no parameter"))?;
    let iterations = state.get_iter();
    if !converged {
        warn!(
            "Nelder-Mead stopped after {} iterations without converging (best cost {:.6e})",
            iterations,
            state.get_best_cost()
        );
    }

    Ok(MinimizeOutcome {
        value: objective(&param),
        param: Array1::from(param),
        converged,
        iterations,
    })
}

/// Bounded one-dimensional minimisation on `[lo, hi]` with Brent's method.
/// Returns `(argmin, value)`.
pub fn line_search<F>(objective: F, lo: f64, hi: f64, max_iters: u64) -> Result<(f64, f64)>
where
    F: Fn(f64) -> f64,
{
    if !(lo < hi) {
        return Err(ForestError::optimization(format!(
            "empty line-search interval [{}, {}]",
            lo, hi
        )));
    }
    let solver = BrentOpt::new(lo, hi);
    let problem = ScalarObjective { f: &objective };
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()?;
    let state = res.state();
    let arg = *state
        .get_best_param()
        .ok_or_else(|| ForestError::optimization("Brent search returned no parameter"))?;
    Ok((arg, objective(arg)))
}

/// Optional global refinement step: given a starting point and an objective,
/// return a point that is no worse.
pub trait GlobalRefiner: Sync {
    fn refine(&self, start: &Array1<f64>, objective: &dyn Fn(&[f64]) -> f64) -> Array1<f64>;
}

/// Metropolis random walk with a shrinking proposal scale. The best visited
/// point is returned, so the result never has a higher objective than `start`.
#[derive(Debug, Clone)]
pub struct RandomWalkRefiner {
    pub n_steps: usize,
    pub scale: f64,
    pub temperature: f64,
    pub seed: u64,
}

impl Default for RandomWalkRefiner {
    fn default() -> Self {
        Self {
            n_steps: 200,
            scale: 0.1,
            temperature: 1.0,
            seed: 42,
        }
    }
}

impl GlobalRefiner for RandomWalkRefiner {
    fn refine(&self, start: &Array1<f64>, objective: &dyn Fn(&[f64]) -> f64) -> Array1<f64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut current = start.to_vec();
        let mut current_value = finite_or_penalty(objective(&current));
        let mut best = current.clone();
        let mut best_value = current_value;

        for step in 0..self.n_steps {
            let shrink = 1.0 - step as f64 / self.n_steps as f64;
            let proposal: Vec<f64> = current
                .iter()
                .map(|&v| v + self.scale * shrink * rng.gen_range(-1.0..1.0) * v.abs().max(1.0))
                .collect();
            let value = finite_or_penalty(objective(&proposal));
            let accept = value < current_value
                || rng.gen::<f64>() < ((current_value - value) / self.temperature).exp();
            if accept {
                current = proposal;
                current_value = value;
                if value < best_value {
                    best = current.clone();
                    best_value = value;
                }
            }
        }
        debug!("random walk refinement: {:.6e} -> {:.6e}", finite_or_penalty(objective(&start.to_vec())), best_value);
        Array1::from(best)
    }
}
