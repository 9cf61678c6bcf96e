use crate::error::{ForestError, Result};
use crate::forest::{ForestParams, ForestParamsBuilder};
use crate::optim::MinimizerOptions;

use super::gmm::WeightingScheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatistic {
    /// `2 N (Q_constrained - Q_unconstrained)`.
    DistanceMetric,
    /// Newey–McFadden Wald statistic on the difference of the two fits.
    Wald,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalValueMethod {
    /// Chi-squared with one degree of freedom per extra leaf.
    Asymptotic,
    /// Adaptive subsampling of the leaves.
    Subsampling,
}

#[derive(Debug, Clone)]
pub struct HomogeneityTestOptions {
    pub statistic: TestStatistic,
    pub weighting: WeightingScheme,
    pub critical_values: CriticalValueMethod,
    pub alpha: f64,
    pub min_draws: usize,
    pub max_draws: usize,
    /// Standard-error multiplier for stopping when `p > alpha`.
    pub c_accept: f64,
    /// Standard-error multiplier for stopping when `p <= alpha`.
    pub c_reject: f64,
    /// Leaf subsamples have `ceil(n_l^subsample_exponent)` observations.
    pub subsample_exponent: f64,
    /// Leaves with fewer honest observations are left out of the test.
    pub min_leaf_obs: usize,
    pub max_gauss_newton_iters: usize,
    pub tolerance: f64,
    pub minimizer: MinimizerOptions,
    pub seed: u64,
    pub num_threads: Option<usize>,
}

impl HomogeneityTestOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ForestError::config(format!("alpha must lie in (0, 1), got {}", self.alpha)));
        }
        if self.min_draws == 0 || self.max_draws < self.min_draws {
            return Err(ForestError::config(format!(
                "need 0 < min_draws <= max_draws, got {} and {}",
                self.min_draws, self.max_draws
            )));
        }
        if !(self.c_accept > 0.0 && self.c_reject > 0.0) {
            return Err(ForestError::config("stopping multipliers must be positive"));
        }
        if !(self.subsample_exponent > 0.0 && self.subsample_exponent < 1.0) {
            return Err(ForestError::config(format!(
                "subsample_exponent must lie in (0, 1), got {}",
                self.subsample_exponent
            )));
        }
        if self.max_gauss_newton_iters == 0 || !(self.tolerance > 0.0) {
            return Err(ForestError::config("Gauss-Newton needs iterations and a positive tolerance"));
        }
        if self.num_threads == Some(0) {
            return Err(ForestError::config("num_threads must be positive"));
        }
        Ok(())
    }
}

// Builder for HomogeneityTestOptions
#[derive(Debug, Clone)]
pub struct HomogeneityTestOptionsBuilder {
    options: HomogeneityTestOptions,
}

impl HomogeneityTestOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: HomogeneityTestOptions {
                statistic: TestStatistic::DistanceMetric,
                weighting: WeightingScheme::TwoStep,
                critical_values: CriticalValueMethod::Subsampling,
                alpha: 0.05,
                min_draws: 100,
                max_draws: 2000,
                c_accept: 3.0,
                c_reject: 2.0,
                subsample_exponent: 0.7,
                min_leaf_obs: 30,
                max_gauss_newton_iters: 20,
                tolerance: 1e-10,
                minimizer: MinimizerOptions::default(),
                seed: 42,
                num_threads: None,
            },
        }
    }

    pub fn statistic(mut self, statistic: TestStatistic) -> Self {
        self.options.statistic = statistic;
        self
    }

    pub fn weighting(mut self, weighting: WeightingScheme) -> Self {
        self.options.weighting = weighting;
        self
    }

    pub fn critical_values(mut self, critical_values: CriticalValueMethod) -> Self {
        self.options.critical_values = critical_values;
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.options.alpha = alpha;
        self
    }

    pub fn draws(mut self, min_draws: usize, max_draws: usize) -> Self {
        self.options.min_draws = min_draws;
        self.options.max_draws = max_draws;
        self
    }

    pub fn stopping_multipliers(mut self, c_accept: f64, c_reject: f64) -> Self {
        self.options.c_accept = c_accept;
        self.options.c_reject = c_reject;
        self
    }

    pub fn subsample_exponent(mut self, subsample_exponent: f64) -> Self {
        self.options.subsample_exponent = subsample_exponent;
        self
    }

    pub fn min_leaf_obs(mut self, min_leaf_obs: usize) -> Self {
        self.options.min_leaf_obs = min_leaf_obs;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.options.num_threads = Some(num_threads);
        self
    }

    pub fn build(self) -> HomogeneityTestOptions {
        self.options
    }
}

impl Default for HomogeneityTestOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for HomogeneityTestOptions {
    fn default() -> Self {
        HomogeneityTestOptionsBuilder::new().build()
    }
}

#[derive(Debug, Clone)]
pub struct HomogeneousSearchParams {
    /// Forest grown at every objective evaluation; keep it small and shallow.
    pub forest: ForestParams,
    pub minimizer: MinimizerOptions,
}

impl HomogeneousSearchParams {
    pub fn validate(&self) -> Result<()> {
        if self.minimizer.max_iters == 0 {
            return Err(ForestError::config("search needs at least one iteration"));
        }
        self.forest.validate()
    }
}

// Builder for HomogeneousSearchParams
#[derive(Debug, Clone)]
pub struct HomogeneousSearchParamsBuilder {
    forest_builder: ForestParamsBuilder,
    minimizer: MinimizerOptions,
}

impl HomogeneousSearchParamsBuilder {
    pub fn new() -> Self {
        Self {
            forest_builder: ForestParamsBuilder::new().num_trees(10).max_depth(3).seed(7),
            minimizer: MinimizerOptions {
                max_iters: 100,
                sd_tolerance: 1e-8,
                initial_step: 0.1,
            },
        }
    }

    pub fn forest(mut self, forest_builder: ForestParamsBuilder) -> Self {
        self.forest_builder = forest_builder;
        self
    }

    pub fn minimizer(mut self, minimizer: MinimizerOptions) -> Self {
        self.minimizer = minimizer;
        self
    }

    // Convenience methods for nested parameters
    pub fn num_trees(mut self, num_trees: usize) -> Self {
        self.forest_builder = self.forest_builder.num_trees(num_trees);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.forest_builder = self.forest_builder.max_depth(max_depth);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.forest_builder = self.forest_builder.seed(seed);
        self
    }

    pub fn max_iters(mut self, max_iters: u64) -> Self {
        self.minimizer.max_iters = max_iters;
        self
    }

    pub fn build(self) -> HomogeneousSearchParams {
        HomogeneousSearchParams {
            forest: self.forest_builder.build(),
            minimizer: self.minimizer,
        }
    }
}

impl Default for HomogeneousSearchParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for HomogeneousSearchParams {
    fn default() -> Self {
        HomogeneousSearchParamsBuilder::new().build()
    }
}
