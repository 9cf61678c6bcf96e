use crate::error::{ForestError, Result};

#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Minimum number of observations on each side of a split.
    pub min_count: usize,
    /// Minimum share of the node's observations on each side of a split.
    pub min_proportion: f64,
    /// Minimum relative improvement of the fit needed to split.
    pub min_mse_improvement: f64,
    pub max_depth: usize,
    /// Size of the random subset of variables searched at each node; `None`
    /// searches every variable.
    pub num_random_variables: Option<usize>,
    /// Points of the uniform grid pass after the line search.
    pub grid_points: usize,
    pub line_search_iters: u64,
}

// Builder for TreeOptions
#[derive(Debug, Clone)]
pub struct TreeOptionsBuilder {
    min_count: usize,
    min_proportion: f64,
    min_mse_improvement: f64,
    max_depth: usize,
    num_random_variables: Option<usize>,
    grid_points: usize,
    line_search_iters: u64,
}

impl TreeOptionsBuilder {
    pub fn new() -> Self {
        Self {
            min_count: 50,
            min_proportion: 0.001,
            min_mse_improvement: 0.01,
            max_depth: 100,
            num_random_variables: None,
            grid_points: 20,
            line_search_iters: 100,
        }
    }

    pub fn min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count;
        self
    }

    pub fn min_proportion(mut self, min_proportion: f64) -> Self {
        self.min_proportion = min_proportion;
        self
    }

    pub fn min_mse_improvement(mut self, min_mse_improvement: f64) -> Self {
        self.min_mse_improvement = min_mse_improvement;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn num_random_variables(mut self, num_random_variables: usize) -> Self {
        self.num_random_variables = Some(num_random_variables);
        self
    }

    pub fn grid_points(mut self, grid_points: usize) -> Self {
        self.grid_points = grid_points;
        self
    }

    pub fn line_search_iters(mut self, line_search_iters: u64) -> Self {
        self.line_search_iters = line_search_iters;
        self
    }

    pub fn build(self) -> TreeOptions {
        TreeOptions {
            min_count: self.min_count,
            min_proportion: self.min_proportion,
            min_mse_improvement: self.min_mse_improvement,
            max_depth: self.max_depth,
            num_random_variables: self.num_random_variables,
            grid_points: self.grid_points,
            line_search_iters: self.line_search_iters,
        }
    }
}

impl Default for TreeOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TreeOptions {
    fn default() -> Self {
        TreeOptionsBuilder::new().build()
    }
}

impl TreeOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.min_proportion) {
            return Err(ForestError::config(format!(
                "min_proportion must lie in [0, 0.5), got {}",
                self.min_proportion
            )));
        }
        if !self.min_mse_improvement.is_finite() || self.min_mse_improvement < 0.0 {
            return Err(ForestError::config(format!(
                "min_mse_improvement must be finite and non-negative, got {}",
                self.min_mse_improvement
            )));
        }
        if self.num_random_variables == Some(0) {
            return Err(ForestError::config("num_random_variables must be positive"));
        }
        Ok(())
    }
}
