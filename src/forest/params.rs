use crate::error::{ForestError, Result};
use crate::tree::{TreeOptions, TreeOptionsBuilder};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub num_trees: usize,
    pub tree_options: TreeOptions,
    /// Share of each tree's sample used to grow the structure; the rest
    /// re-estimates the leaves.
    pub proportion_structure: f64,
    pub bootstrap: bool,
    pub honest: bool,
    pub seed: u64,
    /// Worker threads for tree growth; `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(ForestError::config("a forest needs at least one tree"));
        }
        if self.honest && !(self.proportion_structure > 0.0 && self.proportion_structure < 1.0) {
            return Err(ForestError::config(format!(
                "proportion_structure must lie in (0, 1), got {}",
                self.proportion_structure
            )));
        }
        if self.num_threads == Some(0) {
            return Err(ForestError::config("num_threads must be positive"));
        }
        self.tree_options.validate()
    }
}

// Builder for ForestParams
#[derive(Debug, Clone)]
pub struct ForestParamsBuilder {
    num_trees: usize,
    tree_options_builder: TreeOptionsBuilder,
    proportion_structure: f64,
    bootstrap: bool,
    honest: bool,
    seed: u64,
    num_threads: Option<usize>,
}

impl ForestParamsBuilder {
    pub fn new() -> Self {
        Self {
            num_trees: 100,
            tree_options_builder: TreeOptionsBuilder::new(),
            proportion_structure: 0.5,
            bootstrap: true,
            honest: true,
            seed: 42,
            num_threads: None,
        }
    }

    pub fn num_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = num_trees;
        self
    }

    pub fn proportion_structure(mut self, proportion_structure: f64) -> Self {
        self.proportion_structure = proportion_structure;
        self
    }

    pub fn bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn honest(mut self, honest: bool) -> Self {
        self.honest = honest;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn tree_options(mut self, tree_options_builder: TreeOptionsBuilder) -> Self {
        self.tree_options_builder = tree_options_builder;
        self
    }

    // Convenience methods for nested parameters
    pub fn min_count(mut self, min_count: usize) -> Self {
        self.tree_options_builder = self.tree_options_builder.min_count(min_count);
        self
    }

    pub fn min_proportion(mut self, min_proportion: f64) -> Self {
        self.tree_options_builder = self.tree_options_builder.min_proportion(min_proportion);
        self
    }

    pub fn min_mse_improvement(mut self, min_mse_improvement: f64) -> Self {
        self.tree_options_builder = self
            .tree_options_builder
            .min_mse_improvement(min_mse_improvement);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.tree_options_builder = self.tree_options_builder.max_depth(max_depth);
        self
    }

    pub fn num_random_variables(mut self, num_random_variables: usize) -> Self {
        self.tree_options_builder = self
            .tree_options_builder
            .num_random_variables(num_random_variables);
        self
    }

    pub fn build(self) -> ForestParams {
        ForestParams {
            num_trees: self.num_trees,
            tree_options: self.tree_options_builder.build(),
            proportion_structure: self.proportion_structure,
            bootstrap: self.bootstrap,
            honest: self.honest,
            seed: self.seed,
            num_threads: self.num_threads,
        }
    }
}

impl Default for ForestParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParamsBuilder::new().build()
    }
}
