//! Tests whether a parameter takes one common value across the leaves of the
//! trees, and estimates that value when it does.
//!
//! Per tree and parameter, an unconstrained stacked GMM fit (one value per
//! leaf) is compared with a fit that ties the parameter across leaves, by a
//! distance-metric or a Wald statistic. p-values come from adaptive
//! subsampling or the chi-squared limit. Trees then vote, and the parameters
//! a majority accepts are re-estimated jointly by
//! [`HomogeneousSearchContainer`].
pub mod gmm;
pub mod params;
pub mod search;
pub mod statistics;
pub mod subsample;
pub mod voting;

pub use gmm::{GmmFit, WeightingScheme};
pub use params::{
    CriticalValueMethod, HomogeneityTestOptions, HomogeneityTestOptionsBuilder, HomogeneousSearchParams,
    HomogeneousSearchParamsBuilder, TestStatistic,
};
pub use search::{impose_homogeneity, HomogeneousSearchContainer, HomogeneousSearchOutcome};
pub use statistics::{compute_statistic, HomogeneityStatistic};
pub use subsample::{asymptotic_p_value, subsample_p_value, PValue};
pub use voting::{test_forest_homogeneity, test_tree_homogeneity, HomogeneityReport, ParameterTest, ParameterVote};
