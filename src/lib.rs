pub mod error;
pub mod forest;
pub mod homogeneity;
pub mod lens;
pub mod linalg;
pub mod models;
pub mod moment;
pub mod optim;
pub mod partition;
pub mod split;
pub mod test_data;
pub mod tree;

pub use error::{ForestError, Result};
pub use forest::{cross_validate, grow_forest, ForestParams, ForestParamsBuilder, MomentForest};
pub use homogeneity::{
    impose_homogeneity, test_forest_homogeneity, HomogeneityReport, HomogeneityTestOptions,
    HomogeneityTestOptionsBuilder, HomogeneousSearchContainer, HomogeneousSearchParams,
};
pub use lens::DataLens;
pub use moment::{ContainerMoment, HomogeneousParameters, MomentSpecification};
pub use split::SplitRule;
pub use tree::{TreeMoment, TreeOptions, TreeOptionsBuilder};
