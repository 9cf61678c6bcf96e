use ndarray::ArrayView1;

use crate::lens::DataLens;
use crate::partition::IntegerPartition;

/// One binary split on a splitting covariate.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitRule {
    /// `z[variable] < threshold` goes left.
    Continuous { variable: usize, threshold: f64 },
    /// Levels in the partition's left set go left.
    Discrete {
        variable: usize,
        partition: IntegerPartition,
    },
}

impl SplitRule {
    pub fn variable(&self) -> usize {
        match self {
            SplitRule::Continuous { variable, .. } | SplitRule::Discrete { variable, .. } => {
                *variable
            }
        }
    }

    pub fn goes_left(&self, z_row: ArrayView1<f64>) -> bool {
        match self {
            SplitRule::Continuous {
                variable,
                threshold,
            } => z_row[*variable] < *threshold,
            SplitRule::Discrete {
                variable,
                partition,
            } => partition.is_left(z_row[*variable].round() as i64),
        }
    }
}

/// A rule together with the two lenses it produces.
#[derive(Debug, Clone)]
pub struct SplitContainer {
    pub rule: SplitRule,
    pub left: DataLens,
    pub right: DataLens,
}

impl SplitContainer {
    pub fn new(lens: &DataLens, rule: SplitRule) -> Self {
        let (left, right) = lens.subset_by_rule(&rule);
        Self { rule, left, right }
    }

    pub fn is_degenerate(&self) -> bool {
        self.left.is_empty() || self.right.is_empty()
    }
}
