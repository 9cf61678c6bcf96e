use std::ops::Range;
use std::sync::Arc;

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ForestError, Result};
use crate::split::SplitRule;

/// Non-copying view over shared regressors `x`, outcomes `y` and splitting
/// covariates `z`.
///
/// A lens is an ordered list of row indices into the backing matrices.
/// Indices may repeat (bootstrap draws). Every operation returns a new lens;
/// the receiver and the backing data are never modified.
#[derive(Debug, Clone)]
pub struct DataLens {
    x: Arc<Array2<f64>>,
    y: Arc<Array1<f64>>,
    z: Arc<Array2<f64>>,
    indices: Vec<usize>,
    balance_column: Option<usize>,
}

impl DataLens {
    pub fn new(x: Array2<f64>, y: Array1<f64>, z: Array2<f64>) -> Result<Self> {
        Self::from_shared(Arc::new(x), Arc::new(y), Arc::new(z))
    }

    pub fn from_shared(x: Arc<Array2<f64>>, y: Arc<Array1<f64>>, z: Arc<Array2<f64>>) -> Result<Self> {
        let n = y.len();
        if x.nrows() != n || z.nrows() != n {
            return Err(ForestError::dimension(format!(
                "x has {} rows, y has {} and z has {}",
                x.nrows(),
                n,
                z.nrows()
            )));
        }
        Ok(Self {
            x,
            y,
            z,
            indices: (0..n).collect(),
            balance_column: None,
        })
    }

    /// Marks a column of `x` as a 0/1 treatment indicator whose ratio `split`
    /// preserves on both sides.
    pub fn with_balance_column(mut self, column: usize) -> Result<Self> {
        if column >= self.x.ncols() {
            return Err(ForestError::config(format!(
                "balance column {} out of range for {} regressors",
                column,
                self.x.ncols()
            )));
        }
        self.balance_column = Some(column);
        Ok(self)
    }

    fn with_indices(&self, indices: Vec<usize>) -> Self {
        Self {
            x: Arc::clone(&self.x),
            y: Arc::clone(&self.y),
            z: Arc::clone(&self.z),
            indices,
            balance_column: self.balance_column,
        }
    }

    pub fn num_obs(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_x_cols(&self) -> usize {
        self.x.ncols()
    }

    pub fn num_z_cols(&self) -> usize {
        self.z.ncols()
    }

    /// Number of rows in the backing matrices.
    pub fn num_backing_rows(&self) -> usize {
        self.y.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn x(&self, row: usize, col: usize) -> f64 {
        self.x[[self.indices[row], col]]
    }

    pub fn y(&self, row: usize) -> f64 {
        self.y[self.indices[row]]
    }

    pub fn z(&self, row: usize, col: usize) -> f64 {
        self.z[[self.indices[row], col]]
    }

    pub fn x_row(&self, row: usize) -> ArrayView1<f64> {
        self.x.row(self.indices[row])
    }

    pub fn z_row(&self, row: usize) -> ArrayView1<f64> {
        self.z.row(self.indices[row])
    }

    pub fn x_matrix(&self) -> Array2<f64> {
        self.x.select(Axis(0), &self.indices)
    }

    pub fn y_vector(&self) -> Array1<f64> {
        self.y.select(Axis(0), &self.indices)
    }

    pub fn z_matrix(&self) -> Array2<f64> {
        self.z.select(Axis(0), &self.indices)
    }

    /// Bootstrap draw of the same length, uniformly with replacement.
    pub fn resample<R: Rng + ?Sized>(&self, rng: &mut R) -> DataLens {
        let n = self.num_obs();
        if n == 0 {
            return self.with_indices(Vec::new());
        }
        let indices = (0..n).map(|_| self.indices[rng.gen_range(0..n)]).collect();
        self.with_indices(indices)
    }

    /// Splits the lens into two disjoint parts; the first receives
    /// `proportion` of the observations. With a balance column, each treatment
    /// arm is split separately so both parts keep the arm ratio.
    pub fn split<R: Rng + ?Sized>(&self, proportion: f64, rng: &mut R) -> (DataLens, DataLens) {
        let proportion = proportion.clamp(0.0, 1.0);
        let groups: Vec<Vec<usize>> = match self.balance_column {
            Some(col) => {
                let (treated, control): (Vec<usize>, Vec<usize>) =
                    (0..self.num_obs()).partition(|&i| self.x(i, col) > 0.5);
                vec![treated, control]
            }
            None => vec![(0..self.num_obs()).collect()],
        };

        let mut first = Vec::with_capacity(self.num_obs());
        let mut second = Vec::with_capacity(self.num_obs());
        for mut group in groups {
            group.shuffle(rng);
            let cut = (proportion * group.len() as f64).round() as usize;
            first.extend(group[..cut].iter().map(|&p| self.indices[p]));
            second.extend(group[cut..].iter().map(|&p| self.indices[p]));
        }
        (self.with_indices(first), self.with_indices(second))
    }

    /// Positions are indices into this lens (not into the backing data).
    pub fn subset(&self, positions: &[usize]) -> DataLens {
        self.with_indices(positions.iter().map(|&p| self.indices[p]).collect())
    }

    pub fn slice(&self, rows: Range<usize>) -> DataLens {
        let end = rows.end.min(self.num_obs());
        let start = rows.start.min(end);
        self.with_indices(self.indices[start..end].to_vec())
    }

    /// Routes every observation through `rule`, returning `(left, right)`.
    pub fn subset_by_rule(&self, rule: &SplitRule) -> (DataLens, DataLens) {
        let (left, right): (Vec<usize>, Vec<usize>) = self
            .indices
            .iter()
            .partition(|&&idx| rule.goes_left(self.z.row(idx)));
        (self.with_indices(left), self.with_indices(right))
    }

    /// Observed `(min, max)` of a splitting covariate, `None` when empty.
    pub fn z_range(&self, col: usize) -> Option<(f64, f64)> {
        self.indices
            .iter()
            .map(|&idx| self.z[[idx, col]])
            .minmax()
            .into_option()
    }

    /// Distinct levels of a discrete splitting covariate, sorted.
    pub fn discrete_levels(&self, col: usize) -> Vec<i64> {
        self.indices
            .iter()
            .map(|&idx| self.z[[idx, col]].round() as i64)
            .sorted_unstable()
            .dedup()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn small_lens() -> DataLens {
        let n = 20;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { 1.0 } else { (i % 2) as f64 });
        let y = Array1::from_shape_fn(n, |i| i as f64);
        let z = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        DataLens::new(x, y, z).unwrap()
    }

    #[test]
    fn test_dimension_mismatch() {
        let res = DataLens::new(Array2::zeros((3, 1)), Array1::zeros(2), Array2::zeros((3, 1)));
        assert!(matches!(res, Err(ForestError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_resample_in_range() {
        let lens = small_lens();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let boot = lens.resample(&mut rng);
            assert_eq!(boot.num_obs(), lens.num_obs());
            assert!(boot.indices().iter().all(|&i| i < lens.num_backing_rows()));
        }
    }

    #[test]
    fn test_split_disjoint_and_exhaustive() {
        let lens = small_lens();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (a, b) = lens.split(0.5, &mut rng);
            assert_eq!(a.num_obs() + b.num_obs(), lens.num_obs());
            let mut all: Vec<usize> = a.indices().iter().chain(b.indices()).copied().collect();
            all.sort_unstable();
            assert_eq!(all, (0..20).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_balanced_split_keeps_ratio() {
        let lens = small_lens().with_balance_column(1).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let (a, _) = lens.split(0.5, &mut rng);
        let treated = (0..a.num_obs()).filter(|&i| a.x(i, 1) > 0.5).count();
        assert_eq!(treated, 5);
        assert_eq!(a.num_obs(), 10);
    }

    #[test]
    fn test_subset_by_rule_and_slice() {
        let lens = small_lens();
        let rule = SplitRule::Continuous {
            variable: 0,
            threshold: 5.0,
        };
        let (left, right) = lens.subset_by_rule(&rule);
        assert_eq!(left.num_obs(), 5);
        assert_eq!(right.num_obs(), 15);
        assert_eq!(left.y_vector(), array![0.0, 1.0, 2.0, 3.0, 4.0]);

        let sliced = lens.slice(18..40);
        assert_eq!(sliced.num_obs(), 2);
        assert_eq!(lens.slice(30..40).num_obs(), 0);
    }

    #[test]
    fn test_levels_and_range() {
        let lens = small_lens();
        assert_eq!(lens.z_range(0), Some((0.0, 19.0)));
        assert_eq!(lens.discrete_levels(0).len(), 20);
        assert_eq!(lens.slice(0..0).z_range(0), None);
    }
}
