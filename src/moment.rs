//! The model capability the tree and forest call into.
//!
//! A [`MomentSpecification`] knows how to fit its model on any [`DataLens`]
//! and hands back a [`ContainerMoment`] holding the fit. The core never looks
//! at which concrete model it is driving.
use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1};

use crate::lens::DataLens;

/// A fitted model on one data subset.
///
/// A failed fit (too few observations, singular system, optimizer failure)
/// has `beta() == None` and an infinite goodness of fit.
pub trait ContainerMoment {
    fn beta(&self) -> Option<&Array1<f64>>;

    fn variance(&self) -> Option<&Array2<f64>>;

    /// Lower is better; `+inf` marks a failed fit.
    fn goodness_of_fit(&self) -> f64;

    fn num_obs(&self) -> usize;

    /// Sum over observations of the moment vector at `beta` (length
    /// `num_moments`), not divided by the number of observations.
    fn moment_g(&self, beta: ArrayView1<f64>) -> Array1<f64>;

    /// Moment contribution of observation `i`.
    fn moment_gi(&self, beta: ArrayView1<f64>, i: usize) -> Array1<f64>;

    /// Jacobian of [`ContainerMoment::moment_g`], `num_moments x num_params`,
    /// not divided by the number of observations.
    fn jacobian(&self, beta: ArrayView1<f64>) -> Array2<f64>;

    fn is_valid(&self) -> bool {
        self.beta().is_some() && self.goodness_of_fit().is_finite()
    }
}

/// Parameters fixed to a common value across the whole population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomogeneousParameters {
    values: BTreeMap<usize, f64>,
}

impl HomogeneousParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.values.keys().copied().collect()
    }

    pub fn is_homogeneous(&self, k: usize) -> bool {
        self.values.contains_key(&k)
    }

    pub fn get(&self, k: usize) -> Option<f64> {
        self.values.get(&k).copied()
    }

    pub fn set(&mut self, k: usize, value: f64) {
        self.values.insert(k, value);
    }

    pub fn remove(&mut self, k: usize) -> Option<f64> {
        self.values.remove(&k)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }
}

pub trait MomentSpecification: Sync {
    type Container: ContainerMoment + Send;

    /// Fits the model on `lens`.
    ///
    /// With `all_params_homogeneous == false` parameters registered in
    /// [`MomentSpecification::homogeneous_parameters`] are held at their
    /// values and only the rest are estimated. With `true` every parameter is
    /// estimated on this lens, as for a single pooled region.
    fn compute_optimal_beta(&self, lens: &DataLens, all_params_homogeneous: bool) -> Self::Container;

    /// One flag per column of `z`: `true` for categorical covariates.
    fn discrete_vector(&self) -> &[bool];

    /// Columns of `z` the split search may use.
    fn variables_to_search(&self) -> &[usize];

    fn num_params(&self) -> usize;

    fn num_moments(&self) -> usize;

    fn predicted_y(&self, x: ArrayView1<f64>, beta: ArrayView1<f64>) -> f64;

    /// Per-observation loss used for out-of-sample evaluation.
    fn goodness_of_fit(&self, y: f64, x: ArrayView1<f64>, beta: ArrayView1<f64>) -> f64;

    fn homogeneous_parameters(&self) -> &HomogeneousParameters;

    fn homogeneous_parameters_mut(&mut self) -> &mut HomogeneousParameters;

    fn homogeneous_index(&self) -> Vec<usize> {
        self.homogeneous_parameters().indices()
    }

    /// Flags `k` as homogeneous, keeping any value already set (0 otherwise).
    fn set_homogeneous_index(&mut self, k: usize) {
        let value = self.homogeneous_parameters().get(k).unwrap_or(0.0);
        self.homogeneous_parameters_mut().set(k, value);
    }

    fn homogeneous_parameter(&self, k: usize) -> Option<f64> {
        self.homogeneous_parameters().get(k)
    }

    fn set_homogeneous_parameter(&mut self, k: usize, value: f64) {
        self.homogeneous_parameters_mut().set(k, value);
    }

    fn clear_homogeneous(&mut self) {
        self.homogeneous_parameters_mut().clear();
    }
}
