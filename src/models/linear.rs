use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::lens::DataLens;
use crate::linalg::{invert_spd, solve_spd};
use crate::moment::{ContainerMoment, HomogeneousParameters, MomentSpecification};

/// Linear regression `y = x'beta + e` written as the moment condition
/// `E[x (y - x'beta)] = 0`. Goodness of fit is the sum of squared residuals,
/// so the fits of the two sides of a split add up to a number comparable with
/// the fit of the parent.
#[derive(Debug, Clone)]
pub struct LinearMomentSpecification {
    num_params: usize,
    discrete: Vec<bool>,
    search: Vec<usize>,
    min_obs: usize,
    homogeneous: HomogeneousParameters,
}

impl LinearMomentSpecification {
    /// `discrete` has one entry per column of `z`; every column is searched.
    pub fn new(num_params: usize, discrete: Vec<bool>) -> Self {
        let search = (0..discrete.len()).collect();
        Self {
            num_params,
            discrete,
            search,
            min_obs: num_params + 1,
            homogeneous: HomogeneousParameters::new(),
        }
    }

    pub fn with_variables_to_search(mut self, search: Vec<usize>) -> Self {
        self.search = search;
        self
    }

    /// Fits on fewer observations than this fail.
    pub fn with_min_obs(mut self, min_obs: usize) -> Self {
        self.min_obs = min_obs;
        self
    }
}

impl MomentSpecification for LinearMomentSpecification {
    type Container = LinearContainer;

    fn compute_optimal_beta(&self, lens: &DataLens, all_params_homogeneous: bool) -> LinearContainer {
        let fixed: Vec<(usize, f64)> = if all_params_homogeneous {
            Vec::new()
        } else {
            self.homogeneous.iter().collect()
        };
        LinearContainer::fit(lens.x_matrix(), lens.y_vector(), &fixed, self.min_obs)
    }

    fn discrete_vector(&self) -> &[bool] {
        &self.discrete
    }

    fn variables_to_search(&self) -> &[usize] {
        &self.search
    }

    fn num_params(&self) -> usize {
        self.num_params
    }

    fn num_moments(&self) -> usize {
        self.num_params
    }

    fn predicted_y(&self, x: ArrayView1<f64>, beta: ArrayView1<f64>) -> f64 {
        x.dot(&beta)
    }

    fn goodness_of_fit(&self, y: f64, x: ArrayView1<f64>, beta: ArrayView1<f64>) -> f64 {
        (y - x.dot(&beta)).powi(2)
    }

    fn homogeneous_parameters(&self) -> &HomogeneousParameters {
        &self.homogeneous
    }

    fn homogeneous_parameters_mut(&mut self) -> &mut HomogeneousParameters {
        &mut self.homogeneous
    }
}

#[derive(Debug, Clone)]
pub struct LinearContainer {
    x: Array2<f64>,
    y: Array1<f64>,
    beta: Option<Array1<f64>>,
    variance: Option<Array2<f64>>,
    sse: f64,
}

impl LinearContainer {
    /// Least squares with the parameters in `fixed` held at their values.
    pub fn fit(x: Array2<f64>, y: Array1<f64>, fixed: &[(usize, f64)], min_obs: usize) -> Self {
        let n = y.len();
        let k = x.ncols();
        let free: Vec<usize> = (0..k)
            .filter(|j| !fixed.iter().any(|(f, _)| f == j))
            .collect();

        if n < min_obs.max(free.len() + 1) {
            return Self::failed(x, y);
        }

        let mut beta = Array1::zeros(k);
        let mut y_adj = y.clone();
        for &(j, value) in fixed.iter().filter(|(j, _)| *j < k) {
            beta[j] = value;
            y_adj.scaled_add(-value, &x.column(j));
        }

        let mut variance = Array2::zeros((k, k));
        if !free.is_empty() {
            let xf = x.select(Axis(1), &free);
            let xtx = xf.t().dot(&xf);
            let xty = xf.t().dot(&y_adj);
            let (Some(beta_free), Some(xtx_inv)) =
                (solve_spd(xtx.view(), xty.view()), invert_spd(xtx.view()))
            else {
                return Self::failed(x, y);
            };
            for (a, &j) in free.iter().enumerate() {
                beta[j] = beta_free[a];
            }
            let resid = &y - &x.dot(&beta);
            let sigma2 = resid.dot(&resid) / (n - free.len()) as f64;
            for (a, &i) in free.iter().enumerate() {
                for (b, &j) in free.iter().enumerate() {
                    variance[[i, j]] = sigma2 * xtx_inv[[a, b]];
                }
            }
        }

        let resid = &y - &x.dot(&beta);
        let sse = resid.dot(&resid);
        Self {
            x,
            y,
            beta: Some(beta),
            variance: Some(variance),
            sse,
        }
    }

    fn failed(x: Array2<f64>, y: Array1<f64>) -> Self {
        Self {
            x,
            y,
            beta: None,
            variance: None,
            sse: f64::INFINITY,
        }
    }
}

impl ContainerMoment for LinearContainer {
    fn beta(&self) -> Option<&Array1<f64>> {
        self.beta.as_ref()
    }

    fn variance(&self) -> Option<&Array2<f64>> {
        self.variance.as_ref()
    }

    fn goodness_of_fit(&self) -> f64 {
        self.sse
    }

    fn num_obs(&self) -> usize {
        self.y.len()
    }

    fn moment_g(&self, beta: ArrayView1<f64>) -> Array1<f64> {
        let resid = &self.y - &self.x.dot(&beta);
        self.x.t().dot(&resid)
    }

    fn moment_gi(&self, beta: ArrayView1<f64>, i: usize) -> Array1<f64> {
        let xi = self.x.row(i);
        let resid = self.y[i] - xi.dot(&beta);
        xi.to_owned() * resid
    }

    fn jacobian(&self, _beta: ArrayView1<f64>) -> Array2<f64> {
        -self.x.t().dot(&self.x)
    }
}
