//! Simulated data sets with known parameter surfaces, used by the tests, the
//! bench and the demo binary.
//!
//! Every generator produces `x = [1, d]` with `d ~ N(0, 1)` and
//! `y = alpha + beta(z) d + e`, `e ~ N(0, noise_sd^2)`.
use ndarray::{Array1, Array2};
use rand::{distributions::Distribution, rngs::StdRng, Rng, SeedableRng};
use statrs::distribution::Normal;

use crate::error::{ForestError, Result};
use crate::lens::DataLens;

pub const INTERCEPT: f64 = 0.5;

fn normal(sd: f64) -> Result<Normal> {
    Normal::new(0.0, sd).map_err(|e| ForestError::config(format!("invalid noise level: {}", e)))
}

fn build<F>(n: usize, z: Array2<f64>, noise_sd: f64, rng: &mut StdRng, slope: F) -> Result<DataLens>
where
    F: Fn(usize) -> f64,
{
    let std_normal = normal(1.0)?;
    let noise = normal(noise_sd.max(f64::MIN_POSITIVE))?;
    let d: Array1<f64> = (0..n).map(|_| std_normal.sample(rng)).collect();
    let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { 1.0 } else { d[i] });
    let y: Array1<f64> = (0..n)
        .map(|i| INTERCEPT + slope(i) * d[i] + noise.sample(rng))
        .collect();
    DataLens::new(x, y, z)
}

/// Slope of [`step_effect`] at `z`.
pub fn step_slope(z: f64) -> f64 {
    if z < 5.0 {
        1.0
    } else {
        3.0
    }
}

/// One continuous covariate `z ~ U[0, 10]`, slope 1 below 5 and 3 above; the
/// intercept is the same everywhere.
pub fn step_effect(n: usize, noise_sd: f64, seed: u64) -> Result<DataLens> {
    let mut rng = StdRng::seed_from_u64(seed);
    let z = Array2::from_shape_fn((n, 1), |_| rng.gen_range(0.0..10.0));
    let slopes: Vec<f64> = z.column(0).iter().map(|&v| step_slope(v)).collect();
    build(n, z, noise_sd, &mut rng, |i| slopes[i])
}

/// Levels `{0, 2}` of the discrete covariate in column 0.
pub const DISCRETE_LOW_LEVELS: [i64; 2] = [0, 2];

/// Column 0 is a categorical covariate with levels `0..5`; levels 0 and 2
/// have slope 1, the rest slope 3. Column 1 is uniform noise.
pub fn discrete_effect(n: usize, noise_sd: f64, seed: u64) -> Result<DataLens> {
    let mut rng = StdRng::seed_from_u64(seed);
    let z = Array2::from_shape_fn((n, 2), |(_, j)| {
        if j == 0 {
            rng.gen_range(0..5) as f64
        } else {
            rng.gen_range(0.0..1.0)
        }
    });
    let slopes: Vec<f64> = z
        .column(0)
        .iter()
        .map(|&v| {
            if DISCRETE_LOW_LEVELS.contains(&(v as i64)) {
                1.0
            } else {
                3.0
            }
        })
        .collect();
    build(n, z, noise_sd, &mut rng, |i| slopes[i])
}

/// Two uniform covariates that carry no heterogeneity: slope 2 everywhere.
pub fn homogeneous_effect(n: usize, noise_sd: f64, seed: u64) -> Result<DataLens> {
    let mut rng = StdRng::seed_from_u64(seed);
    let z = Array2::from_shape_fn((n, 2), |_| rng.gen_range(0.0..10.0));
    build(n, z, noise_sd, &mut rng, |_| 2.0)
}
