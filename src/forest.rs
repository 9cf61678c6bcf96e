pub mod cv;
pub mod forest_fitter;
pub mod params;

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::{rngs::StdRng, SeedableRng};

use crate::error::Result;
use crate::lens::DataLens;
use crate::moment::MomentSpecification;
use crate::tree::TreeMoment;

pub use cv::{cross_validate, CvCell, CvGrid, CvOutcome};
pub use forest_fitter::grow_forest;
pub use params::{ForestParams, ForestParamsBuilder};

/// Seeds of the three random steps of one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSeeds {
    pub resample: u64,
    pub split: u64,
    pub grow: u64,
}

/// Draws a tree's structure and honesty samples from the forest-level lens.
///
/// The lens is split first so no backing row reaches both samples. Only the
/// structure sample is bootstrapped; the honesty sample keeps each row once.
/// Without honesty both are the same sample.
pub fn draw_tree_lenses(root: &DataLens, seeds: &TreeSeeds, params: &ForestParams) -> (DataLens, DataLens) {
    let bootstrap = |lens: DataLens| {
        if params.bootstrap {
            lens.resample(&mut StdRng::seed_from_u64(seeds.resample))
        } else {
            lens
        }
    };
    if params.honest {
        let (structure, honest) = root.split(
            params.proportion_structure,
            &mut StdRng::seed_from_u64(seeds.split),
        );
        (bootstrap(structure), honest)
    } else {
        let sample = bootstrap(root.clone());
        (sample.clone(), sample)
    }
}

#[derive(Debug, Clone)]
pub struct MomentForest {
    trees: Vec<TreeMoment>,
    seeds: Vec<TreeSeeds>,
    params: ForestParams,
}

impl MomentForest {
    pub(crate) fn new(trees: Vec<TreeMoment>, seeds: Vec<TreeSeeds>, params: ForestParams) -> Self {
        Self {
            trees,
            seeds,
            params,
        }
    }

    /// Forest over already grown trees. It carries no seeds, so
    /// [`MomentForest::tree_lenses`] returns `None`.
    pub fn from_trees(trees: Vec<TreeMoment>) -> Self {
        Self {
            trees,
            seeds: Vec::new(),
            params: ForestParams::default(),
        }
    }

    pub fn trees(&self) -> &[TreeMoment] {
        &self.trees
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Regenerates the structure and honesty samples tree `i` was grown
    /// from, given the lens the forest was grown on.
    pub fn tree_lenses(&self, i: usize, root: &DataLens) -> Option<(DataLens, DataLens)> {
        self.seeds
            .get(i)
            .map(|seeds| draw_tree_lenses(root, seeds, &self.params))
    }

    /// Equal-weight average of the trees' estimates at `z`. Trees without an
    /// estimate there are left out; `None` if no tree has one.
    pub fn estimated_beta(&self, z: ArrayView1<f64>) -> Option<Array1<f64>> {
        let mut sum: Option<Array1<f64>> = None;
        let mut count = 0usize;
        for beta in self.trees.iter().filter_map(|tree| tree.estimated_beta(z)) {
            match sum.as_mut() {
                Some(acc) => *acc += beta,
                None => sum = Some(beta.clone()),
            }
            count += 1;
        }
        sum.map(|acc| acc / count as f64)
    }

    pub fn predicted_y<S: MomentSpecification>(&self, spec: &S, x: ArrayView1<f64>, z: ArrayView1<f64>) -> Option<f64> {
        self.estimated_beta(z).map(|beta| spec.predicted_y(x, beta.view()))
    }

    pub fn predict_betas(&self, z: ArrayView2<f64>) -> Vec<Option<Array1<f64>>> {
        z.axis_iter(Axis(0))
            .map(|row| self.estimated_beta(row))
            .collect()
    }

    /// Mean per-observation goodness of fit on `lens`; `+inf` when no
    /// observation can be predicted.
    pub fn out_of_sample_fit<S: MomentSpecification>(&self, spec: &S, lens: &DataLens) -> f64 {
        let losses: Vec<f64> = (0..lens.num_obs())
            .filter_map(|i| {
                self.estimated_beta(lens.z_row(i))
                    .map(|beta| spec.goodness_of_fit(lens.y(i), lens.x_row(i), beta.view()))
            })
            .collect();
        if losses.is_empty() {
            f64::INFINITY
        } else {
            losses.iter().sum::<f64>() / losses.len() as f64
        }
    }
}

/// Runs `f` on a dedicated pool of `num_threads` workers, or on the global
/// pool when `None`.
#[cfg(feature = "use-rayon")]
pub(crate) fn with_pool<T, F>(num_threads: Option<usize>, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match num_threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| crate::error::ForestError::config(e.to_string()))?;
            Ok(pool.install(f))
        }
        None => Ok(f()),
    }
}

#[cfg(not(feature = "use-rayon"))]
pub(crate) fn with_pool<T, F>(_num_threads: Option<usize>, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    Ok(f())
}
