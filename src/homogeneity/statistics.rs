use log::debug;

use crate::error::{ForestError, Result};
use crate::moment::ContainerMoment;

use super::gmm::{GmmFit, StackedGmm, WeightingScheme};
use super::params::{HomogeneityTestOptions, TestStatistic};

/// Both statistics for one parameter over the leaves of one tree.
#[derive(Debug, Clone)]
pub struct HomogeneityStatistic {
    pub parameter: usize,
    pub distance_metric: f64,
    pub wald: f64,
    pub degrees_of_freedom: usize,
    pub unconstrained: GmmFit,
    pub constrained: GmmFit,
    /// Common value of the parameter under the constraint.
    pub shared_value: f64,
    pub num_obs: usize,
}

impl HomogeneityStatistic {
    pub fn value(&self, statistic: TestStatistic) -> f64 {
        match statistic {
            TestStatistic::DistanceMetric => self.distance_metric,
            TestStatistic::Wald => self.wald,
        }
    }

    /// Whether both fits reached their stopping tolerance.
    pub fn converged(&self) -> bool {
        self.unconstrained.converged && self.constrained.converged
    }
}

/// Tests that parameter `k` takes one value in every leaf. `leaves` holds one
/// valid fit per leaf, at least two of them.
pub fn compute_statistic<C: ContainerMoment>(
    leaves: &[C],
    k: usize,
    options: &HomogeneityTestOptions,
) -> Result<HomogeneityStatistic> {
    if leaves.len() < 2 {
        return Err(ForestError::homogeneity(format!(
            "need at least two leaves, got {}",
            leaves.len()
        )));
    }
    let gmm = StackedGmm::new(leaves, options.max_gauss_newton_iters, options.tolerance)?;
    if leaves[0].beta().map_or(true, |b| k >= b.len()) {
        return Err(ForestError::homogeneity(format!("no parameter {}", k)));
    }
    let n = gmm.total_obs();

    let (unconstrained, constrained, weights_u, weights_c) = match options.weighting {
        WeightingScheme::TwoStep => {
            let first = gmm.fit_fixed(gmm.start(None), &gmm.identity_weights(), None)?;
            let weights = gmm
                .efficient_weights(&first.betas)
                .ok_or_else(|| ForestError::homogeneity("singular moment covariance"))?;
            let unconstrained = gmm.fit_fixed(first.betas, &weights, None)?;
            let constrained = gmm.fit_fixed(gmm.start(Some(k)), &weights, Some(k))?;
            (unconstrained, constrained, weights.clone(), weights)
        }
        WeightingScheme::ContinuouslyUpdated => {
            let unconstrained = gmm.fit_cue(None, &options.minimizer)?;
            let constrained = gmm.fit_cue(Some(k), &options.minimizer)?;
            let weights_u = gmm
                .efficient_weights(&unconstrained.betas)
                .ok_or_else(|| ForestError::homogeneity("singular moment covariance"))?;
            let weights_c = gmm
                .efficient_weights(&constrained.betas)
                .ok_or_else(|| ForestError::homogeneity("singular moment covariance"))?;
            (unconstrained, constrained, weights_u, weights_c)
        }
    };

    let q_u = gmm.objective(&unconstrained.betas, &weights_u);
    let q_c = gmm.objective(&constrained.betas, &weights_c);
    let distance_metric = (2.0 * n * (q_c - q_u)).max(0.0);
    let wald = gmm
        .wald(&unconstrained.betas, &constrained.betas, &weights_u)
        .max(0.0);
    let shared_value = constrained.betas[0][k];

    debug!(
        "parameter {} over {} leaves: DM {:.4}, Wald {:.4}, shared value {:.4}",
        k,
        gmm.num_leaves(),
        distance_metric,
        wald,
        shared_value
    );

    Ok(HomogeneityStatistic {
        parameter: k,
        distance_metric,
        wald,
        degrees_of_freedom: gmm.num_leaves() - 1,
        unconstrained,
        constrained,
        shared_value,
        num_obs: n as usize,
    })
}
