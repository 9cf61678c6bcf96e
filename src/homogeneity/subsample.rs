//! p-values for the homogeneity statistics.
//!
//! The subsampling p-value is the share of leaf-wise subsamples whose
//! statistic is at least the full-sample one. Draws continue until the Monte
//! Carlo error of that share is small next to its distance from `alpha`.
use log::{debug, warn};
use rand::{seq::index::sample, Rng};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::error::{ForestError, Result};
use crate::lens::DataLens;
use crate::moment::{ContainerMoment, MomentSpecification};

use super::params::HomogeneityTestOptions;
use super::statistics::compute_statistic;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PValue {
    pub p_value: f64,
    /// Subsamples used; zero for the asymptotic p-value.
    pub draws: usize,
}

/// Upper tail of the chi-squared distribution.
pub fn asymptotic_p_value(statistic: f64, degrees_of_freedom: usize) -> Result<PValue> {
    let chi2 = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| ForestError::homogeneity(format!("chi-squared({}): {}", degrees_of_freedom, e)))?;
    Ok(PValue {
        p_value: chi2.sf(statistic),
        draws: 0,
    })
}

/// Subsample size for a leaf of `n` observations, strictly below `n`.
pub fn subsample_size(n: usize, exponent: f64) -> usize {
    let size = (n as f64).powf(exponent).ceil() as usize;
    size.min(n.saturating_sub(1)).max(1)
}

/// Whether `exceed` hits out of `draws` pin the p-value down on one side of
/// `alpha`.
pub fn should_stop(exceed: usize, draws: usize, options: &HomogeneityTestOptions) -> bool {
    if draws < options.min_draws {
        return false;
    }
    if draws >= options.max_draws {
        return true;
    }
    let p = exceed as f64 / draws as f64;
    let se = (p * (1.0 - p) / draws as f64).sqrt();
    if se == 0.0 {
        return true;
    }
    let multiplier = if p > options.alpha {
        options.c_accept
    } else {
        options.c_reject
    };
    (p - options.alpha).abs() > multiplier * se
}

/// Subsampling p-value of `full_statistic` for parameter `k`. Each draw
/// subsamples every leaf without replacement and refits it.
pub fn subsample_p_value<S, R>(
    spec: &S,
    leaves: &[DataLens],
    k: usize,
    full_statistic: f64,
    options: &HomogeneityTestOptions,
    rng: &mut R,
) -> Result<PValue>
where
    S: MomentSpecification,
    R: Rng + ?Sized,
{
    let sizes: Vec<usize> = leaves
        .iter()
        .map(|lens| subsample_size(lens.num_obs(), options.subsample_exponent))
        .collect();

    let mut exceed = 0usize;
    let mut draws = 0usize;
    let mut attempts = 0usize;
    while attempts < 2 * options.max_draws {
        attempts += 1;
        let containers: Vec<S::Container> = leaves
            .iter()
            .zip(&sizes)
            .map(|(lens, &size)| {
                let positions = sample(&mut *rng, lens.num_obs(), size).into_vec();
                spec.compute_optimal_beta(&lens.subset(&positions), true)
            })
            .collect();
        if containers.iter().any(|c| !c.is_valid()) {
            continue;
        }
        let statistic = match compute_statistic(&containers, k, options) {
            Ok(statistic) if statistic.converged() => statistic,
            _ => continue,
        };
        draws += 1;
        if statistic.value(options.statistic) >= full_statistic {
            exceed += 1;
        }
        if should_stop(exceed, draws, options) {
            break;
        }
    }

    if draws == 0 {
        return Err(ForestError::homogeneity(format!(
            "no usable subsample for parameter {} in {} attempts",
            k, attempts
        )));
    }
    if draws < options.min_draws {
        warn!(
            "only {} of {} attempted subsamples were usable for parameter {}",
            draws, attempts, k
        );
    }
    let p_value = exceed as f64 / draws as f64;
    debug!("parameter {}: subsampling p-value {:.4} from {} draws", k, p_value, draws);
    Ok(PValue { p_value, draws })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homogeneity::params::HomogeneityTestOptionsBuilder;
    use crate::models::LinearMomentSpecification;
    use crate::split::SplitRule;
    use crate::test_data::step_effect;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_asymptotic_p_value() {
        // 95% quantile of chi-squared(1).
        let p = asymptotic_p_value(3.841_458_820_694_124, 1).unwrap();
        assert_abs_diff_eq!(p.p_value, 0.05, epsilon = 1e-6);
        assert_eq!(p.draws, 0);
        assert_abs_diff_eq!(asymptotic_p_value(0.0, 3).unwrap().p_value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_subsample_size() {
        assert_eq!(subsample_size(100, 0.7), 26);
        assert_eq!(subsample_size(2, 0.7), 1);
        assert!(subsample_size(10_000, 0.7) < 10_000);
    }

    #[test]
    fn test_should_stop() {
        let options = HomogeneityTestOptionsBuilder::new().draws(100, 2000).build();
        assert!(!should_stop(50, 99, &options));
        // p = 0.5, far above alpha.
        assert!(should_stop(50, 100, &options));
        // p = 0.05 exactly: undecided.
        assert!(!should_stop(5, 100, &options));
        // p = 0, no Monte Carlo error left.
        assert!(should_stop(0, 100, &options));
        assert!(should_stop(100, 2000, &options));
    }

    fn leaves_of_step(n: usize, seed: u64) -> (LinearMomentSpecification, Vec<DataLens>) {
        let lens = step_effect(n, 0.5, seed).unwrap();
        let (low, high) = lens.subset_by_rule(&SplitRule::Continuous {
            variable: 0,
            threshold: 5.0,
        });
        (LinearMomentSpecification::new(2, vec![false]), vec![low, high])
    }

    #[test]
    fn test_subsampling_rejects_heterogeneous_slope() {
        let (spec, leaves) = leaves_of_step(1200, 3);
        let containers: Vec<_> = leaves.iter().map(|l| spec.compute_optimal_beta(l, true)).collect();
        let options = HomogeneityTestOptionsBuilder::new().draws(50, 400).build();
        let full = compute_statistic(&containers, 1, &options).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let p = subsample_p_value(&spec, &leaves, 1, full.distance_metric, &options, &mut rng).unwrap();
        assert!(p.p_value < 0.05, "p-value {}", p.p_value);
        assert!(p.draws >= 50 && p.draws <= 400);
    }

    #[test]
    fn test_homogeneous_intercept_has_larger_p_value_than_slope() {
        let (spec, leaves) = leaves_of_step(1200, 4);
        let containers: Vec<_> = leaves.iter().map(|l| spec.compute_optimal_beta(l, true)).collect();
        let options = HomogeneityTestOptionsBuilder::new().draws(50, 400).build();
        let intercept = compute_statistic(&containers, 0, &options).unwrap();
        let slope = compute_statistic(&containers, 1, &options).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let p_intercept =
            subsample_p_value(&spec, &leaves, 0, intercept.distance_metric, &options, &mut rng).unwrap();
        let p_slope = subsample_p_value(&spec, &leaves, 1, slope.distance_metric, &options, &mut rng).unwrap();
        assert!(
            p_intercept.p_value > p_slope.p_value,
            "intercept p {} slope p {}",
            p_intercept.p_value,
            p_slope.p_value
        );
    }
}
