use std::time::SystemTime;

use log::info;
use momentforest::{
    grow_forest,
    homogeneity::{impose_homogeneity, test_forest_homogeneity, HomogeneityTestOptions, HomogeneousSearchParams},
    models::LinearMomentSpecification,
    test_data, ForestParamsBuilder, Result,
};
use ndarray::array;
use rand::{rngs::StdRng, SeedableRng};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let lens = test_data::step_effect(4000, 0.5, 42)?;
    let (train, test) = lens.split(0.5, &mut StdRng::seed_from_u64(42));
    let mut spec = LinearMomentSpecification::new(2, vec![false]);
    let params = ForestParamsBuilder::new().num_trees(50).min_count(50).build();

    info!("Fitting on {} observations", train.num_obs());
    let start = SystemTime::now();
    let forest = grow_forest(&spec, &train, &params)?;
    if let Ok(elapsed) = start.elapsed() {
        info!("Time elapsed: {:?}", elapsed);
    }

    for z in [1.0, 3.0, 5.5, 9.0] {
        match forest.estimated_beta(array![z].view()) {
            Some(beta) => println!("z = {:>4}: beta = {}", z, beta),
            None => println!("z = {:>4}: no estimate", z),
        }
    }
    println!("Out-of-sample MSE: {:.4}", forest.out_of_sample_fit(&spec, &test));

    let report = test_forest_homogeneity(&spec, &forest, &train, &HomogeneityTestOptions::default())?;
    for vote in report.votes() {
        println!(
            "parameter {}: {} accept / {} reject, homogeneous = {}",
            vote.parameter, vote.accept, vote.reject, vote.homogeneous
        );
    }

    if let Some(outcome) = impose_homogeneity(&mut spec, &train, &report, HomogeneousSearchParams::default())? {
        println!("Homogeneous values: {:?}", outcome.values);
        let restricted = grow_forest(&spec, &train, &params)?;
        println!(
            "Out-of-sample MSE with homogeneity imposed: {:.4}",
            restricted.out_of_sample_fit(&spec, &test)
        );
    }
    Ok(())
}
