//! Samples a correlated 2D Gaussian posterior with delayed rejection and prints
//! summary statistics and per-stage acceptance rates.

use mini_dram::core::ChainRunner;
use mini_dram::delayed_rejection::{DelayedRejection, DrOptions};
use mini_dram::model::{GaussianPrior, ModelParameters};
use mini_dram::proposal::cholesky_upper;
use mini_dram::sampler::{DrChain, DrSampler};
use ndarray::{array, Axis};
use std::error::Error;

/// Main entry point: sets up a bounded 2D Gaussian sum-of-squares model, runs the
/// sampler and prints what it found.
fn main() -> Result<(), Box<dyn Error>> {
    const ITERATIONS: usize = 40_000;
    const BURNIN: usize = 4_000;
    const N_CHAINS: usize = 4;
    const SEED: u64 = 42;

    let mean = array![1.0, -1.0];
    let cov = array![[2.0, 1.0], [1.0, 2.0]];
    // inverse of `cov`
    let precision = array![[2.0, -1.0], [-1.0, 2.0]] / 3.0;
    let cost = move |theta: &[f64]| {
        let d = array![theta[0] - mean[0], theta[1] - mean[1]];
        d.dot(&precision.dot(&d))
    };

    // deliberately too wide, so the delayed stages have work to do
    let base_chol = cholesky_upper(&cov)? * 4.0;
    let options = DrOptions::default().with_ntry(3);
    let dr = DelayedRejection::from_options(&base_chol, &options)?;
    let parameters = ModelParameters::new(array![-10.0, -10.0], array![10.0, 10.0])?;

    let chain = DrChain::new(
        cost,
        GaussianPrior::flat(2),
        parameters,
        dr,
        &[5.0, 5.0],
        array![1.0],
    )?;
    let mut sampler = DrSampler::new(chain, N_CHAINS).set_seed(SEED);

    let samples = sampler.run(BURNIN + ITERATIONS / N_CHAINS, BURNIN)?;
    let views: Vec<_> = samples.iter().map(|s| s.view()).collect();
    let stacked = ndarray::concatenate(Axis(0), &views)?;
    println!("Generated {} samples", stacked.nrows());

    let sample_mean = stacked
        .mean_axis(Axis(0))
        .ok_or("cannot average an empty sample")?;
    println!(
        "Mean after burn-in: ({:.2}, {:.2})",
        sample_mean[0], sample_mean[1]
    );

    let total_steps: u64 = sampler.chains.iter().map(|c| c.n_steps).sum();
    for (stage, n) in sampler.accepted_per_stage().iter().enumerate() {
        println!(
            "Stage {stage}: accepted {n} of {total_steps} steps ({:.1}%)",
            100.0 * *n as f64 / total_steps as f64
        );
    }
    Ok(())
}
