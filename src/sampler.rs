/*!
# Metropolis sampler with delayed rejection

A plain (non-adaptive) Metropolis sampler over a sum-of-squares posterior that falls back
to [`DelayedRejection`] whenever its standard proposal is rejected. It is the smallest
outer loop that drives the delayed rejection stages end to end.

- **Posterior**: `exp(-0.5 * (Σ ss / sigma2 + prior))`, with `ss` from a [`CostEvaluator`]
  and the prior penalty from a [`PriorEvaluator`].
- **Parallel chains**: [`DrSampler`] holds several independent [`DrChain`]s and runs them
  in parallel through [`ChainRunner`](crate::core::ChainRunner). Every chain owns its RNG
  and its [`DrMetrics`].
- **Reproducibility**: `set_seed` gives chain `i` the seed `seed + i`.

## Example Usage

```rust
use mini_dram::core::ChainRunner;
use mini_dram::delayed_rejection::{DelayedRejection, DrOptions};
use mini_dram::model::{GaussianPrior, ModelParameters};
use mini_dram::sampler::{DrChain, DrSampler};
use ndarray::array;

let cost = |theta: &[f64]| theta.iter().map(|t| t * t).sum::<f64>();
let dr = DelayedRejection::from_options(&array![[2.0, 0.0], [0.0, 2.0]], &DrOptions::default())
    .unwrap();
let chain = DrChain::new(
    cost,
    GaussianPrior::flat(2),
    ModelParameters::unbounded(2),
    dr,
    &[1.0, 1.0],
    array![1.0],
)
.unwrap();

let mut sampler = DrSampler::new(chain, 2).set_seed(42);
let samples = sampler.run(200, 50).unwrap();
assert_eq!(samples.len(), 2);
assert_eq!(samples[0].dim(), (150, 2));
```
*/

use ndarray::{Array1, ArrayView1};
use rand::prelude::*;
use tracing::trace;

use crate::alpha::log_posterior_ratio;
use crate::bounds::is_outside_bounds;
use crate::core::{HasChains, MarkovChain};
use crate::delayed_rejection::{DelayedRejection, DrMetrics};
use crate::error::{DrError, Result};
use crate::model::{CostEvaluator, ModelParameters, PriorEvaluator};
use crate::parameter_set::ParameterSet;
use crate::proposal::propose;

/// Several independent delayed rejection chains sharing one model.
#[derive(Debug, Clone)]
pub struct DrSampler<C, P> {
    /// The independent chains.
    pub chains: Vec<DrChain<C, P>>,
    /// The global random seed.
    pub seed: u64,
}

/// A single Metropolis chain with delayed rejection.
#[derive(Debug, Clone)]
pub struct DrChain<C, P> {
    /// Sum-of-squares cost.
    pub cost: C,
    /// Prior penalty.
    pub prior: P,
    /// Limits and estimated subset.
    pub parameters: ModelParameters,
    /// Stage factors and the delayed rejection loop.
    pub dr: DelayedRejection,
    /// The last accepted state.
    pub current: ParameterSet,
    /// Delayed rejection counters for this chain.
    pub metrics: DrMetrics,
    /// Number of steps taken.
    pub n_steps: u64,
    /// Number of steps whose last candidate left the parameter bounds.
    pub n_outbound: u64,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for this chain.
    pub rng: SmallRng,
    lower: Array1<f64>,
    upper: Array1<f64>,
}

impl<C, P> DrChain<C, P>
where
    C: CostEvaluator,
    P: PriorEvaluator,
{
    /**
    Creates a chain starting at `initial_theta`, evaluating its cost and prior.

    # Arguments

    * `cost` - Sum-of-squares cost, one value per entry of `sigma2`.
    * `prior` - Prior penalty.
    * `parameters` - Limits of the estimated parameters.
    * `dr` - Stage factors; stage 0 is the standard Metropolis proposal.
    * `initial_theta` - Starting values of the estimated parameters.
    * `sigma2` - Observation-error variance per data set.
    */
    pub fn new(
        cost: C,
        prior: P,
        parameters: ModelParameters,
        dr: DelayedRejection,
        initial_theta: &[f64],
        sigma2: Array1<f64>,
    ) -> Result<Self> {
        let npar = dr.stages().npar();
        if initial_theta.len() != npar {
            return Err(DrError::DimensionMismatch {
                what: "initial theta",
                expected: npar,
                found: initial_theta.len(),
            });
        }
        if parameters.npar() != npar {
            return Err(DrError::DimensionMismatch {
                what: "estimated parameters",
                expected: npar,
                found: parameters.npar(),
            });
        }
        let ss = cost.evaluate(initial_theta);
        if ss.len() != sigma2.len() {
            return Err(DrError::DimensionMismatch {
                what: "cost evaluator output",
                expected: sigma2.len(),
                found: ss.len(),
            });
        }
        let prior_value = prior.evaluate(initial_theta);
        let theta = Array1::from(initial_theta.to_vec());
        let current = ParameterSet::new(theta, ss, sigma2, prior_value);
        let metrics = DrMetrics::new(dr.ntry());
        let lower = parameters.active_lower_limits();
        let upper = parameters.active_upper_limits();
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            cost,
            prior,
            parameters,
            dr,
            current,
            metrics,
            n_steps: 0,
            n_outbound: 0,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            lower,
            upper,
        })
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Fraction of steps accepted at each stage so far.
    pub fn stage_acceptance_rates(&self) -> Vec<f64> {
        self.metrics.stage_acceptance_rates(self.n_steps)
    }
}

impl<C, P> DrSampler<C, P>
where
    C: CostEvaluator + Clone + Send,
    P: PriorEvaluator + Clone + Send,
{
    /// Creates `n_chains` copies of `chain`, each with its own random seed.
    pub fn new(chain: DrChain<C, P>, n_chains: usize) -> Self {
        let chains = (0..n_chains)
            .map(|_| {
                let seed = thread_rng().gen::<u64>();
                chain.clone().set_seed(seed)
            })
            .collect();
        let seed = thread_rng().gen::<u64>();

        Self { chains, seed }
    }

    /**
    Sets a new global seed and updates the seed for each chain accordingly.

    Each chain receives the seed `seed + i`, where `i` is the chain index.
    */
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed.wrapping_add(i as u64);
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed)
        }
        self
    }

    /// Per-stage acceptance counts summed over all chains.
    pub fn accepted_per_stage(&self) -> Vec<u64> {
        let ntry = self.chains.first().map_or(0, |c| c.dr.ntry());
        let mut total = vec![0; ntry];
        for chain in &self.chains {
            for (sum, n) in total.iter_mut().zip(&chain.metrics.accepted_per_stage) {
                *sum += n;
            }
        }
        total
    }
}

impl<C, P> HasChains for DrSampler<C, P>
where
    C: CostEvaluator + Clone + Send,
    P: PriorEvaluator + Clone + Send,
{
    type Chain = DrChain<C, P>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}

impl<C, P> MarkovChain for DrChain<C, P>
where
    C: CostEvaluator,
    P: PriorEvaluator,
{
    /**
    Performs one Metropolis step, followed by delayed rejection if it is rejected.

    The standard proposal is drawn with the stage 0 factor. Proposals outside the limits
    are rejected without evaluation; the rest are accepted when
    `log u < -0.5 * (Σ Δ(ss / sigma2) + Δprior)`.
    */
    fn step(&mut self) -> Result<ArrayView1<'_, f64>> {
        self.n_steps += 1;
        let proposal = propose(
            &mut self.rng,
            self.current.theta.view(),
            self.current.sigma2.view(),
            self.dr.stages().chol(0),
        );

        let (new_set, accepted, mut outbound) =
            if is_outside_bounds(proposal.theta.view(), self.lower.view(), self.upper.view()) {
                (proposal.reject_out_of_bounds(), false, true)
            } else {
                let theta = proposal.theta.to_vec();
                let ss = self.cost.evaluate(&theta);
                if ss.len() != proposal.sigma2.len() {
                    return Err(DrError::DimensionMismatch {
                        what: "cost evaluator output",
                        expected: proposal.sigma2.len(),
                        found: ss.len(),
                    });
                }
                let prior_value = self.prior.evaluate(&theta);
                let new_set = proposal.evaluate(ss, prior_value);
                let log_accept_ratio = log_posterior_ratio(&self.current, &new_set);
                let u: f64 = self.rng.gen();
                (new_set, log_accept_ratio > u.ln(), false)
            };

        if accepted {
            self.metrics.accepted_per_stage[0] += 1;
            self.current = new_set;
        } else if self.dr.ntry() > 1 {
            let outcome = self.dr.run(
                &self.current,
                &new_set,
                &self.parameters,
                &self.cost,
                &self.prior,
                &mut self.metrics,
                &mut self.rng,
            )?;
            outbound = outcome.outbound;
            if outcome.accepted {
                self.current = outcome.set;
            }
        }
        if outbound {
            self.n_outbound += 1;
        }
        trace!(step = self.n_steps, accepted, outbound, "metropolis step");

        Ok(self.current.theta.view())
    }

    fn current_state(&self) -> ArrayView1<'_, f64> {
        self.current.theta.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChainRunner;
    use crate::delayed_rejection::DrOptions;
    use crate::model::GaussianPrior;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    type Cost = fn(&[f64]) -> f64;

    fn quadratic(theta: &[f64]) -> f64 {
        theta.iter().map(|t| t * t).sum()
    }

    fn chain(ntry: usize, parameters: ModelParameters) -> DrChain<Cost, GaussianPrior> {
        let options = DrOptions::default().with_ntry(ntry);
        let dr = DelayedRejection::from_options(&array![[3.0]], &options).unwrap();
        DrChain::new(
            quadratic as Cost,
            GaussianPrior::flat(1),
            parameters,
            dr,
            &[0.5],
            array![1.0],
        )
        .unwrap()
    }

    #[test]
    fn new_chain_evaluates_initial_state() {
        let c = chain(2, ModelParameters::unbounded(1));
        assert_eq!(c.current.ss, array![0.25]);
        assert_eq!(c.current.prior, 0.0);
        assert_eq!(c.metrics.accepted_per_stage, vec![0, 0]);
    }

    #[test]
    fn new_chain_checks_dimensions() {
        let dr = DelayedRejection::from_options(&array![[1.0]], &DrOptions::default()).unwrap();
        let result = DrChain::new(
            quadratic as Cost,
            GaussianPrior::flat(1),
            ModelParameters::unbounded(1),
            dr,
            &[0.0, 1.0],
            array![1.0],
        );
        assert!(matches!(result, Err(DrError::DimensionMismatch { .. })));
    }

    #[test]
    fn set_seed_assigns_consecutive_seeds() {
        let sampler = DrSampler::new(chain(2, ModelParameters::unbounded(1)), 3).set_seed(42);
        let seeds: Vec<u64> = sampler.chains.iter().map(|c| c.seed).collect();
        assert_eq!(seeds, vec![42, 43, 44]);
    }

    #[test]
    fn same_seed_same_samples() {
        let template = chain(3, ModelParameters::unbounded(1));
        let mut a = DrSampler::new(template.clone(), 2).set_seed(7);
        let mut b = DrSampler::new(template, 2).set_seed(7);
        assert_eq!(a.run(300, 0).unwrap(), b.run(300, 0).unwrap());
        assert_eq!(a.accepted_per_stage(), b.accepted_per_stage());
    }

    #[test]
    fn delayed_stages_rescue_wide_proposals() {
        // stage 0 is far too wide for the unit posterior, so many steps need a delayed stage
        let mut c = chain(3, ModelParameters::unbounded(1)).set_seed(42);
        for _ in 0..2_000 {
            c.step().unwrap();
        }
        let rates = c.stage_acceptance_rates();
        assert_eq!(rates.len(), 3);
        assert!(rates[1] > 0.05, "rates = {rates:?}");
        assert!(rates.iter().sum::<f64>() <= 1.0);
        assert!(c.metrics.invocations > 0);
    }

    #[test]
    fn chain_stays_inside_bounds() {
        let params = ModelParameters::new(array![0.0], array![1.0]).unwrap();
        let mut sampler = DrSampler::new(chain(3, params), 2).set_seed(3);
        let samples = sampler.run(1_000, 0).unwrap();
        for s in &samples {
            assert!(s.iter().all(|x| (0.0..=1.0).contains(x)));
        }
        assert!(sampler.chains.iter().all(|c| c.n_outbound > 0));
        assert!(sampler.chains.iter().all(|c| c.n_outbound <= c.n_steps));
    }

    #[test]
    fn outbound_steps_are_counted_once() {
        // every candidate of every stage leaves the tiny box
        let params = ModelParameters::new(array![-0.01], array![0.01]).unwrap();
        let dr = DelayedRejection::from_options(
            &array![[10.0]],
            &DrOptions::default().with_ntry(3).with_drscale(vec![1.0]),
        )
        .unwrap();
        let mut c = DrChain::new(
            quadratic as Cost,
            GaussianPrior::flat(1),
            params,
            dr,
            &[0.0],
            array![1.0],
        )
        .unwrap()
        .set_seed(11);
        for _ in 0..100 {
            c.step().unwrap();
        }
        assert_eq!(c.n_steps, 100);
        assert!(c.n_outbound > 90 && c.n_outbound <= 100, "{}", c.n_outbound);
        assert!(c.current.theta[0].abs() <= 0.01);
    }

    #[test]
    fn seeds_wrap_around() {
        let sampler =
            DrSampler::new(chain(2, ModelParameters::unbounded(1)), 3).set_seed(u64::MAX);
        let seeds: Vec<u64> = sampler.chains.iter().map(|c| c.seed).collect();
        assert_eq!(seeds, vec![u64::MAX, 0, 1]);
    }

    #[test]
    fn run_discards_burn_in() {
        let mut sampler = DrSampler::new(chain(2, ModelParameters::unbounded(1)), 3).set_seed(1);
        let samples = sampler.run(100, 40).unwrap();
        assert_eq!(samples.len(), 3);
        for s in &samples {
            assert_eq!(s.dim(), (60, 1));
        }
        let mean = samples[0].mean_axis(Axis(0)).unwrap();
        assert_abs_diff_eq!(mean[0], 0.0, epsilon = 1.5);
    }
}
