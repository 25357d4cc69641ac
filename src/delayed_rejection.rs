/*!
# Delayed Rejection

When a standard Metropolis proposal is rejected, delayed rejection keeps trying: it draws
further candidates around the last accepted state with increasingly narrow proposal
covariances, and scores each one with the multi-stage acceptance probability from
[`crate::alpha`]. The first accepted candidate replaces the current state; if every stage
is rejected the chain stays where it was.

The controller itself is stateless apart from its stage factors. Acceptance counters live
in a [`DrMetrics`] owned by the calling chain, and randomness comes from the caller's RNG,
so independent chains never share anything.

## Example

```rust
use mini_dram::delayed_rejection::{DelayedRejection, DrMetrics, DrOptions};
use mini_dram::model::{GaussianPrior, ModelParameters};
use mini_dram::parameter_set::ParameterSet;
use ndarray::array;
use rand::rngs::SmallRng;
use rand::SeedableRng;

let options = DrOptions::default().with_ntry(3);
let dr = DelayedRejection::from_options(&array![[1.0]], &options).unwrap();
let cost = |theta: &[f64]| theta[0] * theta[0];
let prior = GaussianPrior::flat(1);
let params = ModelParameters::unbounded(1);

let old_set = ParameterSet::scalar(array![0.0], 0.0, 1.0, 0.0);
let new_set = ParameterSet::scalar(array![5.0], 25.0, 1.0, 0.0);
let mut metrics = DrMetrics::new(dr.ntry());
let mut rng = SmallRng::seed_from_u64(42);

let outcome = dr
    .run(&old_set, &new_set, &params, &cost, &prior, &mut metrics, &mut rng)
    .unwrap();
if !outcome.accepted {
    assert_eq!(outcome.set, old_set);
}
```
*/

use ndarray::Array2;
use rand::Rng;
use tracing::{debug, trace};

use crate::alpha::acceptance_ratio_counted;
use crate::bounds::is_outside_bounds;
use crate::error::{DrError, Result};
use crate::model::{CostEvaluator, ModelParameters, PriorEvaluator};
use crate::parameter_set::ParameterSet;
use crate::proposal::{propose, validate_drscale, StageFactors};

/// Delayed rejection configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DrOptions {
    /// Number of stages including the standard Metropolis proposal.
    pub ntry: usize,
    /// Shrink factors for the delayed stages' Cholesky factors.
    pub drscale: Vec<f64>,
}

impl Default for DrOptions {
    fn default() -> Self {
        Self {
            ntry: 2,
            drscale: vec![5.0, 4.0, 3.0],
        }
    }
}

impl DrOptions {
    pub fn with_ntry(mut self, ntry: usize) -> Self {
        self.ntry = ntry;
        self
    }

    pub fn with_drscale(mut self, drscale: Vec<f64>) -> Self {
        self.drscale = drscale;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ntry == 0 {
            return Err(DrError::InvalidOption {
                name: "ntry",
                reason: "at least one stage is required",
            });
        }
        validate_drscale(&self.drscale)
    }
}

/// Delayed rejection efficiency counters for one chain.
///
/// Never reset between invocations; they summarize the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrMetrics {
    /// Accepted candidates per stage. Index 0 is the standard Metropolis stage.
    pub accepted_per_stage: Vec<u64>,
    /// Number of acceptance ratio evaluations, recursive ones included.
    pub alpha_evaluations: u64,
    /// Number of delayed rejection invocations.
    pub invocations: u64,
}

impl DrMetrics {
    pub fn new(ntry: usize) -> Self {
        Self {
            accepted_per_stage: vec![0; ntry],
            alpha_evaluations: 0,
            invocations: 0,
        }
    }

    /// Fraction of `n_steps` accepted at each stage.
    pub fn stage_acceptance_rates(&self, n_steps: u64) -> Vec<f64> {
        self.accepted_per_stage
            .iter()
            .map(|&n| match n_steps {
                0 => 0.0,
                _ => n as f64 / n_steps as f64,
            })
            .collect()
    }
}

/// Result of one delayed rejection invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DrOutcome {
    /// Whether one of the delayed stages was accepted.
    pub accepted: bool,
    /// The accepted candidate, or the old state when every stage was rejected.
    pub set: ParameterSet,
    /// Whether the last attempted stage fell outside the parameter bounds.
    pub outbound: bool,
}

/// The delayed rejection stage loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayedRejection {
    stages: StageFactors,
}

impl DelayedRejection {
    pub fn new(stages: StageFactors) -> Self {
        Self { stages }
    }

    /// Builds the stages from one Cholesky factor scaled by `options.drscale`.
    pub fn from_options(base_chol: &Array2<f64>, options: &DrOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::new(StageFactors::from_drscale(
            base_chol,
            &options.drscale,
            options.ntry,
        )?))
    }

    pub fn ntry(&self) -> usize {
        self.stages.ntry()
    }

    pub fn stages(&self) -> &StageFactors {
        &self.stages
    }

    /**
    Runs the delayed stages after `new_set` was rejected from `old_set`.

    Each stage draws a candidate around `old_set.theta` with the stage's Cholesky factor
    and `new_set.sigma2`. Candidates outside the limits of the estimated parameters are
    recorded with infinite cost and never evaluated. Otherwise the cost and prior are
    evaluated and the candidate is accepted with its multi-stage acceptance probability.

    Counters in `metrics` are incremented for every accepted stage.
    */
    #[allow(clippy::too_many_arguments)]
    pub fn run<C, P, R>(
        &self,
        old_set: &ParameterSet,
        new_set: &ParameterSet,
        parameters: &ModelParameters,
        cost: &C,
        prior: &P,
        metrics: &mut DrMetrics,
        rng: &mut R,
    ) -> Result<DrOutcome>
    where
        C: CostEvaluator + ?Sized,
        P: PriorEvaluator + ?Sized,
        R: Rng + ?Sized,
    {
        let ntry = self.ntry();
        if ntry <= 1 {
            return Ok(DrOutcome {
                accepted: false,
                set: old_set.clone(),
                outbound: false,
            });
        }
        self.check_dimensions(old_set, new_set, parameters, metrics)?;
        metrics.invocations += 1;

        let lower = parameters.active_lower_limits();
        let upper = parameters.active_upper_limits();

        let mut try_path: Vec<ParameterSet> = vec![old_set.clone(), new_set.clone()];
        let mut outbound = false;
        let mut itry = 1;
        while itry < ntry {
            itry += 1;
            let next = propose(
                rng,
                old_set.theta.view(),
                new_set.sigma2.view(),
                self.stages.chol(itry - 1),
            );

            if is_outside_bounds(next.theta.view(), lower.view(), upper.view()) {
                trace!(stage = itry - 1, "delayed rejection candidate outside bounds");
                try_path.push(next.reject_out_of_bounds());
                outbound = true;
                continue;
            }
            outbound = false;

            let theta = next.theta.to_vec();
            let ss = cost.evaluate(&theta);
            if ss.len() != next.sigma2.len() {
                return Err(DrError::DimensionMismatch {
                    what: "cost evaluator output",
                    expected: next.sigma2.len(),
                    found: ss.len(),
                });
            }
            let prior_value = prior.evaluate(&theta);
            let mut candidate = next.evaluate(ss, prior_value);

            let alpha = {
                let refs: Vec<&ParameterSet> =
                    try_path.iter().chain(std::iter::once(&candidate)).collect();
                acceptance_ratio_counted(
                    &refs,
                    self.stages.inv_chols(),
                    &mut metrics.alpha_evaluations,
                )
            };
            candidate.set_alpha(alpha);
            trace!(stage = itry - 1, alpha, "delayed rejection candidate scored");

            let v: f64 = rng.gen();
            if alpha >= 1.0 || v < alpha {
                metrics.accepted_per_stage[itry - 1] += 1;
                debug!(stage = itry - 1, alpha, "delayed rejection accepted");
                return Ok(DrOutcome {
                    accepted: true,
                    set: candidate,
                    outbound,
                });
            }
            try_path.push(candidate);
        }

        debug!(stages = ntry - 1, outbound, "delayed rejection exhausted");
        Ok(DrOutcome {
            accepted: false,
            set: old_set.clone(),
            outbound,
        })
    }

    fn check_dimensions(
        &self,
        old_set: &ParameterSet,
        new_set: &ParameterSet,
        parameters: &ModelParameters,
        metrics: &DrMetrics,
    ) -> Result<()> {
        let npar = self.stages.npar();
        let checks = [
            ("old theta", old_set.theta.len()),
            ("new theta", new_set.theta.len()),
            ("estimated parameters", parameters.npar()),
        ];
        for (what, found) in checks {
            if found != npar {
                return Err(DrError::DimensionMismatch {
                    what,
                    expected: npar,
                    found,
                });
            }
        }
        if metrics.accepted_per_stage.len() < self.ntry() {
            return Err(DrError::DimensionMismatch {
                what: "stage acceptance counters",
                expected: self.ntry(),
                found: metrics.accepted_per_stage.len(),
            });
        }
        let n_data_sets = old_set.sigma2.len();
        let data_set_checks = [
            ("old sum of squares", old_set.ss.len()),
            ("new error variances", new_set.sigma2.len()),
            ("new sum of squares", new_set.ss.len()),
        ];
        for (what, found) in data_set_checks {
            if found != n_data_sets {
                return Err(DrError::DimensionMismatch {
                    what,
                    expected: n_data_sets,
                    found,
                });
            }
        }
        Ok(())
    }
}
