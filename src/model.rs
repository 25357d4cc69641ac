/*!
Collaborators the delayed rejection stages evaluate candidates against.

- [`CostEvaluator`] returns the sum-of-squares misfit of a parameter vector, one value per
  data set. Any `Fn(&[f64]) -> f64` closure is a single data set cost (and also a prior).
- [`PriorEvaluator`] returns the prior penalty of a parameter vector. [`GaussianPrior`] is
  the usual `Σ((θ - μ) / σ)²` penalty; `σ = ∞` makes it flat.
- [`ModelParameters`] holds the parameter limits and which parameters are being estimated.

# Examples

```rust
use mini_dram::model::{CostEvaluator, GaussianPrior, ModelParameters, PriorEvaluator};
use ndarray::array;

let cost = |theta: &[f64]| theta.iter().map(|t| t * t).sum::<f64>();
assert_eq!(CostEvaluator::evaluate(&cost, &[1.0, 2.0]), array![5.0]);

let prior = GaussianPrior::flat(2);
assert_eq!(prior.evaluate(&[1.0, 2.0]), 0.0);

let params = ModelParameters::new(array![0.0, 0.0, 0.0], array![1.0, 1.0, 1.0])
    .unwrap()
    .with_estimated(vec![0, 2])
    .unwrap();
assert_eq!(params.npar(), 2);
```
*/

use ndarray::{Array1, Axis};

use crate::error::{DrError, Result};

/// Sum-of-squares cost of a parameter vector.
pub trait CostEvaluator {
    /// Returns one cost value per data set.
    fn evaluate(&self, theta: &[f64]) -> Array1<f64>;
}

/// Prior penalty of a parameter vector.
pub trait PriorEvaluator {
    fn evaluate(&self, theta: &[f64]) -> f64;
}

impl<F> CostEvaluator for F
where
    F: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, theta: &[f64]) -> Array1<f64> {
        Array1::from_elem(1, self(theta))
    }
}

impl<F> PriorEvaluator for F
where
    F: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, theta: &[f64]) -> f64 {
        self(theta)
    }
}

/// Wraps a closure returning one cost per data set.
#[derive(Debug, Clone)]
pub struct PerDataSet<F>(pub F);

impl<F> CostEvaluator for PerDataSet<F>
where
    F: Fn(&[f64]) -> Array1<f64>,
{
    fn evaluate(&self, theta: &[f64]) -> Array1<f64> {
        (self.0)(theta)
    }
}

/// Independent Gaussian prior penalty `Σ((θ - μ) / σ)²`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianPrior {
    pub mu: Array1<f64>,
    pub sigma: Array1<f64>,
}

impl GaussianPrior {
    pub fn new(mu: Array1<f64>, sigma: Array1<f64>) -> Result<Self> {
        if mu.len() != sigma.len() {
            return Err(DrError::DimensionMismatch {
                what: "prior sigma",
                expected: mu.len(),
                found: sigma.len(),
            });
        }
        if sigma.iter().any(|s| !(*s > 0.0)) {
            return Err(DrError::InvalidOption {
                name: "sigma",
                reason: "prior standard deviations must be positive",
            });
        }
        Ok(Self { mu, sigma })
    }

    /// A prior that contributes nothing for any `theta`.
    pub fn flat(npar: usize) -> Self {
        Self {
            mu: Array1::zeros(npar),
            sigma: Array1::from_elem(npar, f64::INFINITY),
        }
    }
}

impl PriorEvaluator for GaussianPrior {
    fn evaluate(&self, theta: &[f64]) -> f64 {
        theta
            .iter()
            .zip(self.mu.iter())
            .zip(self.sigma.iter())
            .map(|((t, mu), sigma)| ((t - mu) / sigma).powi(2))
            .sum()
    }
}

/// Limits for every model parameter plus the subset currently being estimated.
///
/// Fixed parameters keep their limits but are not part of `theta`, so bounds checks only
/// see the estimated subset.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    lower_limits: Array1<f64>,
    upper_limits: Array1<f64>,
    estimated: Vec<usize>,
}

impl ModelParameters {
    /// All parameters are estimated.
    pub fn new(lower_limits: Array1<f64>, upper_limits: Array1<f64>) -> Result<Self> {
        if lower_limits.len() != upper_limits.len() {
            return Err(DrError::DimensionMismatch {
                what: "upper limits",
                expected: lower_limits.len(),
                found: upper_limits.len(),
            });
        }
        if lower_limits
            .iter()
            .zip(upper_limits.iter())
            .any(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi)
        {
            return Err(DrError::InvalidOption {
                name: "limits",
                reason: "lower limits must not exceed upper limits",
            });
        }
        let estimated = (0..lower_limits.len()).collect();
        Ok(Self {
            lower_limits,
            upper_limits,
            estimated,
        })
    }

    /// Unbounded parameters, all estimated.
    pub fn unbounded(npar: usize) -> Self {
        Self {
            lower_limits: Array1::from_elem(npar, f64::NEG_INFINITY),
            upper_limits: Array1::from_elem(npar, f64::INFINITY),
            estimated: (0..npar).collect(),
        }
    }

    /// Restricts estimation to the given parameter indices, in `theta` order.
    pub fn with_estimated(mut self, estimated: Vec<usize>) -> Result<Self> {
        let total = self.lower_limits.len();
        if let Some(&bad) = estimated.iter().find(|&&i| i >= total) {
            return Err(DrError::DimensionMismatch {
                what: "estimated parameter index",
                expected: total,
                found: bad,
            });
        }
        self.estimated = estimated;
        Ok(self)
    }

    /// Number of estimated parameters.
    pub fn npar(&self) -> usize {
        self.estimated.len()
    }

    pub fn estimated(&self) -> &[usize] {
        &self.estimated
    }

    pub fn active_lower_limits(&self) -> Array1<f64> {
        self.lower_limits.select(Axis(0), &self.estimated)
    }

    pub fn active_upper_limits(&self) -> Array1<f64> {
        self.upper_limits.select(Axis(0), &self.estimated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn gaussian_prior_penalty() {
        let prior = GaussianPrior::new(array![1.0, 0.0], array![2.0, 0.5]).unwrap();
        // ((3 - 1) / 2)^2 + ((1 - 0) / 0.5)^2 = 1 + 4
        assert_abs_diff_eq!(prior.evaluate(&[3.0, 1.0]), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn gaussian_prior_rejects_bad_sigma() {
        assert!(GaussianPrior::new(array![0.0], array![0.0]).is_err());
        assert!(GaussianPrior::new(array![0.0], array![1.0, 1.0]).is_err());
    }

    #[test]
    fn active_limits_follow_estimated_order() {
        let params = ModelParameters::new(array![-1.0, -2.0, -3.0], array![1.0, 2.0, 3.0])
            .unwrap()
            .with_estimated(vec![2, 0])
            .unwrap();
        assert_eq!(params.active_lower_limits(), array![-3.0, -1.0]);
        assert_eq!(params.active_upper_limits(), array![3.0, 1.0]);
    }

    #[test]
    fn invalid_limits_are_rejected() {
        assert!(ModelParameters::new(array![1.0], array![0.0]).is_err());
        assert!(ModelParameters::new(array![0.0], array![1.0, 2.0]).is_err());
        let params = ModelParameters::new(array![0.0], array![1.0]).unwrap();
        assert!(params.with_estimated(vec![1]).is_err());
    }

    #[test]
    fn per_data_set_cost_passes_through() {
        let cost = PerDataSet(|theta: &[f64]| array![theta[0], 2.0 * theta[0]]);
        assert_eq!(cost.evaluate(&[1.5]), array![1.5, 3.0]);
    }
}
