//! Snapshots of candidate and accepted parameter states.
//!
//! A freshly drawn candidate is a [`Proposal`]: it only knows its parameter vector and
//! observation-error variance. It turns into a [`ParameterSet`] once it has been scored,
//! either by evaluating the cost and prior ([`Proposal::evaluate`]) or by being rejected
//! for leaving the parameter bounds ([`Proposal::reject_out_of_bounds`]). The acceptance
//! probability of a set is only known after it has been scored against a try-path, so it
//! is exposed as an `Option`.

use ndarray::Array1;

/// A candidate state that has not been evaluated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// The parameter vector.
    pub theta: Array1<f64>,
    /// Observation-error variance, one entry per data set.
    pub sigma2: Array1<f64>,
}

/// A scored parameter state.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    /// The parameter vector.
    pub theta: Array1<f64>,
    /// Observation-error variance, one entry per data set.
    pub sigma2: Array1<f64>,
    /// Sum-of-squares cost, one entry per data set. `+inf` marks a bounds-rejected state.
    pub ss: Array1<f64>,
    /// Prior penalty at `theta`.
    pub prior: f64,
    alpha: Option<f64>,
}

impl Proposal {
    pub fn new(theta: Array1<f64>, sigma2: Array1<f64>) -> Self {
        Self { theta, sigma2 }
    }

    /// Attaches the cost and prior evaluated at `theta`.
    pub fn evaluate(self, ss: Array1<f64>, prior: f64) -> ParameterSet {
        ParameterSet {
            theta: self.theta,
            sigma2: self.sigma2,
            ss,
            prior,
            alpha: None,
        }
    }

    /// Marks the candidate as rejected without evaluating it: infinite cost,
    /// zero prior and zero acceptance probability.
    pub fn reject_out_of_bounds(self) -> ParameterSet {
        let ss = Array1::from_elem(self.sigma2.len(), f64::INFINITY);
        ParameterSet {
            theta: self.theta,
            sigma2: self.sigma2,
            ss,
            prior: 0.0,
            alpha: Some(0.0),
        }
    }
}

impl ParameterSet {
    pub fn new(theta: Array1<f64>, ss: Array1<f64>, sigma2: Array1<f64>, prior: f64) -> Self {
        Self {
            theta,
            sigma2,
            ss,
            prior,
            alpha: None,
        }
    }

    /// Convenience constructor for single data set models.
    pub fn scalar(theta: Array1<f64>, ss: f64, sigma2: f64, prior: f64) -> Self {
        Self::new(theta, Array1::from_elem(1, ss), Array1::from_elem(1, sigma2), prior)
    }

    /// The acceptance probability computed against this set's try-path, if any.
    pub fn alpha(&self) -> Option<f64> {
        self.alpha
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub(crate) fn set_alpha(&mut self, alpha: f64) {
        self.alpha = Some(alpha);
    }

    pub fn npar(&self) -> usize {
        self.theta.len()
    }

    /// True for states produced by [`Proposal::reject_out_of_bounds`].
    pub fn is_out_of_bounds(&self) -> bool {
        self.ss.iter().any(|ss| *ss == f64::INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn alpha_is_unset_until_scored() {
        let set = Proposal::new(array![1.0, 2.0], array![0.5]).evaluate(array![3.0], 0.1);
        assert_eq!(set.alpha(), None);
        assert_eq!(set.with_alpha(0.25).alpha(), Some(0.25));
    }

    #[test]
    fn out_of_bounds_rejection_marks_every_data_set() {
        let set = Proposal::new(array![1.0], array![1.0, 2.0]).reject_out_of_bounds();
        assert_eq!(set.ss, array![f64::INFINITY, f64::INFINITY]);
        assert_eq!(set.prior, 0.0);
        assert_eq!(set.alpha(), Some(0.0));
        assert!(set.is_out_of_bounds());
    }

    #[test]
    fn scalar_constructor_wraps_single_data_set() {
        let set = ParameterSet::scalar(array![0.0, 1.0], 4.0, 2.0, 0.0);
        assert_eq!(set.ss.len(), 1);
        assert_eq!(set.sigma2.len(), 1);
        assert_eq!(set.npar(), 2);
        assert!(!set.is_out_of_bounds());
    }
}
