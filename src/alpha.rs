/*!
Multi-stage delayed rejection acceptance probability.

For a try-path `x = y_0, y_1, ..., y_n` (the last accepted state, the rejected standard
proposal and the delayed rejection candidates so far) the acceptance probability of `y_n`
is

```text
alpha_n = min(1, sigmoid(y) * Π_k (1 - alpha_k(y_n, ..., y_{n-k-1}))
                            / Π_k (1 - alpha_k(x, ..., y_{k+1})))
```

where `y` is the log posterior ratio between `y_n` and `x` plus the Gaussian proposal
corrections of every earlier stage, and the `alpha_k` are this same function evaluated on
the forward prefixes and reversed suffixes of the path.

Only a vanishing numerator (`a2 == 0`) short-circuits to zero. A vanishing denominator is
left to the floating point division, which matches the established algorithm and keeps
acceptance values comparable with it.
*/

use ndarray::Array2;

use crate::error::{DrError, Result};
use crate::parameter_set::ParameterSet;

/// Acceptance probability of the newest element of `try_path`.
///
/// `inv_chols[k]` is the inverse Cholesky factor of stage `k`; at least
/// `try_path.len() - 1` of them are needed. An empty path or too few factors is a
/// [`DrError::DimensionMismatch`].
///
/// # Examples
///
/// ```rust
/// use mini_dram::alpha::acceptance_ratio;
/// use mini_dram::parameter_set::ParameterSet;
/// use ndarray::{array, Array2};
///
/// let old = ParameterSet::scalar(array![0.0], 1.0, 1.0, 0.0);
/// let new = ParameterSet::scalar(array![0.0], 1.0, 1.0, 0.0);
/// let inv: Vec<Array2<f64>> = vec![array![[1.0]]];
/// let alpha = acceptance_ratio(&[&old, &new], &inv).unwrap();
/// assert!((alpha - 0.5).abs() < 1e-12);
/// ```
pub fn acceptance_ratio(try_path: &[&ParameterSet], inv_chols: &[Array2<f64>]) -> Result<f64> {
    if try_path.is_empty() {
        return Err(DrError::DimensionMismatch {
            what: "try path",
            expected: 1,
            found: 0,
        });
    }
    if inv_chols.len() + 1 < try_path.len() {
        return Err(DrError::DimensionMismatch {
            what: "inverse stage factors",
            expected: try_path.len() - 1,
            found: inv_chols.len(),
        });
    }
    let mut evaluations = 0;
    Ok(acceptance_ratio_counted(try_path, inv_chols, &mut evaluations))
}

/// Same as [`acceptance_ratio`], adding the number of (recursive) evaluations to `evaluations`.
pub(crate) fn acceptance_ratio_counted(
    try_path: &[&ParameterSet],
    inv_chols: &[Array2<f64>],
    evaluations: &mut u64,
) -> f64 {
    debug_assert!(!try_path.is_empty() && inv_chols.len() + 1 >= try_path.len());
    *evaluations += 1;
    let stage = try_path.len() - 1;

    let mut a1 = 1.0;
    let mut a2 = 1.0;
    for k in 0..stage.saturating_sub(1) {
        let forward = acceptance_ratio_counted(&try_path[..k + 2], inv_chols, evaluations);
        a1 *= 1.0 - forward;

        let reversed: Vec<&ParameterSet> = try_path[stage - k - 1..=stage]
            .iter()
            .rev()
            .copied()
            .collect();
        let backward = acceptance_ratio_counted(&reversed, inv_chols, evaluations);
        a2 *= 1.0 - backward;
        if a2 == 0.0 {
            // the reverse path is never re-entered
            return 0.0;
        }
    }

    let mut y = log_posterior_ratio(try_path[0], try_path[stage]);
    for k in 0..stage {
        y += log_proposal_ratio(k, try_path, inv_chols);
    }
    if y.is_nan() {
        return 0.0;
    }

    (sigmoid(y) * a2 / a1).min(1.0)
}

/// `-0.5 * (Σ(ss_new / sigma2_new - ss_old / sigma2_old) + prior_new - prior_old)`.
pub fn log_posterior_ratio(old: &ParameterSet, new: &ParameterSet) -> f64 {
    let misfit: f64 = new
        .ss
        .iter()
        .zip(new.sigma2.iter())
        .zip(old.ss.iter().zip(old.sigma2.iter()))
        .map(|((ss_new, s2_new), (ss_old, s2_old))| ss_new / s2_new - ss_old / s2_old)
        .sum();
    -0.5 * (misfit + new.prior - old.prior)
}

/// Log ratio of the stage `k` Gaussian proposal densities along the reversed and forward
/// path. The newest stage is symmetric and contributes nothing.
fn log_proposal_ratio(k: usize, try_path: &[&ParameterSet], inv_chols: &[Array2<f64>]) -> f64 {
    let last = try_path.len() - 2;
    if k == last {
        return 0.0;
    }
    let inv_r = &inv_chols[k];
    let reverse_step = (&try_path[last - k].theta - &try_path[last + 1].theta).dot(inv_r);
    let forward_step = (&try_path[k + 1].theta - &try_path[0].theta).dot(inv_r);
    -0.5 * (reverse_step.dot(&reverse_step) - forward_step.dot(&forward_step))
}

/// Logistic function that neither overflows nor loses precision for large `|y|`.
pub fn sigmoid(y: f64) -> f64 {
    if y >= 0.0 {
        1.0 / (1.0 + (-y).exp())
    } else {
        let e = y.exp();
        e / (1.0 + e)
    }
}
