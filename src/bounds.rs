//! Parameter limit checks.

use ndarray::ArrayView1;

/// Returns `true` if any coordinate of `theta` lies strictly below its lower limit
/// or strictly above its upper limit.
pub fn is_outside_bounds(
    theta: ArrayView1<f64>,
    lower_limits: ArrayView1<f64>,
    upper_limits: ArrayView1<f64>,
) -> bool {
    theta
        .iter()
        .zip(lower_limits.iter())
        .zip(upper_limits.iter())
        .any(|((&t, &lo), &hi)| t < lo || t > hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use proptest::prelude::*;

    #[test]
    fn limits_are_inclusive() {
        let lo = array![0.0, -1.0];
        let hi = array![1.0, 1.0];
        assert!(!is_outside_bounds(array![0.0, 1.0].view(), lo.view(), hi.view()));
        assert!(is_outside_bounds(array![-1e-12, 0.0].view(), lo.view(), hi.view()));
        assert!(is_outside_bounds(array![0.5, 1.0 + 1e-12].view(), lo.view(), hi.view()));
    }

    #[test]
    fn infinite_limits_accept_everything_finite() {
        let lo = Array1::from_elem(3, f64::NEG_INFINITY);
        let hi = Array1::from_elem(3, f64::INFINITY);
        assert!(!is_outside_bounds(array![-1e300, 0.0, 1e300].view(), lo.view(), hi.view()));
    }

    proptest! {
        #[test]
        fn inside_box_is_never_flagged(
            point in prop::collection::vec((-10.0f64..10.0, 0.0f64..5.0, 0.0f64..5.0), 1..6)
        ) {
            let theta: Array1<f64> = point.iter().map(|(t, _, _)| *t).collect();
            let lo: Array1<f64> = point.iter().map(|(t, d, _)| t - d).collect();
            let hi: Array1<f64> = point.iter().map(|(t, _, d)| t + d).collect();
            prop_assert!(!is_outside_bounds(theta.view(), lo.view(), hi.view()));
        }

        #[test]
        fn one_violating_coordinate_is_enough(
            point in prop::collection::vec(-10.0f64..10.0, 1..6),
            which in any::<prop::sample::Index>(),
            excess in 1e-6f64..100.0,
            above in any::<bool>(),
        ) {
            let theta = Array1::from(point);
            let mut lo = &theta - 1.0;
            let mut hi = &theta + 1.0;
            let i = which.index(theta.len());
            if above {
                hi[i] = theta[i] - excess;
            } else {
                lo[i] = theta[i] + excess;
            }
            prop_assert!(is_outside_bounds(theta.view(), lo.view(), hi.view()));
        }
    }
}
