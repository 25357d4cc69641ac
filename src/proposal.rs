/*!
Gaussian proposals for the delayed rejection stages.

Every stage `i` has its own upper-triangular Cholesky factor `R_i` of the proposal
covariance `R_iᵀ R_i`. A candidate is drawn as `θ' = θ + u·R_i` with `u ~ N(0, I)`. The
acceptance ratio needs the whitening matrices `R_i⁻¹`, which [`StageFactors`] computes once
up front.
*/

use nalgebra::{Cholesky, DMatrix};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{DrError, Result};
use crate::parameter_set::Proposal;

/// Draws a candidate around `base_theta` using the stage factor `stage_chol`.
pub fn propose<R: Rng + ?Sized>(
    rng: &mut R,
    base_theta: ArrayView1<f64>,
    sigma2: ArrayView1<f64>,
    stage_chol: &Array2<f64>,
) -> Proposal {
    let npar = base_theta.len();
    let u: Array1<f64> = (0..npar).map(|_| rng.sample(StandardNormal)).collect();
    let theta = &base_theta + &u.dot(stage_chol);
    Proposal::new(theta, sigma2.to_owned())
}

/// Per-stage Cholesky factors together with their inverses.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFactors {
    chols: Vec<Array2<f64>>,
    inv_chols: Vec<Array2<f64>>,
}

impl StageFactors {
    /// Validates explicit per-stage factors. Stage 0 is the standard Metropolis proposal.
    pub fn new(chols: Vec<Array2<f64>>) -> Result<Self> {
        if chols.is_empty() {
            return Err(DrError::NoStages);
        }
        let npar = chols[0].nrows();
        let inv_chols = chols
            .iter()
            .enumerate()
            .map(|(stage, chol)| {
                validate_factor(stage, chol, npar)?;
                invert_upper(stage, chol)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { chols, inv_chols })
    }

    /// Builds `ntry` stages from one factor: stage 0 uses `base_chol`, stage `i` uses
    /// `base_chol / drscale[i - 1]`, repeating the last scale once they run out.
    pub fn from_drscale(base_chol: &Array2<f64>, drscale: &[f64], ntry: usize) -> Result<Self> {
        if ntry == 0 {
            return Err(DrError::InvalidOption {
                name: "ntry",
                reason: "at least one stage is required",
            });
        }
        validate_drscale(drscale)?;
        let chols = (0..ntry)
            .map(|stage| match stage {
                0 => base_chol.clone(),
                _ => base_chol / drscale[(stage - 1).min(drscale.len() - 1)],
            })
            .collect();
        Self::new(chols)
    }

    /// Number of stages, including the standard Metropolis stage.
    pub fn ntry(&self) -> usize {
        self.chols.len()
    }

    pub fn npar(&self) -> usize {
        self.chols[0].nrows()
    }

    pub fn chol(&self, stage: usize) -> &Array2<f64> {
        &self.chols[stage]
    }

    pub fn chols(&self) -> &[Array2<f64>] {
        &self.chols
    }

    pub fn inv_chols(&self) -> &[Array2<f64>] {
        &self.inv_chols
    }
}

pub(crate) fn validate_drscale(drscale: &[f64]) -> Result<()> {
    if drscale.is_empty() {
        return Err(DrError::InvalidOption {
            name: "drscale",
            reason: "at least one scale is required",
        });
    }
    if drscale.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return Err(DrError::InvalidOption {
            name: "drscale",
            reason: "scales must be positive and finite",
        });
    }
    Ok(())
}

fn validate_factor(stage: usize, chol: &Array2<f64>, npar: usize) -> Result<()> {
    let (rows, cols) = chol.dim();
    if rows != cols {
        return Err(DrError::NotSquare { stage, rows, cols });
    }
    if rows != npar {
        return Err(DrError::DimensionMismatch {
            what: "stage factor",
            expected: npar,
            found: rows,
        });
    }
    if chol.iter().any(|x| !x.is_finite()) {
        return Err(DrError::NonFinite { stage });
    }
    if chol.indexed_iter().any(|((i, j), x)| i > j && *x != 0.0) {
        return Err(DrError::NotUpperTriangular { stage });
    }
    if let Some(err) = singular_diagonal(stage, chol) {
        return Err(err);
    }
    Ok(())
}

fn singular_diagonal(stage: usize, chol: &Array2<f64>) -> Option<DrError> {
    chol.diag()
        .iter()
        .enumerate()
        .find(|(_, d)| !(**d > 0.0))
        .map(|(index, &value)| DrError::SingularFactor {
            stage,
            index,
            value,
        })
}

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[(i, j)])
}

fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Inverse of a validated upper-triangular stage factor.
fn invert_upper(stage: usize, r: &Array2<f64>) -> Result<Array2<f64>> {
    let n = r.nrows();
    to_dmatrix(r)
        .solve_upper_triangular(&DMatrix::<f64>::identity(n, n))
        .map(|inv| to_array2(&inv))
        .ok_or_else(|| {
            singular_diagonal(stage, r).unwrap_or(DrError::SingularFactor {
                stage,
                index: 0,
                value: 0.0,
            })
        })
}

/// Upper-triangular Cholesky factor `R` with `cov = Rᵀ R`.
///
/// Only the lower triangle of `cov` is read.
pub fn cholesky_upper(cov: &Array2<f64>) -> Result<Array2<f64>> {
    let (rows, cols) = cov.dim();
    if rows != cols {
        return Err(DrError::NotSquare {
            stage: 0,
            rows,
            cols,
        });
    }
    if cov.iter().any(|x| !x.is_finite()) {
        return Err(DrError::NotPositiveDefinite);
    }
    let chol = Cholesky::new(to_dmatrix(cov)).ok_or(DrError::NotPositiveDefinite)?;
    Ok(to_array2(&chol.l().transpose()))
}
