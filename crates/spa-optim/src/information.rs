//! Square-root information factors for whitening residuals.

use crate::error::{Result, SpaError};
use log::debug;
use nalgebra::Cholesky;
use spa_core::{Mat3, Real};

const SYMMETRY_TOL: Real = 1e-9;
const PIVOT_TOL: Real = 1e-12;

/// Upper-triangular `S` with `Sᵀ S = information`.
///
/// Positive definite inputs go through a regular Cholesky decomposition.
/// Semi-definite inputs (zero pivots) fall back to a pivot-tolerant
/// factorization that leaves the corresponding rows of `S` at zero.
pub fn sqrt_information(information: &Mat3) -> Result<Mat3> {
    if information.iter().any(|v| !v.is_finite()) {
        return Err(SpaError::SingularInformation(
            "matrix contains non-finite entries".to_string(),
        ));
    }

    let scale = information.amax().max(1.0);
    let asym = (information - information.transpose()).amax();
    if asym > SYMMETRY_TOL * scale {
        return Err(SpaError::SingularInformation(format!(
            "matrix is not symmetric (max asymmetry {asym:e})"
        )));
    }

    if let Some(chol) = Cholesky::new(*information) {
        return Ok(chol.l().transpose());
    }

    debug!("information matrix is not positive definite, trying semi-definite factorization");
    semidefinite_upper_factor(information, PIVOT_TOL * scale)
}

fn semidefinite_upper_factor(a: &Mat3, tol: Real) -> Result<Mat3> {
    let mut u = Mat3::zeros();
    for i in 0..3 {
        let mut d = a[(i, i)];
        for k in 0..i {
            d -= u[(k, i)] * u[(k, i)];
        }
        if d < -tol {
            return Err(SpaError::SingularInformation(format!(
                "negative pivot {d:e} at index {i}"
            )));
        }

        if d <= tol {
            // zero pivot: the rest of the row must vanish as well
            for j in (i + 1)..3 {
                let mut off = a[(i, j)];
                for k in 0..i {
                    off -= u[(k, i)] * u[(k, j)];
                }
                if off.abs() > tol.sqrt() {
                    return Err(SpaError::SingularInformation(format!(
                        "zero pivot at index {i} with non-zero coupling {off:e}"
                    )));
                }
            }
            continue;
        }

        let pivot = d.sqrt();
        u[(i, i)] = pivot;
        for j in (i + 1)..3 {
            let mut off = a[(i, j)];
            for k in 0..i {
                off -= u[(k, i)] * u[(k, j)];
            }
            u[(i, j)] = off / pivot;
        }
    }
    Ok(u)
}
