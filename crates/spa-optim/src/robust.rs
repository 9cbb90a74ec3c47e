//! Robust loss evaluation and residual rescaling.
//!
//! A loss maps the squared residual norm `s = ||r||²` to `ρ(s)`. The
//! least-squares backend only sees plain residuals, so each robustified block
//! is rewritten as `r̂ = g(s)·r` with `g = sqrt(ρ(s)/s)`, which gives
//! `½||r̂||² = ½ρ(s)`. The Jacobian of `r̂` is exact:
//!
//! ```text
//! Ĵ = g·J + c·r·(rᵀJ),   c = (ρ'(s)·s - ρ(s)) / (g·s²)
//! ```

use crate::ir::RobustLoss;
use nalgebra::{SMatrix, SVector};

impl RobustLoss {
    /// `[ρ(s), ρ'(s), ρ''(s)]` at squared residual norm `s`.
    ///
    /// ```text
    /// Huber(δ):  ρ(s) = s            if s ≤ δ²
    ///                   2δ√s - δ²    otherwise
    /// ```
    pub fn evaluate(&self, s: f64) -> [f64; 3] {
        match *self {
            RobustLoss::None => [s, 1.0, 0.0],
            RobustLoss::Huber { scale } => {
                let scale2 = scale * scale;
                if s <= scale2 {
                    // Quadratic region
                    [s, 1.0, 0.0]
                } else {
                    // Linear region
                    let r = s.sqrt();
                    [
                        2.0 * scale * r - scale2,
                        scale / r,
                        -scale / (2.0 * s * r),
                    ]
                }
            }
        }
    }

    /// Rescaling applied to a residual block with squared norm `s`.
    pub fn correction(&self, s: f64) -> RobustCorrection {
        let [rho, rho_prime, _] = self.evaluate(s);
        if s <= 0.0 || rho == s {
            return RobustCorrection::IDENTITY;
        }
        let scale = (rho / s).sqrt();
        RobustCorrection {
            scale,
            coupling: (rho_prime * s - rho) / (scale * s * s),
        }
    }
}

/// Linear map turning `(r, J)` into the robustified `(r̂, Ĵ)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustCorrection {
    /// `g(s)`
    pub scale: f64,
    /// `2·dg/ds`
    pub coupling: f64,
}

impl RobustCorrection {
    pub const IDENTITY: RobustCorrection = RobustCorrection {
        scale: 1.0,
        coupling: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn residual<const R: usize>(&self, r: &SVector<f64, R>) -> SVector<f64, R> {
        r * self.scale
    }

    /// `Ĵ` for the unscaled residual `r` and its Jacobian `j`.
    pub fn jacobian<const R: usize, const C: usize>(
        &self,
        r: &SVector<f64, R>,
        j: &SMatrix<f64, R, C>,
    ) -> SMatrix<f64, R, C> {
        if self.is_identity() {
            return *j;
        }
        j * self.scale + r * (r.transpose() * j) * self.coupling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn approx_eq(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "values differ: {} vs {} (tol={})",
            a,
            b,
            tol
        );
    }

    #[test]
    fn huber_matches_l2_for_small_residuals() {
        let loss = RobustLoss::Huber { scale: 1.0 };
        let [rho, d1, d2] = loss.evaluate(0.25);
        approx_eq(rho, 0.25, 1e-12);
        approx_eq(d1, 1.0, 1e-12);
        approx_eq(d2, 0.0, 1e-12);
        assert!(loss.correction(0.25).is_identity());
    }

    #[test]
    fn huber_linear_for_large_residuals() {
        let loss = RobustLoss::Huber { scale: 1.0 };
        let r: f64 = 5.0;
        let [rho, d1, _] = loss.evaluate(r * r);
        approx_eq(rho, 2.0 * r - 1.0, 1e-12);
        approx_eq(d1, 1.0 / r, 1e-12);
    }

    #[test]
    fn huber_is_continuous_at_threshold() {
        let loss = RobustLoss::Huber { scale: 2.0 };
        let below = loss.evaluate(4.0 - 1e-9);
        let above = loss.evaluate(4.0 + 1e-9);
        approx_eq(below[0], above[0], 1e-8);
        approx_eq(below[1], above[1], 1e-8);
    }

    #[test]
    fn corrected_cost_is_half_rho() {
        let loss = RobustLoss::Huber { scale: 1.0 };
        let r = Vector3::new(2.0, -1.5, 0.7);
        let s = r.norm_squared();
        let corr = loss.correction(s);
        let r_hat = corr.residual(&r);
        approx_eq(0.5 * r_hat.norm_squared(), 0.5 * loss.evaluate(s)[0], 1e-12);
    }

    #[test]
    fn corrected_jacobian_matches_finite_differences() {
        // r(x) = A x + b, robustified with Huber(1)
        let a = Matrix3::new(1.2, -0.3, 0.5, 0.4, 2.0, -0.1, -0.6, 0.2, 1.5);
        let b = Vector3::new(0.8, -1.1, 2.4);
        let loss = RobustLoss::Huber { scale: 1.0 };
        let robust = |x: &Vector3<f64>| {
            let r = a * x + b;
            loss.correction(r.norm_squared()).residual(&r)
        };

        let x0 = Vector3::new(0.3, 0.1, -0.2);
        let r0 = a * x0 + b;
        assert!(r0.norm_squared() > 1.0, "sample must be in the linear region");
        let j_hat = loss.correction(r0.norm_squared()).jacobian(&r0, &a);

        let h = 1e-6;
        for k in 0..3 {
            let mut xp = x0;
            let mut xm = x0;
            xp[k] += h;
            xm[k] -= h;
            let fd = (robust(&xp) - robust(&xm)) / (2.0 * h);
            for row in 0..3 {
                approx_eq(j_hat[(row, k)], fd[row], 1e-6);
            }
        }
    }

    #[test]
    fn no_loss_is_identity() {
        let corr = RobustLoss::None.correction(100.0);
        assert!(corr.is_identity());
    }
}
