use nalgebra::{Matrix3, Vector2, Vector3};
use std::f64::consts::{PI, TAU};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Mat3 = Matrix3<Real>;

/// Wrap an angle into `(-π, π]`.
///
/// Closed-form reduction, constant time for any finite input. Non-finite
/// input propagates as NaN.
pub fn normalize_angle(a: Real) -> Real {
    let wrapped = PI - (PI - a).rem_euclid(TAU);
    // rem_euclid may round up to exactly TAU
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
