use crate::math::{normalize_angle, Real, Vec2};
use nalgebra::Rotation2;
use serde::{Deserialize, Serialize};

/// Rigid 2-D transform from a pose-local frame to the common reference frame.
///
/// The rotation is stored as a plain angle in radians. Operations that
/// produce a new angle wrap it into `(-π, π]`; the constructor does not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose2 {
    pub translation: Vec2,
    pub rotation: Real,
}

impl Default for Pose2 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose2 {
    pub fn new(x: Real, y: Real, theta: Real) -> Self {
        Self {
            translation: Vec2::new(x, y),
            rotation: theta,
        }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn x(&self) -> Real {
        self.translation.x
    }

    pub fn y(&self) -> Real {
        self.translation.y
    }

    pub fn angle(&self) -> Real {
        self.rotation
    }

    fn rotation_matrix(&self) -> Rotation2<Real> {
        Rotation2::new(self.rotation)
    }

    /// `self ∘ other`: apply `other` in the frame of `self`.
    pub fn compose(&self, other: &Pose2) -> Pose2 {
        Pose2 {
            translation: self.translation + self.rotation_matrix() * other.translation,
            rotation: normalize_angle(self.rotation + other.rotation),
        }
    }

    pub fn inverse(&self) -> Pose2 {
        let r_inv = self.rotation_matrix().inverse();
        Pose2 {
            translation: -(r_inv * self.translation),
            rotation: normalize_angle(-self.rotation),
        }
    }

    /// Relative transform from `self` to `other`, expressed in `self`'s frame.
    pub fn between(&self, other: &Pose2) -> Pose2 {
        self.inverse().compose(other)
    }

    /// Flat `[x, y, θ]` layout used by optimizer parameter blocks.
    pub fn to_array(&self) -> [Real; 3] {
        [self.translation.x, self.translation.y, self.rotation]
    }

    pub fn from_array(v: [Real; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}
