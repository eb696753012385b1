//! Core shared types for the enveloping algorithms (engine-agnostic).

use nalgebra::{Isometry3, Matrix3};
use parry3d::math::{Point, Real, Vector};

// ----- tolerances governing degenerate-case handling -----

/// Chords shorter than this are treated as no intersection.
pub const CHORD_EPS: Real = 1.0e-6;
/// Accumulated interpenetration volume below this is no contact.
pub const VOLUME_EPS: Real = 1.0e-9;
/// Directions shorter than this cannot be normalized.
pub const NORMAL_EPS: Real = 1.0e-6;
/// Determinant threshold for line/surface parallelism.
pub const PARALLEL_EPS: Real = 1.0e-7;
/// Slack added to the per-rib culling slab.
pub const SLAB_CULL_TOL: Real = 1.0e-4;
/// Allowed deviation of a pose rotation from orthonormality.
pub const ORTHONORMAL_TOL: Real = 1.0e-3;

/// Which enveloping algorithm a `setup` call runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopingMethod {
    /// Exact circular-segment integration over triangle/disk chords.
    Geometric,
    /// Four downward line casts through the contact patch.
    Sampling,
}

/// World pose of a shell: translation plus a rotation block that is expected
/// to be orthonormal. The rotation is validated, never renormalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub translation: Vector<Real>,
    pub rotation: Matrix3<Real>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            translation: Vector::zeros(),
            rotation: Matrix3::identity(),
        }
    }

    pub fn new(translation: Vector<Real>, rotation: Matrix3<Real>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_isometry(iso: &Isometry3<Real>) -> Self {
        Self {
            translation: iso.translation.vector,
            rotation: iso.rotation.to_rotation_matrix().into_inner(),
        }
    }

    /// True when `rotation`ᵀ·`rotation` deviates from identity by at most `tol`
    /// in any entry.
    pub fn is_orthonormal(&self, tol: Real) -> bool {
        let e = self.rotation.transpose() * self.rotation - Matrix3::identity();
        e.amax() <= tol
    }

    #[inline]
    pub fn point_to_world(&self, p: &Point<Real>) -> Point<Real> {
        Point::from(self.rotation * p.coords + self.translation)
    }

    #[inline]
    pub fn vector_to_world(&self, v: &Vector<Real>) -> Vector<Real> {
        self.rotation * v
    }
}

/// One disk-shaped contact primitive: a cross-sectional slice of the shell.
/// Immutable once the shell is sized.
#[derive(Clone, Copy, Debug)]
pub struct Rib {
    pub radius: Real,
    /// Disk center in the shell's local frame; rib centers are ordered
    /// monotonically along the local lateral (y) axis.
    pub center: Point<Real>,
    /// Disk axis in the shell's local frame (unit, lateral).
    pub normal: Vector<Real>,
    pub width: Real,
    /// Static inclination of this slice relative to the shell plane (rad).
    pub inclination: Real,
}

/// World-space frame of one rib, recomputed once per step from the pose.
#[derive(Clone, Copy, Debug)]
pub struct RibFrame {
    /// Disk center, world.
    pub center: Point<Real>,
    /// Disk axis (shell lateral), world.
    pub axis: Vector<Real>,
    /// Shell local x (rolling direction), world.
    pub longitudinal: Vector<Real>,
    /// Shell local z, world.
    pub up: Vector<Real>,
}

impl RibFrame {
    pub fn new(rib: &Rib, pose: &Pose) -> Self {
        Self {
            center: pose.point_to_world(&rib.center),
            axis: pose.vector_to_world(&rib.normal),
            longitudinal: pose.vector_to_world(&Vector::x()),
            up: pose.vector_to_world(&Vector::z()),
        }
    }
}

/// Per-rib contact quantities. After a `setup` every field is well-defined;
/// before the first one the sentinel from `unknown()` is visible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactOutput {
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub friction: Real,
    pub depth: Real,
    pub area: Real,
    pub volume: Real,
}

impl ContactOutput {
    /// "Currently unknown": NaN geometry, zero scalars.
    pub fn unknown() -> Self {
        Self {
            point: Point::new(Real::NAN, Real::NAN, Real::NAN),
            normal: Vector::new(Real::NAN, Real::NAN, Real::NAN),
            friction: 0.0,
            depth: 0.0,
            area: 0.0,
            volume: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthonormality_check() {
        let pose = Pose::identity();
        assert!(pose.is_orthonormal(ORTHONORMAL_TOL));

        let mut skewed = Pose::identity();
        skewed.rotation[(0, 1)] = 0.2;
        assert!(!skewed.is_orthonormal(ORTHONORMAL_TOL));

        let iso = Isometry3::rotation(Vector::new(0.3, -0.1, 0.7));
        let from_iso = Pose::from_isometry(&iso);
        assert!(from_iso.is_orthonormal(ORTHONORMAL_TOL));
    }

    #[test]
    fn pose_transforms() {
        let iso = Isometry3::new(Vector::new(1.0, 2.0, 3.0), Vector::new(0.0, 0.0, 0.5));
        let pose = Pose::from_isometry(&iso);
        let p = Point::new(0.5, -0.5, 0.25);
        let expected = iso * p;
        let got = pose.point_to_world(&p);
        assert!((got - expected).norm() < 1.0e-6);
    }

    #[test]
    fn unknown_output_is_nan_and_zero() {
        let out = ContactOutput::unknown();
        assert!(out.point.x.is_nan());
        assert!(out.normal.z.is_nan());
        assert_eq!(out.depth, 0.0);
        assert_eq!(out.volume, 0.0);
    }
}
