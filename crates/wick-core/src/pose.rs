//! The `Pose` value type and its algebra.
//!
//! A pose is a scaled rigid transform (non-uniform scale, unit quaternion
//! rotation, translation). Every node in the animation graph produces one
//! pose per skeleton joint, so the operations here sit on the hot path of
//! each evaluated frame.

use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::quat::safe_lerp;

/// A scaled rigid transform: applied to a point `p` it computes
/// `trans + rot * (scale * p)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub scale: Vec3,
    pub rot: Quat,
    pub trans: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        scale: Vec3::ONE,
        rot: Quat::IDENTITY,
        trans: Vec3::ZERO,
    };

    pub const fn new(scale: Vec3, rot: Quat, trans: Vec3) -> Self {
        Self { scale, rot, trans }
    }

    /// A pose with unit scale.
    pub const fn from_rot_trans(rot: Quat, trans: Vec3) -> Self {
        Self {
            scale: Vec3::ONE,
            rot,
            trans,
        }
    }

    pub fn from_mat4(mat: &Mat4) -> Self {
        let (scale, rot, trans) = mat.to_scale_rotation_translation();
        Self {
            scale,
            rot: rot.normalize(),
            trans,
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rot, self.trans)
    }

    /// Transform a point.
    pub fn xform_point(&self, rhs: Vec3) -> Vec3 {
        self.trans + self.rot * (self.scale * rhs)
    }

    /// Transform a direction, correct under non-uniform scale
    /// (inverse-transpose of the linear part).
    pub fn xform_vector(&self, rhs: Vec3) -> Vec3 {
        let x_axis = self.rot * Vec3::new(self.scale.x, 0.0, 0.0);
        let y_axis = self.rot * Vec3::new(0.0, self.scale.y, 0.0);
        let z_axis = self.rot * Vec3::new(0.0, 0.0, self.scale.z);
        let mat = Mat3::from_cols(x_axis, y_axis, z_axis);
        mat.transpose().inverse() * rhs
    }

    /// Transform a direction assuming near-uniform scale (no
    /// inverse-transpose); cheap and exact for rigid poses.
    pub fn xform_vector_fast(&self, rhs: Vec3) -> Vec3 {
        self.rot * (self.scale * rhs)
    }

    /// Compose two poses: `(a * b).xform_point(p) == a.xform_point(b.xform_point(p))`.
    pub fn compose(&self, rhs: &Pose) -> Pose {
        Pose::from_mat4(&(self.to_mat4() * rhs.to_mat4()))
    }

    /// Inverse pose. Only valid for non-degenerate scale.
    pub fn inverse(&self) -> Pose {
        Pose::from_mat4(&self.to_mat4().inverse())
    }

    /// Reflect across the local YZ plane without introducing negative scale.
    pub fn mirrored(&self) -> Pose {
        Pose {
            scale: self.scale,
            rot: Quat::from_xyzw(self.rot.x, -self.rot.y, -self.rot.z, self.rot.w),
            trans: Vec3::new(-self.trans.x, self.trans.y, self.trans.z),
        }
    }

    /// Blend toward `other`: scale and translation lerp, rotation by
    /// shortest-arc lerp with renormalisation.
    pub fn blend(&self, other: &Pose, alpha: f32) -> Pose {
        Pose {
            scale: self.scale.lerp(other.scale, alpha),
            rot: safe_lerp(self.rot, other.rot, alpha),
            trans: self.trans.lerp(other.trans, alpha),
        }
    }
}

impl std::ops::Mul for Pose {
    type Output = Pose;
    fn mul(self, rhs: Pose) -> Pose {
        self.compose(&rhs)
    }
}

impl std::ops::Mul<Vec3> for Pose {
    type Output = Vec3;
    fn mul(self, rhs: Vec3) -> Vec3 {
        self.xform_point(rhs)
    }
}

/// Linearly blend two full pose slices into `out`.
///
/// `alpha` of 0.0 = fully `a`, 1.0 = fully `b`. Rotation uses shortest-arc
/// lerp with renormalisation.
pub fn blend_poses(a: &[Pose], b: &[Pose], alpha: f32, out: &mut [Pose]) {
    let count = a.len().min(b.len()).min(out.len());
    for i in 0..count {
        out[i] = a[i].blend(&b[i], alpha);
    }
}

/// Additive blend: layer `b` as a delta on top of `a`.
///
/// Scale multiplies by `lerp(1, b.scale, alpha)`; rotation composes a
/// polarity-corrected delta lerped up from identity; translation adds
/// `alpha * b.trans`.
pub fn blend_poses_additive(a: &[Pose], b: &[Pose], alpha: f32, out: &mut [Pose]) {
    let count = a.len().min(b.len()).min(out.len());
    for i in 0..count {
        // keep the delta in the same hemisphere as identity; sign of w suffices.
        let mut delta = b[i].rot;
        if delta.w < 0.0 {
            delta = -delta;
        }
        let delta = Quat::IDENTITY.lerp(delta, alpha);
        out[i] = Pose {
            scale: a[i].scale * Vec3::ONE.lerp(b[i].scale, alpha),
            rot: (a[i].rot * delta).normalize(),
            trans: a[i].trans + alpha * b[i].trans,
        };
    }
}

/// Blend four pose slices with the given weights (weights should sum to 1).
///
/// Rotations are combined as a sign-corrected weighted quaternion sum,
/// normalized; a good approximation of the weighted mean for small spreads.
pub fn blend_poses4(
    a: &[Pose],
    b: &[Pose],
    c: &[Pose],
    d: &[Pose],
    alphas: [f32; 4],
    out: &mut [Pose],
) {
    let count = a
        .len()
        .min(b.len())
        .min(c.len())
        .min(d.len())
        .min(out.len());
    for i in 0..count {
        let rots = [a[i].rot, b[i].rot, c[i].rot, d[i].rot];
        let mut accum = rots[0] * alphas[0];
        for j in 1..4 {
            let mut rot = rots[j];
            if rots[0].dot(rot) < 0.0 {
                rot = -rot;
            }
            accum = accum + rot * alphas[j];
        }
        out[i] = Pose {
            scale: a[i].scale * alphas[0]
                + b[i].scale * alphas[1]
                + c[i].scale * alphas[2]
                + d[i].scale * alphas[3],
            rot: accum.normalize(),
            trans: a[i].trans * alphas[0]
                + b[i].trans * alphas[1]
                + c[i].trans * alphas[2]
                + d[i].trans * alphas[3],
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-5;

    fn poses_close(a: &Pose, b: &Pose, eps: f32) -> bool {
        (a.trans - b.trans).length() < eps
            && (a.scale - b.scale).length() < eps
            && a.rot.dot(b.rot).abs() > 1.0 - eps
    }

    #[test]
    fn identity_is_neutral_for_composition() {
        let p = Pose::new(
            Vec3::ONE,
            Quat::from_axis_angle(Vec3::Z, 0.7),
            Vec3::new(1.0, 2.0, 3.0),
        );
        assert!(poses_close(&(p * Pose::IDENTITY), &p, EPSILON));
        assert!(poses_close(&(Pose::IDENTITY * p), &p, EPSILON));
    }

    #[test]
    fn compose_with_inverse_is_identity() {
        let p = Pose::new(
            Vec3::new(1.0, 2.0, 0.5),
            Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 1.2),
            Vec3::new(-4.0, 1.0, 9.0),
        );
        let result = p * p.inverse();
        assert!(poses_close(&result, &Pose::IDENTITY, EPSILON));
    }

    #[test]
    fn composition_matches_point_application() {
        let parent = Pose::new(
            Vec3::ONE,
            Quat::from_axis_angle(Vec3::X, 0.4),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let child = Pose::new(
            Vec3::ONE,
            Quat::from_axis_angle(Vec3::Z, -0.9),
            Vec3::new(2.0, 0.0, 0.0),
        );
        let p = Vec3::new(0.3, -0.2, 0.7);
        let composed = (parent * child) * p;
        let nested = parent * (child * p);
        assert!((composed - nested).length() < EPSILON);
    }

    #[test]
    fn mirror_flips_x_translation_and_rotation() {
        let p = Pose::new(
            Vec3::ONE,
            Quat::from_axis_angle(Vec3::Y, 0.5),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let m = p.mirrored();
        assert!((m.trans - Vec3::new(-1.0, 2.0, 3.0)).length() < EPSILON);
        assert!((m.rot.y + p.rot.y).abs() < EPSILON);
        assert!((m.rot.w - p.rot.w).abs() < EPSILON);
        // mirroring twice is the identity operation
        assert!(poses_close(&m.mirrored(), &p, EPSILON));
    }

    #[test]
    fn blend_endpoints_and_midpoint() {
        let a = [Pose::from_rot_trans(Quat::IDENTITY, Vec3::ZERO)];
        let b = [Pose::new(
            Vec3::splat(3.0),
            Quat::from_axis_angle(Vec3::Y, FRAC_PI_2),
            Vec3::new(10.0, 20.0, 30.0),
        )];
        let mut out = [Pose::IDENTITY];

        blend_poses(&a, &b, 0.0, &mut out);
        assert!(poses_close(&out[0], &a[0], EPSILON));

        blend_poses(&a, &b, 1.0, &mut out);
        assert!(poses_close(&out[0], &b[0], EPSILON));

        blend_poses(&a, &b, 0.5, &mut out);
        assert!((out[0].trans - Vec3::new(5.0, 10.0, 15.0)).length() < EPSILON);
        assert!((out[0].scale - Vec3::splat(2.0)).length() < EPSILON);
        let expected = a[0].blend(&b[0], 0.5);
        assert!(poses_close(&out[0], &expected, EPSILON));
    }

    #[test]
    fn additive_blend_zero_weight_returns_base() {
        let base = [Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(1.0, 2.0, 3.0))];
        let add = [Pose::from_rot_trans(
            Quat::from_axis_angle(Vec3::X, 0.8),
            Vec3::new(5.0, 5.0, 5.0),
        )];
        let mut out = [Pose::IDENTITY];
        blend_poses_additive(&base, &add, 0.0, &mut out);
        assert!(poses_close(&out[0], &base[0], EPSILON));
    }

    #[test]
    fn additive_blend_full_weight_adds_delta() {
        let base = [Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(1.0, 2.0, 3.0))];
        let add = [Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(5.0, 0.0, 0.0))];
        let mut out = [Pose::IDENTITY];
        blend_poses_additive(&base, &add, 1.0, &mut out);
        assert!((out[0].trans - Vec3::new(6.0, 2.0, 3.0)).length() < EPSILON);
    }

    #[test]
    fn blend4_equal_weights_average_translations() {
        let mk = |x: f32| [Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(x, 0.0, 0.0))];
        let (a, b, c, d) = (mk(0.0), mk(1.0), mk(2.0), mk(3.0));
        let mut out = [Pose::IDENTITY];
        blend_poses4(&a, &b, &c, &d, [0.25; 4], &mut out);
        assert!((out[0].trans.x - 1.5).abs() < EPSILON);
        assert!((out[0].rot.length() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn xform_vector_handles_nonuniform_scale() {
        // a plane normal must be transformed by the inverse transpose
        let p = Pose::new(Vec3::new(2.0, 1.0, 1.0), Quat::IDENTITY, Vec3::ZERO);
        let n = p.xform_vector(Vec3::X);
        assert!((n - Vec3::new(0.5, 0.0, 0.0)).length() < EPSILON);
    }
}
