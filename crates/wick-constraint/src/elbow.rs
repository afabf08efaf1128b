//! Hinge constraint for elbows and knees.

use glam::{Quat, Vec3};
use wick_core::quat::{average_quats, swing_twist_decomposition};
use wick_core::{Result, WickError};

const AXIS_EPSILON: f32 = 1.0e-4;
// just under 1/sqrt(3): a normalized vector always has one component this large
const MIN_LARGEST_COMPONENT: f32 = 0.57735;
// |swing.w| above this means the swing is negligible
const MIN_SWING_REAL_PART: f32 = 0.99999;

/// A hinge about a fixed axis with a signed angle range.
///
/// Any input rotation is factored into swing and twist about the hinge;
/// the twist angle is clamped to `[min_angle, max_angle]` and the swing is
/// discarded entirely, so the joint can only ever rotate about its hinge.
#[derive(Debug, Clone)]
pub struct ElbowConstraint {
    reference_rotation: Quat,
    axis: Vec3,
    perp_axis: Vec3,
    min_angle: f32,
    max_angle: f32,
}

impl ElbowConstraint {
    /// `hinge_axis` is expressed in the joint's local frame and need not be
    /// normalized; `min_angle`/`max_angle` should lie in [-PI, PI].
    pub fn new(
        reference_rotation: Quat,
        hinge_axis: Vec3,
        min_angle: f32,
        max_angle: f32,
    ) -> Result<Self> {
        let axis_length = hinge_axis.length();
        if axis_length < AXIS_EPSILON {
            return Err(WickError::InvalidParameter(
                "elbow constraint hinge axis is degenerate".into(),
            ));
        }
        let axis = hinge_axis / axis_length;

        // a second axis perpendicular to the hinge, used to measure the
        // signed twist angle
        let mut perp_axis = Vec3::ZERO;
        for i in 0..3 {
            let component = axis[i];
            if component.abs() > MIN_LARGEST_COMPONENT {
                let j = (i + 1) % 3;
                let k = (j + 1) % 3;
                perp_axis[i] = -axis[j];
                perp_axis[j] = component;
                perp_axis[k] = 0.0;
                perp_axis = perp_axis.normalize();
                break;
            }
        }

        Ok(Self {
            reference_rotation,
            axis,
            perp_axis,
            min_angle: min_angle.min(max_angle),
            max_angle: min_angle.max(max_angle),
        })
    }

    pub fn reference_rotation(&self) -> Quat {
        self.reference_rotation
    }

    pub fn hinge_axis(&self) -> Vec3 {
        self.axis
    }

    pub fn min_angle(&self) -> f32 {
        self.min_angle
    }

    pub fn max_angle(&self) -> f32 {
        self.max_angle
    }

    /// Clamp `rotation` in place. Returns true if it was changed.
    pub fn apply(&self, rotation: &mut Quat) -> bool {
        // rotation = post_rotation * reference_rotation
        let post_rotation = *rotation * self.reference_rotation.inverse();
        let (swing, mut twist) = swing_twist_decomposition(post_rotation, self.axis);

        // signed twist angle about the hinge
        let mut twist_angle = 2.0 * twist.w.abs().clamp(-1.0, 1.0).acos();
        let twisted = twist * self.perp_axis;
        twist_angle *= self.perp_axis.cross(twisted).dot(self.axis).signum();

        let clamped_twist_angle = twist_angle.clamp(self.min_angle, self.max_angle);
        let twist_was_clamped = twist_angle != clamped_twist_angle;

        if twist_was_clamped || swing.w.abs() < MIN_SWING_REAL_PART {
            if twist_was_clamped {
                twist = Quat::from_axis_angle(self.axis, clamped_twist_angle);
            }
            // discard all swing, keep only twist
            *rotation = twist * self.reference_rotation;
            return true;
        }
        false
    }

    /// Midpoint of the two angle limits in rotation space.
    pub fn center_rotation(&self) -> Quat {
        let limits = [
            Quat::from_axis_angle(self.axis, self.min_angle) * self.reference_rotation,
            Quat::from_axis_angle(self.axis, self.max_angle) * self.reference_rotation,
        ];
        average_quats(&limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const EPSILON: f32 = 1e-4;

    fn quats_close(a: Quat, b: Quat, eps: f32) -> bool {
        a.dot(b).abs() > 1.0 - eps
    }

    #[test]
    fn rotations_inside_limits_pass_through() {
        let constraint =
            ElbowConstraint::new(Quat::IDENTITY, Vec3::X, -PI / 4.0, PI / 3.0).unwrap();
        let small = PI / 100.0;
        let num_checks = 10;
        let start = -PI / 4.0 + small;
        let end = PI / 3.0 - small;
        for i in 0..num_checks {
            let angle = start + (end - start) * i as f32 / (num_checks - 1) as f32;
            let mut rotation = Quat::from_axis_angle(Vec3::X, angle);
            let input = rotation;
            let updated = constraint.apply(&mut rotation);
            assert!(!updated, "angle {} should be inside the range", angle);
            assert!(quats_close(rotation, input, EPSILON));
        }
    }

    #[test]
    fn rotation_outside_min_clamps_to_min() {
        let min = -PI / 4.0;
        let max = PI / 3.0;
        let constraint = ElbowConstraint::new(Quat::IDENTITY, Vec3::X, min, max).unwrap();
        let mut rotation = Quat::from_axis_angle(Vec3::X, min - PI / 100.0);
        assert!(constraint.apply(&mut rotation));
        assert!(quats_close(rotation, Quat::from_axis_angle(Vec3::X, min), EPSILON));
    }

    #[test]
    fn rotation_outside_max_clamps_to_max() {
        let min = -PI / 4.0;
        let max = PI / 3.0;
        let constraint = ElbowConstraint::new(Quat::IDENTITY, Vec3::X, min, max).unwrap();
        let mut rotation = Quat::from_axis_angle(Vec3::X, max + PI / 100.0);
        assert!(constraint.apply(&mut rotation));
        assert!(quats_close(rotation, Quat::from_axis_angle(Vec3::X, max), EPSILON));
    }

    #[test]
    fn pure_swing_clamps_to_reference() {
        let constraint =
            ElbowConstraint::new(Quat::IDENTITY, Vec3::X, -PI / 4.0, PI / 3.0).unwrap();
        // a rotation about an axis perpendicular to the hinge has no twist
        let swing_axis = Vec3::X.cross(Vec3::new(7.0, -5.0, 2.0)).normalize();
        let mut rotation = Quat::from_axis_angle(swing_axis, 0.789);
        assert!(constraint.apply(&mut rotation));
        assert!(quats_close(rotation, Quat::IDENTITY, EPSILON));
    }

    #[test]
    fn nonidentity_reference_is_respected() {
        let reference = Quat::from_axis_angle(Vec3::new(1.0, 2.0, -3.0).normalize(), 1.23);
        let constraint = ElbowConstraint::new(reference, Vec3::X, -PI / 4.0, PI / 3.0).unwrap();

        let mut rotation = reference;
        assert!(!constraint.apply(&mut rotation));
        assert!(quats_close(rotation, reference, EPSILON));

        let max = PI / 3.0;
        let mut rotation = Quat::from_axis_angle(Vec3::X, max + 0.05) * reference;
        assert!(constraint.apply(&mut rotation));
        assert!(quats_close(
            rotation,
            Quat::from_axis_angle(Vec3::X, max) * reference,
            EPSILON
        ));
    }

    #[test]
    fn center_rotation_is_the_limit_midpoint() {
        let constraint = ElbowConstraint::new(Quat::IDENTITY, Vec3::X, 0.0, PI / 2.0).unwrap();
        let center = constraint.center_rotation();
        assert!(quats_close(
            center,
            Quat::from_axis_angle(Vec3::X, PI / 4.0),
            EPSILON
        ));
    }

    #[test]
    fn degenerate_axis_is_rejected() {
        assert!(ElbowConstraint::new(Quat::IDENTITY, Vec3::ZERO, 0.0, 1.0).is_err());
    }
}
