//! Swing-twist constraint for ball joints (shoulders, hips, wrists).
//!
//! A rotation measured from the reference is factored into a twist about
//! the joint's local Y axis followed by a swing about an axis in the XZ
//! plane. The twist angle is clamped to a signed range; the swing is
//! clamped against a direction-dependent envelope stored as a lookup table
//! of minimum dot products, following the unit-quaternion joint-limit
//! parameterisation of Liu and Prakash.

use glam::{Quat, Vec3};
use std::f32::consts::TAU;
use wick_core::quat::{average_quats, swing_twist_decomposition};

const MIN_MINDOT: f32 = -0.999;
const MAX_MINDOT: f32 = 1.0;
const AXIS_EPSILON: f32 = 1.0e-5;

/// Which twist limit clamped last frame; disambiguates angles near the
/// +/-PI seam so the twist does not pop between representations 2*PI apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TwistBoundary {
    Low,
    High,
    #[default]
    None,
}

/// Cyclic lookup table of minimum `dot(Y, swungY)` values as a function of
/// the swing-axis angle theta in [0, 2*PI).
#[derive(Debug, Clone)]
pub struct SwingLimitFunction {
    // the first value is duplicated at the back for cyclic interpolation
    min_dots: Vec<f32>,
}

impl Default for SwingLimitFunction {
    fn default() -> Self {
        // unconstrained
        Self::from_min_dots(&[])
    }
}

impl SwingLimitFunction {
    /// Build from minimum dot products at uniformly spaced theta values.
    /// An empty slice produces a nearly-free constraint.
    pub fn from_min_dots(min_dots: &[f32]) -> Self {
        let mut table = Vec::with_capacity(min_dots.len().max(1) + 1);
        if min_dots.is_empty() {
            table.push(MIN_MINDOT);
        } else {
            for &dot in min_dots {
                table.push(dot.clamp(MIN_MINDOT, MAX_MINDOT));
            }
        }
        // duplicate the first value to establish cyclic boundary conditions
        table.push(table[0]);
        Self { min_dots: table }
    }

    /// Minimum allowed `dot(Y, swungY)` at swing-axis angle `theta`.
    pub fn min_dot(&self, theta: f32) -> f32 {
        let mut normalized = (theta / TAU).fract();
        if normalized < 0.0 {
            normalized += 1.0;
        }
        let scaled = normalized * (self.min_dots.len() - 1) as f32;
        let i = scaled.floor() as usize;
        let j = (i + 1) % self.min_dots.len();
        let fraction = scaled.fract();
        self.min_dots[i] * (1.0 - fraction) + self.min_dots[j] * fraction
    }

    pub fn min_dots(&self) -> &[f32] {
        &self.min_dots
    }
}

/// Twist range about local Y plus a swing envelope in the XZ plane.
#[derive(Debug, Clone)]
pub struct SwingTwistConstraint {
    reference_rotation: Quat,
    swing_limit: SwingLimitFunction,
    min_twist: f32,
    max_twist: f32,
    last_twist_boundary: TwistBoundary,
}

impl Default for SwingTwistConstraint {
    fn default() -> Self {
        Self::new(Quat::IDENTITY)
    }
}

impl SwingTwistConstraint {
    pub fn new(reference_rotation: Quat) -> Self {
        Self {
            reference_rotation,
            swing_limit: SwingLimitFunction::default(),
            min_twist: -std::f32::consts::PI,
            max_twist: std::f32::consts::PI,
            last_twist_boundary: TwistBoundary::None,
        }
    }

    pub fn reference_rotation(&self) -> Quat {
        self.reference_rotation
    }

    pub fn set_reference_rotation(&mut self, reference: Quat) {
        self.reference_rotation = reference;
    }

    /// `min_twist`/`max_twist` should be in [-PI, PI].
    pub fn set_twist_limits(&mut self, min_twist: f32, max_twist: f32) {
        self.min_twist = min_twist.min(max_twist);
        self.max_twist = min_twist.max(max_twist);
        self.last_twist_boundary = TwistBoundary::None;
    }

    /// Swing limits as minimum dot products at uniformly spaced thetas.
    pub fn set_swing_limits(&mut self, min_dots: &[f32]) {
        self.swing_limit = SwingLimitFunction::from_min_dots(min_dots);
    }

    /// Swing limits authored as a set of allowed swung directions. Each
    /// direction yields a (theta, minDot) pair; the pairs are sorted by
    /// theta and resampled onto a uniform grid for fast lookup. The
    /// directions need not be normalized or uniformly spread.
    pub fn set_swing_limits_from_directions(&mut self, swung_directions: &[Vec3]) {
        struct Limit {
            theta: f32,
            min_dot: f32,
        }

        let mut limits: Vec<Limit> = Vec::with_capacity(swung_directions.len());
        for direction in swung_directions {
            let length = direction.length();
            if length < AXIS_EPSILON {
                continue;
            }
            let swing_axis = Vec3::Y.cross(*direction);
            let mut theta = (-swing_axis.z).atan2(swing_axis.x);
            if theta < 0.0 {
                theta += TAU;
            }
            limits.push(Limit {
                theta,
                min_dot: direction.y / length,
            });
        }

        match limits.len() {
            0 => self.set_swing_limits(&[]),
            1 => {
                let min_dot = limits[0].min_dot;
                self.set_swing_limits(&[min_dot]);
            }
            n => {
                limits.sort_by(|a, b| a.theta.total_cmp(&b.theta));

                // resample onto n uniformly spaced thetas
                let delta_theta = TAU / n as f32;
                let mut min_dots = Vec::with_capacity(n);
                for i in 0..n {
                    let theta = i as f32 * delta_theta;
                    let right = limits
                        .iter()
                        .position(|limit| limit.theta >= theta)
                        .unwrap_or(0);
                    let left = (right + n - 1) % n;
                    let mut left_theta = limits[left].theta;
                    let mut right_theta = limits[right].theta;
                    if left_theta > right_theta {
                        // straddling the cyclic boundary
                        if left_theta > theta {
                            left_theta -= TAU;
                        } else {
                            right_theta += TAU;
                        }
                    }
                    let span = right_theta - left_theta;
                    let weight = if span.abs() > f32::EPSILON {
                        (theta - left_theta) / span
                    } else {
                        0.0
                    };
                    min_dots
                        .push(limits[left].min_dot * (1.0 - weight) + limits[right].min_dot * weight);
                }
                self.set_swing_limits(&min_dots);
            }
        }
    }

    pub fn swing_limit_function(&self) -> &SwingLimitFunction {
        &self.swing_limit
    }

    pub fn min_twist(&self) -> f32 {
        self.min_twist
    }

    pub fn max_twist(&self) -> f32 {
        self.max_twist
    }

    /// Clamp `rotation` in place. Returns true if it was changed.
    pub fn apply(&mut self, rotation: &mut Quat) -> bool {
        // rotation = post_rotation * reference_rotation
        let post_rotation = *rotation * self.reference_rotation.inverse();
        let (mut swing, twist) = swing_twist_decomposition(post_rotation, Vec3::Y);

        // signed twist angle about Y
        let mut twist_angle = 2.0 * twist.w.abs().clamp(-1.0, 1.0).acos();
        let twisted_x = twist * Vec3::X;
        twist_angle *= Vec3::X.cross(twisted_x).dot(Vec3::Y).signum();

        // adjust the measured angle according to the clamping history, so
        // angles that wrap past +/-PI keep clamping against the same side
        match self.last_twist_boundary {
            TwistBoundary::Low => {
                if twist_angle > self.max_twist {
                    twist_angle -= TAU;
                }
            }
            TwistBoundary::High => {
                if twist_angle < self.min_twist {
                    twist_angle += TAU;
                }
            }
            TwistBoundary::None => {
                let mid_boundary = 0.5 * (self.max_twist + self.min_twist + TAU);
                if twist_angle > mid_boundary {
                    // the lower boundary is closer, phase down one cycle
                    twist_angle -= TAU;
                } else if twist_angle < mid_boundary - TAU {
                    // the higher boundary is closer, phase up one cycle
                    twist_angle += TAU;
                }
            }
        }

        let clamped_twist_angle = twist_angle.clamp(self.min_twist, self.max_twist);
        let twist_was_clamped = twist_angle != clamped_twist_angle;
        self.last_twist_boundary = if twist_was_clamped {
            if twist_angle > clamped_twist_angle {
                TwistBoundary::High
            } else {
                TwistBoundary::Low
            }
        } else {
            TwistBoundary::None
        };

        // clamp the swing against the envelope; the swing axis always lies
        // in the constraint's XZ plane
        let swung_y = swing * Vec3::Y;
        let swing_axis = Vec3::Y.cross(swung_y);
        let mut swing_was_clamped = false;
        let axis_length = swing_axis.length();
        if axis_length > AXIS_EPSILON {
            let theta = (-swing_axis.z).atan2(swing_axis.x);
            let min_dot = self.swing_limit.min_dot(theta);
            if swung_y.dot(Vec3::Y) < min_dot {
                swing = Quat::from_axis_angle(
                    swing_axis / axis_length,
                    min_dot.clamp(-1.0, 1.0).acos(),
                );
                swing_was_clamped = true;
            }
        }

        if swing_was_clamped || twist_was_clamped {
            let twist = Quat::from_axis_angle(Vec3::Y, clamped_twist_angle);
            *rotation = swing * twist * self.reference_rotation;
            return true;
        }
        false
    }

    /// Midpoint of the twist limits in rotation space.
    pub fn center_rotation(&self) -> Quat {
        let limits = [
            Quat::from_axis_angle(Vec3::Y, self.min_twist) * self.reference_rotation,
            Quat::from_axis_angle(Vec3::Y, self.max_twist) * self.reference_rotation,
        ];
        average_quats(&limits)
    }

    pub fn clear_history(&mut self) {
        self.last_twist_boundary = TwistBoundary::None;
    }
}
