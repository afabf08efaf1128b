//! Cubic Hermite spline with arc-length reparameterisation.
//!
//! Used by the spine IK solver: a curve is fitted between the base and tip
//! poses each frame, and intermediate joints are placed at fixed fractions
//! of its *arc length*, so joint spacing stays even as the curve bends.

use glam::{Quat, Vec3};

/// Number of subdivisions in the cached arc-length table.
const NUM_SUBDIVISIONS: usize = 30;

/// A cubic Hermite curve `H(t)` for `t` in [0, 1], with endpoints `p0`,
/// `p1` and tangents `m0`, `m1`, plus a precomputed arc-length table.
#[derive(Debug, Clone)]
pub struct CubicHermiteSpline {
    p0: Vec3,
    m0: Vec3,
    p1: Vec3,
    m1: Vec3,
    // accumulated arc length at i / NUM_SUBDIVISIONS
    arc_lengths: [f32; NUM_SUBDIVISIONS + 1],
}

impl CubicHermiteSpline {
    pub fn new(p0: Vec3, m0: Vec3, p1: Vec3, m1: Vec3) -> Self {
        let mut spline = Self {
            p0,
            m0,
            p1,
            m1,
            arc_lengths: [0.0; NUM_SUBDIVISIONS + 1],
        };
        let delta = 1.0 / NUM_SUBDIVISIONS as f32;
        let mut accum = 0.0;
        let mut alpha = 0.0;
        for i in 1..=NUM_SUBDIVISIONS {
            accum += spline.position(alpha).distance(spline.position(alpha + delta));
            alpha += delta;
            spline.arc_lengths[i] = accum;
        }
        spline
    }

    /// Fit a spline between two oriented endpoints: the tangents point
    /// along each endpoint's local +Y, scaled by the chord length and a
    /// per-end gain.
    pub fn from_end_rotations(
        base_rot: Quat,
        base_trans: Vec3,
        tip_rot: Quat,
        tip_trans: Vec3,
        base_gain: f32,
        tip_gain: f32,
    ) -> Self {
        let linear_distance = base_trans.distance(tip_trans);
        Self::new(
            base_trans,
            base_gain * linear_distance * (base_rot * Vec3::Y),
            tip_trans,
            tip_gain * linear_distance * (tip_rot * Vec3::Y),
        )
    }

    /// Evaluate the curve at parameter `t` (0..1).
    pub fn position(&self, t: f32) -> Vec3 {
        let t2 = t * t;
        let t3 = t2 * t;
        let w0 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let w1 = t3 - 2.0 * t2 + t;
        let w2 = -2.0 * t3 + 3.0 * t2;
        let w3 = t3 - t2;
        w0 * self.p0 + w1 * self.m0 + w2 * self.p1 + w3 * self.m1
    }

    /// First derivative at parameter `t` (0..1).
    pub fn derivative(&self, t: f32) -> Vec3 {
        let t2 = t * t;
        let w0 = -6.0 * t + 6.0 * t2;
        let w1 = 1.0 - 4.0 * t + 3.0 * t2;
        let w2 = 6.0 * t - 6.0 * t2;
        let w3 = -2.0 * t + 3.0 * t2;
        w0 * self.p0 + w1 * self.m0 + w2 * self.p1 + w3 * self.m1
    }

    /// Arc length of the curve from 0 up to parameter `t`.
    pub fn arc_length(&self, t: f32) -> f32 {
        let index = t * NUM_SUBDIVISIONS as f32;
        let prev = (index.floor() as usize).min(NUM_SUBDIVISIONS);
        let next = (index.ceil() as usize).min(NUM_SUBDIVISIONS);
        let alpha = index.fract();
        self.arc_lengths[prev] * (1.0 - alpha) + self.arc_lengths[next] * alpha
    }

    /// Total arc length of the curve.
    pub fn total_arc_length(&self) -> f32 {
        self.arc_lengths[NUM_SUBDIVISIONS]
    }

    /// Parameter `t` whose arc length is `s`; inverse of [`arc_length`].
    ///
    /// [`arc_length`]: Self::arc_length
    pub fn arc_length_inverse(&self, s: f32) -> f32 {
        let mut next = NUM_SUBDIVISIONS;
        for (i, &value) in self.arc_lengths.iter().enumerate().take(NUM_SUBDIVISIONS) {
            if value > s {
                next = i;
                break;
            }
        }
        let prev = next.saturating_sub(1);
        let span = self.arc_lengths[next] - self.arc_lengths[prev];
        let alpha = if span > 0.0 {
            ((s - self.arc_lengths[prev]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let delta = 1.0 / NUM_SUBDIVISIONS as f32;
        (prev as f32 * delta) * (1.0 - alpha) + (next as f32 * delta) * alpha
    }
}
