//! Accumulators for combining contributions from multiple IK targets
//! landing on the same joint.

use glam::{Quat, Vec3};

/// Averages rotations by a sign-corrected quaternion sum. Equivalent to a
/// weighted mean on the 4-sphere for small angular spreads.
#[derive(Debug, Clone, Default)]
pub struct RotationAccumulator {
    rotation_sum: Quat,
    num_rotations: u32,
}

impl RotationAccumulator {
    pub fn new() -> Self {
        Self {
            rotation_sum: Quat::IDENTITY,
            num_rotations: 0,
        }
    }

    pub fn add(&mut self, rotation: Quat) {
        if self.num_rotations == 0 {
            self.rotation_sum = rotation;
        } else {
            let rotation = if self.rotation_sum.dot(rotation) < 0.0 {
                -rotation
            } else {
                rotation
            };
            self.rotation_sum = self.rotation_sum + rotation;
        }
        self.num_rotations += 1;
    }

    pub fn size(&self) -> u32 {
        self.num_rotations
    }

    pub fn average(&self) -> Quat {
        if self.num_rotations > 0 {
            self.rotation_sum.normalize()
        } else {
            Quat::IDENTITY
        }
    }

    pub fn clear(&mut self) {
        self.rotation_sum = Quat::IDENTITY;
        self.num_rotations = 0;
    }
}

/// Weighted mean of translations.
#[derive(Debug, Clone, Default)]
pub struct TranslationAccumulator {
    accum: Vec3,
    total_weight: f32,
    dirty: bool,
}

impl TranslationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, translation: Vec3, weight: f32) {
        self.accum += weight * translation;
        self.total_weight += weight;
        self.dirty = true;
    }

    pub fn average(&self) -> Vec3 {
        if self.total_weight > 0.0 {
            self.accum / self.total_weight
        } else {
            Vec3::ZERO
        }
    }

    /// True if any translation has been accumulated since the last
    /// [`clear_and_clean`].
    ///
    /// [`clear_and_clean`]: Self::clear_and_clean
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Zero the accumulator but keep the dirty flag.
    pub fn clear(&mut self) {
        self.accum = Vec3::ZERO;
        self.total_weight = 0.0;
    }

    /// Zero the accumulator and the dirty flag.
    pub fn clear_and_clean(&mut self) {
        self.clear();
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rotation_accumulator_returns_identity() {
        let accum = RotationAccumulator::new();
        assert_eq!(accum.size(), 0);
        assert!(accum.average().dot(Quat::IDENTITY).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn rotation_average_is_sign_corrected() {
        let q = Quat::from_axis_angle(Vec3::Y, 0.6);
        let mut accum = RotationAccumulator::new();
        accum.add(q);
        accum.add(-q);
        accum.add(q);
        assert_eq!(accum.size(), 3);
        assert!(accum.average().dot(q).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn rotation_average_of_opposing_tilts_is_neutral() {
        let mut accum = RotationAccumulator::new();
        accum.add(Quat::from_axis_angle(Vec3::X, 0.4));
        accum.add(Quat::from_axis_angle(Vec3::X, -0.4));
        assert!(accum.average().dot(Quat::IDENTITY).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn translation_average_is_weighted() {
        let mut accum = TranslationAccumulator::new();
        accum.add(Vec3::new(1.0, 0.0, 0.0), 1.0);
        accum.add(Vec3::new(4.0, 0.0, 0.0), 3.0);
        assert!(accum.is_dirty());
        assert!((accum.average() - Vec3::new(3.25, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn clear_keeps_dirty_but_clear_and_clean_does_not() {
        let mut accum = TranslationAccumulator::new();
        accum.add(Vec3::ONE, 1.0);
        accum.clear();
        assert!(accum.is_dirty());
        assert_eq!(accum.average(), Vec3::ZERO);
        accum.clear_and_clean();
        assert!(!accum.is_dirty());
    }
}
