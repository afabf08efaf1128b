//! IK target description shared by the solvers.

use glam::Vec3;
use wick_core::Pose;

/// Extra pull given to head targets so the solver prioritises them.
const HMD_HEAD_WEIGHT_BOOST: f32 = 8.0;

/// What aspect of the target the solver must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IkTargetType {
    #[default]
    RotationAndPosition,
    RotationOnly,
    HmdHead,
    HipsRelativeRotationAndPosition,
    Spline,
    Unknown,
}

impl IkTargetType {
    pub fn from_int(value: i32) -> Self {
        match value {
            0 => IkTargetType::RotationAndPosition,
            1 => IkTargetType::RotationOnly,
            2 => IkTargetType::HmdHead,
            3 => IkTargetType::HipsRelativeRotationAndPosition,
            4 => IkTargetType::Spline,
            _ => IkTargetType::Unknown,
        }
    }
}

/// A per-joint IK goal: an absolute pose, a type tag, a weight, flex
/// coefficients for spline chains, and an optional pole vector for
/// elbow/knee plane disambiguation.
#[derive(Debug, Clone)]
pub struct IkTarget {
    /// Joint index this target pulls on.
    pub index: usize,
    /// Goal pose; absolute, unless `root_index` is set, in which case it
    /// is expressed relative to that root and transformed at solve time.
    pub pose: Pose,
    /// The target joint's topmost ancestor, when the pose is authored
    /// root-relative.
    pub root_index: Option<usize>,
    pub target_type: IkTargetType,
    pub weight: f32,
    /// Per-joint stiffness along the chain in [0, 1]: 0 keeps the under
    /// pose, 1 snaps to the solve.
    pub flex_coefficients: Vec<f32>,
    pub pole_vector: Option<Vec3>,
}

impl IkTarget {
    pub fn new(index: usize, pose: Pose, target_type: IkTargetType) -> Self {
        Self {
            index,
            pose,
            root_index: None,
            target_type,
            weight: 1.0,
            flex_coefficients: Vec::new(),
            pole_vector: None,
        }
    }

    /// Weight used by the solver; head targets get a fixed boost.
    pub fn effective_weight(&self) -> f32 {
        if self.target_type == IkTargetType::HmdHead {
            HMD_HEAD_WEIGHT_BOOST * self.weight
        } else {
            self.weight
        }
    }

    /// Flex coefficient for chain position `i`, clamped to the last entry.
    pub fn flex_coefficient(&self, i: usize) -> f32 {
        if self.flex_coefficients.is_empty() {
            1.0
        } else {
            self.flex_coefficients[i.min(self.flex_coefficients.len() - 1)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_targets_are_weight_boosted() {
        let mut target = IkTarget::new(3, Pose::IDENTITY, IkTargetType::HmdHead);
        assert!((target.effective_weight() - 8.0).abs() < 1e-6);
        target.target_type = IkTargetType::RotationAndPosition;
        assert!((target.effective_weight() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn flex_lookup_clamps_and_defaults() {
        let mut target = IkTarget::new(0, Pose::IDENTITY, IkTargetType::Spline);
        assert!((target.flex_coefficient(5) - 1.0).abs() < 1e-6);
        target.flex_coefficients = vec![0.2, 0.8];
        assert!((target.flex_coefficient(0) - 0.2).abs() < 1e-6);
        assert!((target.flex_coefficient(7) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn type_tags_round_trip_from_int() {
        assert_eq!(IkTargetType::from_int(2), IkTargetType::HmdHead);
        assert_eq!(IkTargetType::from_int(4), IkTargetType::Spline);
        assert_eq!(IkTargetType::from_int(99), IkTargetType::Unknown);
    }
}
