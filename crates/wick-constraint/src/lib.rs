//! Rotation constraints for the Wick animation system.
//!
//! Constraints clamp a joint's parent-relative rotation to an allowed
//! region measured from a reference (rest) rotation. Two kinds exist:
//! a hinge with an angle range (elbows, knees) and a swing-twist envelope
//! (shoulders, hips, wrists, ankles). The IK solver applies them in place
//! after every per-joint adjustment.

pub mod accumulator;
pub mod elbow;
pub mod swing_twist;

pub use accumulator::{RotationAccumulator, TranslationAccumulator};
pub use elbow::ElbowConstraint;
pub use swing_twist::{SwingLimitFunction, SwingTwistConstraint};

use glam::Quat;

/// A per-joint rotation constraint. Closed set, dispatched by match.
#[derive(Debug, Clone)]
pub enum RotationConstraint {
    Elbow(ElbowConstraint),
    SwingTwist(SwingTwistConstraint),
}

impl RotationConstraint {
    /// Clamp `rotation` in place. Returns true if it was changed.
    pub fn apply(&mut self, rotation: &mut Quat) -> bool {
        match self {
            RotationConstraint::Elbow(c) => c.apply(rotation),
            RotationConstraint::SwingTwist(c) => c.apply(rotation),
        }
    }

    /// The rotation from which constraint deviations are measured.
    pub fn reference_rotation(&self) -> Quat {
        match self {
            RotationConstraint::Elbow(c) => c.reference_rotation(),
            RotationConstraint::SwingTwist(c) => c.reference_rotation(),
        }
    }

    /// The center of the allowed region; a good neutral starting point
    /// for iterative solvers.
    pub fn center_rotation(&self) -> Quat {
        match self {
            RotationConstraint::Elbow(c) => c.center_rotation(),
            RotationConstraint::SwingTwist(c) => c.center_rotation(),
        }
    }

    /// Forget any remembered limit boundary state.
    pub fn clear_history(&mut self) {
        if let RotationConstraint::SwingTwist(c) = self {
            c.clear_history();
        }
    }
}

impl From<ElbowConstraint> for RotationConstraint {
    fn from(c: ElbowConstraint) -> Self {
        RotationConstraint::Elbow(c)
    }
}

impl From<SwingTwistConstraint> for RotationConstraint {
    fn from(c: SwingTwistConstraint) -> Self {
        RotationConstraint::SwingTwist(c)
    }
}
