//! The node kinds of the animation graph.

pub mod blend_directional;
pub mod blend_linear;
pub mod blend_linear_move;
pub mod clip;
pub mod controller;
pub mod default_pose;
pub mod ik_target;
pub mod inverse_kinematics;
pub mod manipulator;
pub mod overlay;
pub mod pole_vector;
pub mod random_switch;
pub mod spline_ik;
pub mod state_machine;
pub mod two_bone_ik;

pub use blend_directional::{BlendDirectional, DirectionalGrid};
pub use blend_linear::BlendLinear;
pub use blend_linear_move::BlendLinearMove;
pub use clip::Clip;
pub use controller::{ControlledJoint, Controller};
pub use default_pose::DefaultPose;
pub use ik_target::{IkTarget, IkTargetType};
pub use inverse_kinematics::{IkTargetVar, InverseKinematics};
pub use manipulator::{ManipulatedJoint, Manipulator, SourceType};
pub use overlay::{BoneSet, Overlay};
pub use pole_vector::{PoleVectorConstraint, PoleVectorTheta};
pub use random_switch::{RandomSwitch, RandomSwitchState};
pub use spline_ik::SplineIk;
pub use state_machine::{InterpType, State, StateMachine, Transition};
pub use two_bone_ik::TwoBoneIk;
