//! Core types and math for the Wick animation system.
//!
//! Provides the `Pose` value type and its algebra, quaternion helpers,
//! cubic Hermite splines with arc-length reparameterisation, easing
//! functions, bit-vector pack/unpack helpers, and the workspace error type.

pub mod bitvec;
pub mod easing;
pub mod error;
pub mod pose;
pub mod quat;
pub mod spline;

pub use easing::{ease, EasingType};
pub use error::{Result, WickError};
pub use pose::{blend_poses, blend_poses4, blend_poses_additive, Pose};
pub use quat::{average_quats, generate_basis_vectors, safe_lerp, swing_twist_decomposition};
pub use spline::CubicHermiteSpline;
