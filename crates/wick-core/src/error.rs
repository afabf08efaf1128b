//! Error types for Wick

use thiserror::Error;

/// The main error type for Wick operations.
///
/// Construction-time problems only: per-frame evaluation never fails,
/// it degrades to inert/pass-through behavior instead.
#[derive(Debug, Error)]
pub enum WickError {
    #[error("Skeleton error: {0}")]
    SkeletonError(String),

    #[error("Joint not found: {0}")]
    JointNotFound(String),

    #[error("Duplicate joint name: {0}")]
    DuplicateJointName(String),

    #[error("Joint {index} has parent {parent}, which is not topologically earlier")]
    BadParentOrder { index: usize, parent: usize },

    #[error("Node error: {0}")]
    NodeError(String),

    #[error("Wrong child count for {id}: expected {expected}, got {got}")]
    WrongChildCount {
        id: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Animation error: {0}")]
    AnimationError(String),
}

/// Result type alias for Wick operations
pub type Result<T> = std::result::Result<T, WickError>;
