//! Delivery surface for externally loaded animation data.
//!
//! Loading and file-format parsing happen outside this crate; the host
//! inserts finished [`AnimationData`] under its URL-like key, and clip
//! nodes poll the cache at the top of `evaluate` until their key resolves.

use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use wick_core::Pose;

/// One frame of source animation, in the source skeleton's joint order.
#[derive(Debug, Clone, Default)]
pub struct AnimationFrame {
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
}

/// A fully loaded source animation: a joint-name list used to map onto a
/// runtime skeleton, per-joint pre/post-rotation poses factored from the
/// authoring format, and the frame data at 30 fps.
#[derive(Debug, Clone)]
pub struct AnimationData {
    pub joint_names: Vec<String>,
    pub pre_rotation_poses: Vec<Pose>,
    pub post_rotation_poses: Vec<Pose>,
    pub frames: Vec<AnimationFrame>,
}

impl AnimationData {
    /// Animation data with identity pre/post-rotations.
    pub fn new(joint_names: Vec<String>, frames: Vec<AnimationFrame>) -> Self {
        let count = joint_names.len();
        Self {
            joint_names,
            pre_rotation_poses: vec![Pose::IDENTITY; count],
            post_rotation_poses: vec![Pose::IDENTITY; count],
            frames,
        }
    }

    pub fn num_joints(&self) -> usize {
        self.joint_names.len()
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }
}

/// Shared registry of resolved animations, keyed by URL.
///
/// The only shared mutable store in the system: the host's loader inserts,
/// clip nodes read. Clips observe resolution at the top of `evaluate`.
#[derive(Debug, Default)]
pub struct AnimationCache {
    entries: RwLock<HashMap<String, Arc<AnimationData>>>,
}

impl AnimationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a loaded animation. Replaces any previous entry.
    pub fn insert(&self, url: impl Into<String>, data: AnimationData) {
        self.entries
            .write()
            .expect("animation cache lock poisoned")
            .insert(url.into(), Arc::new(data));
    }

    /// `None` until the loader has delivered the animation.
    pub fn get(&self, url: &str) -> Option<Arc<AnimationData>> {
        self.entries
            .read()
            .expect("animation cache lock poisoned")
            .get(url)
            .cloned()
    }

    pub fn remove(&self, url: &str) {
        self.entries
            .write()
            .expect("animation cache lock poisoned")
            .remove(url);
    }
}
