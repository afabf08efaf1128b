//! Always returns the skeleton's relative default poses.

use std::sync::Arc;

use wick_core::Pose;

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

#[derive(Debug)]
pub struct DefaultPose {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
}

impl DefaultPose {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
        }
    }

    pub fn evaluate(
        &mut self,
        _vars: &VariantMap,
        _ctx: &EvalContext,
        _dt: f32,
        _triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        match &self.skeleton {
            Some(skeleton) => {
                self.poses.clear();
                self.poses
                    .extend_from_slice(skeleton.relative_default_poses());
            }
            None => self.poses.clear(),
        }
        &self.poses
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
    }
}
