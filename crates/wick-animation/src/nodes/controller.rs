//! Procedural absolute-rotation overrides on named joints.

use std::sync::Arc;

use wick_core::Pose;

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

/// One overridden joint: the variable holding its absolute rotation and
/// the joint it lands on.
#[derive(Debug, Clone)]
pub struct ControlledJoint {
    pub var: String,
    pub joint_name: String,
    joint_index: Option<usize>,
    looked_up: bool,
}

impl ControlledJoint {
    pub fn new(var: impl Into<String>, joint_name: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            joint_name: joint_name.into(),
            joint_index: None,
            looked_up: false,
        }
    }
}

/// Overrides absolute rotations on selected joints with quaternions read
/// from the variable map; translations and scales come from the under
/// pose. Each override is converted back to parent-relative through the
/// inverse of the parent's absolute rotation.
#[derive(Debug)]
pub struct Controller {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
    joints: Vec<ControlledJoint>,
}

impl Controller {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            joints: Vec::new(),
        }
    }

    pub fn add_joint(&mut self, joint: ControlledJoint) {
        self.joints.push(joint);
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        let under = match &self.skeleton {
            Some(skeleton) => skeleton.relative_bind_poses().to_vec(),
            None => Vec::new(),
        };
        self.overlay(vars, ctx, dt, triggers_out, &under)
    }

    pub fn overlay(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        _dt: f32,
        _triggers_out: &mut VariantMap,
        under_poses: &[Pose],
    ) -> &[Pose] {
        self.poses.clear();
        self.poses.extend_from_slice(under_poses);

        let Some(skeleton) = &self.skeleton else {
            return &self.poses;
        };

        for joint in &mut self.joints {
            if !joint.looked_up {
                joint.joint_index = skeleton.joint_index(&joint.joint_name);
                if joint.joint_index.is_none() {
                    log::warn!(
                        "Controller could not find joint {:?} in skeleton",
                        joint.joint_name
                    );
                }
                joint.looked_up = true;
            }

            let Some(joint_index) = joint.joint_index else {
                continue;
            };

            // the override is absolute, so the default and the parent frame
            // come from the under poses when available, the bind pose
            // otherwise
            let (default_abs_rot, parent_abs_rot) = if joint_index < under_poses.len() {
                let default = skeleton.absolute_pose(joint_index, under_poses);
                let parent = match skeleton.parent_index(joint_index) {
                    Some(parent) => skeleton.absolute_pose(parent, under_poses).rot,
                    None => glam::Quat::IDENTITY,
                };
                (default.rot, parent)
            } else {
                let default = skeleton.absolute_bind_pose(joint_index).rot;
                let parent = match skeleton.parent_index(joint_index) {
                    Some(parent) => skeleton.absolute_bind_pose(parent).rot,
                    None => glam::Quat::IDENTITY,
                };
                (default, parent)
            };

            let abs_rot = ctx.lookup_rig_rot(vars, &joint.var, default_abs_rot);
            let rel_rot = (parent_abs_rot.inverse() * abs_rot).normalize();

            if joint_index < self.poses.len() {
                self.poses[joint_index].rot = rel_rot;
            }
        }

        &self.poses
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
        for joint in &mut self.joints {
            joint.joint_index = None;
            joint.looked_up = false;
        }
        self.poses = vec![Pose::IDENTITY; skeleton.num_joints()];
    }
}
