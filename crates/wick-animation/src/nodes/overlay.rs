//! Layer one subtree's poses over another, gated per joint by a bone set.

use std::collections::VecDeque;
use std::sync::Arc;

use wick_core::{blend_poses, Pose};

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

/// Named groups of joints, derived from the skeleton by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoneSet {
    #[default]
    FullBody,
    UpperBody,
    LowerBody,
    RightArm,
    LeftArm,
    AboveTheHead,
    BelowTheHead,
    HeadOnly,
    SpineOnly,
    LeftHand,
    RightHand,
    Empty,
}

impl BoneSet {
    /// Bone sets are addressed by integer from the variable map.
    pub fn from_int(value: i32) -> Self {
        match value {
            0 => BoneSet::FullBody,
            1 => BoneSet::UpperBody,
            2 => BoneSet::LowerBody,
            3 => BoneSet::RightArm,
            4 => BoneSet::LeftArm,
            5 => BoneSet::AboveTheHead,
            6 => BoneSet::BelowTheHead,
            7 => BoneSet::HeadOnly,
            8 => BoneSet::SpineOnly,
            9 => BoneSet::LeftHand,
            10 => BoneSet::RightHand,
            _ => BoneSet::Empty,
        }
    }

    pub fn to_int(self) -> i32 {
        match self {
            BoneSet::FullBody => 0,
            BoneSet::UpperBody => 1,
            BoneSet::LowerBody => 2,
            BoneSet::RightArm => 3,
            BoneSet::LeftArm => 4,
            BoneSet::AboveTheHead => 5,
            BoneSet::BelowTheHead => 6,
            BoneSet::HeadOnly => 7,
            BoneSet::SpineOnly => 8,
            BoneSet::LeftHand => 9,
            BoneSet::RightHand => 10,
            BoneSet::Empty => 11,
        }
    }
}

/// child[0] is overlaid on top of child[1]. The bone set controls blending
/// per joint; `alpha` fades the whole overlay in and out.
#[derive(Debug)]
pub struct Overlay {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
    bone_set: BoneSet,
    alpha: f32,
    bone_set_weights: Vec<f32>,
    bone_set_var: String,
    alpha_var: String,
}

impl Overlay {
    pub fn new(id: impl Into<String>, bone_set: BoneSet, alpha: f32) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            bone_set,
            alpha,
            bone_set_weights: Vec::new(),
            bone_set_var: String::new(),
            alpha_var: String::new(),
        }
    }

    pub fn set_bone_set_var(&mut self, var: impl Into<String>) {
        self.bone_set_var = var.into();
    }

    pub fn set_alpha_var(&mut self, var: impl Into<String>) {
        self.alpha_var = var.into();
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        // switching bone sets rebuilds the weight table; avoid it when the
        // variable has not changed
        let prev_bone_set = self.bone_set;
        self.bone_set = BoneSet::from_int(vars.lookup_int(&self.bone_set_var, self.bone_set.to_int()));
        if self.bone_set != prev_bone_set && self.skeleton.is_some() {
            self.build_bone_set_weights();
        }
        self.alpha = vars.lookup_float(&self.alpha_var, self.alpha);

        if self.children.len() >= 2 {
            let (over_children, under_children) = self.children.split_at_mut(1);
            let under_poses = under_children[0].evaluate(vars, ctx, dt, triggers_out);
            let over_poses = over_children[0].overlay(vars, ctx, dt, triggers_out, under_poses);

            if !under_poses.is_empty() && under_poses.len() == over_poses.len() {
                self.poses.resize(under_poses.len(), Pose::IDENTITY);
                for i in 0..self.poses.len() {
                    let weight = self.bone_set_weights.get(i).copied().unwrap_or(0.0);
                    let alpha = weight * self.alpha;
                    blend_poses(
                        &under_poses[i..i + 1],
                        &over_poses[i..i + 1],
                        alpha,
                        &mut self.poses[i..i + 1],
                    );
                }
            }
        }
        &self.poses
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
        // the weight table depends on the skeleton's topology
        self.build_bone_set_weights();
    }

    fn build_bone_set_weights(&mut self) {
        let Some(skeleton) = self.skeleton.clone() else {
            return;
        };
        let count = skeleton.num_joints();
        match self.bone_set {
            BoneSet::FullBody => self.fill_weights(count, 1.0),
            BoneSet::Empty => self.fill_weights(count, 0.0),
            BoneSet::UpperBody => self.subtree_weights(&skeleton, "Spine", 0.0, 1.0, false),
            BoneSet::LowerBody => {
                self.subtree_weights(&skeleton, "Spine", 1.0, 0.0, false);
                if let Some(hips) = skeleton.joint_index("Hips") {
                    self.bone_set_weights[hips] = 0.0;
                }
            }
            BoneSet::LeftArm => self.subtree_weights(&skeleton, "LeftShoulder", 0.0, 1.0, false),
            BoneSet::RightArm => self.subtree_weights(&skeleton, "RightShoulder", 0.0, 1.0, false),
            BoneSet::AboveTheHead => self.subtree_weights(&skeleton, "Head", 0.0, 1.0, false),
            BoneSet::BelowTheHead => self.subtree_weights(&skeleton, "Head", 1.0, 0.0, false),
            BoneSet::HeadOnly => self.subtree_weights(&skeleton, "Head", 0.0, 1.0, true),
            BoneSet::SpineOnly => self.subtree_weights(&skeleton, "Spine", 0.0, 1.0, true),
            BoneSet::LeftHand => self.subtree_weights(&skeleton, "LeftHand", 0.0, 1.0, false),
            BoneSet::RightHand => self.subtree_weights(&skeleton, "RightHand", 0.0, 1.0, false),
        }
    }

    fn fill_weights(&mut self, count: usize, value: f32) {
        self.bone_set_weights.clear();
        self.bone_set_weights.resize(count, value);
    }

    /// Fill with `base`, then set the named joint's descendants (or just
    /// the joint itself when `only_self`) to `subtree`.
    fn subtree_weights(
        &mut self,
        skeleton: &Arc<Skeleton>,
        root_name: &str,
        base: f32,
        subtree: f32,
        only_self: bool,
    ) {
        self.fill_weights(skeleton.num_joints(), base);
        let Some(root) = skeleton.joint_index(root_name) else {
            log::warn!("Overlay bone set references unknown joint {:?}", root_name);
            return;
        };
        if only_self {
            self.bone_set_weights[root] = subtree;
            return;
        }
        // breadth-first walk over the subtree below the root
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(joint) = queue.pop_front() {
            for child in skeleton.children_of_joint(joint) {
                self.bone_set_weights[child] = subtree;
                queue.push_back(child);
            }
        }
    }
}
