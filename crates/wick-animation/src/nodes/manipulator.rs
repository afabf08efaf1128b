//! Per-joint procedural control with selectable rotation and translation
//! sources, lerped into the under pose.

use std::sync::Arc;

use glam::Vec3;
use wick_core::Pose;

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

/// Where a manipulated joint's rotation or translation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceType {
    /// A variable in the skeleton's absolute frame, converted to relative
    /// through the resolved parent.
    #[default]
    Absolute,
    /// A variable already in the joint's parent-relative frame.
    Relative,
    /// Taken from the under pose.
    UnderPose,
    /// Taken from the node's default (the under pose when available).
    Default,
}

/// One manipulated joint.
#[derive(Debug, Clone)]
pub struct ManipulatedJoint {
    pub joint_name: String,
    pub rotation_type: SourceType,
    pub translation_type: SourceType,
    pub rotation_var: String,
    pub translation_var: String,
    joint_index: Option<usize>,
    looked_up: bool,
}

impl ManipulatedJoint {
    pub fn new(
        joint_name: impl Into<String>,
        rotation_type: SourceType,
        translation_type: SourceType,
        rotation_var: impl Into<String>,
        translation_var: impl Into<String>,
    ) -> Self {
        Self {
            joint_name: joint_name.into(),
            rotation_type,
            translation_type,
            rotation_var: rotation_var.into(),
            translation_var: translation_var.into(),
            joint_index: None,
            looked_up: false,
        }
    }
}

#[derive(Debug)]
pub struct Manipulator {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
    alpha: f32,
    alpha_var: String,
    joints: Vec<ManipulatedJoint>,
}

impl Manipulator {
    pub fn new(id: impl Into<String>, alpha: f32) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            alpha,
            alpha_var: String::new(),
            joints: Vec::new(),
        }
    }

    pub fn set_alpha_var(&mut self, var: impl Into<String>) {
        self.alpha_var = var.into();
    }

    pub fn add_joint(&mut self, joint: ManipulatedJoint) {
        self.joints.push(joint);
    }

    pub fn remove_all_joints(&mut self) {
        self.joints.clear();
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
        self.alpha = vars.lookup_float(&self.alpha_var, self.alpha);

        self.poses.clear();
        self.poses.extend_from_slice(under_poses);
        if under_poses.is_empty() {
            return &self.poses;
        }

        let Some(skeleton) = self.skeleton.clone() else {
            return &self.poses;
        };

        for j in 0..self.joints.len() {
            let joint = &mut self.joints[j];
            if !joint.looked_up {
                joint.joint_index = skeleton.joint_index(&joint.joint_name);
                if joint.joint_index.is_none() {
                    log::warn!(
                        "Manipulator could not find joint {:?} in skeleton",
                        joint.joint_name
                    );
                }
                joint.looked_up = true;
            }

            let Some(joint_index) = joint.joint_index else {
                continue;
            };

            let default_rel_pose = if joint_index < under_poses.len() {
                under_poses[joint_index]
            } else {
                Pose::IDENTITY
            };

            let joint = self.joints[j].clone();
            let rel_pose = compute_relative_pose(
                &skeleton,
                &joint,
                joint_index,
                vars,
                ctx,
                &default_rel_pose,
                under_poses,
            );

            self.poses[joint_index] = default_rel_pose.blend(&rel_pose, self.alpha);
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

fn compute_relative_pose(
    skeleton: &Arc<Skeleton>,
    joint: &ManipulatedJoint,
    joint_index: usize,
    vars: &VariantMap,
    ctx: &EvalContext,
    default_rel_pose: &Pose,
    under_poses: &[Pose],
) -> Pose {
    let default_abs_pose = skeleton.absolute_pose(joint_index, under_poses);
    let parent_abs_pose = match skeleton.parent_index(joint_index) {
        Some(parent) => skeleton.absolute_pose(parent, under_poses),
        None => Pose::IDENTITY,
    };

    let rel_trans = match joint.translation_type {
        SourceType::Absolute => {
            let abs_trans = ctx.lookup_rig_point(vars, &joint.translation_var, default_abs_pose.trans);
            parent_abs_pose.inverse().xform_point(abs_trans)
        }
        SourceType::Relative => {
            ctx.lookup_rig_vector(vars, &joint.translation_var, default_rel_pose.trans)
        }
        SourceType::UnderPose => under_poses[joint_index].trans,
        SourceType::Default => default_rel_pose.trans,
    };

    let rel_rot = match joint.rotation_type {
        SourceType::Absolute => {
            let abs_rot = ctx.lookup_rig_rot(vars, &joint.rotation_var, default_abs_pose.rot);
            (parent_abs_pose.rot.inverse() * abs_rot).normalize()
        }
        SourceType::Relative => ctx.lookup_rig_rot(vars, &joint.rotation_var, default_rel_pose.rot),
        SourceType::UnderPose => under_poses[joint_index].rot,
        SourceType::Default => default_rel_pose.rot,
    };

    Pose::new(Vec3::ONE, rel_rot, rel_trans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::JointData;
    use glam::Quat;
    use std::f32::consts::FRAC_PI_2;

    fn two_bone_skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![
                    JointData::new("Root", None, Pose::IDENTITY),
                    JointData::new(
                        "Bone",
                        Some(0),
                        Pose::from_rot_trans(Quat::IDENTITY, Vec3::Y),
                    ),
                ],
                Pose::IDENTITY,
            )
            .unwrap(),
        )
    }

    #[test]
    fn relative_rotation_is_lerped_by_alpha() {
        let skeleton = two_bone_skeleton();
        let mut node = Manipulator::new("manip", 0.5);
        node.add_joint(ManipulatedJoint::new(
            "Bone",
            SourceType::Relative,
            SourceType::UnderPose,
            "boneRot",
            "",
        ));
        node.set_skeleton_internal(&skeleton);

        let target = Quat::from_axis_angle(Vec3::Z, FRAC_PI_2);
        let mut vars = VariantMap::new();
        vars.set("boneRot", target);

        let under = skeleton.relative_bind_poses().to_vec();
        let poses = node.overlay(
            &vars,
            &EvalContext::default(),
            0.0,
            &mut VariantMap::new(),
            &under,
        );
        // halfway between identity and a quarter turn
        let expected = Quat::IDENTITY.slerp(target, 0.5);
        assert!(poses[1].rot.dot(expected).abs() > 1.0 - 1e-4);
    }

    #[test]
    fn under_pose_sources_pass_through() {
        let skeleton = two_bone_skeleton();
        let mut node = Manipulator::new("manip", 1.0);
        node.add_joint(ManipulatedJoint::new(
            "Bone",
            SourceType::UnderPose,
            SourceType::UnderPose,
            "",
            "",
        ));
        node.set_skeleton_internal(&skeleton);

        let under_rot = Quat::from_axis_angle(Vec3::X, 0.3);
        let under = vec![Pose::IDENTITY, Pose::from_rot_trans(under_rot, Vec3::Y)];
        let poses = node.overlay(
            &VariantMap::new(),
            &EvalContext::default(),
            0.0,
            &mut VariantMap::new(),
            &under,
        );
        assert!(poses[1].rot.dot(under_rot).abs() > 1.0 - 1e-5);
        assert!((poses[1].trans - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn absolute_translation_converts_through_parent() {
        let skeleton = two_bone_skeleton();
        let mut node = Manipulator::new("manip", 1.0);
        node.add_joint(ManipulatedJoint::new(
            "Bone",
            SourceType::Default,
            SourceType::Absolute,
            "",
            "bonePos",
        ));
        node.set_skeleton_internal(&skeleton);

        // root translated +X in the under pose; an absolute target at
        // (1, 2, 0) is relative (0, 2, 0)
        let under = vec![
            Pose::from_rot_trans(Quat::IDENTITY, Vec3::X),
            Pose::from_rot_trans(Quat::IDENTITY, Vec3::Y),
        ];
        let mut vars = VariantMap::new();
        vars.set("bonePos", Vec3::new(1.0, 2.0, 0.0));
        let poses = node.overlay(
            &vars,
            &EvalContext::default(),
            0.0,
            &mut VariantMap::new(),
            &under,
        );
        assert!((poses[1].trans - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn empty_under_poses_are_passed_through() {
        let mut node = Manipulator::new("manip", 1.0);
        let poses = node.overlay(
            &VariantMap::new(),
            &EvalContext::default(),
            0.0,
            &mut VariantMap::new(),
            &[],
        );
        assert!(poses.is_empty());
    }
}
