//! Analytic two-bone IK chain (shoulder/elbow/wrist, hip/knee/ankle).

use std::sync::Arc;

use glam::{Quat, Vec3};
use wick_core::Pose;

use crate::chain::AnimChain;
use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::nodes::pole_vector::IkInterpType;
use crate::skeleton::Skeleton;
use crate::util::FRAMES_PER_SECOND;
use crate::variables::VariantMap;

const MIN_AXIS_LENGTH: f32 = 1.0e-4;

/// Bends the mid joint about a fixed hinge axis to reach an end-effector
/// position, then aims the base at the target and snaps the tip to the
/// target orientation. The result is blended with the under poses by
/// `alpha`, with snapshot interpolation on enable/disable.
#[derive(Debug)]
pub struct TwoBoneIk {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,

    alpha: f32,
    enabled: bool,
    // in frames (1/30 s)
    interp_duration: f32,
    base_joint_name: String,
    mid_joint_name: String,
    tip_joint_name: String,
    /// In the base joint's relative frame; normalized at construction.
    mid_hinge_axis: Vec3,

    base_parent_index: Option<usize>,
    base_index: Option<usize>,
    mid_index: Option<usize>,
    tip_index: Option<usize>,

    alpha_var: String,
    enabled_var: String,
    // variables holding the *names* of the end-effector variables, so the
    // graph can re-route targets at runtime
    end_effector_rotation_var_var: String,
    end_effector_position_var_var: String,
    prev_end_effector_rotation_var: String,
    prev_end_effector_position_var: String,

    interp_type: IkInterpType,
    interp_alpha: f32,
    interp_alpha_vel: f32,
    snapshot_chain: AnimChain,
}

impl TwoBoneIk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        alpha: f32,
        enabled: bool,
        interp_duration: f32,
        base_joint_name: impl Into<String>,
        mid_joint_name: impl Into<String>,
        tip_joint_name: impl Into<String>,
        mid_hinge_axis: Vec3,
        alpha_var: impl Into<String>,
        enabled_var: impl Into<String>,
        end_effector_rotation_var_var: impl Into<String>,
        end_effector_position_var_var: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            alpha,
            enabled,
            interp_duration,
            base_joint_name: base_joint_name.into(),
            mid_joint_name: mid_joint_name.into(),
            tip_joint_name: tip_joint_name.into(),
            mid_hinge_axis: mid_hinge_axis.normalize(),
            base_parent_index: None,
            base_index: None,
            mid_index: None,
            tip_index: None,
            alpha_var: alpha_var.into(),
            enabled_var: enabled_var.into(),
            end_effector_rotation_var_var: end_effector_rotation_var_var.into(),
            end_effector_position_var_var: end_effector_position_var_var.into(),
            prev_end_effector_rotation_var: String::new(),
            prev_end_effector_position_var: String::new(),
            interp_type: IkInterpType::None,
            interp_alpha: 0.0,
            interp_alpha_vel: 0.0,
            snapshot_chain: AnimChain::new(),
        }
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        if self.children.len() != 1 {
            return &self.poses;
        }

        let under_poses = self.children[0]
            .evaluate(vars, ctx, dt, triggers_out)
            .to_vec();

        let (Some(skeleton), Some(base_index), Some(mid_index), Some(tip_index)) = (
            self.skeleton.clone(),
            self.base_index,
            self.mid_index,
            self.tip_index,
        ) else {
            // joint resolution failed: pass the under poses through
            self.poses = under_poses;
            return &self.poses;
        };
        if under_poses.is_empty() {
            self.poses = under_poses;
            return &self.poses;
        }
        if under_poses.len() != self.poses.len() {
            self.poses = under_poses.clone();
        }

        let alpha = vars.lookup_float(&self.alpha_var, self.alpha).clamp(0.0, 1.0);
        if alpha == 0.0 {
            self.poses = under_poses;
            return &self.poses;
        }

        let enabled = vars.lookup_bool(&self.enabled_var, self.enabled);
        if enabled != self.enabled {
            let mut pose_chain = AnimChain::new();
            pose_chain.build_from_relative_poses(&skeleton, &self.poses, tip_index);
            let interp_type = if enabled {
                IkInterpType::SnapshotToSolve
            } else {
                IkInterpType::SnapshotToUnderPoses
            };
            self.begin_interp(interp_type, pose_chain);
        }
        self.enabled = enabled;

        // don't build chains or solve while disabled and not interping
        if self.interp_type == IkInterpType::None && !enabled {
            self.poses = under_poses;
            return &self.poses;
        }

        let mut under_chain = AnimChain::new();
        under_chain.build_from_relative_poses(&skeleton, &under_poses, tip_index);
        let mut ik_chain = under_chain;

        let base_parent_pose = match self.base_parent_index {
            Some(index) => ik_chain.absolute_pose(index),
            None => Pose::IDENTITY,
        };
        let base_pose = ik_chain.absolute_pose(base_index);
        let mid_pose = ik_chain.absolute_pose(mid_index);
        let tip_pose = ik_chain.absolute_pose(tip_index);

        let rotation_var = vars.lookup_string(&self.end_effector_rotation_var_var, "");
        let position_var = vars.lookup_string(&self.end_effector_position_var_var, "");

        // a re-routed end effector gets a smoothing interp
        if (!self.prev_end_effector_rotation_var.is_empty()
            && self.prev_end_effector_rotation_var != rotation_var)
            || (!self.prev_end_effector_position_var.is_empty()
                && self.prev_end_effector_position_var != position_var)
        {
            let mut pose_chain = AnimChain::new();
            pose_chain.build_from_relative_poses(&skeleton, &self.poses, tip_index);
            self.begin_interp(IkInterpType::SnapshotToSolve, pose_chain);
        }
        self.prev_end_effector_rotation_var = rotation_var.clone();
        self.prev_end_effector_position_var = position_var.clone();

        // same-frame outputs from earlier nodes take priority over the
        // host-written variables
        let mut target_pose = tip_pose;
        if triggers_out.has_key(&rotation_var) {
            target_pose.rot = ctx.lookup_rig_rot(triggers_out, &rotation_var, tip_pose.rot);
        } else {
            target_pose.rot = ctx.lookup_rig_rot(vars, &rotation_var, tip_pose.rot);
        }
        if triggers_out.has_key(&position_var) {
            target_pose.trans = ctx.lookup_rig_point(triggers_out, &position_var, tip_pose.trans);
        } else {
            target_pose.trans = ctx.lookup_rig_point(vars, &position_var, tip_pose.trans);
        }

        let r0 = (mid_pose.trans - base_pose.trans).length();
        let r1 = (tip_pose.trans - mid_pose.trans).length();
        let d = (target_pose.trans - base_pose.trans).length();

        // interior angle of the mid joint from the circle-circle
        // intersection; fully extended when out of reach
        let mut mid_angle = 0.0;
        if d < r0 + r1 {
            let y = ((-d + r1 - r0) * (-d - r1 + r0) * (-d + r1 + r0) * (d + r1 + r0))
                .max(0.0)
                .sqrt()
                / (2.0 * d);
            mid_angle = std::f32::consts::PI
                - ((y / r0).clamp(-1.0, 1.0).acos() + (y / r1).clamp(-1.0, 1.0).acos());
        }

        let rel_mid_rot = Quat::from_axis_angle(self.mid_hinge_axis, mid_angle);
        ik_chain.set_relative_pose(
            mid_index,
            Pose::from_rot_trans(rel_mid_rot, under_poses[mid_index].trans),
        );
        ik_chain.build_dirty_absolute_poses();

        // aim the base so the new tip lands on the target direction
        let new_tip_pose = ik_chain.absolute_pose(tip_index);
        let lever_arm = new_tip_pose.trans - base_pose.trans;
        let target_line = target_pose.trans - base_pose.trans;
        let axis = lever_arm.cross(target_line);
        let axis_length = axis.length();
        if axis_length > MIN_AXIS_LENGTH {
            let axis = axis / axis_length;
            let cos_angle = (lever_arm.dot(target_line)
                / (lever_arm.length() * target_line.length()))
            .clamp(-1.0, 1.0);
            let delta_rot = Quat::from_axis_angle(axis, cos_angle.acos());
            let abs_rot = delta_rot * base_pose.rot;
            let rel_base_rot = (base_parent_pose.rot.inverse() * abs_rot).normalize();
            ik_chain.set_relative_pose(
                base_index,
                Pose::from_rot_trans(rel_base_rot, under_poses[base_index].trans),
            );
        }

        // snap the tip's absolute orientation to the target's
        ik_chain.build_dirty_absolute_poses();
        let mid_joint_pose = ik_chain.absolute_pose(mid_index);
        let rel_tip_rot = (mid_joint_pose.rot.inverse() * target_pose.rot).normalize();
        ik_chain.set_relative_pose(
            tip_index,
            Pose::from_rot_trans(rel_tip_rot, under_poses[tip_index].trans),
        );

        // blend with the under chain
        ik_chain.blend(&under_chain, alpha);

        self.poses = under_poses;
        self.apply_interp(dt, &under_chain, &ik_chain, enabled);
        &self.poses
    }

    fn begin_interp(&mut self, interp_type: IkInterpType, chain: AnimChain) {
        self.snapshot_chain = chain;
        self.interp_type = interp_type;
        self.interp_alpha_vel = FRAMES_PER_SECOND / self.interp_duration;
        self.interp_alpha = 0.0;
    }

    fn apply_interp(
        &mut self,
        dt: f32,
        under_chain: &AnimChain,
        ik_chain: &AnimChain,
        enabled: bool,
    ) {
        if self.interp_type != IkInterpType::None {
            self.interp_alpha += self.interp_alpha_vel * dt;
            if self.interp_alpha < 1.0 {
                let mut interp_chain = match self.interp_type {
                    IkInterpType::SnapshotToUnderPoses => *under_chain,
                    _ => *ik_chain,
                };
                interp_chain.blend(&self.snapshot_chain, self.interp_alpha);
                interp_chain.output_relative_poses(&mut self.poses);
                return;
            }
            self.interp_type = IkInterpType::None;
        }
        if enabled {
            ik_chain.output_relative_poses(&mut self.poses);
        } else {
            under_chain.output_relative_poses(&mut self.poses);
        }
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
        let indices = skeleton.joint_indices(&[
            self.base_joint_name.as_str(),
            self.mid_joint_name.as_str(),
            self.tip_joint_name.as_str(),
        ]);
        self.base_index = indices[0];
        self.mid_index = indices[1];
        self.tip_index = indices[2];
        if self.base_index.is_none() || self.mid_index.is_none() || self.tip_index.is_none() {
            log::warn!(
                "TwoBoneIk {:?} could not resolve joints {:?}/{:?}/{:?}",
                self.id,
                self.base_joint_name,
                self.mid_joint_name,
                self.tip_joint_name
            );
        }
        self.base_parent_index = self.base_index.and_then(|i| skeleton.parent_index(i));
        self.poses = vec![Pose::IDENTITY; skeleton.num_joints()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::DefaultPose;
    use crate::skeleton::JointData;
    use std::f32::consts::FRAC_PI_2;

    // A -> B -> C -> D along the x axis, one unit apart
    fn straight_chain() -> Arc<Skeleton> {
        let step = Pose::from_rot_trans(Quat::IDENTITY, Vec3::X);
        Arc::new(
            Skeleton::new(
                vec![
                    JointData::new("A", None, Pose::IDENTITY),
                    JointData::new("B", Some(0), step),
                    JointData::new("C", Some(1), step),
                    JointData::new("D", Some(2), step),
                ],
                Pose::IDENTITY,
            )
            .unwrap(),
        )
    }

    fn make_node(skeleton: &Arc<Skeleton>) -> TwoBoneIk {
        let mut node = TwoBoneIk::new(
            "ik",
            1.0,
            true,
            1.0,
            "B",
            "C",
            "D",
            Vec3::Z,
            "",
            "",
            "rotVarVar",
            "posVarVar",
        );
        node.set_skeleton_internal(skeleton);
        let mut child = DefaultPose::new("under");
        child.set_skeleton_internal(skeleton);
        node.children.push(AnimNode::DefaultPose(child));
        node
    }

    fn solve(node: &mut TwoBoneIk, vars: &VariantMap, frames: usize) -> Vec<Pose> {
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut poses = Vec::new();
        for _ in 0..frames {
            poses = node.evaluate(vars, &ctx, 1.0 / 30.0, &mut triggers).to_vec();
        }
        poses
    }

    #[test]
    fn reaches_a_bent_target() {
        let skeleton = straight_chain();
        let mut node = make_node(&skeleton);

        let mut vars = VariantMap::new();
        vars.set("rotVarVar", "eeRot");
        vars.set("posVarVar", "eePos");
        vars.set("eePos", Vec3::new(2.0, 1.0, 0.0));
        vars.set("eeRot", Quat::from_axis_angle(Vec3::Z, FRAC_PI_2));

        let poses = solve(&mut node, &vars, 40);

        let d = skeleton.absolute_pose(3, &poses).trans;
        assert!(
            (d - Vec3::new(2.0, 1.0, 0.0)).length() < 1e-3,
            "tip missed the target: {:?}",
            d
        );
        let c = skeleton.absolute_pose(2, &poses).trans;
        assert!(
            (c - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-3,
            "mid not at the analytic elbow: {:?}",
            c
        );
        // the mid joint carries the quarter-turn bend
        let mid_rot = poses[2].rot;
        assert!(
            mid_rot
                .dot(Quat::from_axis_angle(Vec3::Z, FRAC_PI_2))
                .abs()
                > 1.0 - 1e-4
        );
    }

    #[test]
    fn out_of_reach_target_leaves_chain_extended() {
        let skeleton = straight_chain();
        let mut node = make_node(&skeleton);

        let mut vars = VariantMap::new();
        vars.set("posVarVar", "eePos");
        vars.set("eePos", Vec3::new(3.0, 0.0, 0.0));

        let poses = solve(&mut node, &vars, 40);
        let d = skeleton.absolute_pose(3, &poses).trans;
        // the solver converges gradually toward full extension
        assert!((d - Vec3::new(3.0, 0.0, 0.0)).length() < 0.4, "{:?}", d);
    }

    #[test]
    fn disabled_node_passes_under_through() {
        let skeleton = straight_chain();
        let mut node = make_node(&skeleton);
        node.enabled = false;

        let vars = VariantMap::new();
        let poses = solve(&mut node, &vars, 3);
        assert!((skeleton.absolute_pose(3, &poses).trans - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn alpha_blends_solve_with_under_poses() {
        let skeleton = straight_chain();
        let mut node = make_node(&skeleton);
        node.alpha = 0.0;

        let mut vars = VariantMap::new();
        vars.set("posVarVar", "eePos");
        vars.set("eePos", Vec3::new(2.0, 1.0, 0.0));

        // alpha 0 short-circuits to the under poses
        let poses = solve(&mut node, &vars, 5);
        assert!((skeleton.absolute_pose(3, &poses).trans - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn missing_joints_pass_under_through() {
        let skeleton = straight_chain();
        let mut node = TwoBoneIk::new(
            "ik", 1.0, true, 1.0, "Nope", "C", "D", Vec3::Z, "", "", "", "",
        );
        node.set_skeleton_internal(&skeleton);
        let mut child = DefaultPose::new("under");
        child.set_skeleton_internal(&skeleton);
        node.children.push(AnimNode::DefaultPose(child));

        let vars = VariantMap::new();
        let poses = solve(&mut node, &vars, 2);
        assert_eq!(poses.len(), 4);
    }
}
