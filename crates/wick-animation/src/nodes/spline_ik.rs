//! Spline-based IK for the spine: base (hips), mid (chest), tip (head).
//!
//! A cubic Hermite curve is fitted between the base and tip targets each
//! frame; intermediate joints are placed at cached fractions of its arc
//! length and oriented from the curve tangent, then pulled toward the
//! solve by per-joint flex coefficients.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use wick_core::quat::{quat_from_y_x, safe_lerp};
use wick_core::{ease, CubicHermiteSpline, EasingType, Pose};

use crate::chain::AnimChain;
use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::nodes::ik_target::{IkTarget, IkTargetType};
use crate::nodes::pole_vector::IkInterpType;
use crate::skeleton::Skeleton;
use crate::util::FRAMES_PER_SECOND;
use crate::variables::VariantMap;

const EPSILON: f32 = 1.0e-4;
// the spine may stretch or compress up to this fraction of rest length
const STRETCH_COMPRESS_PERCENTAGE: f32 = 0.15;
// more curvature near the head than the hips
const BASE_GAIN: f32 = 0.5;
const TIP_GAIN: f32 = 1.0;

/// Per-joint placement along the default-pose spline, cached per target.
#[derive(Debug, Clone)]
struct SplineJointInfo {
    joint_index: usize,
    /// Fraction (0..1) along the spline.
    ratio: f32,
    /// Takes the on-curve frame back to the joint's default local frame.
    offset_pose: Pose,
}

#[derive(Debug)]
pub struct SplineIk {
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

    base_index: Option<usize>,
    mid_index: Option<usize>,
    tip_index: Option<usize>,

    base_position_var: String,
    base_rotation_var: String,
    mid_position_var: String,
    mid_rotation_var: String,
    tip_position_var: String,
    tip_rotation_var: String,
    alpha_var: String,
    enabled_var: String,

    tip_flex_coefficients: Vec<f32>,
    mid_flex_coefficients: Vec<f32>,

    spline_joint_info: HashMap<usize, Vec<SplineJointInfo>>,

    interp_type: IkInterpType,
    interp_alpha: f32,
    interp_alpha_vel: f32,
    snapshot_chain: AnimChain,
}

impl SplineIk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        alpha: f32,
        enabled: bool,
        interp_duration: f32,
        base_joint_name: impl Into<String>,
        mid_joint_name: impl Into<String>,
        tip_joint_name: impl Into<String>,
        tip_flex_coefficients: Vec<f32>,
        mid_flex_coefficients: Vec<f32>,
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
            base_index: None,
            mid_index: None,
            tip_index: None,
            base_position_var: String::new(),
            base_rotation_var: String::new(),
            mid_position_var: String::new(),
            mid_rotation_var: String::new(),
            tip_position_var: String::new(),
            tip_rotation_var: String::new(),
            alpha_var: String::new(),
            enabled_var: String::new(),
            tip_flex_coefficients,
            mid_flex_coefficients,
            spline_joint_info: HashMap::new(),
            interp_type: IkInterpType::None,
            interp_alpha: 0.0,
            interp_alpha_vel: 0.0,
            snapshot_chain: AnimChain::new(),
        }
    }

    pub fn set_base_target_vars(
        &mut self,
        position_var: impl Into<String>,
        rotation_var: impl Into<String>,
    ) {
        self.base_position_var = position_var.into();
        self.base_rotation_var = rotation_var.into();
    }

    pub fn set_mid_target_vars(
        &mut self,
        position_var: impl Into<String>,
        rotation_var: impl Into<String>,
    ) {
        self.mid_position_var = position_var.into();
        self.mid_rotation_var = rotation_var.into();
    }

    pub fn set_tip_target_vars(
        &mut self,
        position_var: impl Into<String>,
        rotation_var: impl Into<String>,
    ) {
        self.tip_position_var = position_var.into();
        self.tip_rotation_var = rotation_var.into();
    }

    pub fn set_alpha_var(&mut self, var: impl Into<String>) {
        self.alpha_var = var.into();
    }

    pub fn set_enabled_var(&mut self, var: impl Into<String>) {
        self.enabled_var = var.into();
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

        let alpha = vars.lookup_float(&self.alpha_var, self.alpha).clamp(0.0, 1.0);

        let under_poses = self.children[0]
            .evaluate(vars, ctx, dt, triggers_out)
            .to_vec();

        let (Some(skeleton), Some(base_index), Some(mid_index), Some(tip_index)) = (
            self.skeleton.clone(),
            self.base_index,
            self.mid_index,
            self.tip_index,
        ) else {
            self.poses = under_poses;
            return &self.poses;
        };
        if alpha == 0.0 || under_poses.is_empty() {
            self.poses = under_poses;
            return &self.poses;
        }
        if under_poses.len() != self.poses.len() {
            self.poses = under_poses.clone();
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

        // the previous poses are snapshotted; work from the under poses now
        self.poses = under_poses.clone();

        if self.interp_type == IkInterpType::None && !enabled {
            return &self.poses;
        }

        let mut under_chain = AnimChain::new();
        under_chain.build_from_relative_poses(&skeleton, &under_poses, tip_index);

        // pin the base joint to its target (or its under pose)
        let base_under_pose = skeleton.absolute_pose(base_index, &self.poses);
        let base_target = Pose::from_rot_trans(
            ctx.lookup_rig_rot(vars, &self.base_rotation_var, base_under_pose.rot),
            ctx.lookup_rig_point(vars, &self.base_position_var, base_under_pose.trans),
        );
        let base_parent_abs = match skeleton.parent_index(base_index) {
            Some(parent) => skeleton.absolute_pose(parent, &self.poses),
            None => Pose::IDENTITY,
        };
        self.poses[base_index] = base_parent_abs.inverse() * base_target;
        self.poses[base_index].scale = Vec3::ONE;

        // solve the lower spline toward the mid target
        let mid_abs = skeleton.absolute_pose(mid_index, &self.poses);
        let mut mid_target = IkTarget::new(
            mid_index,
            Pose::from_rot_trans(
                ctx.lookup_rig_rot(vars, &self.mid_rotation_var, mid_abs.rot),
                ctx.lookup_rig_point(vars, &self.mid_position_var, mid_abs.trans),
            ),
            IkTargetType::Spline,
        );
        mid_target.flex_coefficients = self.mid_flex_coefficients.clone();

        let mut absolute_poses = self.poses.clone();
        skeleton.convert_relative_to_absolute(&mut absolute_poses);
        let mut mid_chain = AnimChain::new();
        mid_chain.build_from_relative_poses(&skeleton, &self.poses, mid_index);
        self.solve_target_with_spline(&skeleton, base_index, &mid_target, &absolute_poses, &mut mid_chain);
        mid_chain.output_relative_poses(&mut self.poses);

        // then the upper spline toward the tip target
        let tip_abs = skeleton.absolute_pose(tip_index, &self.poses);
        let mut tip_target = IkTarget::new(
            tip_index,
            Pose::from_rot_trans(
                ctx.lookup_rig_rot(vars, &self.tip_rotation_var, tip_abs.rot),
                ctx.lookup_rig_point(vars, &self.tip_position_var, tip_abs.trans),
            ),
            IkTargetType::Spline,
        );
        tip_target.flex_coefficients = self.tip_flex_coefficients.clone();

        let mut absolute_poses = self.poses.clone();
        skeleton.convert_relative_to_absolute(&mut absolute_poses);
        let mut tip_chain = AnimChain::new();
        tip_chain.build_from_relative_poses(&skeleton, &self.poses, tip_index);
        self.solve_target_with_spline(&skeleton, mid_index, &tip_target, &absolute_poses, &mut tip_chain);
        tip_chain.build_dirty_absolute_poses();
        tip_chain.output_relative_poses(&mut self.poses);

        let mut ik_chain = AnimChain::new();
        ik_chain.build_from_relative_poses(&skeleton, &self.poses, tip_index);
        ik_chain.blend(&under_chain, alpha);

        // smooth the enable/disable transition with an exponential ease
        if self.interp_type != IkInterpType::None {
            self.interp_alpha += self.interp_alpha_vel * dt;
            let ease_alpha = ease(self.interp_alpha.min(1.0), EasingType::EaseOutExpo);
            if self.interp_alpha < 1.0 {
                let mut interp_chain = match self.interp_type {
                    IkInterpType::SnapshotToUnderPoses => under_chain,
                    _ => ik_chain,
                };
                interp_chain.blend(&self.snapshot_chain, ease_alpha);
                interp_chain.output_relative_poses(&mut self.poses);
                return &self.poses;
            }
            self.interp_type = IkInterpType::None;
        }
        if enabled {
            ik_chain.output_relative_poses(&mut self.poses);
        } else {
            under_chain.output_relative_poses(&mut self.poses);
        }
        &self.poses
    }

    fn solve_target_with_spline(
        &mut self,
        skeleton: &Arc<Skeleton>,
        base_index: usize,
        target: &IkTarget,
        absolute_poses: &[Pose],
        chain_out: &mut AnimChain,
    ) {
        let mut tip_pose = target.pose;
        let base_pose = absolute_poses[base_index];

        // more curvature near the head for the full spine spline
        let (base_gain, tip_gain) = if Some(target.index) == self.tip_index {
            (BASE_GAIN, TIP_GAIN)
        } else {
            (1.0, 1.0)
        };
        let spline = CubicHermiteSpline::from_end_rotations(
            base_pose.rot,
            base_pose.trans,
            tip_pose.rot,
            tip_pose.trans,
            base_gain,
            tip_gain,
        );
        let total_arc_length = spline.total_arc_length();

        // keep the rotation interpolation on the short side even when the
        // spine is arched far backwards
        let half_rot = safe_lerp(base_pose.rot, tip_pose.rot, 0.5);
        if (half_rot * Vec3::Z).dot(base_pose.rot * Vec3::Z) < 0.0 {
            tip_pose.rot = -tip_pose.rot;
        }

        let infos = self
            .find_or_create_spline_joint_info(skeleton, base_index, target)
            .to_vec();
        if infos.is_empty() {
            return;
        }

        let mut parent_abs_pose = match skeleton.parent_index(base_index) {
            Some(parent) => absolute_poses[parent],
            None => Pose::IDENTITY,
        };

        // base to tip
        for (i, info) in infos.iter().enumerate().rev() {
            let t = spline.arc_length_inverse(info.ratio * total_arc_length);
            let trans = spline.position(t);

            // ease the twist toward the tip of the full spine spline
            let rot_t = if Some(target.index) == self.tip_index {
                t * t
            } else {
                t
            };
            let twist_rot = safe_lerp(base_pose.rot, tip_pose.rot, rot_t);

            let y = spline.derivative(t).normalize();
            let rot = quat_from_y_x(y, twist_rot * Vec3::X);

            let desired_abs_pose = Pose::from_rot_trans(rot, trans) * info.offset_pose;

            let num_flex = target.flex_coefficients.len();
            let flex = if num_flex == 0 {
                1.0
            } else if num_flex == infos.len() {
                target.flex_coefficient(i)
            } else if info.ratio < 1.0 {
                // interpolate a shorter coefficient list by chain ratio
                let flex_interp = info.ratio * (num_flex - 1) as f32;
                let start = flex_interp.floor() as usize;
                let partial = flex_interp.fract();
                target.flex_coefficient(start) * (1.0 - partial)
                    + target.flex_coefficient(start + 1) * partial
            } else {
                target.flex_coefficient(num_flex - 1)
            };
            let flexed_abs_pose = absolute_poses[info.joint_index].blend(&desired_abs_pose, flex);

            let mut rel_pose = parent_abs_pose.inverse() * flexed_abs_pose;

            if info.joint_index != base_index {
                // constrain how much the spine can stretch or compress
                let length = rel_pose.trans.length();
                if length > EPSILON {
                    let default_length = skeleton
                        .relative_default_pose(info.joint_index)
                        .trans
                        .length();
                    let max_length = default_length * (1.0 + STRETCH_COMPRESS_PERCENTAGE);
                    let min_length = default_length * (1.0 - STRETCH_COMPRESS_PERCENTAGE);
                    if length > max_length {
                        rel_pose.trans = (rel_pose.trans / length) * max_length;
                    } else if length < min_length {
                        rel_pose.trans = (rel_pose.trans / length) * min_length;
                    }
                } else {
                    rel_pose.trans = Vec3::ZERO;
                }
            }

            if !chain_out.set_relative_pose(info.joint_index, rel_pose) {
                log::warn!("SplineIk {:?}: joint not found in spline chain", self.id);
            }

            parent_abs_pose = flexed_abs_pose;
        }
    }

    /// The per-joint ratios and offsets only depend on the default pose,
    /// so they are computed once per target and cached.
    fn find_or_create_spline_joint_info(
        &mut self,
        skeleton: &Arc<Skeleton>,
        base_index: usize,
        target: &IkTarget,
    ) -> &[SplineJointInfo] {
        if !self.spline_joint_info.contains_key(&target.index) {
            self.compute_and_cache_spline_joint_info(skeleton, base_index, target);
        }
        self.spline_joint_info
            .get(&target.index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn compute_and_cache_spline_joint_info(
        &mut self,
        skeleton: &Arc<Skeleton>,
        base_index: usize,
        target: &IkTarget,
    ) {
        let tip_pose = skeleton.absolute_default_pose(target.index);
        let base_pose = skeleton.absolute_default_pose(base_index);

        let (base_gain, tip_gain) = if Some(target.index) == self.tip_index {
            (BASE_GAIN, TIP_GAIN)
        } else {
            (1.0, 1.0)
        };
        let spline = CubicHermiteSpline::from_end_rotations(
            base_pose.rot,
            base_pose.trans,
            tip_pose.rot,
            tip_pose.trans,
            base_gain,
            tip_gain,
        );
        let total_arc_length = spline.total_arc_length();

        let base_to_tip = tip_pose.trans - base_pose.trans;
        let base_to_tip_length = base_to_tip.length();
        if base_to_tip_length < EPSILON {
            self.spline_joint_info.insert(target.index, Vec::new());
            return;
        }
        let base_to_tip_normal = base_to_tip / base_to_tip_length;

        let mut infos = Vec::new();
        let end_index = skeleton.parent_index(base_index);
        let mut index = Some(target.index);
        while index != end_index {
            let Some(joint_index) = index else {
                break;
            };
            let default_pose = skeleton.absolute_default_pose(joint_index);
            let ratio = (default_pose.trans - base_pose.trans).dot(base_to_tip_normal)
                / base_to_tip_length;

            let t = spline.arc_length_inverse(ratio * total_arc_length);
            let y = spline.derivative(t).normalize();
            let rot = quat_from_y_x(y, default_pose.rot * Vec3::X);
            let on_curve_pose = Pose::from_rot_trans(rot, spline.position(t));
            let offset_pose = on_curve_pose.inverse() * *default_pose;

            infos.push(SplineJointInfo {
                joint_index,
                ratio,
                offset_pose,
            });
            index = skeleton.parent_index(joint_index);
        }
        self.spline_joint_info.insert(target.index, infos);
    }

    fn begin_interp(&mut self, interp_type: IkInterpType, chain: AnimChain) {
        self.snapshot_chain = chain;
        self.interp_type = interp_type;
        self.interp_alpha_vel = FRAMES_PER_SECOND / self.interp_duration;
        self.interp_alpha = 0.0;
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
                "SplineIk {:?} could not resolve joints {:?}/{:?}/{:?}",
                self.id,
                self.base_joint_name,
                self.mid_joint_name,
                self.tip_joint_name
            );
        }
        self.spline_joint_info.clear();
        self.poses = vec![Pose::IDENTITY; skeleton.num_joints()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::DefaultPose;
    use crate::skeleton::JointData;
    use glam::Quat;

    // a straight spine up the y axis: Hips, Spine, Spine1, Spine2, Head
    fn spine_skeleton() -> Arc<Skeleton> {
        let step = Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(0.0, 0.25, 0.0));
        Arc::new(
            Skeleton::new(
                vec![
                    JointData::new("Hips", None, Pose::IDENTITY),
                    JointData::new("Spine", Some(0), step),
                    JointData::new("Spine1", Some(1), step),
                    JointData::new("Spine2", Some(2), step),
                    JointData::new("Head", Some(3), step),
                ],
                Pose::IDENTITY,
            )
            .unwrap(),
        )
    }

    fn make_node(skeleton: &Arc<Skeleton>) -> SplineIk {
        let mut node = SplineIk::new(
            "spine",
            1.0,
            true,
            1.0,
            "Hips",
            "Spine2",
            "Head",
            vec![1.0, 1.0, 1.0],
            vec![1.0, 1.0, 1.0],
        );
        node.set_mid_target_vars("chestPos", "chestRot");
        node.set_tip_target_vars("headPos", "headRot");
        node.set_skeleton_internal(skeleton);
        let mut child = DefaultPose::new("under");
        child.set_skeleton_internal(skeleton);
        node.children.push(AnimNode::DefaultPose(child));
        node
    }

    fn run(node: &mut SplineIk, vars: &VariantMap, frames: usize) -> Vec<Pose> {
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut poses = Vec::new();
        for _ in 0..frames {
            poses = node.evaluate(vars, &ctx, 1.0 / 30.0, &mut triggers).to_vec();
        }
        poses
    }

    #[test]
    fn default_targets_reproduce_the_default_pose() {
        let skeleton = spine_skeleton();
        let mut node = make_node(&skeleton);
        let poses = run(&mut node, &VariantMap::new(), 40);
        for (i, pose) in poses.iter().enumerate() {
            let expected = skeleton.relative_default_pose(i);
            assert!(
                (pose.trans - expected.trans).length() < 1e-2,
                "joint {} drifted: {:?} vs {:?}",
                i,
                pose.trans,
                expected.trans
            );
        }
    }

    #[test]
    fn head_target_bends_the_spine() {
        let skeleton = spine_skeleton();
        let mut node = make_node(&skeleton);
        let mut vars = VariantMap::new();
        // lean the chest and head forward
        vars.set("chestPos", Vec3::new(0.0, 0.72, 0.15));
        vars.set("headPos", Vec3::new(0.0, 0.9, 0.3));
        let poses = run(&mut node, &vars, 40);

        // the base stays pinned
        let hips = skeleton.absolute_pose(0, &poses).trans;
        assert!(hips.length() < 1e-3);

        // the head lands near its target
        let head = skeleton.absolute_pose(4, &poses).trans;
        assert!(
            (head - Vec3::new(0.0, 0.9, 0.3)).length() < 0.1,
            "head at {:?}",
            head
        );

        // intermediate joints bend forward rather than staying on the axis
        let spine1 = skeleton.absolute_pose(2, &poses).trans;
        assert!(spine1.z > 0.01, "spine did not bend: {:?}", spine1);
    }

    #[test]
    fn segment_lengths_stay_within_stretch_limits() {
        let skeleton = spine_skeleton();
        let mut node = make_node(&skeleton);
        let mut vars = VariantMap::new();
        // ask for an unreachable head position
        vars.set("headPos", Vec3::new(0.0, 2.0, 0.0));
        let poses = run(&mut node, &vars, 40);
        for i in 1..5 {
            let length = poses[i].trans.length();
            assert!(
                length <= 0.25 * 1.15 + 1e-4,
                "segment {} overstretched: {}",
                i,
                length
            );
        }
    }

    #[test]
    fn missing_joints_pass_under_through() {
        let skeleton = spine_skeleton();
        let mut node = SplineIk::new(
            "spine",
            1.0,
            true,
            1.0,
            "Nope",
            "Spine2",
            "Head",
            vec![],
            vec![],
        );
        node.set_skeleton_internal(&skeleton);
        let mut child = DefaultPose::new("under");
        child.set_skeleton_internal(&skeleton);
        node.children.push(AnimNode::DefaultPose(child));
        let poses = run(&mut node, &VariantMap::new(), 2);
        assert_eq!(poses.len(), 5);
        assert!((poses[1].trans - Vec3::new(0.0, 0.25, 0.0)).length() < 1e-5);
    }
}
