//! Pole-vector constraint: twists a base/mid/tip chain about its base-to-
//! tip axis so the mid joint points toward a requested direction, without
//! moving either endpoint.

use std::sync::Arc;

use glam::{Quat, Vec3};
use wick_core::Pose;

use crate::chain::AnimChain;
use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::util::FRAMES_PER_SECOND;
use crate::variables::VariantMap;

const MIN_LENGTH: f32 = 1.0e-4;
const INTERP_DURATION_FRAMES: f32 = 6.0;

/// Tunable parameters of the hand-target theta heuristic. The defaults are
/// the tuned values for a human arm; hosts with unusual proportions can
/// supply their own.
#[derive(Debug, Clone)]
pub struct PoleVectorTheta {
    /// Degrees added per axis before weighting.
    pub biases: Vec3,
    /// Weights for the x, y, z terms, in degrees per unit.
    pub weights: Vec3,
    /// Weight applied to the z term when the hand is below the shoulder.
    pub z_weight_bottom: f32,
    /// z value (in arm lengths) where the z term starts contributing.
    pub z_start: f32,
    /// x value (in arm lengths) where the x term starts contributing.
    pub x_start: f32,
    /// Subtracted from the default arm length before normalising, meters.
    pub arm_length_margin: f32,
    /// Clamp range for the resulting angle, degrees.
    pub min_theta: f32,
    pub max_theta: f32,
}

impl Default for PoleVectorTheta {
    fn default() -> Self {
        Self {
            biases: Vec3::new(0.0, 135.0, 0.0),
            weights: Vec3::new(-50.0, -60.0, 260.0),
            z_weight_bottom: -100.0,
            z_start: 0.6,
            x_start: 0.1,
            arm_length_margin: 0.1,
            min_theta: 13.0,
            max_theta: 175.0,
        }
    }
}

impl PoleVectorTheta {
    /// Elbow angle in degrees for a hand at `hand` with the shoulder at
    /// `shoulder`, positions normalised by `default_arm_length`.
    pub fn find_theta(
        &self,
        hand: Vec3,
        shoulder: Vec3,
        default_arm_length: f32,
        left: bool,
    ) -> f32 {
        let arm_length = (default_arm_length - self.arm_length_margin).max(MIN_LENGTH);
        let arm_to_hand = hand - shoulder;

        let value_y = (arm_to_hand.y / arm_length) * self.weights.y + self.biases.y;

        let z_weight = if arm_to_hand.y > 0.0 {
            self.weights.z
        } else {
            self.z_weight_bottom
        };
        let value_z = z_weight
            * (self.z_start - arm_to_hand.z / arm_length).max(0.0)
            * (arm_to_hand.y / arm_length).abs();

        let x_term = if left {
            -arm_to_hand.x / arm_length
        } else {
            arm_to_hand.x / arm_length
        };
        let value_x = self.weights.x * (x_term + self.x_start).max(0.0);

        (value_x + value_y + value_z).clamp(self.min_theta, self.max_theta)
    }
}

/// Disambiguates the bend plane of an elbow or knee chain.
#[derive(Debug)]
pub struct PoleVectorConstraint {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,

    enabled: bool,
    reference_vector: Vec3,
    base_joint_name: String,
    mid_joint_name: String,
    tip_joint_name: String,
    enabled_var: String,
    pole_vector_var: String,
    theta_params: PoleVectorTheta,

    base_parent_index: Option<usize>,
    base_index: Option<usize>,
    mid_index: Option<usize>,
    tip_index: Option<usize>,

    interp_type: IkInterpType,
    interp_alpha: f32,
    interp_alpha_vel: f32,
    snapshot_chain: AnimChain,
}

/// Interpolation envelope shared by the IK nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum IkInterpType {
    #[default]
    None,
    SnapshotToUnderPoses,
    SnapshotToSolve,
}

impl PoleVectorConstraint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        enabled: bool,
        reference_vector: Vec3,
        base_joint_name: impl Into<String>,
        mid_joint_name: impl Into<String>,
        tip_joint_name: impl Into<String>,
        enabled_var: impl Into<String>,
        pole_vector_var: impl Into<String>,
        theta_params: PoleVectorTheta,
    ) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            enabled,
            reference_vector,
            base_joint_name: base_joint_name.into(),
            mid_joint_name: mid_joint_name.into(),
            tip_joint_name: tip_joint_name.into(),
            enabled_var: enabled_var.into(),
            pole_vector_var: pole_vector_var.into(),
            theta_params,
            base_parent_index: None,
            base_index: None,
            mid_index: None,
            tip_index: None,
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

        let pole_vector = ctx.lookup_rig_vector(vars, &self.pole_vector_var, Vec3::Z);

        let mut enabled = vars.lookup_bool(&self.enabled_var, self.enabled);
        if pole_vector.length() < MIN_LENGTH {
            enabled = false;
        }

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

        // hand tips use the tuned heuristic instead of the projected angle
        let theta_override = self.hand_theta(&skeleton, tip_index, &base_pose, &tip_pose);

        let ref_vector = mid_pose.xform_vector_fast(self.reference_vector);
        let axis = base_pose.trans - tip_pose.trans;
        let axis_length = axis.length();

        if axis_length > MIN_LENGTH && ref_vector.length() > MIN_LENGTH {
            let unit_axis = axis / axis_length;
            let delta = compute_pole_delta(
                unit_axis,
                ref_vector,
                pole_vector,
                theta_override,
            );
            if let Some(delta_rot) = delta {
                let rel_base_rot =
                    (base_parent_pose.rot.inverse() * delta_rot * base_pose.rot).normalize();
                ik_chain.set_relative_pose(
                    base_index,
                    Pose::from_rot_trans(rel_base_rot, under_poses[base_index].trans),
                );
                let rel_tip_rot =
                    (mid_pose.rot.inverse() * delta_rot.inverse() * tip_pose.rot).normalize();
                ik_chain.set_relative_pose(
                    tip_index,
                    Pose::from_rot_trans(rel_tip_rot, under_poses[tip_index].trans),
                );
            }
        }

        self.poses = under_poses;
        self.apply_interp(dt, &under_chain, &ik_chain, enabled);
        &self.poses
    }

    fn hand_theta(
        &self,
        skeleton: &Arc<Skeleton>,
        tip_index: usize,
        base_pose: &Pose,
        tip_pose: &Pose,
    ) -> Option<f32> {
        let left_hand = skeleton.joint_index("LeftHand");
        let right_hand = skeleton.joint_index("RightHand");
        let is_left = left_hand == Some(tip_index);
        if !is_left && right_hand != Some(tip_index) {
            return None;
        }

        // the default arm span is measured on the right side; both arms
        // have the same proportions
        let (shoulder, hand) = (
            skeleton.joint_index("RightShoulder")?,
            skeleton.joint_index("RightHand")?,
        );
        let default_arm_length = (skeleton.absolute_default_pose(hand).trans
            - skeleton.absolute_default_pose(shoulder).trans)
            .length();

        let mut theta = self.theta_params.find_theta(
            tip_pose.trans,
            base_pose.trans,
            default_arm_length,
            is_left,
        );
        if is_left {
            theta = -theta;
        }
        Some(((180.0 - theta) / 180.0) * std::f32::consts::PI)
    }

    fn begin_interp(&mut self, interp_type: IkInterpType, chain: AnimChain) {
        self.snapshot_chain = chain;
        self.interp_type = interp_type;
        self.interp_alpha_vel = FRAMES_PER_SECOND / INTERP_DURATION_FRAMES;
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
                "PoleVectorConstraint {:?} could not resolve joints {:?}/{:?}/{:?}",
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

/// The delta rotation about `unit_axis` that carries the projected
/// reference vector onto the projected pole vector; `None` when a
/// projection degenerates.
pub(crate) fn compute_pole_delta(
    unit_axis: Vec3,
    ref_vector: Vec3,
    pole_vector: Vec3,
    theta_override: Option<f32>,
) -> Option<Quat> {
    let side_vector = unit_axis.cross(ref_vector);
    let ref_vector_proj = ref_vector - ref_vector.dot(unit_axis) * unit_axis;
    let pole_vector_proj = pole_vector - pole_vector.dot(unit_axis) * unit_axis;

    if side_vector.length() < MIN_LENGTH
        || ref_vector_proj.length() < MIN_LENGTH
        || pole_vector_proj.length() < MIN_LENGTH
    {
        return None;
    }

    let theta = match theta_override {
        Some(theta) => theta,
        None => {
            let dot = ref_vector_proj
                .normalize()
                .dot(pole_vector_proj.normalize())
                .clamp(0.0, 1.0);
            pole_vector.dot(side_vector).signum() * dot.acos()
        }
    };
    Some(Quat::from_axis_angle(unit_axis, theta))
}
