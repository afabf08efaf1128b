//! Multi-target cyclic coordinate descent solver with per-joint rotation
//! constraints.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use glam::{Quat, Vec3};
use wick_constraint::{ElbowConstraint, RotationConstraint, SwingTwistConstraint};
use wick_core::Pose;

use crate::chain::AnimChain;
use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::nodes::ik_target::{IkTarget, IkTargetType};
use crate::nodes::pole_vector::compute_pole_delta;
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

const EPSILON: f32 = 1.0e-5;
/// A target is met when the tip is within a millimeter.
const ACCEPTABLE_ERROR: f32 = 1.0e-3;
const MAX_IK_LOOPS: u32 = 16;
/// Lerp factor time scale for relaxing the pose toward the defaults.
const RELAXATION_TIMESCALE: f32 = 0.25;

/// A variable-driven target description: the joint it pulls on and the
/// variable keys its pose, type and weight are read from each frame.
#[derive(Debug, Clone)]
pub struct IkTargetVar {
    pub joint_name: String,
    pub position_var: String,
    pub rotation_var: String,
    pub type_var: String,
    pub weight_var: String,
    pub weight: f32,
    pub flex_coefficients: Vec<f32>,
    pub pole_vector_enabled_var: String,
    pub pole_vector_var: String,
    joint_index: Option<usize>,
    looked_up: bool,
}

impl IkTargetVar {
    pub fn new(
        joint_name: impl Into<String>,
        position_var: impl Into<String>,
        rotation_var: impl Into<String>,
        type_var: impl Into<String>,
    ) -> Self {
        Self {
            joint_name: joint_name.into(),
            position_var: position_var.into(),
            rotation_var: rotation_var.into(),
            type_var: type_var.into(),
            weight_var: String::new(),
            weight: 1.0,
            flex_coefficients: Vec::new(),
            pole_vector_enabled_var: String::new(),
            pole_vector_var: String::new(),
            joint_index: None,
            looked_up: false,
        }
    }

    pub fn with_weight(mut self, weight: f32, weight_var: impl Into<String>) -> Self {
        self.weight = weight;
        self.weight_var = weight_var.into();
        self
    }

    pub fn with_flex_coefficients(mut self, flex_coefficients: Vec<f32>) -> Self {
        self.flex_coefficients = flex_coefficients;
        self
    }

    pub fn with_pole_vector(
        mut self,
        enabled_var: impl Into<String>,
        pole_vector_var: impl Into<String>,
    ) -> Self {
        self.pole_vector_enabled_var = enabled_var.into();
        self.pole_vector_var = pole_vector_var.into();
        self
    }
}

/// CCD solver: iteratively rotates each joint between a target's tip and
/// the root so the tip approaches the target, applying the joint's
/// rotation constraint after every adjustment. Bounded by an iteration cap
/// and a wall-clock budget; partial solutions are always valid poses.
#[derive(Debug)]
pub struct InverseKinematics {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    relative_poses: Vec<Pose>,
    default_relative_poses: Vec<Pose>,

    constraints: HashMap<usize, RotationConstraint>,
    targets: BTreeMap<usize, IkTarget>,
    max_target_index: usize,
    target_vars: Vec<IkTargetVar>,
    max_error_on_last_solve: f32,
}

impl InverseKinematics {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            relative_poses: Vec::new(),
            default_relative_poses: Vec::new(),
            constraints: HashMap::new(),
            targets: BTreeMap::new(),
            max_target_index: 0,
            target_vars: Vec::new(),
            max_error_on_last_solve: f32::MAX,
        }
    }

    /// Register a variable-driven target; resolved against the variable
    /// map at the top of each evaluate.
    pub fn add_target_var(&mut self, target_var: IkTargetVar) {
        self.target_vars.push(target_var);
    }

    /// Set or update a target imperatively. The pose is interpreted
    /// relative to the joint's topmost ancestor, which is remembered as
    /// the target's root.
    pub fn update_target(&mut self, joint_index: usize, pose: Pose, target_type: IkTargetType) {
        let Some(skeleton) = &self.skeleton else {
            return;
        };
        if joint_index >= skeleton.num_joints() {
            return;
        }
        match self.targets.get_mut(&joint_index) {
            Some(target) => {
                target.pose = pose;
                target.target_type = target_type;
            }
            None => {
                let mut target = IkTarget::new(joint_index, pose, target_type);
                // the topmost non-root ancestor; None when the joint hangs
                // directly off the root
                let root = skeleton.root_index(joint_index);
                target.root_index = (root != joint_index).then_some(root);
                self.targets.insert(joint_index, target);
            }
        }
        self.max_target_index = self.max_target_index.max(joint_index);
    }

    pub fn update_target_by_name(&mut self, name: &str, pose: Pose, target_type: IkTargetType) {
        if let Some(index) = self.skeleton.as_ref().and_then(|s| s.joint_index(name)) {
            self.update_target(index, pose, target_type);
        }
    }

    /// Remove a target and recompute the highest remaining target index.
    pub fn clear_target(&mut self, joint_index: usize) {
        self.targets.remove(&joint_index);
        self.max_target_index = self.targets.keys().max().copied().unwrap_or(0);
    }

    pub fn clear_all_targets(&mut self) {
        self.targets.clear();
        self.max_target_index = 0;
    }

    /// Install a constraint for a specific joint, replacing any built-in.
    pub fn set_constraint(&mut self, joint_index: usize, constraint: RotationConstraint) {
        self.constraints.insert(joint_index, constraint);
    }

    pub fn clear_joint_limit_history(&mut self) {
        for constraint in self.constraints.values_mut() {
            constraint.clear_history();
        }
    }

    pub fn max_error_on_last_solve(&self) -> f32 {
        self.max_error_on_last_solve
    }

    /// Override the relaxation poses (by default the skeleton's relative
    /// default poses).
    pub fn load_default_poses(&mut self, poses: &[Pose]) {
        self.default_relative_poses = poses.to_vec();
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        if self.children.len() == 1 {
            let under_poses = self.children[0]
                .evaluate(vars, ctx, dt, triggers_out)
                .to_vec();
            self.solve_from_under_poses(vars, ctx, dt, &under_poses);
        } else {
            let under_poses = Vec::new();
            self.solve_from_under_poses(vars, ctx, dt, &under_poses);
        }
        &self.relative_poses
    }

    pub fn overlay(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        _triggers_out: &mut VariantMap,
        under_poses: &[Pose],
    ) -> &[Pose] {
        self.solve_from_under_poses(vars, ctx, dt, under_poses);
        &self.relative_poses
    }

    fn solve_from_under_poses(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        under_poses: &[Pose],
    ) {
        let Some(skeleton) = self.skeleton.clone() else {
            self.relative_poses = under_poses.to_vec();
            return;
        };
        let num_joints = skeleton.num_joints();

        if under_poses.len() == num_joints {
            self.relative_poses = under_poses.to_vec();
        } else if self.relative_poses.len() != num_joints {
            self.relative_poses = skeleton.relative_default_poses().to_vec();
        }
        if self.default_relative_poses.len() != num_joints {
            self.default_relative_poses = skeleton.relative_default_poses().to_vec();
        }

        // bleed off accumulated drift while targets are inactive
        self.relax_toward_defaults(dt);

        let targets = self.gather_targets(vars, ctx, &skeleton);

        if targets.is_empty() {
            // still enforce every constraint
            for (&index, constraint) in self.constraints.iter_mut() {
                if index < self.relative_poses.len() {
                    let mut rotation = self.relative_poses[index].rot;
                    constraint.apply(&mut rotation);
                    self.relative_poses[index].rot = rotation;
                }
            }
            self.max_error_on_last_solve = 0.0;
        } else {
            self.solve_with_ccd(ctx, &skeleton, &targets);
        }
    }

    /// Merge imperative targets with this frame's variable-driven ones
    /// (variables win on the same joint), ordered by joint index.
    fn gather_targets(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        skeleton: &Arc<Skeleton>,
    ) -> Vec<IkTarget> {
        let mut merged: BTreeMap<usize, IkTarget> = self.targets.clone();

        let mut absolute_poses = self.relative_poses.clone();
        skeleton.convert_relative_to_absolute(&mut absolute_poses);

        for target_var in &mut self.target_vars {
            if !target_var.looked_up {
                target_var.joint_index = skeleton.joint_index(&target_var.joint_name);
                if target_var.joint_index.is_none() {
                    log::warn!(
                        "InverseKinematics target references unknown joint {:?}",
                        target_var.joint_name
                    );
                }
                target_var.looked_up = true;
            }
            let Some(joint_index) = target_var.joint_index else {
                continue;
            };

            let target_type = IkTargetType::from_int(
                vars.lookup_int(&target_var.type_var, IkTargetType::Unknown as i32),
            );
            if target_type == IkTargetType::Unknown {
                merged.remove(&joint_index);
                continue;
            }

            let default_pose = absolute_poses[joint_index];
            let pose = Pose::from_rot_trans(
                ctx.lookup_rig_rot(vars, &target_var.rotation_var, default_pose.rot),
                ctx.lookup_rig_point(vars, &target_var.position_var, default_pose.trans),
            );

            let mut target = IkTarget::new(joint_index, pose, target_type);
            target.weight = vars.lookup_float(&target_var.weight_var, target_var.weight);
            target.flex_coefficients = target_var.flex_coefficients.clone();
            if target_type == IkTargetType::HipsRelativeRotationAndPosition {
                let root = skeleton.root_index(joint_index);
                target.root_index = (root != joint_index).then_some(root);
            }
            if vars.lookup_bool(&target_var.pole_vector_enabled_var, false) {
                target.pole_vector =
                    Some(ctx.lookup_rig_vector(vars, &target_var.pole_vector_var, Vec3::Z));
            }
            merged.insert(joint_index, target);
        }

        merged.into_values().collect()
    }

    fn relax_toward_defaults(&mut self, dt: f32) {
        let alpha = (dt / RELAXATION_TIMESCALE).clamp(0.0, 1.0);
        for (pose, default) in self
            .relative_poses
            .iter_mut()
            .zip(self.default_relative_poses.iter())
        {
            // flip the default's sign rather than lerping the long way around
            let dot_sign = 1.0_f32.copysign(pose.rot.dot(default.rot));
            pose.rot = pose.rot.lerp(default.rot * dot_sign, alpha).normalize();
        }
    }

    fn apply_constraint(&mut self, joint_index: usize, rotation: &mut Quat) {
        if let Some(constraint) = self.constraints.get_mut(&joint_index) {
            constraint.apply(rotation);
        }
    }

    fn solve_with_ccd(
        &mut self,
        ctx: &EvalContext,
        skeleton: &Arc<Skeleton>,
        targets: &[IkTarget],
    ) {
        let mut absolute_poses = self.relative_poses.clone();
        skeleton.convert_relative_to_absolute(&mut absolute_poses);

        let max_target_index = targets
            .iter()
            .map(|t| t.index)
            .max()
            .unwrap_or(0)
            .max(self.max_target_index);

        let start = Instant::now();
        let budget_us = ctx.ccd_time_budget_us() as u128;

        let mut largest_error;
        let mut num_loops = 0;
        loop {
            largest_error = 0.0_f32;
            for target in targets {
                match target.target_type {
                    IkTargetType::Spline | IkTargetType::Unknown => continue,
                    IkTargetType::RotationOnly => {
                        self.settle_tip_rotation(skeleton, &mut absolute_poses, target);
                        continue;
                    }
                    _ => {}
                }

                let tip_index = target.index;
                let mut target_pose = target.pose;
                if let Some(root_index) = target.root_index {
                    // express the target in the skeleton's absolute frame
                    let root_pose = &self.relative_poses[root_index];
                    target_pose.trans = root_pose.trans + root_pose.rot * target_pose.trans;
                    target_pose.rot = (root_pose.rot * target_pose.rot).normalize();
                }

                let mut lowest_moved_index = self.relative_poses.len() - 1;
                let mut tip = absolute_poses[tip_index].trans;
                let mut error = (target_pose.trans - tip).length();

                if error < ACCEPTABLE_ERROR {
                    largest_error = largest_error.max(error);
                    self.settle_tip_rotation_to(skeleton, &mut absolute_poses, tip_index, target_pose.rot);
                    continue;
                }

                // descend toward the root, rotating each joint to bring
                // the tip closer to the target
                let mut index = skeleton.parent_index(tip_index);
                while let Some(joint_index) = index {
                    if error <= ACCEPTABLE_ERROR {
                        break;
                    }
                    let joint_position = absolute_poses[joint_index].trans;
                    let lever_arm = tip - joint_position;
                    let pivot_line = target_pose.trans - joint_position;

                    let axis = lever_arm.cross(pivot_line);
                    let axis_length = axis.length();
                    if axis_length > EPSILON {
                        let axis = axis / axis_length;
                        let cos_angle = (lever_arm.dot(pivot_line)
                            / (lever_arm.length() * pivot_line.length()))
                        .clamp(-1.0, 1.0);
                        let angle = cos_angle.acos();

                        // the axis can be finite while the angle is still
                        // effectively zero
                        if angle > EPSILON {
                            let delta_rotation = Quat::from_axis_angle(axis, angle);

                            if let Some(parent_index) = skeleton.parent_index(joint_index) {
                                // Q' = dQ * Q and Q = Qp * q  -->  q' = Qp^ * dQ * Q
                                let mut new_rot = (absolute_poses[parent_index].rot.inverse()
                                    * delta_rotation
                                    * absolute_poses[joint_index].rot)
                                    .normalize();
                                self.apply_constraint(joint_index, &mut new_rot);
                                self.relative_poses[joint_index].rot = new_rot;

                                lowest_moved_index = lowest_moved_index.min(joint_index);

                                // track the moving tip as we descend
                                tip = joint_position + delta_rotation * lever_arm;
                                error = (target_pose.trans - tip).length();
                            }
                        }
                    }
                    index = skeleton.parent_index(joint_index);
                }
                largest_error = largest_error.max(error);

                // refresh only the absolute poses that the move dirtied
                if lowest_moved_index <= max_target_index && lowest_moved_index < tip_index {
                    for i in lowest_moved_index..=max_target_index {
                        if let Some(parent_index) = skeleton.parent_index(i) {
                            absolute_poses[i] =
                                absolute_poses[parent_index] * self.relative_poses[i];
                        }
                    }
                }

                self.settle_tip_rotation_to(skeleton, &mut absolute_poses, tip_index, target_pose.rot);
            }
            num_loops += 1;

            if largest_error <= ACCEPTABLE_ERROR
                || num_loops >= MAX_IK_LOOPS
                || start.elapsed().as_micros() >= budget_us
            {
                break;
            }
        }
        self.max_error_on_last_solve = largest_error;

        // disambiguate elbow/knee planes for targets carrying a pole vector
        for target in targets {
            if let Some(pole_vector) = target.pole_vector {
                self.apply_target_pole_vector(skeleton, target, pole_vector);
            }
        }
    }

    /// Set the tip's parent-relative rotation so its absolute rotation
    /// matches the target's, honoring any constraint on the tip joint.
    fn settle_tip_rotation_to(
        &mut self,
        skeleton: &Arc<Skeleton>,
        absolute_poses: &mut [Pose],
        tip_index: usize,
        target_rot: Quat,
    ) {
        if let Some(parent_index) = skeleton.parent_index(tip_index) {
            let mut new_relative_rotation =
                (absolute_poses[parent_index].rot.inverse() * target_rot).normalize();
            self.apply_constraint(tip_index, &mut new_relative_rotation);
            self.relative_poses[tip_index].rot = new_relative_rotation;
            absolute_poses[tip_index].rot = target_rot;
        }
    }

    fn settle_tip_rotation(
        &mut self,
        skeleton: &Arc<Skeleton>,
        absolute_poses: &mut [Pose],
        target: &IkTarget,
    ) {
        self.settle_tip_rotation_to(skeleton, absolute_poses, target.index, target.pose.rot);
    }

    /// Twist the tip's three-joint chain about its base-to-tip axis toward
    /// the pole vector; shared with the standalone pole-vector node.
    fn apply_target_pole_vector(
        &mut self,
        skeleton: &Arc<Skeleton>,
        target: &IkTarget,
        pole_vector: Vec3,
    ) {
        let tip_index = target.index;
        let Some(mid_index) = skeleton.parent_index(tip_index) else {
            return;
        };
        let Some(base_index) = skeleton.parent_index(mid_index) else {
            return;
        };

        let mut chain = AnimChain::new();
        if !chain.build_from_relative_poses(skeleton, &self.relative_poses, tip_index) {
            return;
        }
        let base_parent_pose = match skeleton.parent_index(base_index) {
            Some(index) => chain.absolute_pose(index),
            None => Pose::IDENTITY,
        };
        let base_pose = chain.absolute_pose(base_index);
        let mid_pose = chain.absolute_pose(mid_index);
        let tip_pose = chain.absolute_pose(tip_index);

        let axis = base_pose.trans - tip_pose.trans;
        if axis.length() < 1.0e-4 {
            return;
        }
        let unit_axis = axis.normalize();
        let ref_vector = mid_pose.xform_vector_fast(Vec3::X);

        let Some(delta_rot) = compute_pole_delta(unit_axis, ref_vector, pole_vector, None) else {
            return;
        };

        let rel_base_rot = (base_parent_pose.rot.inverse() * delta_rot * base_pose.rot).normalize();
        chain.set_relative_pose(
            base_index,
            Pose::from_rot_trans(rel_base_rot, self.relative_poses[base_index].trans),
        );
        let rel_tip_rot = (mid_pose.rot.inverse() * delta_rot.inverse() * tip_pose.rot).normalize();
        chain.set_relative_pose(
            tip_index,
            Pose::from_rot_trans(rel_tip_rot, self.relative_poses[tip_index].trans),
        );
        chain.output_relative_poses(&mut self.relative_poses);
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
        self.default_relative_poses = skeleton.relative_default_poses().to_vec();
        self.relative_poses = skeleton.relative_default_poses().to_vec();
        for target_var in &mut self.target_vars {
            target_var.joint_index = None;
            target_var.looked_up = false;
        }
        self.targets.clear();
        self.max_target_index = 0;
        self.init_constraints(skeleton);
    }

    /// Build the humanoid constraint table from the skeleton by joint
    /// name: swing-twist envelopes for shoulders, hips, wrists and ankles,
    /// hinges for elbows and knees, mirrored between left and right.
    fn init_constraints(&mut self, skeleton: &Arc<Skeleton>) {
        use std::f32::consts::PI;

        self.constraints.clear();

        let default_poses = skeleton.relative_default_poses();
        let mut absolute_poses = default_poses.to_vec();
        skeleton.convert_relative_to_absolute(&mut absolute_poses);

        for i in 0..skeleton.num_joints() {
            let name = skeleton.joint_name(i);
            let lower = name.to_lowercase();
            let (is_left, base_name) = if lower.starts_with("left") {
                (true, &lower[4..])
            } else if lower.starts_with("right") {
                (false, &lower[5..])
            } else {
                (false, lower.as_str())
            };
            let mirror = if is_left { -1.0 } else { 1.0 };

            let reference_rotation = default_poses[i].rot;

            let constraint: Option<RotationConstraint> = match base_name {
                "arm" => {
                    let mut st = SwingTwistConstraint::new(reference_rotation);
                    st.set_twist_limits(-PI / 2.0, PI / 2.0);
                    // approximate swing limits in the root frame
                    let mut directions = vec![
                        Vec3::new(mirror * 1.0, 1.0, 1.0),
                        Vec3::new(mirror * 1.0, 0.0, 1.0),
                        Vec3::new(mirror * 1.0, -1.0, 0.5),
                        Vec3::new(0.0, -1.0, 0.0),
                        Vec3::new(0.0, -1.0, -1.0),
                        Vec3::new(mirror * -0.5, 0.0, -1.0),
                        Vec3::new(0.0, 1.0, -1.0),
                        Vec3::new(0.0, 1.0, 0.0),
                    ];
                    let inv_absolute = absolute_poses[i].rot.inverse();
                    for direction in &mut directions {
                        *direction = inv_absolute * *direction;
                    }
                    st.set_swing_limits_from_directions(&directions);
                    Some(st.into())
                }
                "upleg" => {
                    let mut st = SwingTwistConstraint::new(reference_rotation);
                    st.set_twist_limits(-PI / 4.0, PI / 4.0);
                    let mut directions = vec![
                        Vec3::new(mirror * 0.25, 0.0, 1.0),
                        Vec3::new(mirror * -0.5, 0.0, 1.0),
                        Vec3::new(mirror * -1.0, 0.0, 1.0),
                        Vec3::new(mirror * -1.0, 0.0, 0.0),
                        Vec3::new(mirror * -0.5, -0.5, -1.0),
                        Vec3::new(0.0, -0.75, -1.0),
                        Vec3::new(mirror * 0.25, -1.0, 0.0),
                        Vec3::new(mirror * 0.25, -1.0, 1.0),
                    ];
                    let inv_absolute = absolute_poses[i].rot.inverse();
                    for direction in &mut directions {
                        *direction = inv_absolute * *direction;
                    }
                    st.set_swing_limits_from_directions(&directions);
                    Some(st.into())
                }
                "hand" => {
                    let mut st = SwingTwistConstraint::new(reference_rotation);
                    st.set_twist_limits(-PI / 2.0, PI / 2.0);
                    // parent-frame directions, symmetric in x
                    let mut directions = vec![
                        Vec3::new(1.0, 1.0, 0.0),
                        Vec3::new(0.75, 1.0, -1.0),
                        Vec3::new(-0.75, 1.0, -1.0),
                        Vec3::new(-1.0, 1.0, 0.0),
                        Vec3::new(-0.75, 1.0, 1.0),
                        Vec3::new(0.75, 1.0, 1.0),
                    ];
                    let inv_relative = reference_rotation.inverse();
                    for direction in &mut directions {
                        *direction = inv_relative * *direction;
                    }
                    st.set_swing_limits_from_directions(&directions);
                    Some(st.into())
                }
                "foot" => {
                    let mut st = SwingTwistConstraint::new(reference_rotation);
                    st.set_twist_limits(-PI / 4.0, PI / 4.0);
                    let mut directions = vec![
                        Vec3::Y,
                        Vec3::X,
                        Vec3::new(1.0, 1.0, 1.0),
                        Vec3::new(1.0, 1.0, -1.0),
                    ];
                    let inv_relative = reference_rotation.inverse();
                    for direction in &mut directions {
                        *direction = inv_relative * *direction;
                    }
                    st.set_swing_limits_from_directions(&directions);
                    Some(st.into())
                }
                // the elbow rotates about the parent-frame z axis
                "forearm" => hinge_constraint(
                    reference_rotation,
                    -mirror * Vec3::Z,
                    0.0,
                    7.0 * PI / 8.0,
                )
                .map(RotationConstraint::from),
                // the knee rotates about the parent-frame -x axis
                "leg" => hinge_constraint(reference_rotation, -Vec3::X, 0.0, 3.0 * PI / 4.0)
                    .map(RotationConstraint::from),
                _ => None,
            };

            if let Some(constraint) = constraint {
                self.constraints.insert(i, constraint);
            }
        }
    }
}

/// Build an elbow/knee hinge: the raw angle range is measured by swinging
/// the parent-frame y axis about the hinge, then projecting into the
/// child frame.
fn hinge_constraint(
    reference_rotation: Quat,
    hinge_axis: Vec3,
    min_raw_angle: f32,
    max_raw_angle: f32,
) -> Option<ElbowConstraint> {
    let inv_reference = reference_rotation.inverse();
    let min_swing_axis = inv_reference * (Quat::from_axis_angle(hinge_axis, min_raw_angle) * Vec3::Y);
    let max_swing_axis = inv_reference * (Quat::from_axis_angle(hinge_axis, max_raw_angle) * Vec3::Y);

    // rotate the hinge into the child frame for the rest of the math
    let hinge_axis = reference_rotation * hinge_axis;

    let projected_y = (Vec3::Y - Vec3::Y.dot(hinge_axis) * hinge_axis).normalize();
    let mut min_angle = projected_y.dot(min_swing_axis).clamp(-1.0, 1.0).acos();
    if hinge_axis.dot(projected_y.cross(min_swing_axis)) < 0.0 {
        min_angle = -min_angle;
    }
    let mut max_angle = projected_y.dot(max_swing_axis).clamp(-1.0, 1.0).acos();
    if hinge_axis.dot(projected_y.cross(max_swing_axis)) < 0.0 {
        max_angle = -max_angle;
    }

    ElbowConstraint::new(reference_rotation, hinge_axis, min_angle, max_angle).ok()
}
