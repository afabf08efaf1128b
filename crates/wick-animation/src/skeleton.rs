//! Immutable joint topology shared by every node in a graph.
//!
//! A skeleton stores parent indices in topological order (parents strictly
//! before children), joint names, the bind and default pose sets in both
//! relative and absolute form, the pre/post-rotation poses factored out of
//! the authoring format, and a left/right mirror map.

use glam::Vec3;
use std::collections::HashMap;

use wick_core::{Pose, Result, WickError};

/// Per-joint construction input.
#[derive(Debug, Clone)]
pub struct JointData {
    pub name: String,
    /// Must reference a lower joint index (topological order).
    pub parent: Option<usize>,
    pub relative_bind_pose: Pose,
    /// The joint configuration at frame 0 of the default animation.
    pub relative_default_pose: Pose,
    pub pre_rotation_pose: Pose,
    pub post_rotation_pose: Pose,
}

impl JointData {
    /// A joint whose bind and default configurations coincide.
    pub fn new(name: impl Into<String>, parent: Option<usize>, relative_pose: Pose) -> Self {
        Self {
            name: name.into(),
            parent,
            relative_bind_pose: relative_pose,
            relative_default_pose: relative_pose,
            pre_rotation_pose: Pose::IDENTITY,
            post_rotation_pose: Pose::IDENTITY,
        }
    }
}

/// Immutable after construction; nodes hold it behind an `Arc`.
#[derive(Debug)]
pub struct Skeleton {
    names: Vec<String>,
    parents: Vec<Option<usize>>,
    relative_bind_poses: Vec<Pose>,
    absolute_bind_poses: Vec<Pose>,
    relative_default_poses: Vec<Pose>,
    absolute_default_poses: Vec<Pose>,
    pre_rotation_poses: Vec<Pose>,
    post_rotation_poses: Vec<Pose>,
    /// Index of the joint mirroring each joint across the sagittal plane
    /// (self if none).
    mirror_map: Vec<usize>,
    indices_by_name: HashMap<String, usize>,
}

impl Skeleton {
    /// Build a skeleton from a topologically ordered joint list.
    ///
    /// `geometry_offset` is the authoring-format scale/offset; absolute
    /// bind and default translations are rescaled through it so bone
    /// positions come out in meters.
    pub fn new(joints: Vec<JointData>, geometry_offset: Pose) -> Result<Self> {
        let count = joints.len();

        let mut indices_by_name = HashMap::with_capacity(count);
        for (i, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent >= i {
                    return Err(WickError::BadParentOrder { index: i, parent });
                }
            }
            if indices_by_name.insert(joint.name.clone(), i).is_some() {
                return Err(WickError::DuplicateJointName(joint.name.clone()));
            }
        }

        let names: Vec<String> = joints.iter().map(|j| j.name.clone()).collect();
        let parents: Vec<Option<usize>> = joints.iter().map(|j| j.parent).collect();
        let relative_bind: Vec<Pose> = joints.iter().map(|j| j.relative_bind_pose).collect();
        let relative_default: Vec<Pose> = joints.iter().map(|j| j.relative_default_pose).collect();

        let (relative_bind_poses, absolute_bind_poses) =
            normalize_pose_set(&parents, &relative_bind, &geometry_offset);
        let (relative_default_poses, absolute_default_poses) =
            normalize_pose_set(&parents, &relative_default, &geometry_offset);

        let mirror_map = build_mirror_map(&names, &indices_by_name);

        Ok(Self {
            names,
            parents,
            relative_bind_poses,
            absolute_bind_poses,
            relative_default_poses,
            absolute_default_poses,
            pre_rotation_poses: joints.iter().map(|j| j.pre_rotation_pose).collect(),
            post_rotation_poses: joints.iter().map(|j| j.post_rotation_pose).collect(),
            mirror_map,
            indices_by_name,
        })
    }

    pub fn num_joints(&self) -> usize {
        self.names.len()
    }

    pub fn joint_name(&self, joint_index: usize) -> &str {
        &self.names[joint_index]
    }

    /// Case-sensitive name lookup.
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.indices_by_name.get(name).copied()
    }

    /// Batch lookup; preserves order, `None` for unresolved names.
    pub fn joint_indices(&self, names: &[&str]) -> Vec<Option<usize>> {
        names.iter().map(|name| self.joint_index(name)).collect()
    }

    pub fn parent_index(&self, joint_index: usize) -> Option<usize> {
        self.parents[joint_index]
    }

    /// Number of ancestors between this joint and its root.
    pub fn chain_depth(&self, joint_index: usize) -> usize {
        let mut depth = 0;
        let mut index = joint_index;
        while let Some(parent) = self.parents[index] {
            depth += 1;
            index = parent;
        }
        depth
    }

    /// The topmost ancestor of a joint (itself if it is a root).
    pub fn root_index(&self, joint_index: usize) -> usize {
        let mut index = joint_index;
        while let Some(parent) = self.parents[index] {
            index = parent;
        }
        index
    }

    pub fn children_of_joint(&self, joint_index: usize) -> Vec<usize> {
        (0..self.num_joints())
            .filter(|&i| self.parents[i] == Some(joint_index))
            .collect()
    }

    pub fn relative_bind_pose(&self, joint_index: usize) -> &Pose {
        &self.relative_bind_poses[joint_index]
    }

    pub fn relative_bind_poses(&self) -> &[Pose] {
        &self.relative_bind_poses
    }

    pub fn absolute_bind_pose(&self, joint_index: usize) -> &Pose {
        &self.absolute_bind_poses[joint_index]
    }

    pub fn relative_default_pose(&self, joint_index: usize) -> &Pose {
        &self.relative_default_poses[joint_index]
    }

    pub fn relative_default_poses(&self) -> &[Pose] {
        &self.relative_default_poses
    }

    pub fn absolute_default_pose(&self, joint_index: usize) -> &Pose {
        &self.absolute_default_poses[joint_index]
    }

    pub fn absolute_default_poses(&self) -> &[Pose] {
        &self.absolute_default_poses
    }

    pub fn pre_rotation_pose(&self, joint_index: usize) -> &Pose {
        &self.pre_rotation_poses[joint_index]
    }

    pub fn post_rotation_pose(&self, joint_index: usize) -> &Pose {
        &self.post_rotation_poses[joint_index]
    }

    pub fn mirror_map(&self) -> &[usize] {
        &self.mirror_map
    }

    /// Accumulate the absolute pose of one joint from a relative pose slice.
    pub fn absolute_pose(&self, joint_index: usize, relative_poses: &[Pose]) -> Pose {
        let mut pose = relative_poses[joint_index];
        let mut index = joint_index;
        while let Some(parent) = self.parents[index] {
            pose = relative_poses[parent] * pose;
            index = parent;
        }
        pose
    }

    /// Convert a full relative pose vector to absolute, in place.
    pub fn convert_relative_to_absolute(&self, poses: &mut [Pose]) {
        // parents precede children, one forward pass suffices
        for i in 0..poses.len().min(self.num_joints()) {
            if let Some(parent) = self.parents[i] {
                poses[i] = poses[parent] * poses[i];
            }
        }
    }

    /// Convert a full absolute pose vector to relative, in place.
    pub fn convert_absolute_to_relative(&self, poses: &mut [Pose]) {
        // children first so parent absolutes are still intact
        for i in (0..poses.len().min(self.num_joints())).rev() {
            if let Some(parent) = self.parents[i] {
                poses[i] = poses[parent].inverse() * poses[i];
            }
        }
    }

    /// Mirror a relative pose vector across the sagittal plane, swapping
    /// left and right joints.
    pub fn mirror_relative_poses(&self, poses: &mut [Pose]) {
        self.convert_relative_to_absolute(poses);
        self.mirror_absolute_poses(poses);
        self.convert_absolute_to_relative(poses);
    }

    /// Mirror an absolute pose vector across the sagittal plane.
    pub fn mirror_absolute_poses(&self, poses: &mut [Pose]) {
        let original = poses.to_vec();
        for (i, pose) in poses.iter_mut().enumerate().take(self.num_joints()) {
            *pose = original[self.mirror_map[i]].mirrored();
        }
    }
}

/// Accumulate absolutes from relatives, rescale the absolute translations
/// by the geometry offset, then recompute the relatives so the
/// absolute/relative invariant holds for the normalized set.
fn normalize_pose_set(
    parents: &[Option<usize>],
    relative: &[Pose],
    geometry_offset: &Pose,
) -> (Vec<Pose>, Vec<Pose>) {
    let count = relative.len();

    let mut absolute = Vec::with_capacity(count);
    for i in 0..count {
        let pose = match parents[i] {
            Some(parent) => {
                let parent_pose: Pose = absolute[parent];
                parent_pose * relative[i]
            }
            None => relative[i],
        };
        absolute.push(pose);
    }

    for pose in &mut absolute {
        pose.trans = (*geometry_offset * *pose).trans;
        pose.scale = Vec3::ONE;
    }

    let mut relative = Vec::with_capacity(count);
    for i in 0..count {
        match parents[i] {
            Some(parent) => relative.push(absolute[parent].inverse() * absolute[i]),
            None => relative.push(absolute[i]),
        }
    }

    (relative, absolute)
}

/// Pair up joints whose names differ only by a Left/Right prefix
/// (case-insensitive prefix test, case-preserving swap).
fn build_mirror_map(names: &[String], indices_by_name: &HashMap<String, usize>) -> Vec<usize> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let lower = name.to_lowercase();
            let swapped = if lower.starts_with("left") {
                format!("Right{}", &name[4..])
            } else if lower.starts_with("right") {
                format!("Left{}", &name[5..])
            } else {
                return i;
            };
            indices_by_name.get(&swapped).copied().unwrap_or(i)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn simple_arm() -> Skeleton {
        // Hips at origin, arms out along +/-X, a head up +Y
        let joints = vec![
            JointData::new("Hips", None, Pose::IDENTITY),
            JointData::new(
                "Head",
                Some(0),
                Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(0.0, 1.5, 0.0)),
            ),
            JointData::new(
                "LeftArm",
                Some(0),
                Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(-0.5, 1.0, 0.0)),
            ),
            JointData::new(
                "RightArm",
                Some(0),
                Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(0.5, 1.0, 0.0)),
            ),
            JointData::new(
                "LeftHand",
                Some(2),
                Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(-0.4, 0.0, 0.0)),
            ),
        ];
        Skeleton::new(joints, Pose::IDENTITY).unwrap()
    }

    #[test]
    fn absolute_poses_accumulate_down_the_hierarchy() {
        let skeleton = simple_arm();
        let hand = skeleton.absolute_default_pose(4);
        assert!((hand.trans - Vec3::new(-0.9, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn absolute_equals_parent_compose_relative() {
        let skeleton = simple_arm();
        for i in 0..skeleton.num_joints() {
            if let Some(parent) = skeleton.parent_index(i) {
                let expected =
                    *skeleton.absolute_default_pose(parent) * *skeleton.relative_default_pose(i);
                let actual = skeleton.absolute_default_pose(i);
                assert!((expected.trans - actual.trans).length() < 1e-5);
            }
        }
    }

    #[test]
    fn name_lookup_is_case_sensitive() {
        let skeleton = simple_arm();
        assert_eq!(skeleton.joint_index("LeftArm"), Some(2));
        assert_eq!(skeleton.joint_index("leftarm"), None);
        assert_eq!(skeleton.joint_index("Missing"), None);
    }

    #[test]
    fn mirror_map_pairs_left_and_right() {
        let skeleton = simple_arm();
        assert_eq!(skeleton.mirror_map()[2], 3); // LeftArm <-> RightArm
        assert_eq!(skeleton.mirror_map()[3], 2);
        assert_eq!(skeleton.mirror_map()[0], 0); // Hips maps to itself
        assert_eq!(skeleton.mirror_map()[4], 4); // RightHand missing: self
    }

    #[test]
    fn geometry_offset_rescales_translations() {
        let joints = vec![
            JointData::new("Root", None, Pose::IDENTITY),
            JointData::new(
                "Bone",
                Some(0),
                Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(100.0, 0.0, 0.0)),
            ),
        ];
        // authoring units are centimeters
        let offset = Pose::new(Vec3::splat(0.01), Quat::IDENTITY, Vec3::ZERO);
        let skeleton = Skeleton::new(joints, offset).unwrap();
        assert!((skeleton.absolute_bind_pose(1).trans - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((skeleton.relative_bind_pose(1).trans - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
        assert_eq!(skeleton.absolute_bind_pose(1).scale, Vec3::ONE);
    }

    #[test]
    fn out_of_order_parent_is_rejected() {
        let joints = vec![
            JointData::new("A", Some(1), Pose::IDENTITY),
            JointData::new("B", None, Pose::IDENTITY),
        ];
        assert!(Skeleton::new(joints, Pose::IDENTITY).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let joints = vec![
            JointData::new("A", None, Pose::IDENTITY),
            JointData::new("A", Some(0), Pose::IDENTITY),
        ];
        assert!(Skeleton::new(joints, Pose::IDENTITY).is_err());
    }

    #[test]
    fn relative_absolute_round_trip() {
        let skeleton = simple_arm();
        let mut poses = skeleton.relative_default_poses().to_vec();
        skeleton.convert_relative_to_absolute(&mut poses);
        skeleton.convert_absolute_to_relative(&mut poses);
        for (a, b) in poses.iter().zip(skeleton.relative_default_poses()) {
            assert!((a.trans - b.trans).length() < 1e-5);
            assert!(a.rot.dot(b.rot).abs() > 1.0 - 1e-5);
        }
    }

    #[test]
    fn mirroring_twice_restores_poses() {
        let skeleton = simple_arm();
        let mut poses = skeleton.relative_default_poses().to_vec();
        poses[2] = Pose::from_rot_trans(
            Quat::from_axis_angle(Vec3::Z, 0.5),
            Vec3::new(-0.5, 1.0, 0.0),
        );
        let original = poses.clone();
        skeleton.mirror_relative_poses(&mut poses);
        skeleton.mirror_relative_poses(&mut poses);
        for (a, b) in poses.iter().zip(original.iter()) {
            assert!((a.trans - b.trans).length() < 1e-4);
            assert!(a.rot.dot(b.rot).abs() > 1.0 - 1e-4);
        }
    }

    #[test]
    fn children_and_depth_queries() {
        let skeleton = simple_arm();
        assert_eq!(skeleton.children_of_joint(0), vec![1, 2, 3]);
        assert_eq!(skeleton.chain_depth(4), 2);
        assert_eq!(skeleton.root_index(4), 0);
    }
}
