//! Short parent-to-tip joint chain used by the IK nodes for snapshotting
//! and in/out blending.

use std::sync::Arc;

use wick_core::Pose;

use crate::skeleton::Skeleton;

/// Maximum chain depth; chains are stack-allocated so the IK hot loop
/// never touches the allocator.
pub const MAX_CHAIN_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy)]
struct ChainElem {
    relative_pose: Pose,
    absolute_pose: Pose,
    joint_index: usize,
    dirty: bool,
}

impl Default for ChainElem {
    fn default() -> Self {
        Self {
            relative_pose: Pose::IDENTITY,
            absolute_pose: Pose::IDENTITY,
            joint_index: usize::MAX,
            dirty: true,
        }
    }
}

/// A fixed-capacity chain of joints from a tip up to its topmost ancestor.
///
/// Position 0 is the tip; position `len - 1` is the base. Absolute poses
/// are rebuilt lazily from the base down, only where dirty.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimChain {
    chain: [ChainElem; MAX_CHAIN_DEPTH],
    top: usize,
}

impl AnimChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk the skeleton parents from `tip_index` to the root, copying
    /// relative poses into the chain, then build the absolutes. Returns
    /// false (leaving the chain unusable) if the chain would exceed
    /// [`MAX_CHAIN_DEPTH`].
    pub fn build_from_relative_poses(
        &mut self,
        skeleton: &Arc<Skeleton>,
        relative_poses: &[Pose],
        tip_index: usize,
    ) -> bool {
        self.top = 0;
        let mut joint_index = Some(tip_index);
        while let Some(index) = joint_index {
            if self.top >= MAX_CHAIN_DEPTH {
                return false;
            }
            self.chain[self.top] = ChainElem {
                relative_pose: relative_poses[index],
                absolute_pose: Pose::IDENTITY,
                joint_index: index,
                dirty: true,
            };
            self.top += 1;
            joint_index = skeleton.parent_index(index);
        }
        self.build_dirty_absolute_poses();
        true
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Identity if the joint is not part of this chain.
    pub fn absolute_pose(&self, joint_index: usize) -> Pose {
        for elem in &self.chain[..self.top] {
            if elem.joint_index == joint_index {
                return elem.absolute_pose;
            }
        }
        Pose::IDENTITY
    }

    /// Replace one joint's relative pose, marking it and everything below
    /// it dirty. Returns false if the joint is not part of this chain.
    pub fn set_relative_pose(&mut self, joint_index: usize, relative_pose: Pose) -> bool {
        let mut found = false;
        for i in (0..self.top).rev() {
            if self.chain[i].joint_index == joint_index {
                self.chain[i].relative_pose = relative_pose;
                found = true;
            }
            // every descendant absolute is now stale
            if found {
                self.chain[i].dirty = true;
            }
        }
        found
    }

    /// Rebuild stale absolute poses from the base toward the tip.
    pub fn build_dirty_absolute_poses(&mut self) {
        if self.top == 0 {
            return;
        }
        // base of the chain: relative and absolute coincide
        let base = self.top - 1;
        if self.chain[base].dirty {
            self.chain[base].absolute_pose = self.chain[base].relative_pose;
            self.chain[base].dirty = false;
        }
        for i in (0..base).rev() {
            if self.chain[i].dirty {
                self.chain[i].absolute_pose =
                    self.chain[i + 1].absolute_pose * self.chain[i].relative_pose;
                self.chain[i].dirty = false;
            }
        }
    }

    /// Blend relative poses from `src` toward this chain's: `alpha` of 0
    /// yields `src`, 1 keeps this chain. Chains must have equal length;
    /// absolutes become stale.
    pub fn blend(&mut self, src: &AnimChain, alpha: f32) {
        if src.top != self.top {
            return;
        }
        for i in 0..self.top {
            self.chain[i].relative_pose = src.chain[i]
                .relative_pose
                .blend(&self.chain[i].relative_pose, alpha);
            self.chain[i].dirty = true;
        }
    }

    /// Scatter the chain's relative poses back into a full pose vector.
    pub fn output_relative_poses(&self, relative_poses: &mut [Pose]) {
        for elem in &self.chain[..self.top] {
            relative_poses[elem.joint_index] = elem.relative_pose;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::JointData;
    use glam::{Quat, Vec3};

    fn four_joint_skeleton() -> Arc<Skeleton> {
        let step = Pose::from_rot_trans(Quat::IDENTITY, Vec3::X);
        let joints = vec![
            JointData::new("A", None, Pose::IDENTITY),
            JointData::new("B", Some(0), step),
            JointData::new("C", Some(1), step),
            JointData::new("D", Some(2), step),
        ];
        Arc::new(Skeleton::new(joints, Pose::IDENTITY).unwrap())
    }

    #[test]
    fn chain_runs_tip_to_base() {
        let skeleton = four_joint_skeleton();
        let poses = skeleton.relative_default_poses().to_vec();
        let mut chain = AnimChain::new();
        assert!(chain.build_from_relative_poses(&skeleton, &poses, 3));
        assert_eq!(chain.len(), 4);
        // absolute positions accumulate base to tip
        assert!((chain.absolute_pose(3).trans - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);
        assert!((chain.absolute_pose(0).trans - Vec3::ZERO).length() < 1e-5);
    }

    #[test]
    fn set_relative_pose_dirties_descendants_only() {
        let skeleton = four_joint_skeleton();
        let poses = skeleton.relative_default_poses().to_vec();
        let mut chain = AnimChain::new();
        chain.build_from_relative_poses(&skeleton, &poses, 3);

        // rotate B a quarter turn about Z: C and D should move
        let rot = Quat::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_2);
        assert!(chain.set_relative_pose(1, Pose::from_rot_trans(rot, Vec3::X)));
        chain.build_dirty_absolute_poses();
        assert!((chain.absolute_pose(3).trans - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-4);
        // the base did not move
        assert!((chain.absolute_pose(0).trans - Vec3::ZERO).length() < 1e-5);
    }

    #[test]
    fn set_relative_pose_rejects_foreign_joint() {
        let skeleton = four_joint_skeleton();
        let poses = skeleton.relative_default_poses().to_vec();
        let mut chain = AnimChain::new();
        chain.build_from_relative_poses(&skeleton, &poses, 2);
        assert!(!chain.set_relative_pose(3, Pose::IDENTITY));
    }

    #[test]
    fn blend_interpolates_relative_poses() {
        let skeleton = four_joint_skeleton();
        let poses = skeleton.relative_default_poses().to_vec();
        let mut a = AnimChain::new();
        a.build_from_relative_poses(&skeleton, &poses, 3);

        let mut moved = poses.clone();
        moved[3].trans = Vec3::new(3.0, 0.0, 0.0);
        let mut b = AnimChain::new();
        b.build_from_relative_poses(&skeleton, &moved, 3);

        a.blend(&b, 0.5);
        let mut out = poses.clone();
        a.output_relative_poses(&mut out);
        assert!((out[3].trans - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn blend_requires_equal_lengths() {
        let skeleton = four_joint_skeleton();
        let poses = skeleton.relative_default_poses().to_vec();
        let mut a = AnimChain::new();
        a.build_from_relative_poses(&skeleton, &poses, 3);
        let mut b = AnimChain::new();
        b.build_from_relative_poses(&skeleton, &poses, 2);
        let before = a.absolute_pose(3);
        a.blend(&b, 0.5); // must be a no-op
        assert!((a.absolute_pose(3).trans - before.trans).length() < 1e-6);
    }

    #[test]
    fn output_writes_only_chain_joints() {
        let skeleton = four_joint_skeleton();
        let poses = skeleton.relative_default_poses().to_vec();
        let mut chain = AnimChain::new();
        chain.build_from_relative_poses(&skeleton, &poses, 2); // A..C only

        let marker = Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(9.0, 9.0, 9.0));
        let mut out = vec![marker; 4];
        chain.output_relative_poses(&mut out);
        assert!((out[3].trans - marker.trans).length() < 1e-6); // untouched
        assert!((out[2].trans - Vec3::X).length() < 1e-6);
    }
}
