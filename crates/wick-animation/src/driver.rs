//! Per-frame entry point: variables in, one relative pose per joint out.

use std::collections::HashSet;
use std::sync::Arc;

use glam::Mat4;
use wick_core::Pose;

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

/// Owns a graph's root node, its skeleton, the variable map and the
/// trigger sink, and runs one cooperative step per frame.
///
/// Triggers emitted during a step are exposed through [`triggers`] and fed
/// back into the variable map at the start of the next step, so that
/// transitions can observe them as boolean variables.
///
/// [`triggers`]: Self::triggers
#[derive(Debug)]
pub struct GraphDriver {
    skeleton: Arc<Skeleton>,
    root: Option<AnimNode>,
    vars: VariantMap,
    triggers_out: VariantMap,
    geometry_to_rig: Mat4,
    out_poses: Vec<Pose>,
}

impl GraphDriver {
    pub fn new(skeleton: Arc<Skeleton>) -> Self {
        let out_poses = skeleton.relative_default_poses().to_vec();
        Self {
            skeleton,
            root: None,
            vars: VariantMap::new(),
            triggers_out: VariantMap::new(),
            geometry_to_rig: Mat4::IDENTITY,
            out_poses,
        }
    }

    /// Install the graph; the skeleton is pushed through the whole tree.
    pub fn set_root(&mut self, mut root: AnimNode) {
        root.set_skeleton(&self.skeleton);
        self.root = Some(root);
    }

    pub fn clear_root(&mut self) {
        self.root = None;
    }

    pub fn root(&self) -> Option<&AnimNode> {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> Option<&mut AnimNode> {
        self.root.as_mut()
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    /// Host-writable parameters for the coming frame.
    pub fn vars_mut(&mut self) -> &mut VariantMap {
        &mut self.vars
    }

    pub fn vars(&self) -> &VariantMap {
        &self.vars
    }

    pub fn set_geometry_to_rig(&mut self, geometry_to_rig: Mat4) {
        self.geometry_to_rig = geometry_to_rig;
    }

    /// Run one frame. `dt` drives integration and interpolation; `now_us`
    /// is the host's monotonic clock, used only for the CCD time budget.
    ///
    /// Returns one relative pose per skeleton joint. With no root (or a
    /// root producing a mis-sized vector) the skeleton's relative default
    /// poses are returned.
    pub fn step(&mut self, dt: f32, now_us: u64) -> &[Pose] {
        // triggers from the previous frame become visible as booleans now
        let previous_triggers = self.triggers_out.take_triggers();
        self.vars.clear_triggers();
        for trigger in previous_triggers {
            self.vars.set_trigger(trigger);
        }

        let ctx = EvalContext::new(self.geometry_to_rig, now_us);

        let num_joints = self.skeleton.num_joints();
        match &mut self.root {
            Some(root) => {
                let poses = root.evaluate(&self.vars, &ctx, dt, &mut self.triggers_out);
                if poses.len() == num_joints {
                    self.out_poses.clear();
                    self.out_poses.extend_from_slice(poses);
                } else {
                    // a graph that failed to produce a meaningful pose
                    // vector falls back to the default pose
                    self.out_poses.clear();
                    self.out_poses
                        .extend_from_slice(self.skeleton.relative_default_poses());
                }
            }
            None => {
                self.out_poses.clear();
                self.out_poses
                    .extend_from_slice(self.skeleton.relative_default_poses());
            }
        }
        &self.out_poses
    }

    /// Triggers accumulated during the most recent step.
    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers_out.triggers()
    }

    /// Drain the accumulated triggers (they would otherwise be recycled
    /// into the variable map on the next step).
    pub fn take_triggers(&mut self) -> HashSet<String> {
        self.triggers_out.take_triggers()
    }
}
