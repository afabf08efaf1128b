//! The polymorphic animation node and its tree plumbing.
//!
//! The node set is a closed tagged union: evaluation dispatch is a match,
//! and adding a kind is an explicit schema change. Parents own their
//! children by value; evaluation hands borrowed views downward.

use std::sync::Arc;

use wick_core::Pose;

use crate::context::EvalContext;
use crate::nodes::{
    BlendDirectional, BlendLinear, BlendLinearMove, Clip, Controller, DefaultPose,
    InverseKinematics, Manipulator, Overlay, PoleVectorConstraint, RandomSwitch, SplineIk,
    StateMachine, TwoBoneIk,
};
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

/// One node in the animation graph. Every variant evaluates to a pose
/// vector whose length equals the skeleton's joint count whenever the
/// return is meaningful; consumers must tolerate empty or identity output.
#[derive(Debug)]
pub enum AnimNode {
    Clip(Clip),
    BlendLinear(BlendLinear),
    BlendLinearMove(BlendLinearMove),
    BlendDirectional(BlendDirectional),
    Overlay(Overlay),
    Manipulator(Manipulator),
    Controller(Controller),
    DefaultPose(DefaultPose),
    StateMachine(StateMachine),
    RandomSwitch(RandomSwitch),
    InverseKinematics(InverseKinematics),
    TwoBoneIk(TwoBoneIk),
    SplineIk(SplineIk),
    PoleVectorConstraint(PoleVectorConstraint),
}

impl AnimNode {
    /// Stable ID, unique within a graph by convention.
    pub fn id(&self) -> &str {
        match self {
            AnimNode::Clip(n) => &n.id,
            AnimNode::BlendLinear(n) => &n.id,
            AnimNode::BlendLinearMove(n) => &n.id,
            AnimNode::BlendDirectional(n) => &n.id,
            AnimNode::Overlay(n) => &n.id,
            AnimNode::Manipulator(n) => &n.id,
            AnimNode::Controller(n) => &n.id,
            AnimNode::DefaultPose(n) => &n.id,
            AnimNode::StateMachine(n) => &n.id,
            AnimNode::RandomSwitch(n) => &n.id,
            AnimNode::InverseKinematics(n) => &n.id,
            AnimNode::TwoBoneIk(n) => &n.id,
            AnimNode::SplineIk(n) => &n.id,
            AnimNode::PoleVectorConstraint(n) => &n.id,
        }
    }

    pub fn children(&self) -> &[AnimNode] {
        match self {
            AnimNode::Clip(n) => &n.children,
            AnimNode::BlendLinear(n) => &n.children,
            AnimNode::BlendLinearMove(n) => &n.children,
            AnimNode::BlendDirectional(n) => &n.children,
            AnimNode::Overlay(n) => &n.children,
            AnimNode::Manipulator(n) => &n.children,
            AnimNode::Controller(n) => &n.children,
            AnimNode::DefaultPose(n) => &n.children,
            AnimNode::StateMachine(n) => &n.children,
            AnimNode::RandomSwitch(n) => &n.children,
            AnimNode::InverseKinematics(n) => &n.children,
            AnimNode::TwoBoneIk(n) => &n.children,
            AnimNode::SplineIk(n) => &n.children,
            AnimNode::PoleVectorConstraint(n) => &n.children,
        }
    }

    pub fn children_mut(&mut self) -> &mut Vec<AnimNode> {
        match self {
            AnimNode::Clip(n) => &mut n.children,
            AnimNode::BlendLinear(n) => &mut n.children,
            AnimNode::BlendLinearMove(n) => &mut n.children,
            AnimNode::BlendDirectional(n) => &mut n.children,
            AnimNode::Overlay(n) => &mut n.children,
            AnimNode::Manipulator(n) => &mut n.children,
            AnimNode::Controller(n) => &mut n.children,
            AnimNode::DefaultPose(n) => &mut n.children,
            AnimNode::StateMachine(n) => &mut n.children,
            AnimNode::RandomSwitch(n) => &mut n.children,
            AnimNode::InverseKinematics(n) => &mut n.children,
            AnimNode::TwoBoneIk(n) => &mut n.children,
            AnimNode::SplineIk(n) => &mut n.children,
            AnimNode::PoleVectorConstraint(n) => &mut n.children,
        }
    }

    pub fn add_child(&mut self, child: AnimNode) {
        self.children_mut().push(child);
    }

    /// Produce this frame's pose vector. The borrow is valid until the
    /// node's next `evaluate` call.
    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        match self {
            AnimNode::Clip(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::BlendLinear(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::BlendLinearMove(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::BlendDirectional(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::Overlay(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::Manipulator(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::Controller(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::DefaultPose(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::StateMachine(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::RandomSwitch(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::InverseKinematics(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::TwoBoneIk(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::SplineIk(n) => n.evaluate(vars, ctx, dt, triggers_out),
            AnimNode::PoleVectorConstraint(n) => n.evaluate(vars, ctx, dt, triggers_out),
        }
    }

    /// Like `evaluate`, but the caller supplies the poses this node is
    /// layered on top of. Nodes without an overlay behavior ignore the
    /// under poses and evaluate normally.
    pub fn overlay(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
        under_poses: &[Pose],
    ) -> &[Pose] {
        match self {
            AnimNode::Manipulator(n) => n.overlay(vars, ctx, dt, triggers_out, under_poses),
            AnimNode::Controller(n) => n.overlay(vars, ctx, dt, triggers_out, under_poses),
            AnimNode::InverseKinematics(n) => n.overlay(vars, ctx, dt, triggers_out, under_poses),
            _ => self.evaluate(vars, ctx, dt, triggers_out),
        }
    }

    /// Pair this graph with a skeleton; each node caches what it needs and
    /// the call recurses into the children.
    pub fn set_skeleton(&mut self, skeleton: &Arc<Skeleton>) {
        self.set_skeleton_internal(skeleton);
        for child in self.children_mut() {
            child.set_skeleton(skeleton);
        }
    }

    fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        match self {
            AnimNode::Clip(n) => n.set_skeleton_internal(skeleton),
            AnimNode::BlendLinear(n) => n.set_skeleton_internal(skeleton),
            AnimNode::BlendLinearMove(n) => n.set_skeleton_internal(skeleton),
            AnimNode::BlendDirectional(n) => n.set_skeleton_internal(skeleton),
            AnimNode::Overlay(n) => n.set_skeleton_internal(skeleton),
            AnimNode::Manipulator(n) => n.set_skeleton_internal(skeleton),
            AnimNode::Controller(n) => n.set_skeleton_internal(skeleton),
            AnimNode::DefaultPose(n) => n.set_skeleton_internal(skeleton),
            AnimNode::StateMachine(n) => n.set_skeleton_internal(skeleton),
            AnimNode::RandomSwitch(n) => n.set_skeleton_internal(skeleton),
            AnimNode::InverseKinematics(n) => n.set_skeleton_internal(skeleton),
            AnimNode::TwoBoneIk(n) => n.set_skeleton_internal(skeleton),
            AnimNode::SplineIk(n) => n.set_skeleton_internal(skeleton),
            AnimNode::PoleVectorConstraint(n) => n.set_skeleton_internal(skeleton),
        }
    }

    /// Seek the playback-carrying nodes to `frame` (relative to their
    /// start), recursively.
    pub fn set_current_frame(&mut self, frame: f32) {
        self.set_current_frame_internal(frame);
        for child in self.children_mut() {
            child.set_current_frame(frame);
        }
    }

    fn set_current_frame_internal(&mut self, frame: f32) {
        match self {
            AnimNode::Clip(n) => n.set_current_frame_internal(frame),
            AnimNode::BlendLinear(n) => n.set_current_frame_internal(frame),
            AnimNode::BlendLinearMove(n) => n.set_current_frame_internal(frame),
            _ => {}
        }
    }

    /// Mark a node as the active branch of its parent; only random
    /// switches care (they re-roll their state on activation).
    pub fn set_active(&mut self, active: bool) {
        if let AnimNode::RandomSwitch(n) = self {
            n.set_active_internal(active);
        }
    }

    /// Depth-first pre-order walk; return false from the visitor to prune
    /// a subtree.
    pub fn traverse<'a>(&'a self, visitor: &mut impl FnMut(&'a AnimNode) -> bool) {
        if visitor(self) {
            for child in self.children() {
                child.traverse(visitor);
            }
        }
    }

    pub fn find_by_name(&self, id: &str) -> Option<&AnimNode> {
        let mut found = None;
        self.traverse(&mut |node| {
            if found.is_some() {
                return false;
            }
            if node.id() == id {
                found = Some(node);
                return false;
            }
            true
        });
        found
    }

    pub fn as_clip(&self) -> Option<&Clip> {
        match self {
            AnimNode::Clip(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_clip_mut(&mut self) -> Option<&mut Clip> {
        match self {
            AnimNode::Clip(n) => Some(n),
            _ => None,
        }
    }
}
