//! State machine for transitioning between child subtrees with smooth
//! interpolation.

use std::sync::Arc;

use wick_core::{blend_poses, Pose};

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::util::FRAMES_PER_SECOND;
use crate::variables::VariantMap;

/// How the pose interpolation between the outgoing and incoming states is
/// evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpType {
    /// Both endpoints are captured at switch time; the incoming child is
    /// seeked to its interp target and evaluated once with dt = 0.
    #[default]
    SnapshotBoth,
    /// Only the outgoing snapshot is stored; the incoming child is
    /// evaluated live each frame, advancing from `interp_target -
    /// duration`. Useful when interpolating into a blend whose factor is
    /// not known at switch time.
    SnapshotPrev,
    /// Both endpoints are evaluated live each frame.
    EvaluateBoth,
}

impl InterpType {
    pub fn from_int(value: i32) -> Self {
        match value {
            1 => InterpType::SnapshotPrev,
            2 => InterpType::EvaluateBoth,
            _ => InterpType::SnapshotBoth,
        }
    }

    pub fn to_int(self) -> i32 {
        match self {
            InterpType::SnapshotBoth => 0,
            InterpType::SnapshotPrev => 1,
            InterpType::EvaluateBoth => 2,
        }
    }
}

/// A transition out of a state: the first one whose boolean variable reads
/// true wins, in declaration order.
#[derive(Debug, Clone)]
pub struct Transition {
    pub var: String,
    /// Index of the target state.
    pub target: usize,
}

/// One state: a child subtree plus the parameters of the interpolation
/// used when entering it. `interp_target` and `interp_duration` are in
/// frames (1/30 s units).
#[derive(Debug, Clone)]
pub struct State {
    pub id: String,
    pub child_index: usize,
    pub interp_target: f32,
    pub interp_duration: f32,
    pub interp_type: InterpType,
    pub transitions: Vec<Transition>,
    pub interp_target_var: String,
    pub interp_duration_var: String,
    pub interp_type_var: String,
}

impl State {
    pub fn new(
        id: impl Into<String>,
        child_index: usize,
        interp_target: f32,
        interp_duration: f32,
        interp_type: InterpType,
    ) -> Self {
        Self {
            id: id.into(),
            child_index,
            interp_target,
            interp_duration,
            interp_type,
            transitions: Vec::new(),
            interp_target_var: String::new(),
            interp_duration_var: String::new(),
            interp_type_var: String::new(),
        }
    }

    pub fn add_transition(&mut self, var: impl Into<String>, target: usize) {
        self.transitions.push(Transition {
            var: var.into(),
            target,
        });
    }
}

#[derive(Debug)]
pub struct StateMachine {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    #[allow(dead_code)]
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,

    states: Vec<State>,
    current_state: usize,
    previous_state: usize,
    current_state_var: String,

    // interpolation state
    during_interp: bool,
    active_interp_type: InterpType,
    alpha: f32,
    alpha_vel: f32,
    prev_poses: Vec<Pose>,
    next_poses: Vec<Pose>,
    warned_bad_state_var: bool,
}

impl StateMachine {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            states: Vec::new(),
            current_state: 0,
            previous_state: 0,
            current_state_var: String::new(),
            during_interp: false,
            active_interp_type: InterpType::SnapshotBoth,
            alpha: 0.0,
            alpha_vel: 0.0,
            prev_poses: Vec::new(),
            next_poses: Vec::new(),
            warned_bad_state_var: false,
        }
    }

    pub fn add_state(&mut self, state: State) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    pub fn set_current_state(&mut self, state_index: usize) {
        self.current_state = state_index;
        self.previous_state = state_index;
    }

    pub fn set_current_state_var(&mut self, var: impl Into<String>) {
        self.current_state_var = var.into();
    }

    pub fn current_state_id(&self) -> &str {
        &self.states[self.current_state].id
    }

    pub fn is_interpolating(&self) -> bool {
        self.during_interp
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        if self.states.is_empty() {
            return &self.poses;
        }

        // a directly set state variable overrides the transitions
        let desired_id = vars.lookup_string(&self.current_state_var, self.current_state_id());
        if desired_id != self.current_state_id() {
            match self.states.iter().position(|state| state.id == desired_id) {
                Some(index) => self.switch_state(vars, ctx, index),
                None => {
                    if !self.warned_bad_state_var {
                        log::warn!(
                            "StateMachine {:?} could not find state {:?} referenced by {:?}",
                            self.id,
                            desired_id,
                            self.current_state_var
                        );
                        self.warned_bad_state_var = true;
                    }
                }
            }
        }

        // first transition whose variable reads true wins
        if let Some(target) = self.evaluate_transitions(vars) {
            self.switch_state(vars, ctx, target);
        }

        self.blend_or_evaluate(vars, ctx, dt, triggers_out);
        &self.poses
    }

    fn evaluate_transitions(&self, vars: &VariantMap) -> Option<usize> {
        for transition in &self.states[self.current_state].transitions {
            if vars.lookup_bool(&transition.var, false) {
                if transition.target != self.current_state {
                    return Some(transition.target);
                }
                return None;
            }
        }
        None
    }

    fn switch_state(&mut self, vars: &VariantMap, ctx: &EvalContext, desired: usize) {
        let state = &self.states[desired];
        let duration = vars
            .lookup_float(&state.interp_duration_var, state.interp_duration)
            .max(0.001);
        let interp_target = vars.lookup_float(&state.interp_target_var, state.interp_target);
        let interp_type = InterpType::from_int(
            vars.lookup_int(&state.interp_type_var, state.interp_type.to_int()),
        );
        let next_child = state.child_index;

        log::debug!(
            "StateMachine {:?} switching {:?} -> {:?}",
            self.id,
            self.current_state_id(),
            self.states[desired].id
        );

        let interp_was_active = self.during_interp;
        self.during_interp = true;
        self.alpha = 0.0;
        self.alpha_vel = FRAMES_PER_SECOND / duration;
        self.active_interp_type = interp_type;

        match interp_type {
            InterpType::SnapshotBoth => {
                self.prev_poses = self.poses.clone();
                self.children[next_child].set_current_frame(interp_target);
                // dt of zero cannot fire triggers
                let mut scratch = VariantMap::new();
                self.next_poses = self.children[next_child]
                    .evaluate(vars, ctx, 0.0, &mut scratch)
                    .to_vec();
            }
            InterpType::SnapshotPrev => {
                self.prev_poses = self.poses.clone();
                self.children[next_child].set_current_frame(interp_target - duration);
            }
            InterpType::EvaluateBoth => {
                self.children[next_child].set_current_frame(interp_target - duration);
                if interp_was_active {
                    // a second switch during an active interp freezes the
                    // old result and demotes to SnapshotPrev
                    self.prev_poses = self.poses.clone();
                    self.active_interp_type = InterpType::SnapshotPrev;
                }
            }
        }

        self.previous_state = self.current_state;
        self.current_state = desired;
    }

    fn blend_or_evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) {
        let current_child = self.states[self.current_state].child_index;
        let previous_child = self.states[self.previous_state].child_index;

        if self.during_interp {
            self.alpha += self.alpha_vel * dt;
            if self.alpha < 1.0 {
                match self.active_interp_type {
                    InterpType::SnapshotBoth => {}
                    InterpType::SnapshotPrev => {
                        self.next_poses = self.children[current_child]
                            .evaluate(vars, ctx, dt, triggers_out)
                            .to_vec();
                    }
                    InterpType::EvaluateBoth => {
                        self.prev_poses = self.children[previous_child]
                            .evaluate(vars, ctx, dt, triggers_out)
                            .to_vec();
                        self.next_poses = self.children[current_child]
                            .evaluate(vars, ctx, dt, triggers_out)
                            .to_vec();
                    }
                }
                if !self.prev_poses.is_empty() && self.prev_poses.len() == self.next_poses.len() {
                    self.poses.resize(self.prev_poses.len(), Pose::IDENTITY);
                    blend_poses(&self.prev_poses, &self.next_poses, self.alpha, &mut self.poses);
                }
            } else {
                self.during_interp = false;
                self.prev_poses.clear();
                self.next_poses.clear();
            }
        }
        if !self.during_interp {
            self.poses = self.children[current_child]
                .evaluate(vars, ctx, dt, triggers_out)
                .to_vec();
        }
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AnimationCache, AnimationData, AnimationFrame};
    use crate::nodes::Clip;
    use crate::skeleton::JointData;
    use glam::{Quat, Vec3};

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![JointData::new("Root", None, Pose::IDENTITY)],
                Pose::IDENTITY,
            )
            .unwrap(),
        )
    }

    fn constant_clip(id: &str, x: f32) -> AnimNode {
        let cache = Arc::new(AnimationCache::new());
        cache.insert(
            "anim",
            AnimationData::new(
                vec!["Root".into()],
                vec![
                    AnimationFrame {
                        translations: vec![Vec3::new(x, 0.0, 0.0)],
                        rotations: vec![Quat::IDENTITY],
                    };
                    31
                ],
            ),
        );
        let mut clip = Clip::new(id, "anim", 0.0, 30.0, 1.0, true, false, cache);
        clip.set_skeleton_internal(&skeleton());
        AnimNode::Clip(clip)
    }

    fn machine_with_two_states(interp_type: InterpType) -> StateMachine {
        let mut machine = StateMachine::new("machine");
        machine.children.push(constant_clip("idleClip", 0.0));
        machine.children.push(constant_clip("walkClip", 10.0));
        let mut idle = State::new("idle", 0, 0.0, 6.0, interp_type);
        idle.add_transition("toWalk", 1);
        machine.add_state(idle);
        machine.add_state(State::new("walk", 1, 0.0, 6.0, interp_type));
        machine.set_current_state(0);
        machine.set_current_state_var("machineState");
        machine
    }

    #[test]
    fn transition_variable_switches_state() {
        let mut machine = machine_with_two_states(InterpType::SnapshotBoth);
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();

        let mut vars = VariantMap::new();
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert_eq!(machine.current_state_id(), "idle");

        vars.set("toWalk", true);
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert_eq!(machine.current_state_id(), "walk");
        assert!(machine.is_interpolating());
    }

    #[test]
    fn state_var_overrides_transitions() {
        let mut machine = machine_with_two_states(InterpType::SnapshotBoth);
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut vars = VariantMap::new();
        vars.set("machineState", "walk");
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert_eq!(machine.current_state_id(), "walk");
    }

    #[test]
    fn snapshot_both_interpolates_over_duration() {
        let mut machine = machine_with_two_states(InterpType::SnapshotBoth);
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut vars = VariantMap::new();

        // settle in idle: poses at x = 0
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert!((machine.poses[0].trans.x - 0.0).abs() < 1e-4);

        // switch; duration 6 frames = 0.2 s
        vars.set("toWalk", true);
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        // one frame in: alpha = 1/6
        let expected = 10.0 / 6.0;
        assert!(
            (machine.poses[0].trans.x - expected).abs() < 1e-3,
            "got {}",
            machine.poses[0].trans.x
        );
        vars.unset("toWalk");

        // after the full duration the live walk pose is reported
        for _ in 0..6 {
            machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        }
        assert!(!machine.is_interpolating());
        assert!((machine.poses[0].trans.x - 10.0).abs() < 1e-3);
    }

    #[test]
    fn interp_duration_is_in_thirtieths_of_a_second() {
        let mut machine = machine_with_two_states(InterpType::SnapshotBoth);
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut vars = VariantMap::new();
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        vars.set("machineState", "walk");
        machine.evaluate(&vars, &ctx, 0.0, &mut triggers);
        vars.unset("machineState");

        // 6 frames at 30 fps = 0.2 seconds; after 0.1 s alpha is 0.5
        machine.evaluate(&vars, &ctx, 0.1, &mut triggers);
        assert!((machine.poses[0].trans.x - 5.0).abs() < 1e-3);
        // past the end the interp is done
        machine.evaluate(&vars, &ctx, 0.11, &mut triggers);
        assert!(!machine.is_interpolating());
    }

    #[test]
    fn evaluate_both_demotes_on_double_switch() {
        let mut machine = machine_with_two_states(InterpType::EvaluateBoth);
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut vars = VariantMap::new();
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);

        vars.set("machineState", "walk");
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert_eq!(machine.active_interp_type, InterpType::EvaluateBoth);

        // switch back mid-interp: the mode demotes so the old result is
        // frozen instead of re-evaluated
        vars.set("machineState", "idle");
        machine.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert_eq!(machine.active_interp_type, InterpType::SnapshotPrev);
    }
}
