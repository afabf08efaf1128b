//! State machine with priority-weighted random selection and idle-timer
//! driven transitions (fidget animations, talk variants).

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wick_core::{blend_poses, ease, EasingType, Pose};

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::nodes::state_machine::InterpType;
use crate::skeleton::Skeleton;
use crate::util::FRAMES_PER_SECOND;
use crate::variables::VariantMap;

/// A transition out of a random-switch state, evaluated in declaration
/// order; used for temporary movements layered on the random cycle.
#[derive(Debug, Clone)]
pub struct RandomTransition {
    pub var: String,
    pub target: usize,
}

/// One selectable state. `priority` weights the random draw (0 removes the
/// state from random selection); `resume` re-enters the state at its
/// remembered frame instead of seeking to the interp target.
#[derive(Debug, Clone)]
pub struct RandomSwitchState {
    pub id: String,
    pub child_index: usize,
    pub interp_target: f32,
    pub interp_duration: f32,
    pub interp_type: InterpType,
    pub easing: EasingType,
    pub priority: f32,
    pub resume: bool,
    pub transitions: Vec<RandomTransition>,
    pub interp_target_var: String,
    pub interp_duration_var: String,
    pub interp_type_var: String,
}

impl RandomSwitchState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        child_index: usize,
        interp_target: f32,
        interp_duration: f32,
        interp_type: InterpType,
        easing: EasingType,
        priority: f32,
        resume: bool,
    ) -> Self {
        Self {
            id: id.into(),
            child_index,
            interp_target,
            interp_duration,
            interp_type,
            easing,
            priority,
            resume,
            transitions: Vec::new(),
            interp_target_var: String::new(),
            interp_duration_var: String::new(),
            interp_type_var: String::new(),
        }
    }

    pub fn add_transition(&mut self, var: impl Into<String>, target: usize) {
        self.transitions.push(RandomTransition {
            var: var.into(),
            target,
        });
    }
}

#[derive(Debug)]
pub struct RandomSwitch {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    #[allow(dead_code)]
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,

    states: Vec<RandomSwitchState>,
    current_state: usize,
    previous_state: usize,
    last_played_state: String,

    current_state_var: String,
    trigger_random_switch_var: String,
    transition_var: String,

    trigger_time_min: f32,
    trigger_time_max: f32,
    trigger_time: f32,
    random_switch_time_min: f32,
    random_switch_time_max: f32,
    random_switch_time: f32,

    // pick a fresh random state on the next evaluate (set on activation)
    trigger_new_random_state: bool,

    // interpolation state
    during_interp: bool,
    active_interp_type: InterpType,
    easing: EasingType,
    alpha: f32,
    alpha_vel: f32,
    prev_poses: Vec<Pose>,
    next_poses: Vec<Pose>,

    rng: StdRng,
}

impl RandomSwitch {
    /// `seed` makes the node deterministic; hosts pass entropy, tests a
    /// fixed value.
    pub fn new(id: impl Into<String>, seed: u64) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            states: Vec::new(),
            current_state: 0,
            previous_state: 0,
            last_played_state: String::new(),
            current_state_var: String::new(),
            trigger_random_switch_var: String::new(),
            transition_var: String::new(),
            trigger_time_min: 10.0,
            trigger_time_max: 20.0,
            trigger_time: 0.0,
            random_switch_time_min: 10.0,
            random_switch_time_max: 20.0,
            random_switch_time: 0.0,
            trigger_new_random_state: false,
            during_interp: false,
            active_interp_type: InterpType::SnapshotPrev,
            easing: EasingType::Linear,
            alpha: 0.0,
            alpha_vel: 0.0,
            prev_poses: Vec::new(),
            next_poses: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn add_state(&mut self, state: RandomSwitchState) -> usize {
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

    pub fn set_trigger_random_switch_var(&mut self, var: impl Into<String>) {
        self.trigger_random_switch_var = var.into();
    }

    pub fn set_transition_var(&mut self, var: impl Into<String>) {
        self.transition_var = var.into();
    }

    pub fn set_trigger_times(&mut self, min: f32, max: f32) {
        self.trigger_time_min = min;
        self.trigger_time_max = max;
    }

    pub fn set_random_switch_times(&mut self, min: f32, max: f32) {
        self.random_switch_time_min = min;
        self.random_switch_time_max = max;
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

        if self.trigger_new_random_state || vars.lookup_bool(&self.trigger_random_switch_var, false)
        {
            // consider states with a priority, excluding the one played last
            let mut candidates = Vec::with_capacity(self.states.len());
            let mut total_priority = 0.0;
            let mut current_state_has_priority = false;
            for (index, state) in self.states.iter().enumerate() {
                if state.priority > 0.0 {
                    let is_repeat = self.children[state.child_index].id() == self.last_played_state;
                    if !is_repeat {
                        candidates.push(index);
                        total_priority += state.priority;
                    }
                    current_state_has_priority =
                        current_state_has_priority || index == self.current_state;
                }
            }

            // walk the cumulative normalized priorities with one draw
            let mut desired = self.current_state;
            let dice: f32 = self.rng.random_range(0.0..1.0);
            let mut lower_bound = 0.0;
            for &index in &candidates {
                let upper_bound = lower_bound + self.states[index].priority / total_priority;
                if dice >= lower_bound && dice < upper_bound {
                    desired = index;
                    break;
                }
                lower_bound = upper_bound;
            }

            if self.trigger_new_random_state {
                self.switch_random_state(vars, ctx, desired, false);
                self.trigger_new_random_state = false;
            } else if current_state_has_priority {
                // a random switch fired; make sure we are not cutting off a
                // previously triggered transition
                if desired != self.current_state {
                    self.switch_random_state(vars, ctx, desired, true);
                } else {
                    self.during_interp = false;
                }
            }
            self.trigger_time = self.draw_trigger_time();
            self.random_switch_time = self.draw_random_switch_time();
        } else {
            // a temporary movement requested through a transition variable
            if let Some(target) = self.evaluate_transitions(vars) {
                self.switch_random_state(vars, ctx, target, true);
                self.trigger_time = self.draw_trigger_time();
                self.random_switch_time = self.draw_random_switch_time();
            }
        }

        self.trigger_time -= dt;
        if self.trigger_time < 0.0 && self.trigger_time_min > 0.0 && self.trigger_time_max > 0.0 {
            self.trigger_time = self.draw_trigger_time();
            if !self.transition_var.is_empty() {
                triggers_out.set_trigger(self.transition_var.clone());
            }
        }

        self.random_switch_time -= dt;
        if self.random_switch_time < 0.0
            && self.random_switch_time_min > 0.0
            && self.random_switch_time_max > 0.0
        {
            self.random_switch_time = self.draw_random_switch_time();
            // restart the trigger timer as well
            self.trigger_time = self.draw_trigger_time();
            if !self.trigger_random_switch_var.is_empty() {
                triggers_out.set_trigger(self.trigger_random_switch_var.clone());
            }
        }

        self.blend_or_evaluate(vars, ctx, dt, triggers_out);
        &self.poses
    }

    fn draw_trigger_time(&mut self) -> f32 {
        if self.trigger_time_max > self.trigger_time_min {
            self.rng
                .random_range(self.trigger_time_min..self.trigger_time_max)
        } else {
            self.trigger_time_min
        }
    }

    fn draw_random_switch_time(&mut self) -> f32 {
        if self.random_switch_time_max > self.random_switch_time_min {
            self.rng
                .random_range(self.random_switch_time_min..self.random_switch_time_max)
        } else {
            self.random_switch_time_min
        }
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

    fn switch_random_state(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        desired: usize,
        should_interp: bool,
    ) {
        let state = self.states[desired].clone();
        let next_child = state.child_index;
        let prev_child = self.states[self.current_state].child_index;

        self.children[prev_child].set_active(false);
        self.children[next_child].set_active(true);
        self.last_played_state = self.children[next_child].id().to_string();

        if should_interp {
            let interp_was_active = self.during_interp;
            self.during_interp = true;

            let duration = vars
                .lookup_float(&state.interp_duration_var, state.interp_duration)
                .max(0.001);
            let interp_target = vars.lookup_float(&state.interp_target_var, state.interp_target);
            self.alpha = 0.0;
            self.alpha_vel = FRAMES_PER_SECOND / duration;
            self.active_interp_type = InterpType::from_int(
                vars.lookup_int(&state.interp_type_var, state.interp_type.to_int()),
            );
            self.easing = state.easing;

            match self.active_interp_type {
                InterpType::SnapshotBoth => {
                    self.prev_poses = self.poses.clone();
                    if !state.resume {
                        self.children[next_child].set_current_frame(interp_target);
                    }
                    let mut scratch = VariantMap::new();
                    self.next_poses = self.children[next_child]
                        .evaluate(vars, ctx, 0.0, &mut scratch)
                        .to_vec();
                }
                InterpType::SnapshotPrev => {
                    self.prev_poses = self.poses.clone();
                    if !state.resume {
                        self.children[next_child].set_current_frame(interp_target - duration);
                    }
                }
                InterpType::EvaluateBoth => {
                    self.children[next_child].set_current_frame(interp_target - duration);
                    if interp_was_active {
                        self.prev_poses = self.poses.clone();
                        self.active_interp_type = InterpType::SnapshotPrev;
                    }
                }
            }
        } else if !state.resume {
            self.children[next_child].set_current_frame(
                vars.lookup_float(&state.interp_target_var, state.interp_target),
            );
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
                    blend_poses(
                        &self.prev_poses,
                        &self.next_poses,
                        ease(self.alpha, self.easing),
                        &mut self.poses,
                    );
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

    /// Entering the node picks a fresh random state on the next evaluate.
    pub(crate) fn set_active_internal(&mut self, active: bool) {
        self.trigger_new_random_state = active;
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

    fn make_switch(seed: u64) -> RandomSwitch {
        let mut switch = RandomSwitch::new("fidget", seed);
        switch.children.push(constant_clip("idleA", 0.0));
        switch.children.push(constant_clip("idleB", 1.0));
        switch.children.push(constant_clip("idleC", 2.0));
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            switch.add_state(RandomSwitchState::new(
                *id,
                i,
                0.0,
                3.0,
                InterpType::SnapshotBoth,
                EasingType::Linear,
                1.0,
                false,
            ));
        }
        switch.set_current_state(0);
        switch
    }

    #[test]
    fn activation_picks_a_state_without_interp() {
        let mut switch = make_switch(7);
        switch.set_active_internal(true);
        let mut triggers = VariantMap::new();
        switch.evaluate(
            &VariantMap::new(),
            &EvalContext::default(),
            1.0 / 30.0,
            &mut triggers,
        );
        assert!(!switch.is_interpolating());
        assert!(!switch.last_played_state.is_empty());
    }

    #[test]
    fn random_switch_var_changes_state_with_interp() {
        let mut switch = make_switch(3);
        switch.set_trigger_random_switch_var("fidgetNext");
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut vars = VariantMap::new();

        switch.set_active_internal(true);
        switch.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        let first = switch.current_state_id().to_string();

        vars.set_trigger("fidgetNext");
        switch.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        // the last-played exclusion guarantees a different state
        assert_ne!(switch.current_state_id(), first);
    }

    #[test]
    fn timers_emit_triggers() {
        let mut switch = make_switch(11);
        switch.set_transition_var("fidgetPlay");
        switch.set_trigger_random_switch_var("fidgetNext");
        switch.set_trigger_times(0.5, 0.5);
        switch.set_random_switch_times(100.0, 100.0);
        let ctx = EvalContext::default();
        let vars = VariantMap::new();
        let mut triggers = VariantMap::new();

        switch.set_active_internal(true);
        switch.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        // run one second: the 0.5 s trigger timer fires
        for _ in 0..30 {
            switch.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        }
        assert!(triggers.has_trigger("fidgetPlay"));
        assert!(!triggers.has_trigger("fidgetNext"));
    }

    #[test]
    fn transition_vars_request_temporary_movements() {
        let mut switch = RandomSwitch::new("talk", 5);
        switch.children.push(constant_clip("talkMain", 0.0));
        switch.children.push(constant_clip("talkWave", 5.0));
        let mut main = RandomSwitchState::new(
            "main",
            0,
            0.0,
            3.0,
            InterpType::SnapshotBoth,
            EasingType::Linear,
            1.0,
            false,
        );
        main.add_transition("waveNow", 1);
        switch.add_state(main);
        switch.add_state(RandomSwitchState::new(
            "wave",
            1,
            0.0,
            3.0,
            InterpType::SnapshotBoth,
            EasingType::Linear,
            0.0,
            false,
        ));
        switch.set_current_state(0);

        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        let mut vars = VariantMap::new();
        switch.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert_eq!(switch.current_state_id(), "main");

        vars.set("waveNow", true);
        switch.evaluate(&vars, &ctx, 1.0 / 30.0, &mut triggers);
        assert_eq!(switch.current_state_id(), "wave");
        assert!(switch.is_interpolating());
    }
}
