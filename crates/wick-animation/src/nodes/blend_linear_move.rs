//! Speed-matched linear blend for locomotion cycles.
//!
//! Each child clip is tagged with the movement speed it represents when
//! played at 30 fps. Given a desired speed, the node computes the phase
//! rate that achieves it for the current blend of the two selected clips,
//! then drives both clips from that single phase.

use std::sync::Arc;

use wick_core::{blend_poses, Pose};

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::util::FRAMES_PER_SECOND;
use crate::variables::VariantMap;

#[derive(Debug)]
pub struct BlendLinearMove {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    #[allow(dead_code)]
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
    alpha: f32,
    desired_speed: f32,
    // normalized cycle position in [0, 1)
    phase: f32,
    characteristic_speeds: Vec<f32>,
    alpha_var: String,
    desired_speed_var: String,
    warned_bad_speeds: bool,
}

impl BlendLinearMove {
    pub fn new(
        id: impl Into<String>,
        alpha: f32,
        desired_speed: f32,
        characteristic_speeds: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            alpha,
            desired_speed,
            phase: 0.0,
            characteristic_speeds,
            alpha_var: String::new(),
            desired_speed_var: String::new(),
            warned_bad_speeds: false,
        }
    }

    pub fn set_alpha_var(&mut self, var: impl Into<String>) {
        self.alpha_var = var.into();
    }

    pub fn set_desired_speed_var(&mut self, var: impl Into<String>) {
        self.desired_speed_var = var.into();
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        self.alpha = vars.lookup_float(&self.alpha_var, self.alpha);
        self.desired_speed = vars.lookup_float(&self.desired_speed_var, self.desired_speed);

        if self.children.len() != self.characteristic_speeds.len() {
            if !self.warned_bad_speeds {
                log::warn!(
                    "BlendLinearMove {:?} has {} children but {} characteristic speeds",
                    self.id,
                    self.children.len(),
                    self.characteristic_speeds.len()
                );
                self.warned_bad_speeds = true;
            }
            return &self.poses;
        }

        match self.children.len() {
            0 => {
                for pose in &mut self.poses {
                    *pose = Pose::IDENTITY;
                }
            }
            1 => {
                if let Some((prev_dt, next_dt)) = self.set_frame_and_phase(dt, 0.0, 0, 0, triggers_out)
                {
                    self.evaluate_and_blend_children(vars, ctx, triggers_out, 0.0, 0, 0, prev_dt, next_dt);
                }
            }
            n => {
                let clamped_alpha = self.alpha.clamp(0.0, (n - 1) as f32);
                let prev_index = clamped_alpha.floor() as usize;
                let next_index = clamped_alpha.ceil() as usize;
                let alpha = clamped_alpha.fract();
                if let Some((prev_dt, next_dt)) =
                    self.set_frame_and_phase(dt, alpha, prev_index, next_index, triggers_out)
                {
                    self.evaluate_and_blend_children(
                        vars,
                        ctx,
                        triggers_out,
                        alpha,
                        prev_index,
                        next_index,
                        prev_dt,
                        next_dt,
                    );
                }
            }
        }
        &self.poses
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_and_blend_children(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        triggers_out: &mut VariantMap,
        alpha: f32,
        prev_index: usize,
        next_index: usize,
        prev_dt: f32,
        next_dt: f32,
    ) {
        if prev_index == next_index {
            let poses = self.children[prev_index].evaluate(vars, ctx, prev_dt, triggers_out);
            self.poses = poses.to_vec();
        } else {
            let (head, tail) = self.children.split_at_mut(next_index);
            let prev_poses = head[prev_index].evaluate(vars, ctx, prev_dt, triggers_out);
            let next_poses = tail[0].evaluate(vars, ctx, next_dt, triggers_out);

            if !prev_poses.is_empty() && prev_poses.len() == next_poses.len() {
                self.poses.resize(prev_poses.len(), Pose::IDENTITY);
                blend_poses(prev_poses, next_poses, alpha, &mut self.poses);
            }
        }
    }

    /// Seek both selected clips to the shared phase, integrate the phase
    /// forward at the rate that achieves the desired speed, and return the
    /// per-child delta times. `None` if either child is not a clip.
    fn set_frame_and_phase(
        &mut self,
        dt: f32,
        alpha: f32,
        prev_index: usize,
        next_index: usize,
        triggers_out: &mut VariantMap,
    ) -> Option<(f32, f32)> {
        let (v0, n0) = {
            let clip = self.children[prev_index].as_clip()?;
            (
                self.characteristic_speeds[prev_index],
                (clip.end_frame() - clip.start_frame()) + 1.0,
            )
        };
        let (v1, n1) = {
            let clip = self.children[next_index].as_clip()?;
            (
                self.characteristic_speeds[next_index],
                (clip.end_frame() - clip.start_frame()) + 1.0,
            )
        };

        // rate of change in phase space necessary to achieve desired speed
        let omega =
            (self.desired_speed * FRAMES_PER_SECOND) / ((1.0 - alpha) * v0 * n0 + alpha * v1 * n1);

        let phase = self.phase;
        self.children[prev_index]
            .as_clip_mut()?
            .set_current_frame_internal(phase * n0);
        self.children[next_index]
            .as_clip_mut()?
            .set_current_frame_internal(phase * n1);

        self.phase += omega * dt;

        if self.phase >= 1.0 {
            triggers_out.set_trigger(format!("{}Loop", self.id));
            self.phase = self.phase.fract();
        }

        Some((
            omega * dt * (n0 / FRAMES_PER_SECOND),
            omega * dt * (n1 / FRAMES_PER_SECOND),
        ))
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
    }

    pub(crate) fn set_current_frame_internal(&mut self, frame: f32) {
        let Some(clip) = self.children.first().and_then(AnimNode::as_clip) else {
            return;
        };
        let num_frames = (clip.end_frame() - clip.start_frame()) + 1.0;
        self.phase = (frame / num_frames).rem_euclid(1.0);
    }
}
