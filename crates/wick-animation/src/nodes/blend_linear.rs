//! Linear blend across N children driven by a single alpha.

use std::sync::Arc;

use wick_core::{blend_poses, Pose};

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::util::accumulate_time;
use crate::variables::VariantMap;

/// Blends between the two children bracketing `alpha` in [0, N-1]; the
/// fractional part is the blend weight. With `sync` set and all-clip
/// children, a single shared phase is driven into each selected clip so
/// cycles of different lengths stay phase-locked.
#[derive(Debug)]
pub struct BlendLinear {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    #[allow(dead_code)]
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
    alpha: f32,
    sync: bool,
    sync_frame: f32,
    time_scale: f32,
    average_length: f32,
    alpha_var: String,
    time_scale_var: String,
}

impl BlendLinear {
    pub fn new(id: impl Into<String>, alpha: f32, sync: bool) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            alpha,
            sync,
            sync_frame: 0.0,
            time_scale: 1.0,
            average_length: 0.0,
            alpha_var: String::new(),
            time_scale_var: String::new(),
        }
    }

    pub fn set_alpha_var(&mut self, var: impl Into<String>) {
        self.alpha_var = var.into();
    }

    pub fn set_time_scale_var(&mut self, var: impl Into<String>) {
        self.time_scale_var = var.into();
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        self.alpha = vars.lookup_float(&self.alpha_var, self.alpha);
        self.time_scale = vars.lookup_float(&self.time_scale_var, self.time_scale);

        match self.children.len() {
            0 => {
                for pose in &mut self.poses {
                    *pose = Pose::IDENTITY;
                }
            }
            1 => {
                let poses = self.children[0].evaluate(vars, ctx, dt, triggers_out);
                self.poses = poses.to_vec();
            }
            n => {
                let clamped_alpha = self.alpha.clamp(0.0, (n - 1) as f32);
                let prev_index = clamped_alpha.floor() as usize;
                let next_index = clamped_alpha.ceil() as usize;
                let alpha = clamped_alpha.fract();

                if self.sync {
                    self.set_sync_and_accumulate_time(dt, prev_index, next_index, triggers_out);
                }
                self.evaluate_and_blend_children(
                    vars,
                    ctx,
                    triggers_out,
                    alpha,
                    prev_index,
                    next_index,
                    dt,
                );
            }
        }
        &self.poses
    }

    fn evaluate_and_blend_children(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        triggers_out: &mut VariantMap,
        alpha: f32,
        prev_index: usize,
        next_index: usize,
        dt: f32,
    ) {
        if prev_index == next_index {
            // alpha landed on an integer boundary
            let poses = self.children[prev_index].evaluate(vars, ctx, dt, triggers_out);
            self.poses = poses.to_vec();
        } else {
            let (head, tail) = self.children.split_at_mut(next_index);
            let prev_poses = head[prev_index].evaluate(vars, ctx, dt, triggers_out);
            let next_poses = tail[0].evaluate(vars, ctx, dt, triggers_out);

            if !prev_poses.is_empty() && prev_poses.len() == next_poses.len() {
                self.poses.resize(prev_poses.len(), Pose::IDENTITY);
                blend_poses(prev_poses, next_poses, alpha, &mut self.poses);
            }
        }
    }

    /// Drive a shared phase into the two selected clips, compensating each
    /// clip's time scale for its cycle length so both stay phase-locked.
    fn set_sync_and_accumulate_time(
        &mut self,
        dt: f32,
        prev_index: usize,
        next_index: usize,
        triggers_out: &mut VariantMap,
    ) {
        // sync only works over clip children
        let mut length_sum = 0.0;
        for child in &self.children {
            let Some(clip) = child.as_clip() else {
                return;
            };
            length_sum += (clip.end_frame() - clip.start_frame()) + 1.0;
        }
        self.average_length = length_sum / self.children.len() as f32;

        let progress = self.sync_frame / self.average_length;

        for index in [prev_index, next_index] {
            let average_length = self.average_length;
            let time_scale = self.time_scale;
            let clip = self.children[index]
                .as_clip_mut()
                .expect("checked above that all children are clips");
            let length = (clip.end_frame() - clip.start_frame()) + 1.0;
            let frame = progress * length;
            clip.set_time_scale(time_scale * (average_length / length));
            clip.set_current_frame_internal(frame);
        }

        self.sync_frame = accumulate_time(
            0.0,
            self.average_length,
            self.time_scale,
            self.sync_frame,
            dt,
            true,
            &self.id,
            triggers_out,
        );
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
    }

    pub(crate) fn set_current_frame_internal(&mut self, frame: f32) {
        let mut scratch = VariantMap::new();
        self.sync_frame = accumulate_time(
            0.0,
            self.average_length,
            self.time_scale,
            frame,
            0.0,
            true,
            &self.id,
            &mut scratch,
        );
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

    /// A one-joint animation whose x translation equals the frame number.
    fn ramp_animation(frames: usize) -> AnimationData {
        AnimationData::new(
            vec!["Root".into()],
            (0..frames)
                .map(|f| AnimationFrame {
                    translations: vec![Vec3::new(f as f32, 0.0, 0.0)],
                    rotations: vec![Quat::IDENTITY],
                })
                .collect(),
        )
    }

    fn make_clip(id: &str, cache: &Arc<AnimationCache>, end: f32) -> AnimNode {
        let mut clip = Clip::new(id, "anim", 0.0, end, 1.0, true, false, cache.clone());
        clip.set_skeleton_internal(&skeleton());
        AnimNode::Clip(clip)
    }

    #[test]
    fn no_children_yield_identity_poses() {
        let mut node = BlendLinear::new("blend", 0.5, false);
        let poses = node.evaluate(
            &VariantMap::new(),
            &EvalContext::default(),
            0.0,
            &mut VariantMap::new(),
        );
        assert!(poses.is_empty());
    }

    #[test]
    fn single_child_passes_through() {
        let cache = Arc::new(AnimationCache::new());
        cache.insert("anim", ramp_animation(10));
        let mut node = BlendLinear::new("blend", 0.0, false);
        node.children.push(make_clip("a", &cache, 9.0));
        let poses = node
            .evaluate(
                &VariantMap::new(),
                &EvalContext::default(),
                0.0,
                &mut VariantMap::new(),
            )
            .to_vec();
        assert_eq!(poses.len(), 1);
    }

    #[test]
    fn fractional_alpha_blends_neighbours() {
        let cache_a = Arc::new(AnimationCache::new());
        // clip a holds x = 0, clip b holds x = 10 (single pose repeated)
        cache_a.insert(
            "anim",
            AnimationData::new(
                vec!["Root".into()],
                vec![
                    AnimationFrame {
                        translations: vec![Vec3::ZERO],
                        rotations: vec![Quat::IDENTITY],
                    };
                    4
                ],
            ),
        );
        let cache_b = Arc::new(AnimationCache::new());
        cache_b.insert(
            "anim",
            AnimationData::new(
                vec!["Root".into()],
                vec![
                    AnimationFrame {
                        translations: vec![Vec3::new(10.0, 0.0, 0.0)],
                        rotations: vec![Quat::IDENTITY],
                    };
                    4
                ],
            ),
        );

        let mut node = BlendLinear::new("blend", 0.25, false);
        node.children.push(make_clip("a", &cache_a, 3.0));
        node.children.push(make_clip("b", &cache_b, 3.0));

        let poses = node
            .evaluate(
                &VariantMap::new(),
                &EvalContext::default(),
                0.0,
                &mut VariantMap::new(),
            )
            .to_vec();
        assert!((poses[0].trans.x - 2.5).abs() < 1e-4);
    }

    #[test]
    fn alpha_var_overrides_alpha() {
        let cache = Arc::new(AnimationCache::new());
        cache.insert("anim", ramp_animation(4));
        let mut node = BlendLinear::new("blend", 0.0, false);
        node.set_alpha_var("blendAlpha");
        node.children.push(make_clip("a", &cache, 3.0));
        node.children.push(make_clip("b", &cache, 3.0));
        let mut vars = VariantMap::new();
        vars.set("blendAlpha", 1.0f32);
        node.evaluate(&vars, &EvalContext::default(), 0.0, &mut VariantMap::new());
        assert!((node.alpha() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sync_phase_locks_clips_of_different_lengths() {
        let cache = Arc::new(AnimationCache::new());
        cache.insert("anim", ramp_animation(40));
        let mut node = BlendLinear::new("blend", 0.5, true);
        // a 10-frame walk cycle and a 30-frame run cycle
        node.children.push(make_clip("walk", &cache, 9.0));
        node.children.push(make_clip("run", &cache, 29.0));

        // advance half of the average cycle, then evaluate once more with
        // dt = 0: the shared phase is written into both clips
        let vars = VariantMap::new();
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();
        node.evaluate(&vars, &ctx, 10.5 / 30.0, &mut triggers);
        node.evaluate(&vars, &ctx, 0.0, &mut triggers);

        let walk = node.children[0].as_clip().unwrap();
        let run = node.children[1].as_clip().unwrap();
        let walk_phase = walk.frame() / 10.0;
        let run_phase = run.frame() / 30.0;
        assert!(
            (walk_phase - run_phase).abs() < 1e-4,
            "phases diverged: {} vs {}",
            walk_phase,
            run_phase
        );
        // the longer clip plays faster than the shared time scale
        assert!(run.time_scale() < walk.time_scale());
    }
}
