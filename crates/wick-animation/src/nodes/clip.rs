//! Playback of a single animation timeline.
//!
//! `start_frame` and `end_frame` are in frames of 1/30 s; `time_scale`
//! speeds up or slows down playback; the loop flag wraps the cursor at the
//! end frame. Every playback parameter can be overridden per frame through
//! a variable key.

use glam::Vec3;
use std::sync::Arc;

use wick_core::{blend_poses, Pose};

use crate::cache::{AnimationCache, AnimationData};
use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::util::accumulate_time;
use crate::variables::VariantMap;

const EPSILON: f32 = 1.0e-4;

/// Plays one animation clip, blending the two frames bracketing the
/// floating-point frame cursor.
#[derive(Debug)]
pub struct Clip {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,

    url: String,
    start_frame: f32,
    end_frame: f32,
    time_scale: f32,
    loop_flag: bool,
    mirror_flag: bool,
    frame: f32,

    start_frame_var: String,
    end_frame_var: String,
    time_scale_var: String,
    loop_flag_var: String,
    mirror_flag_var: String,
    frame_var: String,

    cache: Arc<AnimationCache>,
    /// Set once the cache delivers; kept so a skeleton swap can re-map.
    source: Option<Arc<AnimationData>>,
    // anim[frame][joint], sized to the skeleton's joint count
    anim: Vec<Vec<Pose>>,
    // built on demand when the mirror flag is set
    mirror_anim: Vec<Vec<Pose>>,
    warned_missing_joints: bool,
}

impl Clip {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        start_frame: f32,
        end_frame: f32,
        time_scale: f32,
        loop_flag: bool,
        mirror_flag: bool,
        cache: Arc<AnimationCache>,
    ) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            url: url.into(),
            start_frame,
            end_frame,
            time_scale,
            loop_flag,
            mirror_flag,
            frame: start_frame,
            start_frame_var: String::new(),
            end_frame_var: String::new(),
            time_scale_var: String::new(),
            loop_flag_var: String::new(),
            mirror_flag_var: String::new(),
            frame_var: String::new(),
            cache,
            source: None,
            anim: Vec::new(),
            mirror_anim: Vec::new(),
            warned_missing_joints: false,
        }
    }

    pub fn set_start_frame_var(&mut self, var: impl Into<String>) {
        self.start_frame_var = var.into();
    }
    pub fn set_end_frame_var(&mut self, var: impl Into<String>) {
        self.end_frame_var = var.into();
    }
    pub fn set_time_scale_var(&mut self, var: impl Into<String>) {
        self.time_scale_var = var.into();
    }
    pub fn set_loop_flag_var(&mut self, var: impl Into<String>) {
        self.loop_flag_var = var.into();
    }
    pub fn set_mirror_flag_var(&mut self, var: impl Into<String>) {
        self.mirror_flag_var = var.into();
    }
    pub fn set_frame_var(&mut self, var: impl Into<String>) {
        self.frame_var = var.into();
    }

    pub fn start_frame(&self) -> f32 {
        self.start_frame
    }
    pub fn end_frame(&self) -> f32 {
        self.end_frame
    }
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }
    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }
    pub fn loop_flag(&self) -> bool {
        self.loop_flag
    }
    pub fn frame(&self) -> f32 {
        self.frame
    }
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Switch to a different animation; the new data is picked up from the
    /// cache on a later evaluate.
    pub fn set_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if url != self.url {
            self.url = url;
            self.source = None;
            self.anim.clear();
            self.mirror_anim.clear();
            self.warned_missing_joints = false;
        }
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        _ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        // variable keys override the stored parameters
        self.start_frame = vars.lookup_float(&self.start_frame_var, self.start_frame);
        self.end_frame = vars.lookup_float(&self.end_frame_var, self.end_frame);
        self.time_scale = vars.lookup_float(&self.time_scale_var, self.time_scale);
        self.loop_flag = vars.lookup_bool(&self.loop_flag_var, self.loop_flag);
        self.mirror_flag = vars.lookup_bool(&self.mirror_flag_var, self.mirror_flag);
        let frame = vars.lookup_float(&self.frame_var, self.frame);

        self.frame = accumulate_time(
            self.start_frame,
            self.end_frame,
            self.time_scale,
            frame,
            dt,
            self.loop_flag,
            &self.id,
            triggers_out,
        );

        // poll the cache; this is the only place the frame data may swap in
        if self.source.is_none() && self.skeleton.is_some() {
            if let Some(source) = self.cache.get(&self.url) {
                self.source = Some(source);
                self.copy_from_source();
            }
        }

        if !self.anim.is_empty() {
            // lazy creation of the mirrored frames
            if self.mirror_flag && self.anim.len() != self.mirror_anim.len() {
                self.build_mirror_anim();
            }

            let prev_index = self.frame.floor() as i64;
            let next_index = if self.loop_flag && self.frame >= self.end_frame {
                self.start_frame.ceil() as i64
            } else {
                self.frame.ceil() as i64
            };

            // hosts may set frame ranges outside the loaded data
            let frame_count = self.anim.len() as i64;
            let prev_index = prev_index.clamp(0, frame_count - 1) as usize;
            let next_index = next_index.clamp(0, frame_count - 1) as usize;

            let (prev_frame, next_frame) = if self.mirror_flag {
                (&self.mirror_anim[prev_index], &self.mirror_anim[next_index])
            } else {
                (&self.anim[prev_index], &self.anim[next_index])
            };
            let alpha = self.frame.fract();
            blend_poses(prev_frame, next_frame, alpha, &mut self.poses);
        }

        &self.poses
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
        self.anim.clear();
        self.mirror_anim.clear();
        if self.source.is_some() {
            self.copy_from_source();
        }
    }

    /// Seek relative to the clip's start frame. dt is zero so no triggers
    /// can fire.
    pub(crate) fn set_current_frame_internal(&mut self, frame: f32) {
        let mut scratch = VariantMap::new();
        self.frame = accumulate_time(
            self.start_frame,
            self.end_frame,
            self.time_scale,
            frame + self.start_frame,
            0.0,
            self.loop_flag,
            &self.id,
            &mut scratch,
        );
    }

    /// Build `anim[frame][joint]` by matching source joint names to
    /// skeleton joints. Unmapped skeleton joints fall back to the
    /// skeleton's relative default pose; source translations are rescaled
    /// by the rest-length ratio so large authored translations stay
    /// proportional on a differently sized skeleton.
    fn copy_from_source(&mut self) {
        let (Some(skeleton), Some(source)) = (&self.skeleton, &self.source) else {
            return;
        };

        let skeleton_joint_count = skeleton.num_joints();
        let anim_joint_count = source.num_joints();

        let mut joint_map = Vec::with_capacity(anim_joint_count);
        for name in &source.joint_names {
            let index = skeleton.joint_index(name);
            if index.is_none() && !self.warned_missing_joints {
                log::warn!(
                    "animation contains joint {:?} which is not in the skeleton, url = {}",
                    name,
                    self.url
                );
                self.warned_missing_joints = true;
            }
            joint_map.push(index);
        }

        let frame_count = source.num_frames();
        self.anim.clear();
        self.anim.reserve(frame_count);

        for frame in 0..frame_count {
            let source_frame = &source.frames[frame];

            // default pose gives a reasonable result for skeleton joints
            // absent from the animation
            let mut frame_poses = skeleton.relative_default_poses().to_vec();

            for anim_joint in 0..anim_joint_count {
                let Some(skeleton_joint) = joint_map[anim_joint] else {
                    continue;
                };

                let mut pre_rot = source.pre_rotation_poses[anim_joint];
                let mut post_rot = source.post_rotation_poses[anim_joint];
                pre_rot.scale = Vec3::ONE;
                post_rot.scale = Vec3::ONE;

                let rot = Pose::from_rot_trans(source_frame.rotations[anim_joint], Vec3::ZERO);

                let zero_trans = source.frames[0].translations[anim_joint];
                let rel_default = skeleton.relative_default_pose(skeleton_joint);
                let mut bone_length_scale = 1.0;
                if zero_trans.length() > EPSILON {
                    bone_length_scale = rel_default.trans.length() / zero_trans.length();
                }

                let anim_trans = source_frame.translations[anim_joint];
                let trans = Pose::from_rot_trans(
                    glam::Quat::IDENTITY,
                    rel_default.trans + bone_length_scale * (anim_trans - zero_trans),
                );

                frame_poses[skeleton_joint] = trans * pre_rot * rot * post_rot;
            }
            self.anim.push(frame_poses);
        }

        // rebuilt on demand if the mirror flag is set
        self.mirror_anim.clear();
        self.poses = vec![Pose::IDENTITY; skeleton_joint_count];
    }

    fn build_mirror_anim(&mut self) {
        let Some(skeleton) = &self.skeleton else {
            return;
        };
        self.mirror_anim.clear();
        self.mirror_anim.reserve(self.anim.len());
        for frame_poses in &self.anim {
            let mut mirrored = frame_poses.clone();
            skeleton.mirror_relative_poses(&mut mirrored);
            self.mirror_anim.push(mirrored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AnimationFrame;
    use crate::skeleton::JointData;
    use glam::Quat;

    fn test_skeleton() -> Arc<Skeleton> {
        let joints = vec![
            JointData::new("Hips", None, Pose::IDENTITY),
            JointData::new(
                "Spine",
                Some(0),
                Pose::from_rot_trans(Quat::IDENTITY, Vec3::new(0.0, 0.5, 0.0)),
            ),
        ];
        Arc::new(Skeleton::new(joints, Pose::IDENTITY).unwrap())
    }

    /// 31 frames translating the spine from y=0.5 to y=0.5 + frame * 0.01
    fn test_animation() -> AnimationData {
        let mut frames = Vec::new();
        for frame in 0..31 {
            frames.push(AnimationFrame {
                translations: vec![Vec3::ZERO, Vec3::new(0.0, 0.5 + frame as f32 * 0.01, 0.0)],
                rotations: vec![Quat::IDENTITY, Quat::IDENTITY],
            });
        }
        AnimationData::new(vec!["Hips".into(), "Spine".into()], frames)
    }

    fn frames_to_sec(frames: f32) -> f32 {
        frames / 30.0
    }

    #[test]
    fn frame_cursor_advances_loops_and_stops() {
        let cache = Arc::new(AnimationCache::new());
        let mut clip = Clip::new("clip", "anim", 2.0, 22.0, 1.0, true, false, cache);
        let vars = VariantMap::new();
        let ctx = EvalContext::default();
        let mut triggers = VariantMap::new();

        clip.evaluate(&vars, &ctx, frames_to_sec(10.0), &mut triggers);
        assert!((clip.frame() - 12.0).abs() < 1e-3);

        // does it loop?
        clip.evaluate(&vars, &ctx, frames_to_sec(11.0), &mut triggers);
        assert!((clip.frame() - 3.0).abs() < 1e-3);
        assert!(triggers.has_trigger("clipOnLoop"));

        // does it pause at the end?
        let mut clip2 = Clip::new(
            "clip2",
            "anim",
            2.0,
            22.0,
            1.0,
            false,
            false,
            Arc::new(AnimationCache::new()),
        );
        clip2.evaluate(&vars, &ctx, frames_to_sec(25.0), &mut triggers);
        assert!((clip2.frame() - 22.0).abs() < 1e-3);
        assert!(triggers.has_trigger("clip2OnDone"));
    }

    #[test]
    fn unresolved_animation_returns_empty_poses() {
        let cache = Arc::new(AnimationCache::new());
        let mut clip = Clip::new("clip", "anim", 0.0, 30.0, 1.0, true, false, cache);
        let skeleton = test_skeleton();
        clip.set_skeleton_internal(&skeleton);
        let poses = clip.evaluate(
            &VariantMap::new(),
            &EvalContext::default(),
            1.0 / 30.0,
            &mut VariantMap::new(),
        );
        assert!(poses.is_empty());
    }

    #[test]
    fn resolution_is_observed_at_evaluate() {
        let cache = Arc::new(AnimationCache::new());
        let mut clip = Clip::new("clip", "anim", 0.0, 30.0, 1.0, true, false, cache.clone());
        let skeleton = test_skeleton();
        clip.set_skeleton_internal(&skeleton);
        let ctx = EvalContext::default();
        let vars = VariantMap::new();
        let mut triggers = VariantMap::new();

        clip.evaluate(&vars, &ctx, 0.0, &mut triggers);
        cache.insert("anim", test_animation());

        let poses = clip.evaluate(&vars, &ctx, 0.0, &mut triggers);
        assert_eq!(poses.len(), 2);
        // frame 0: spine at its authored y = 0.5
        assert!((poses[1].trans - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-4);
    }

    #[test]
    fn fractional_frames_blend_neighbours() {
        let cache = Arc::new(AnimationCache::new());
        cache.insert("anim", test_animation());
        let mut clip = Clip::new("clip", "anim", 0.0, 30.0, 1.0, true, false, cache);
        let skeleton = test_skeleton();
        clip.set_skeleton_internal(&skeleton);
        let ctx = EvalContext::default();
        let vars = VariantMap::new();
        let mut triggers = VariantMap::new();

        // land the cursor on frame 5.5
        clip.evaluate(&vars, &ctx, frames_to_sec(5.5), &mut triggers);
        let poses = clip.evaluate(&vars, &ctx, 0.0, &mut triggers);
        let expected_y = 0.5 + 5.5 * 0.01;
        assert!((poses[1].trans.y - expected_y).abs() < 1e-4);
    }

    #[test]
    fn variable_keys_override_parameters() {
        let cache = Arc::new(AnimationCache::new());
        let mut clip = Clip::new("clip", "anim", 0.0, 30.0, 1.0, true, false, cache);
        clip.set_time_scale_var("speed");
        let mut vars = VariantMap::new();
        vars.set("speed", 2.0f32);
        clip.evaluate(
            &vars,
            &EvalContext::default(),
            frames_to_sec(5.0),
            &mut VariantMap::new(),
        );
        assert!((clip.frame() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn unmapped_joints_fall_back_to_default_pose() {
        let cache = Arc::new(AnimationCache::new());
        // animation only knows about the hips
        cache.insert(
            "anim",
            AnimationData::new(
                vec!["Hips".into()],
                vec![AnimationFrame {
                    translations: vec![Vec3::ZERO],
                    rotations: vec![Quat::IDENTITY],
                }; 2],
            ),
        );
        let mut clip = Clip::new("clip", "anim", 0.0, 2.0, 1.0, true, false, cache);
        let skeleton = test_skeleton();
        clip.set_skeleton_internal(&skeleton);
        let poses = clip.evaluate(
            &VariantMap::new(),
            &EvalContext::default(),
            0.0,
            &mut VariantMap::new(),
        );
        // the spine keeps its skeleton default
        assert!((poses[1].trans - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-5);
    }

    #[test]
    fn seek_is_relative_to_start_frame() {
        let cache = Arc::new(AnimationCache::new());
        let mut clip = Clip::new("clip", "anim", 10.0, 30.0, 1.0, true, false, cache);
        clip.set_current_frame_internal(5.0);
        assert!((clip.frame() - 15.0).abs() < 1e-4);
    }
}
