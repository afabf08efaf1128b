//! Frame-time accumulation shared by the clip-driven nodes.

use crate::variables::VariantMap;

/// All "frame" quantities are 1/30 s regardless of real-time dt.
pub const FRAMES_PER_SECOND: f32 = 30.0;

const EPSILON: f32 = 1.0e-4;
// prevents huge dt or time-scale values from causing trigger storms
const MAX_TRIGGER_COUNT: u32 = 3;

/// Advance a frame cursor by `dt`, stepping through wrap points.
///
/// Emits `"{id}OnLoop"` per wrap when looping and `"{id}OnDone"` once when
/// not. A frame range of at most one frame snaps to `end_frame` with no
/// trigger. At most [`MAX_TRIGGER_COUNT`] wrap events are processed per
/// call; leftover time is dropped.
#[allow(clippy::too_many_arguments)]
pub fn accumulate_time(
    start_frame: f32,
    end_frame: f32,
    time_scale: f32,
    current_frame: f32,
    dt: f32,
    loop_flag: bool,
    id: &str,
    triggers_out: &mut VariantMap,
) -> f32 {
    let clamped_start_frame = start_frame.min(end_frame);
    if (clamped_start_frame - end_frame).abs() <= 1.0 {
        // an animation of a single frame sends no loop or done triggers
        return end_frame;
    }

    let mut frame = current_frame;
    if time_scale > EPSILON && dt > EPSILON {
        let mut frames_remaining = dt * time_scale * FRAMES_PER_SECOND;
        let mut trigger_count = 0;

        while frames_remaining > EPSILON && trigger_count < MAX_TRIGGER_COUNT {
            let frames_till_end = end_frame - frame;
            if frames_remaining >= frames_till_end {
                if loop_flag {
                    triggers_out.set_trigger(format!("{id}OnLoop"));
                    frames_remaining -= frames_till_end;
                    frame = clamped_start_frame;
                } else {
                    // only on the transition into the end frame, so a clip
                    // parked at its end stays silent
                    if frame < end_frame {
                        triggers_out.set_trigger(format!("{id}OnDone"));
                    }
                    frame = end_frame;
                    frames_remaining = 0.0;
                }
                trigger_count += 1;
            } else {
                frame += frames_remaining;
                frames_remaining = 0.0;
            }
        }
    }
    frame
}

/// Convert a frame count to seconds at the canonical 30 fps.
pub fn frames_to_seconds(frames: f32) -> f32 {
    frames / FRAMES_PER_SECOND
}
