//! Easing functions applied to interpolation alphas.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Shape of an interpolation envelope. `Linear` leaves the alpha untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EasingType {
    #[default]
    Linear,
    EaseInSine,
    EaseOutSine,
    EaseInOutSine,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInQuint,
    EaseOutQuint,
    EaseInOutQuint,
    EaseInExpo,
    EaseOutExpo,
    EaseInOutExpo,
    EaseInCirc,
    EaseOutCirc,
    EaseInOutCirc,
}

/// Remap `alpha` in [0, 1] through the given easing curve.
pub fn ease(alpha: f32, easing: EasingType) -> f32 {
    use EasingType::*;
    match easing {
        Linear => alpha,
        EaseInSine => ((alpha - 1.0) * FRAC_PI_2).sin() + 1.0,
        EaseOutSine => (alpha * FRAC_PI_2).sin(),
        EaseInOutSine => 0.5 * (1.0 - (alpha * PI).cos()),
        EaseInQuad => alpha * alpha,
        EaseOutQuad => -(alpha * (alpha - 2.0)),
        EaseInOutQuad => {
            if alpha < 0.5 {
                2.0 * alpha * alpha
            } else {
                (-2.0 * alpha * alpha) + (4.0 * alpha) - 1.0
            }
        }
        EaseInCubic => alpha * alpha * alpha,
        EaseOutCubic => {
            let t = alpha - 1.0;
            t * t * t + 1.0
        }
        EaseInOutCubic => {
            if alpha < 0.5 {
                4.0 * alpha * alpha * alpha
            } else {
                let t = 2.0 * alpha - 2.0;
                0.5 * t * t * t + 1.0
            }
        }
        EaseInQuart => alpha * alpha * alpha * alpha,
        EaseOutQuart => {
            let t = alpha - 1.0;
            t * t * t * (1.0 - alpha) + 1.0
        }
        EaseInOutQuart => {
            if alpha < 0.5 {
                8.0 * alpha * alpha * alpha * alpha
            } else {
                let t = alpha - 1.0;
                -8.0 * t * t * t * t + 1.0
            }
        }
        EaseInQuint => alpha * alpha * alpha * alpha * alpha,
        EaseOutQuint => {
            let t = alpha - 1.0;
            t * t * t * t * t + 1.0
        }
        EaseInOutQuint => {
            if alpha < 0.5 {
                16.0 * alpha * alpha * alpha * alpha * alpha
            } else {
                let t = 2.0 * alpha - 2.0;
                0.5 * t * t * t * t * t + 1.0
            }
        }
        EaseInExpo => {
            if alpha == 0.0 {
                alpha
            } else {
                2.0_f32.powf(10.0 * (alpha - 1.0))
            }
        }
        EaseOutExpo => {
            if alpha == 1.0 {
                alpha
            } else {
                1.0 - 2.0_f32.powf(-10.0 * alpha)
            }
        }
        EaseInOutExpo => {
            if alpha == 0.0 || alpha == 1.0 {
                alpha
            } else if alpha < 0.5 {
                0.5 * 2.0_f32.powf(20.0 * alpha - 10.0)
            } else {
                -0.5 * 2.0_f32.powf(-20.0 * alpha + 10.0) + 1.0
            }
        }
        EaseInCirc => 1.0 - (1.0 - alpha * alpha).sqrt(),
        EaseOutCirc => ((2.0 - alpha) * alpha).sqrt(),
        EaseInOutCirc => {
            if alpha < 0.5 {
                0.5 * (1.0 - (1.0 - 4.0 * alpha * alpha).sqrt())
            } else {
                0.5 * ((-(2.0 * alpha - 3.0) * (2.0 * alpha - 1.0)).sqrt() + 1.0)
            }
        }
    }
}
