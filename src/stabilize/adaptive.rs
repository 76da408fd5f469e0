//! Maps the current motion class to effective smoothing parameters.

use crate::stabilize::{MotionClass, Params};

/// The smoothing parameters in effect for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectiveParams {
    /// Fraction of the raw correction to apply, in `[0, 1]`.
    pub strength: f32,
    /// Number of history entries the smoother averages over,
    /// in `[2, smoothing_radius]`.
    pub window: usize,
}

/// Resolves the effective strength and smoothing window for a frame.
///
/// With `params.adaptive` disabled this is the configured strength and the
/// full smoothing radius. Otherwise the motion class selects multipliers:
/// static scenes barely need correction, pans keep most of their intentional
/// motion, and shake gets the full strength of the smoother.
pub fn resolve(params: &Params, class: MotionClass) -> EffectiveParams {
    let radius = params.smoothing_radius as usize;
    if !params.adaptive {
        return EffectiveParams {
            strength: params.max_correction.max(0.0).min(1.0),
            window: radius.max(2),
        };
    }

    let (strength_mult, window_mult) = match class {
        MotionClass::Static => (0.2, 1.0),
        MotionClass::SlowMotion => (0.7, 1.0),
        MotionClass::FastMotion => (0.4, 0.5),
        MotionClass::CameraShake => (1.0, 1.0),
        MotionClass::PanZoom => (0.3, 0.7),
    };

    let strength = (params.max_correction * strength_mult).max(0.0).min(1.0);
    let window = ((radius as f32 * window_mult).round() as usize)
        .max(2)
        .min(radius);

    EffectiveParams { strength, window }
}
