//! Motion classification over the recent transform history.
//!
//! The classifier reduces the last few dozen inter-frame transforms to a
//! handful of rolling statistics and maps those onto discrete motion
//! regimes. The regimes drive the adaptive controller, which decides how
//! aggressively to smooth.

use crate::stabilize::transform::Transform;
use crate::stabilize::MotionClass;
use itertools::Itertools;

/// Translation vectors shorter than this are ignored for directional
/// consistency, their direction being numerically meaningless.
const MIN_DIRECTION_NORM: f32 = 1e-3;

/// Rolling statistics over a window of inter-frame transforms.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionMetrics {
    /// Mean combined motion magnitude, in pixels.
    pub mean_magnitude: f32,
    /// Variance of the motion magnitude.
    pub var_magnitude: f32,
    /// Mean cosine similarity between consecutive translation vectors,
    /// clamped to `[0, 1]`.
    pub directional_consistency: f32,
    /// Fraction of frame-to-frame magnitude differences whose sign flips,
    /// in `[0, 1]`. A proxy for oscillation.
    pub high_freq_ratio: f32,
}

impl MotionMetrics {
    /// Computes the rolling statistics for a chronological transform window.
    pub fn compute(window: &[Transform]) -> MotionMetrics {
        if window.is_empty() {
            return MotionMetrics::default();
        }

        let decomposed: Vec<_> = window.iter().map(Transform::decompose).collect();
        let magnitudes: Vec<f32> = decomposed.iter().map(|d| d.magnitude()).collect();

        let n = magnitudes.len() as f32;
        let mean = magnitudes.iter().sum::<f32>() / n;
        let var = magnitudes.iter().map(|m| (m - mean) * (m - mean)).sum::<f32>() / n;

        let mut cos_sum = 0.0;
        let mut cos_count = 0usize;
        for (prev, curr) in decomposed.iter().tuple_windows() {
            let prev_norm = (prev.tx * prev.tx + prev.ty * prev.ty).sqrt();
            let curr_norm = (curr.tx * curr.tx + curr.ty * curr.ty).sqrt();
            if prev_norm < MIN_DIRECTION_NORM || curr_norm < MIN_DIRECTION_NORM {
                continue;
            }
            cos_sum += (prev.tx * curr.tx + prev.ty * curr.ty) / (prev_norm * curr_norm);
            cos_count += 1;
        }
        let directional_consistency = if cos_count > 0 {
            (cos_sum / cos_count as f32).max(0.0).min(1.0)
        } else {
            0.0
        };

        let diffs: Vec<f32> = magnitudes
            .iter()
            .tuple_windows()
            .map(|(a, b)| b - a)
            .collect();
        let mut flips = 0usize;
        let mut flip_count = 0usize;
        for (prev, curr) in diffs.iter().tuple_windows() {
            flip_count += 1;
            if prev * curr < 0.0 {
                flips += 1;
            }
        }
        let high_freq_ratio = if flip_count > 0 {
            flips as f32 / flip_count as f32
        } else {
            0.0
        };

        MotionMetrics {
            mean_magnitude: mean,
            var_magnitude: var,
            directional_consistency,
            high_freq_ratio,
        }
    }
}

/// Classifies the motion regime of a chronological transform window.
///
/// `sensitivity` scales the decision thresholds: lower sensitivity means
/// larger magnitude thresholds, so less motion registers. Classification is
/// deterministic for identical input.
pub fn classify(window: &[Transform], sensitivity: f32) -> MotionClass {
    let metrics = MotionMetrics::compute(window);
    classify_metrics(&metrics, sensitivity)
}

/// Classifies precomputed motion metrics. The conditions are evaluated in
/// order; the first match wins.
pub fn classify_metrics(metrics: &MotionMetrics, sensitivity: f32) -> MotionClass {
    let s = 1.0 / sensitivity.max(1e-3);

    if metrics.mean_magnitude < 6.0 * s && metrics.var_magnitude < 3.0 * s {
        MotionClass::Static
    } else if metrics.high_freq_ratio > 0.85 * s {
        MotionClass::CameraShake
    } else if metrics.directional_consistency > 0.96 / s && metrics.mean_magnitude > 6.0 * s {
        MotionClass::PanZoom
    } else if metrics.mean_magnitude >= 15.0 * s && metrics.mean_magnitude < 40.0 * s {
        MotionClass::FastMotion
    } else {
        MotionClass::SlowMotion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    fn shift(tx: f32, ty: f32) -> Transform {
        Transform::from_similarity(tx, ty, 0.0, 1.0)
    }

    #[test]
    fn empty_and_still_windows_are_static() {
        assert_eq!(classify(&[], 1.0), MotionClass::Static);
        let window = vec![Transform::IDENTITY; 30];
        assert_eq!(classify(&window, 1.0), MotionClass::Static);
    }

    #[test]
    fn steady_pan_is_pan_zoom() {
        let window = vec![shift(8.0, 0.0); 30];
        let metrics = MotionMetrics::compute(&window);
        assert_close(8.0, metrics.mean_magnitude, 1e-4);
        assert_close(1.0, metrics.directional_consistency, 1e-4);
        assert_eq!(classify(&window, 1.0), MotionClass::PanZoom);
    }

    #[test]
    fn oscillating_motion_is_camera_shake() {
        // Direction reverses every frame and the magnitude alternates, which
        // drives the sign-flip ratio up.
        let mut window = Vec::new();
        for i in 0..30 {
            let mag = if i % 2 == 0 { 14.0 } else { 7.0 };
            let dir = if i % 2 == 0 { 1.0 } else { -1.0 };
            window.push(shift(mag * dir, 0.0));
        }
        let metrics = MotionMetrics::compute(&window);
        assert!(metrics.high_freq_ratio > 0.85, "ratio {}", metrics.high_freq_ratio);
        assert_eq!(classify(&window, 1.0), MotionClass::CameraShake);
    }

    #[test]
    fn moderate_inconsistent_motion_is_fast_motion() {
        // Large translations with alternating vertical direction: too fast
        // for SlowMotion, monotone magnitudes keep the flip ratio low, and
        // the inconsistent direction rules out PanZoom.
        let mut window = Vec::new();
        for i in 0..30 {
            let dir = if i % 2 == 0 { 1.0 } else { -1.0 };
            window.push(shift(20.0, 6.0 * dir));
        }
        assert_eq!(classify(&window, 1.0), MotionClass::FastMotion);
    }

    #[test]
    fn mild_drift_is_slow_motion() {
        // Magnitude above the static cutoff with poor directional
        // consistency falls through to SlowMotion.
        let mut window = Vec::new();
        for i in 0..30 {
            let dir = if i % 2 == 0 { 1.0 } else { -1.0 };
            window.push(shift(8.0, 5.0 * dir));
        }
        assert_eq!(classify(&window, 1.0), MotionClass::SlowMotion);
    }

    #[test]
    fn sensitivity_scales_the_static_threshold() {
        let window = vec![shift(8.0, 0.0); 30];
        // At low sensitivity the same pan stays below the (larger)
        // static threshold.
        assert_eq!(classify(&window, 0.5), MotionClass::Static);
        assert_eq!(classify(&window, 1.0), MotionClass::PanZoom);
    }

    #[test]
    fn classification_is_deterministic() {
        let window: Vec<_> = (0..30)
            .map(|i| shift((i % 5) as f32 * 3.0, (i % 3) as f32 * -2.0))
            .collect();
        let first = classify(&window, 1.0);
        for _ in 0..10 {
            assert_eq!(classify(&window, 1.0), first);
        }
    }
}
