//! Trajectory smoothing over the transform history.
//!
//! The smoother compares the camera's accumulated motion over the window
//! against the windowed average and produces the per-frame correction that
//! pulls the current frame onto the smoothed path. All arithmetic happens on
//! decomposed components (translation, rotation, log-scale), where transform
//! composition is additive and numerically stable.

use crate::stabilize::transform::{Decomposed, Transform};

/// Computes the correction transform for the current frame.
///
/// `window` holds the most recent inter-frame transforms in chronological
/// order. The smoothed cumulative transform is the component-wise mean over
/// the window; the actual cumulative transform is the component-wise sum.
/// The returned correction is their decomposed difference, scaled by
/// `strength` in `[0, 1]` and recomposed. Windows of fewer than two
/// transforms yield the identity.
pub fn compute_correction(window: &[Transform], strength: f32) -> Transform {
    if window.len() < 2 || strength <= 0.0 {
        return Transform::IDENTITY;
    }

    let mut smoothed = Decomposed::default();
    let mut cumulative = Decomposed::default();
    for t in window {
        let d = t.decompose();
        cumulative.tx += d.tx;
        cumulative.ty += d.ty;
        cumulative.theta += d.theta;
        cumulative.log_scale += d.log_scale;
    }
    let n = window.len() as f32;
    smoothed.tx = cumulative.tx / n;
    smoothed.ty = cumulative.ty / n;
    smoothed.theta = cumulative.theta / n;
    smoothed.log_scale = cumulative.log_scale / n;

    let correction = Decomposed {
        tx: smoothed.tx - cumulative.tx,
        ty: smoothed.ty - cumulative.ty,
        theta: smoothed.theta - cumulative.theta,
        log_scale: smoothed.log_scale - cumulative.log_scale,
    };

    correction.scaled(strength.min(1.0)).recompose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    fn shift(tx: f32, ty: f32) -> Transform {
        Transform::from_similarity(tx, ty, 0.0, 1.0)
    }

    #[test]
    fn identity_history_produces_identity_correction() {
        let window = vec![Transform::IDENTITY; 20];
        let k = compute_correction(&window, 1.0);
        assert_close(1.0, k.a, 1e-6);
        assert_close(0.0, k.tx, 1e-6);
        assert_close(0.0, k.ty, 1e-6);
    }

    #[test]
    fn short_windows_produce_identity() {
        assert_eq!(compute_correction(&[], 1.0), Transform::IDENTITY);
        assert_eq!(compute_correction(&[shift(5.0, 0.0)], 1.0), Transform::IDENTITY);
    }

    #[test]
    fn zero_strength_produces_identity() {
        let window = vec![shift(3.0, -1.0); 10];
        assert_eq!(compute_correction(&window, 0.0), Transform::IDENTITY);
    }

    #[test]
    fn oscillation_is_cancelled() {
        // Alternating +5/-5 px jitter: the accumulated path oscillates
        // around zero, so the correction cancels the current displacement.
        let mut window = Vec::new();
        for i in 0..10 {
            window.push(shift(if i % 2 == 0 { 5.0 } else { -5.0 }, 0.0));
        }
        // Cumulative sum is 0 after an even number of entries, mean is 0.
        let k = compute_correction(&window, 1.0);
        assert_close(0.0, k.tx, 1e-4);

        // After an odd entry the cumulative displacement is +5 px; the
        // correction pulls most of it back.
        window.push(shift(5.0, 0.0));
        let k = compute_correction(&window, 1.0);
        assert!(k.tx < -3.0, "correction {} should cancel displacement", k.tx);
    }

    #[test]
    fn correction_is_constant_during_steady_pan() {
        // A steady pan yields a constant correction from frame to frame,
        // meaning no high-frequency motion is introduced into the output.
        let window: Vec<_> = (0..30).map(|_| shift(2.0, 0.0)).collect();
        let k1 = compute_correction(&window, 1.0);
        let k2 = compute_correction(&window, 1.0);
        assert_close(k1.tx, k2.tx, 1e-6);
    }

    #[test]
    fn strength_scales_the_correction_linearly() {
        let mut window = vec![shift(0.0, 0.0); 9];
        window.push(shift(8.0, 0.0));
        let full = compute_correction(&window, 1.0);
        let half = compute_correction(&window, 0.5);
        assert_close(full.tx * 0.5, half.tx, 1e-4);
    }
}
