//! Pyramidal sparse optical flow, Lucas-Kanade style.
//!
//! Tracks a feature set from one luma image to the next. Each point is
//! refined over a small image pyramid, coarse to fine, by iteratively
//! solving the 2x2 normal equations of the local brightness-constancy
//! constraint.
//!
//! See https://en.wikipedia.org/wiki/Lucas%E2%80%93Kanade_method for more
//! details.

use crate::stabilize::detect::{FeaturePoint, FeatureSet, BORDER};
use crate::stabilize::pixel::Pixel;
use crate::stabilize::plane::PlaneData;

/// Number of pyramid levels, full resolution included.
pub const PYRAMID_LEVELS: usize = 3;
/// Half-width of the square tracking window (21x21).
pub const WINDOW_RADIUS: usize = 10;
/// Maximum inner refinement iterations per pyramid level.
pub const MAX_ITERATIONS: usize = 30;
/// Convergence threshold for the per-iteration update, in pixels.
pub const EPSILON: f32 = 0.01;
/// Points whose mean absolute window residual exceeds this are marked lost.
pub const MAX_RESIDUAL: f32 = 50.0;

/// Tracking side length of the window, in samples.
const WINDOW_DIM: usize = 2 * WINDOW_RADIUS + 1;
/// Gram matrices with a smaller minimum eigenvalue than this are treated as
/// untrackable (flat or single-edge neighborhoods).
const MIN_EIGENVALUE: f32 = 1e-4;

/// The outcome of tracking one feature set between two frames.
#[derive(Clone, Debug, Default)]
pub struct TrackResult {
    /// Tracked positions, index-aligned with the input set. Entries whose
    /// status is `false` hold the last best guess and must not be used.
    pub points: FeatureSet,
    /// Per-point success flags, index-aligned with the input set.
    pub status: Vec<bool>,
    /// Fraction of points tracked successfully, in `[0, 1]`.
    pub success_rate: f32,
}

/// Tracks `prev_points` from `prev_luma` into `curr_luma`.
///
/// Both images must have identical dimensions. A point is reported lost when
/// its neighborhood has no trackable texture, the refined position leaves
/// the valid interior, or the final window residual exceeds
/// [`MAX_RESIDUAL`](constant.MAX_RESIDUAL.html).
pub fn track<T: Pixel>(
    prev_luma: &PlaneData<T>,
    curr_luma: &PlaneData<T>,
    prev_points: &[FeaturePoint],
) -> TrackResult {
    if prev_points.is_empty() {
        return TrackResult::default();
    }

    let prev_pyramid = build_pyramid(prev_luma);
    let curr_pyramid = build_pyramid(curr_luma);

    let mut points = Vec::with_capacity(prev_points.len());
    let mut status = Vec::with_capacity(prev_points.len());
    let mut tracked = 0usize;

    for point in prev_points {
        match track_point(&prev_pyramid, &curr_pyramid, *point) {
            Some(tracked_point) => {
                points.push(tracked_point);
                status.push(true);
                tracked += 1;
            }
            None => {
                points.push(*point);
                status.push(false);
            }
        }
    }

    TrackResult {
        points,
        status,
        success_rate: tracked as f32 / prev_points.len() as f32,
    }
}

fn build_pyramid<T: Pixel>(base: &PlaneData<T>) -> Vec<PlaneData<T>> {
    let mut levels = Vec::with_capacity(PYRAMID_LEVELS);
    levels.push(base.clone());
    for level in 1..PYRAMID_LEVELS {
        let coarser = levels[level - 1].half_resolution();
        if coarser.width < WINDOW_DIM || coarser.height < WINDOW_DIM {
            break;
        }
        levels.push(coarser);
    }
    levels
}

/// One sampled tracking window on the previous image: values, spatial
/// gradients and the inverted Gram matrix shared by every iteration.
struct Window {
    values: [f32; WINDOW_DIM * WINDOW_DIM],
    grad_x: [f32; WINDOW_DIM * WINDOW_DIM],
    grad_y: [f32; WINDOW_DIM * WINDOW_DIM],
    inv_gram: [f32; 3],
}

fn sample_window<T: Pixel>(plane: &PlaneData<T>, cx: f32, cy: f32) -> Option<Window> {
    let mut values = [0.0f32; WINDOW_DIM * WINDOW_DIM];
    let mut grad_x = [0.0f32; WINDOW_DIM * WINDOW_DIM];
    let mut grad_y = [0.0f32; WINDOW_DIM * WINDOW_DIM];

    let mut gxx = 0.0f32;
    let mut gxy = 0.0f32;
    let mut gyy = 0.0f32;

    let mut i = 0;
    for wy in 0..WINDOW_DIM {
        let y = cy + wy as f32 - WINDOW_RADIUS as f32;
        for wx in 0..WINDOW_DIM {
            let x = cx + wx as f32 - WINDOW_RADIUS as f32;
            values[i] = plane.sample_bilinear(x, y);
            let gx = (plane.sample_bilinear(x + 1.0, y) - plane.sample_bilinear(x - 1.0, y)) * 0.5;
            let gy = (plane.sample_bilinear(x, y + 1.0) - plane.sample_bilinear(x, y - 1.0)) * 0.5;
            grad_x[i] = gx;
            grad_y[i] = gy;
            gxx += gx * gx;
            gxy += gx * gy;
            gyy += gy * gy;
            i += 1;
        }
    }

    // Reject windows whose Gram matrix is close to singular: flat areas and
    // straight edges cannot pin down a 2-D displacement.
    let trace = gxx + gyy;
    let det = gxx * gyy - gxy * gxy;
    let min_eig = 0.5 * (trace - (trace * trace - 4.0 * det).max(0.0).sqrt());
    if min_eig < MIN_EIGENVALUE || det.abs() < 1e-12 {
        return None;
    }

    let inv_det = 1.0 / det;
    Some(Window {
        values,
        grad_x,
        grad_y,
        inv_gram: [gyy * inv_det, -gxy * inv_det, gxx * inv_det],
    })
}

fn track_point<T: Pixel>(
    prev_pyramid: &[PlaneData<T>],
    curr_pyramid: &[PlaneData<T>],
    point: FeaturePoint,
) -> Option<FeaturePoint> {
    let top = prev_pyramid.len() - 1;

    // Flow estimate carried across levels, in the coordinates of the level
    // currently being refined.
    let mut flow_x = 0.0f32;
    let mut flow_y = 0.0f32;

    for level in (0..=top).rev() {
        let scale = (1 << level) as f32;
        let cx = point.x / scale;
        let cy = point.y / scale;
        let prev = &prev_pyramid[level];
        let curr = &curr_pyramid[level];

        let window = match sample_window(prev, cx, cy) {
            Some(w) => w,
            // Texture can disappear at coarse scales; the finer levels still
            // get a chance with the flow accumulated so far.
            None if level > 0 => {
                flow_x *= 2.0;
                flow_y *= 2.0;
                continue;
            }
            None => return None,
        };

        for _ in 0..MAX_ITERATIONS {
            let mut bx = 0.0f32;
            let mut by = 0.0f32;
            let mut i = 0;
            for wy in 0..WINDOW_DIM {
                let y = cy + flow_y + wy as f32 - WINDOW_RADIUS as f32;
                for wx in 0..WINDOW_DIM {
                    let x = cx + flow_x + wx as f32 - WINDOW_RADIUS as f32;
                    let diff = window.values[i] - curr.sample_bilinear(x, y);
                    bx += diff * window.grad_x[i];
                    by += diff * window.grad_y[i];
                    i += 1;
                }
            }
            let dx = window.inv_gram[0] * bx + window.inv_gram[1] * by;
            let dy = window.inv_gram[1] * bx + window.inv_gram[2] * by;
            flow_x += dx;
            flow_y += dy;
            if dx * dx + dy * dy < EPSILON * EPSILON {
                break;
            }
        }

        if level > 0 {
            flow_x *= 2.0;
            flow_y *= 2.0;
        }
    }

    let tracked = FeaturePoint {
        x: point.x + flow_x,
        y: point.y + flow_y,
    };

    let base = &curr_pyramid[0];
    if tracked.x < BORDER as f32
        || tracked.y < BORDER as f32
        || tracked.x >= (base.width - BORDER) as f32
        || tracked.y >= (base.height - BORDER) as f32
    {
        return None;
    }

    if residual(&prev_pyramid[0], base, point, tracked) > MAX_RESIDUAL {
        return None;
    }

    Some(tracked)
}

/// Mean absolute intensity difference over the tracking window at the final
/// displacement, in 8-bit units.
fn residual<T: Pixel>(
    prev: &PlaneData<T>,
    curr: &PlaneData<T>,
    point: FeaturePoint,
    tracked: FeaturePoint,
) -> f32 {
    let mut sum = 0.0f32;
    for wy in 0..WINDOW_DIM {
        let dy = wy as f32 - WINDOW_RADIUS as f32;
        for wx in 0..WINDOW_DIM {
            let dx = wx as f32 - WINDOW_RADIUS as f32;
            let a = prev.sample_bilinear(point.x + dx, point.y + dy);
            let b = curr.sample_bilinear(tracked.x + dx, tracked.y + dy);
            sum += (a - b).abs();
        }
    }
    sum / (WINDOW_DIM * WINDOW_DIM) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stabilize::detect::tests::checkerboard;
    use crate::stabilize::detect::FeatureDetector;

    fn shifted(plane: &PlaneData<u8>, dx: isize, dy: isize) -> PlaneData<u8> {
        let mut out = PlaneData::new(plane.width, plane.height);
        for y in 0..plane.height {
            for x in 0..plane.width {
                let sx = (x as isize - dx).max(0).min(plane.width as isize - 1) as usize;
                let sy = (y as isize - dy).max(0).min(plane.height as isize - 1) as usize;
                out.data[y * plane.width + x] = plane.get(sx, sy);
            }
        }
        out
    }

    #[test]
    fn identical_frames_track_in_place() {
        let base = checkerboard(128, 128, 16);
        let mut detector = FeatureDetector::new();
        let points = detector.detect(&base, 100, 0.01, 10.0);
        assert!(!points.is_empty());

        let result = track(&base, &base, &points);
        assert!(result.success_rate > 0.9, "rate {}", result.success_rate);
        for (p, q) in points.iter().zip(result.points.iter()) {
            let dist = ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt();
            assert!(dist < 0.5, "point drifted by {}", dist);
        }
    }

    #[test]
    fn translation_is_recovered() {
        let base = checkerboard(160, 160, 16);
        let curr = shifted(&base, 3, -2);
        let mut detector = FeatureDetector::new();
        let points = detector.detect(&base, 100, 0.01, 10.0);
        assert!(!points.is_empty());

        let result = track(&base, &curr, &points);
        assert!(result.success_rate > 0.5, "rate {}", result.success_rate);
        for (i, (p, q)) in points.iter().zip(result.points.iter()).enumerate() {
            if !result.status[i] {
                continue;
            }
            // Interior points away from the replicated border should follow
            // the global shift closely.
            if p.x > 24.0 && p.x < 136.0 && p.y > 24.0 && p.y < 136.0 {
                crate::assert_close(3.0, q.x - p.x, 0.3);
                crate::assert_close(-2.0, q.y - p.y, 0.3);
            }
        }
    }

    #[test]
    fn featureless_targets_are_lost() {
        let base = checkerboard(96, 96, 16);
        let flat: PlaneData<u8> = {
            let mut p = PlaneData::new(96, 96);
            for v in p.data.iter_mut() {
                *v = 128;
            }
            p
        };
        let mut detector = FeatureDetector::new();
        let points = detector.detect(&base, 50, 0.01, 10.0);
        assert!(!points.is_empty());

        let result = track(&base, &flat, &points);
        // Every window lands on flat gray: the residual check throws the
        // points out even though the solver converges somewhere.
        assert!(
            result.success_rate < 0.5,
            "rate {} should reflect tracking loss",
            result.success_rate
        );
    }

    #[test]
    fn empty_input_reports_zero_rate() {
        let base = checkerboard(64, 64, 8);
        let result = track(&base, &base, &[]);
        assert!(result.points.is_empty());
        assert_eq!(result.success_rate, 0.0);
    }
}
