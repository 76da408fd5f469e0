//! Shi-Tomasi corner detection.
//!
//! Produces a set of trackable points from a luma image using the minimum
//! eigenvalue of the local structure tensor as the corner response.
//!
//! See https://en.wikipedia.org/wiki/Corner_detection for more details.

use crate::stabilize::pixel::Pixel;
use crate::stabilize::plane::PlaneData;
use num_traits::AsPrimitive;

/// A sub-pixel feature point in image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeaturePoint {
    /// Horizontal position in pixels.
    pub x: f32,
    /// Vertical position in pixels.
    pub y: f32,
}

/// An ordered set of feature points.
///
/// Order is preserved between detection and subsequent tracking, so index
/// `i` refers to the same physical point across frames until it is dropped.
pub type FeatureSet = Vec<FeaturePoint>;

/// Points closer than this to the image border are rejected; the gradient
/// and tensor windows both need one pixel of margin.
pub const BORDER: usize = 2;

/// A detection run that finds fewer features than this reports an empty set,
/// which callers treat as tracking loss.
pub const MIN_FEATURES: usize = 10;

/// Shi-Tomasi corner detector with reusable scratch storage.
///
/// Detection runs only on cold starts and feature refreshes, but on 4K
/// input the gradient buffers are large enough to be worth keeping around.
#[derive(Default)]
pub struct FeatureDetector {
    grad_x: Vec<f32>,
    grad_y: Vec<f32>,
    response: Vec<f32>,
}

impl FeatureDetector {
    /// Creates a detector with empty scratch buffers.
    pub fn new() -> Self {
        FeatureDetector::default()
    }

    /// Pre-sizes the scratch buffers for the given frame dimensions.
    pub fn reserve(&mut self, width: usize, height: usize) {
        self.grad_x.resize(width * height, 0.0);
        self.grad_y.resize(width * height, 0.0);
        self.response.resize(width * height, 0.0);
    }

    /// Detects up to `max_features` corners in `luma`.
    ///
    /// `min_quality` rejects corners weaker than that fraction of the
    /// strongest response; `min_distance` enforces spacing between accepted
    /// points. Returns an empty set when fewer than
    /// [`MIN_FEATURES`](constant.MIN_FEATURES.html) corners qualify.
    pub fn detect<T: Pixel>(
        &mut self,
        luma: &PlaneData<T>,
        max_features: usize,
        min_quality: f32,
        min_distance: f32,
    ) -> FeatureSet {
        let width = luma.width;
        let height = luma.height;
        if width < 2 * BORDER + 1 || height < 2 * BORDER + 1 {
            return Vec::new();
        }
        self.reserve(width, height);

        self.compute_gradients(luma);
        let max_response = self.compute_responses(width, height);
        if max_response <= 0.0 {
            return Vec::new();
        }

        let threshold = max_response * min_quality;
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for y in BORDER..height - BORDER {
            let row = &self.response[y * width..(y + 1) * width];
            for x in BORDER..width - BORDER {
                if row[x] >= threshold {
                    candidates.push((row[x], x, y));
                }
            }
        }
        candidates.sort_unstable_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let features = select_spaced(&candidates, max_features, min_distance, width, height);
        if features.len() < MIN_FEATURES {
            return Vec::new();
        }
        features
    }

    fn compute_gradients<T: Pixel>(&mut self, luma: &PlaneData<T>) {
        let width = luma.width;
        let height = luma.height;
        for y in 1..height - 1 {
            let above = luma.row(y - 1);
            let here = luma.row(y);
            let below = luma.row(y + 1);
            for x in 1..width - 1 {
                let (a0, a1, a2): (f32, f32, f32) =
                    (above[x - 1].as_(), above[x].as_(), above[x + 1].as_());
                let (h0, h2): (f32, f32) = (here[x - 1].as_(), here[x + 1].as_());
                let (b0, b1, b2): (f32, f32, f32) =
                    (below[x - 1].as_(), below[x].as_(), below[x + 1].as_());
                // Sobel, normalized to keep responses in a stable range.
                self.grad_x[y * width + x] = ((a2 - a0) + 2.0 * (h2 - h0) + (b2 - b0)) / 8.0;
                self.grad_y[y * width + x] = ((b0 - a0) + 2.0 * (b1 - a1) + (b2 - a2)) / 8.0;
            }
        }
    }

    fn compute_responses(&mut self, width: usize, height: usize) -> f32 {
        let mut max_response = 0.0f32;
        for y in BORDER..height - BORDER {
            for x in BORDER..width - BORDER {
                let mut sxx = 0.0f32;
                let mut syy = 0.0f32;
                let mut sxy = 0.0f32;
                for dy in 0..3 {
                    let row = (y + dy - 1) * width;
                    for dx in 0..3 {
                        let idx = row + x + dx - 1;
                        let gx = self.grad_x[idx];
                        let gy = self.grad_y[idx];
                        sxx += gx * gx;
                        syy += gy * gy;
                        sxy += gx * gy;
                    }
                }
                // Minimum eigenvalue of the 2x2 structure tensor.
                let diff = sxx - syy;
                let lambda = 0.5 * ((sxx + syy) - (diff * diff + 4.0 * sxy * sxy).sqrt());
                self.response[y * width + x] = lambda;
                if lambda > max_response {
                    max_response = lambda;
                }
            }
        }
        max_response
    }
}

/// Greedily accepts candidates in descending response order, rejecting any
/// within `min_distance` pixels of an already-accepted point. An occupancy
/// grid with `min_distance`-sized cells keeps the check local.
fn select_spaced(
    candidates: &[(f32, usize, usize)],
    max_features: usize,
    min_distance: f32,
    width: usize,
    height: usize,
) -> FeatureSet {
    let cell = min_distance.max(1.0);
    let grid_w = (width as f32 / cell).ceil() as usize + 1;
    let grid_h = (height as f32 / cell).ceil() as usize + 1;
    let mut grid: Vec<Vec<(f32, f32)>> = vec![Vec::new(); grid_w * grid_h];
    let min_dist_sq = min_distance * min_distance;

    let mut features = Vec::with_capacity(max_features.min(candidates.len()));
    for &(_, x, y) in candidates {
        if features.len() >= max_features {
            break;
        }
        let fx = x as f32;
        let fy = y as f32;
        let cx = (fx / cell) as usize;
        let cy = (fy / cell) as usize;

        let mut blocked = false;
        'cells: for ny in cy.saturating_sub(1)..=(cy + 1).min(grid_h - 1) {
            for nx in cx.saturating_sub(1)..=(cx + 1).min(grid_w - 1) {
                for &(px, py) in &grid[ny * grid_w + nx] {
                    let dx = px - fx;
                    let dy = py - fy;
                    if dx * dx + dy * dy < min_dist_sq {
                        blocked = true;
                        break 'cells;
                    }
                }
            }
        }
        if !blocked {
            grid[cy * grid_w + cx].push((fx, fy));
            features.push(FeaturePoint { x: fx, y: fy });
        }
    }
    features
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stabilize::plane::PlaneData;

    /// A plane with a grid of bright squares: plenty of strong corners.
    pub(crate) fn checkerboard(width: usize, height: usize, period: usize) -> PlaneData<u8> {
        let mut plane = PlaneData::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let bright = (x / period + y / period) % 2 == 0;
                plane.data[y * width + x] = if bright { 220 } else { 30 };
            }
        }
        plane
    }

    #[test]
    fn uniform_image_yields_no_features() {
        let mut plane: PlaneData<u8> = PlaneData::new(64, 64);
        for p in plane.data.iter_mut() {
            *p = 128;
        }
        let mut detector = FeatureDetector::new();
        let features = detector.detect(&plane, 100, 0.01, 5.0);
        assert!(features.is_empty());
    }

    #[test]
    fn checkerboard_yields_corners_inside_the_border() {
        let plane = checkerboard(96, 96, 16);
        let mut detector = FeatureDetector::new();
        let features = detector.detect(&plane, 200, 0.01, 5.0);
        assert!(features.len() >= MIN_FEATURES, "found {}", features.len());
        for f in &features {
            assert!(f.x >= BORDER as f32 && f.x < (96 - BORDER) as f32);
            assert!(f.y >= BORDER as f32 && f.y < (96 - BORDER) as f32);
        }
    }

    #[test]
    fn max_features_bounds_the_result() {
        let plane = checkerboard(128, 128, 8);
        let mut detector = FeatureDetector::new();
        let features = detector.detect(&plane, 20, 0.001, 5.0);
        assert!(features.len() <= 20);
        assert!(features.len() >= MIN_FEATURES);
    }

    #[test]
    fn min_distance_spaces_accepted_points() {
        let plane = checkerboard(128, 128, 8);
        let mut detector = FeatureDetector::new();
        let features = detector.detect(&plane, 500, 0.001, 20.0);
        for (i, a) in features.iter().enumerate() {
            for b in features.iter().skip(i + 1) {
                let dist = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                assert!(dist >= 20.0, "points {:?} and {:?} too close", a, b);
            }
        }
    }

    #[test]
    fn sparse_corners_fall_below_the_minimum() {
        // A single bright square has only four corners, below MIN_FEATURES.
        let mut plane: PlaneData<u8> = PlaneData::new(64, 64);
        for y in 28..36 {
            for x in 28..36 {
                plane.data[y * 64 + x] = 255;
            }
        }
        let mut detector = FeatureDetector::new();
        let features = detector.detect(&plane, 100, 0.01, 5.0);
        assert!(features.is_empty());
    }
}
