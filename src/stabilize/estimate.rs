//! Robust partial-affine transform estimation from matched point pairs.
//!
//! Fits translation + rotation + uniform scale (4 degrees of freedom) with
//! RANSAC: repeated minimal-sample hypotheses, inlier counting, then a
//! least-squares refit on the best consensus set.
//!
//! See https://en.wikipedia.org/wiki/Random_sample_consensus for more
//! details.

use crate::stabilize::detect::FeaturePoint;
use crate::stabilize::transform::Transform;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Minimum number of matched pairs required to attempt estimation.
pub const MIN_MATCHES: usize = 6;
/// Reprojection error bound for a pair to count as an inlier, in pixels.
pub const INLIER_THRESHOLD: f32 = 3.0;
/// Upper bound on RANSAC hypothesis iterations.
pub const MAX_ITERATIONS: usize = 2000;
/// Stop sampling early once this inlier ratio is reached.
pub const EARLY_EXIT_RATIO: f32 = 0.8;
/// Reject the final model below this inlier ratio.
pub const MIN_INLIER_RATIO: f32 = 0.4;
/// Accepted uniform scale range for a sane inter-frame transform.
pub const SCALE_RANGE: (f32, f32) = (0.5, 2.0);

const SAMPLE_SIZE: usize = 3;

/// Estimation failures. These stay inside the stabilizer; the affected
/// frame degrades to a pass-through.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EstimateError {
    /// Fewer matched pairs than the minimal sample requires.
    #[error(display = "Not enough matched pairs to estimate a transform")]
    InsufficientMatches,
    /// No consensus model with a plausible scale was found.
    #[error(display = "Estimated transform was degenerate")]
    Degenerate,
}

/// RANSAC estimator with a deterministically seeded sampler.
///
/// Identical input sequences produce identical transforms; the sampler is
/// reseeded by [`reset`](#method.reset) so a stabilizer reset replays
/// byte-identically.
pub struct TransformEstimator {
    rng: SmallRng,
    inliers: Vec<usize>,
    best_inliers: Vec<usize>,
}

const SAMPLER_SEED: u64 = 0x51AB_172E;

impl TransformEstimator {
    /// Creates an estimator with a freshly seeded sampler.
    pub fn new() -> Self {
        TransformEstimator {
            rng: SmallRng::seed_from_u64(SAMPLER_SEED),
            inliers: Vec::new(),
            best_inliers: Vec::new(),
        }
    }

    /// Reseeds the sampler to its initial state.
    pub fn reset(&mut self) {
        self.rng = SmallRng::seed_from_u64(SAMPLER_SEED);
    }

    /// Estimates the partial-affine transform mapping the first point of
    /// each pair onto the second.
    ///
    /// Returns `InsufficientMatches` for fewer than
    /// [`MIN_MATCHES`](constant.MIN_MATCHES.html) pairs and `Degenerate`
    /// when no model passes the inlier-ratio and scale sanity checks. Never
    /// returns a transform with non-finite components or non-positive scale.
    pub fn estimate(
        &mut self,
        pairs: &[(FeaturePoint, FeaturePoint)],
    ) -> Result<Transform, EstimateError> {
        if pairs.len() < MIN_MATCHES {
            return Err(EstimateError::InsufficientMatches);
        }

        self.best_inliers.clear();
        let mut sample = [0usize; SAMPLE_SIZE];

        for _ in 0..MAX_ITERATIONS {
            self.sample_indices(pairs.len(), &mut sample);
            let model = match fit_similarity(pairs, &sample) {
                Some(model) => model,
                None => continue,
            };

            self.inliers.clear();
            for (i, pair) in pairs.iter().enumerate() {
                if reprojection_error_sq(&model, pair) <= INLIER_THRESHOLD * INLIER_THRESHOLD {
                    self.inliers.push(i);
                }
            }

            if self.inliers.len() > self.best_inliers.len() {
                std::mem::swap(&mut self.inliers, &mut self.best_inliers);
                if self.best_inliers.len() as f32 / pairs.len() as f32 >= EARLY_EXIT_RATIO {
                    break;
                }
            }
        }

        let inlier_ratio = self.best_inliers.len() as f32 / pairs.len() as f32;
        if inlier_ratio < MIN_INLIER_RATIO {
            return Err(EstimateError::Degenerate);
        }

        let refit =
            fit_similarity(pairs, &self.best_inliers).ok_or(EstimateError::Degenerate)?;
        let scale = refit.decompose().log_scale.exp();
        if !refit.is_finite() || !scale.is_finite() || scale < SCALE_RANGE.0 || scale > SCALE_RANGE.1
        {
            return Err(EstimateError::Degenerate);
        }

        Ok(refit)
    }

    /// Draws `SAMPLE_SIZE` distinct indices in `[0, len)`.
    fn sample_indices(&mut self, len: usize, sample: &mut [usize; SAMPLE_SIZE]) {
        for i in 0..SAMPLE_SIZE {
            loop {
                let candidate = self.rng.gen_range(0..len);
                if !sample[..i].contains(&candidate) {
                    sample[i] = candidate;
                    break;
                }
            }
        }
    }
}

impl Default for TransformEstimator {
    fn default() -> Self {
        TransformEstimator::new()
    }
}

/// Closed-form least-squares similarity fit over the selected pairs.
///
/// Solving in centered coordinates gives the rotation/scale parameters
/// directly; the translation follows from the centroids. Returns `None`
/// when the selected source points are (nearly) coincident.
fn fit_similarity(
    pairs: &[(FeaturePoint, FeaturePoint)],
    indices: &[usize],
) -> Option<Transform> {
    let n = indices.len() as f64;
    if indices.len() < 2 {
        return None;
    }

    let mut mean_px = 0.0f64;
    let mut mean_py = 0.0f64;
    let mut mean_qx = 0.0f64;
    let mut mean_qy = 0.0f64;
    for &i in indices {
        let (p, q) = pairs[i];
        mean_px += p.x as f64;
        mean_py += p.y as f64;
        mean_qx += q.x as f64;
        mean_qy += q.y as f64;
    }
    mean_px /= n;
    mean_py /= n;
    mean_qx /= n;
    mean_qy /= n;

    let mut dot = 0.0f64;
    let mut cross = 0.0f64;
    let mut norm = 0.0f64;
    for &i in indices {
        let (p, q) = pairs[i];
        let px = p.x as f64 - mean_px;
        let py = p.y as f64 - mean_py;
        let qx = q.x as f64 - mean_qx;
        let qy = q.y as f64 - mean_qy;
        dot += px * qx + py * qy;
        cross += px * qy - py * qx;
        norm += px * px + py * py;
    }
    if norm < 1e-8 {
        return None;
    }

    // a = s*cos(theta), b = s*sin(theta).
    let a = (dot / norm) as f32;
    let b = (cross / norm) as f32;
    let tx = (mean_qx - (a as f64 * mean_px - b as f64 * mean_py)) as f32;
    let ty = (mean_qy - (b as f64 * mean_px + a as f64 * mean_py)) as f32;

    let transform = Transform {
        a,
        b: -b,
        tx,
        c: b,
        d: a,
        ty,
    };
    if transform.is_finite() {
        Some(transform)
    } else {
        None
    }
}

fn reprojection_error_sq(model: &Transform, pair: &(FeaturePoint, FeaturePoint)) -> f32 {
    let (x, y) = model.apply(pair.0.x, pair.0.y);
    let dx = x - pair.1.x;
    let dy = y - pair.1.y;
    dx * dx + dy * dy
}
