//! The per-frame stabilization pipeline and its owned state.

use crate::stabilize::adapter::{self, AdapterScratch};
use crate::stabilize::adaptive;
use crate::stabilize::classify;
use crate::stabilize::detect::{FeatureDetector, FeaturePoint, FeatureSet};
use crate::stabilize::estimate::TransformEstimator;
use crate::stabilize::history::TransformHistory;
use crate::stabilize::plane::PlaneData;
use crate::stabilize::smooth;
use crate::stabilize::track;
use crate::stabilize::transform::Transform;
use crate::stabilize::warp;
use crate::stabilize::{validate_dimensions, FrameBuffer, FrameView, Metrics, Params};
use crate::StabilizerError;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Motion classification looks at most this far back into the history.
const CLASSIFY_WINDOW: usize = 30;
/// Estimation failures in a row before a feature refresh is forced.
const MAX_ESTIMATION_FAILURES: u32 = 3;
/// Frames of monotonically degrading tracking before a refresh is forced.
const MAX_DEGRADE_STREAK: u32 = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initialized,
    Running,
    /// A forced refresh is in progress; frames pass through until the
    /// feature set is re-acquired.
    Degraded,
}

/// The stabilization engine.
///
/// One instance serves one video source. All state is owned by the
/// instance; the host drives it strictly sequentially. Frame views are
/// borrowed per call and never retained; the returned output frame stays
/// valid until the next [`process_frame`](#method.process_frame) call.
pub struct StabilizerCore {
    state: State,
    width: usize,
    height: usize,
    params: Params,

    prev_luma: PlaneData<u8>,
    curr_luma: PlaneData<u8>,
    features: FeatureSet,
    pairs: Vec<(FeaturePoint, FeaturePoint)>,

    detector: FeatureDetector,
    estimator: TransformEstimator,
    history: TransformHistory,
    scratch: AdapterScratch,

    // Double-buffered output: the host may hold the frame returned for
    // frame N while frame N+1 is being computed.
    outputs: [FrameBuffer; 2],
    back: usize,

    refresh_pending: bool,
    degrade_streak: u32,
    last_success_rate: f32,
    consecutive_failures: u32,
    metrics: Metrics,
}

impl StabilizerCore {
    /// Constructs an uninitialized stabilizer.
    pub fn new() -> Self {
        StabilizerCore {
            state: State::Uninitialized,
            width: 0,
            height: 0,
            params: Params::default(),
            prev_luma: PlaneData::default(),
            curr_luma: PlaneData::default(),
            features: Vec::new(),
            pairs: Vec::new(),
            detector: FeatureDetector::new(),
            estimator: TransformEstimator::new(),
            history: TransformHistory::new(Params::default().smoothing_radius as usize),
            scratch: AdapterScratch::default(),
            outputs: [FrameBuffer::default(), FrameBuffer::default()],
            back: 0,
            refresh_pending: false,
            degrade_streak: 0,
            last_success_rate: 1.0,
            consecutive_failures: 0,
            metrics: Metrics::default(),
        }
    }

    /// Validates the dimensions, clamps the parameters and allocates the
    /// owned working buffers.
    pub fn initialize(
        &mut self,
        width: usize,
        height: usize,
        params: Params,
    ) -> Result<(), StabilizerError> {
        validate_dimensions(width, height)?;
        self.width = width;
        self.height = height;
        self.apply_params(params);

        self.prev_luma = PlaneData::new(width, height);
        self.curr_luma = PlaneData::new(width, height);
        self.detector.reserve(width, height);
        self.features = Vec::with_capacity(self.params.max_features as usize);
        self.pairs = Vec::with_capacity(self.params.max_features as usize);
        self.clear_runtime_state();
        self.state = State::Initialized;
        tracing::debug!(width, height, "stabilizer initialized");
        Ok(())
    }

    /// Clamps and applies a new parameter set.
    ///
    /// A changed smoothing radius resizes the history, preserving the most
    /// recent entries. Calling this twice with the same value is equivalent
    /// to calling it once.
    pub fn update_params(&mut self, params: Params) {
        self.apply_params(params);
    }

    /// Clears all owned state; the next frame is treated as a cold start.
    /// Parameters and dimensions are kept.
    pub fn reset(&mut self) {
        self.clear_runtime_state();
        if self.state != State::Uninitialized {
            self.state = State::Initialized;
        }
        tracing::debug!("stabilizer reset");
    }

    /// Observability counters for the last processed frame.
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Runs the stabilization pipeline on one frame.
    ///
    /// Only boundary conditions are surfaced as errors; any internal
    /// failure downgrades the frame to a pass-through with an identity
    /// history entry. The returned frame borrows the instance's output
    /// buffer and is valid until the next call.
    pub fn process_frame(&mut self, frame: &FrameView<'_>) -> Result<&FrameBuffer, StabilizerError> {
        if self.state == State::Uninitialized {
            return Err(StabilizerError::NotInitialized);
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(StabilizerError::DimensionMismatch {
                reason: "frame size differs from the initialized size",
            });
        }
        adapter::validate_frame(frame)?;

        let start = Instant::now();
        let slot = self.back;

        if !self.params.enabled {
            adapter::copy_frame(frame, &mut self.outputs[slot]);
        } else {
            // Panic barrier: nothing from the pipeline may cross the host
            // boundary. A panicking frame degrades to a pass-through.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_pipeline(frame, slot)));
            if outcome.is_err() {
                tracing::warn!("frame pipeline panicked, passing frame through");
                adapter::copy_frame(frame, &mut self.outputs[slot]);
                self.history.push(Transform::IDENTITY);
                self.consecutive_failures += 1;
                self.refresh_pending = true;
            }
        }

        self.back = 1 - slot;
        self.metrics.cumulative_frames += 1;
        self.metrics.history_len = self.history.len() as u32;
        self.metrics.consecutive_failures = self.consecutive_failures;
        self.metrics.last_frame_time_us = start.elapsed().as_micros() as u64;
        Ok(&self.outputs[slot])
    }

    fn apply_params(&mut self, params: Params) {
        let clamped = params.clamped();
        if clamped != params {
            tracing::warn!("stabilizer parameters were out of range and have been clamped");
        }
        let radius_changed = clamped.smoothing_radius != self.params.smoothing_radius;
        self.params = clamped;
        if radius_changed {
            self.history.resize(self.params.smoothing_radius as usize);
        }
    }

    fn clear_runtime_state(&mut self) {
        self.features.clear();
        self.pairs.clear();
        self.history.clear();
        self.estimator.reset();
        self.refresh_pending = false;
        self.degrade_streak = 0;
        self.last_success_rate = 1.0;
        self.consecutive_failures = 0;
        self.metrics = Metrics::default();
    }

    fn detect_features(&mut self, on_current: bool) -> usize {
        let luma = if on_current {
            &self.curr_luma
        } else {
            &self.prev_luma
        };
        self.features = self.detector.detect(
            luma,
            self.params.max_features as usize,
            self.params.min_feature_quality,
            self.params.min_feature_distance,
        );
        self.features.len()
    }

    fn run_pipeline(&mut self, frame: &FrameView<'_>, slot: usize) {
        adapter::extract_luma(frame, &mut self.curr_luma);

        if self.state == State::Initialized {
            // Cold start: seed the feature set and pass the frame through.
            std::mem::swap(&mut self.prev_luma, &mut self.curr_luma);
            let found = self.detect_features(false);
            self.state = if found > 0 { State::Running } else { State::Degraded };
            adapter::copy_frame(frame, &mut self.outputs[slot]);
            self.metrics.tracked_features = found as u32;
            self.metrics.effective_strength = 0.0;
            return;
        }

        // Track the previous feature set into the current frame.
        let result = track::track(&self.prev_luma, &self.curr_luma, &self.features);
        self.pairs.clear();
        for ((prev, curr), ok) in self
            .features
            .iter()
            .zip(result.points.iter())
            .zip(result.status.iter())
        {
            if *ok {
                self.pairs.push((*prev, *curr));
            }
        }
        let tracked_count = self.pairs.len();

        if result.success_rate < self.last_success_rate {
            self.degrade_streak += 1;
        } else {
            self.degrade_streak = 0;
        }
        self.last_success_rate = result.success_rate;

        // Estimate the inter-frame transform; failures append the identity
        // and pass the frame through.
        let mut pass_through = false;
        match self.estimator.estimate(&self.pairs) {
            Ok(transform) => {
                self.history.push(transform);
                self.consecutive_failures = 0;
            }
            Err(err) => {
                tracing::debug!(error = %err, "transform estimation failed");
                self.history.push(Transform::IDENTITY);
                self.consecutive_failures += 1;
                pass_through = true;
            }
        }

        // Classify the recent motion and resolve the effective parameters.
        let class_window = self.history.window(CLASSIFY_WINDOW.min(self.history.len()));
        let motion_class = classify::classify(class_window, self.params.sensitivity);
        let effective = adaptive::resolve(&self.params, motion_class);

        if pass_through {
            adapter::copy_frame(frame, &mut self.outputs[slot]);
        } else {
            let correction = smooth::compute_correction(
                self.history.window(effective.window),
                effective.strength,
            );
            match warp::sampling_transform(
                &correction,
                self.params.edge_mode,
                self.width as f32,
                self.height as f32,
            ) {
                Some(sampling) => adapter::compose_output(
                    frame,
                    &self.curr_luma,
                    &sampling,
                    self.params.edge_mode,
                    &mut self.scratch,
                    &mut self.outputs[slot],
                ),
                // A non-invertible correction cannot be applied; emit the
                // input unchanged.
                None => adapter::copy_frame(frame, &mut self.outputs[slot]),
            }
        }

        // Refresh policy: re-seed features when tracking thins out, keeps
        // degrading, or estimation keeps failing.
        let min_survivors = ((self.params.max_features as f32 * 0.5) as usize).max(30);
        let needs_refresh = self.refresh_pending
            || result.success_rate < self.params.refresh_threshold_ratio
            || tracked_count < min_survivors
            || self.degrade_streak >= MAX_DEGRADE_STREAK
            || self.consecutive_failures >= MAX_ESTIMATION_FAILURES;

        std::mem::swap(&mut self.prev_luma, &mut self.curr_luma);
        if needs_refresh {
            // prev_luma now holds the current frame; detect on it.
            let found = self.detect_features(false);
            self.refresh_pending = false;
            self.degrade_streak = 0;
            self.state = if found > 0 { State::Running } else { State::Degraded };
            tracing::debug!(found, "feature set refreshed");
        } else {
            // Carry only the surviving tracked points, order preserved.
            self.features.clear();
            for (point, ok) in result.points.iter().zip(result.status.iter()) {
                if *ok {
                    self.features.push(*point);
                }
            }
            self.state = State::Running;
        }

        self.metrics.tracked_features = self.features.len() as u32;
        self.metrics.last_motion_class = motion_class;
        self.metrics.effective_strength = if pass_through { 0.0 } else { effective.strength };
    }
}

impl Default for StabilizerCore {
    fn default() -> Self {
        StabilizerCore::new()
    }
}
