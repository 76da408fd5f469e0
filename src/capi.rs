#![allow(dead_code)]

extern crate libc;

use libc::ptrdiff_t;
use std::os::raw::{c_char, c_int, c_uint};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::null_mut;
use std::slice;

use crate::stabilize as stab;
use crate::stabilize::{plane_dimensions, MAX_PLANES};
use crate::StabilizerError;

/// Success.
pub const AVS_OK: c_int = 0;
/// A required pointer was null or an argument was malformed.
pub const AVS_ERR_INVALID_ARGUMENT: c_int = -1;
/// `avs_process` was called before a successful `avs_create`.
pub const AVS_ERR_NOT_INITIALIZED: c_int = -2;
/// The frame does not match the dimensions passed to `avs_create`.
pub const AVS_ERR_DIMENSION_MISMATCH: c_int = -3;
/// The format tag is not one of the supported values.
pub const AVS_ERR_UNSUPPORTED_FORMAT: c_int = -4;
/// A plane pointer, stride or buffer did not cover the frame geometry.
pub const AVS_ERR_MALFORMED_FRAME: c_int = -5;
/// An internal invariant was violated; the instance is still usable.
pub const AVS_ERR_INTERNAL: c_int = -6;

/// Stabilizer Context
///
/// An opaque per-source stabilizer instance. One context serves one video
/// source and must not be shared between threads without external
/// synchronization.
pub struct Context {
    core: stab::StabilizerCore,
}

/// Host-facing frame description.
///
/// Plane pointers and strides follow the format convention: Y/U/V planes
/// for `I420`, Y and interleaved UV for `NV12`, the packed data in slot 0
/// for `BGRA`/`RGBA`. Unused slots may be null.
#[repr(C)]
pub struct AvsFrame {
    /// Frame width in pixels.
    pub width: c_uint,
    /// Frame height in pixels.
    pub height: c_uint,
    /// Pixel layout: 0 = I420, 1 = NV12, 2 = BGRA, 3 = RGBA.
    pub format: c_uint,
    /// Per-plane base pointers.
    pub planes: [*const u8; MAX_PLANES],
    /// Per-plane row strides in bytes.
    pub strides: [ptrdiff_t; MAX_PLANES],
    /// Monotonic presentation timestamp in nanoseconds.
    pub timestamp_ns: u64,
}

/// Host-facing stabilizer configuration. Field semantics and ranges match
/// the crate-level [`Params`](../stabilize/struct.Params.html); out-of-range
/// values are clamped, never rejected.
#[repr(C)]
pub struct AvsParams {
    /// Nonzero enables stabilization.
    pub enabled: c_int,
    /// Transform history capacity, `[10, 100]`.
    pub smoothing_radius: c_int,
    /// Upper bound on tracked features, `[100, 1000]`.
    pub max_features: c_int,
    /// Minimum corner quality fraction, `[0.001, 0.1]`.
    pub min_feature_quality: f32,
    /// Minimum feature spacing in pixels, `[5, 100]`.
    pub min_feature_distance: f32,
    /// Tracked-fraction refresh threshold, `[0.3, 0.9]`.
    pub refresh_threshold_ratio: f32,
    /// Correction strength, `[0, 1]`.
    pub max_correction: f32,
    /// Boundary policy: 0 = crop, 1 = pad, 2 = scale.
    pub edge_mode: c_int,
    /// Nonzero lets the motion class adapt strength and window.
    pub adaptive: c_int,
    /// Classifier threshold scale, `[0.1, 10]`.
    pub sensitivity: f32,
}

/// Host-facing observability counters.
#[repr(C)]
pub struct AvsMetrics {
    /// Duration of the last `avs_process` call in microseconds.
    pub last_frame_time_us: u64,
    /// Frames processed since create or the last reset.
    pub cumulative_frames: u64,
    /// Successfully tracked features in the last frame.
    pub tracked_features: c_uint,
    /// Motion class of the last frame: 0 = static, 1 = slow motion,
    /// 2 = fast motion, 3 = pan/zoom, 4 = camera shake.
    pub last_motion_class: c_uint,
    /// Current transform history length.
    pub history_len: c_uint,
    /// Current streak of consecutive estimation failures.
    pub consecutive_failures: c_uint,
    /// Strength applied to the last frame's correction.
    pub effective_strength: f32,
}

fn convert_params(params: &AvsParams) -> stab::Params {
    stab::Params {
        enabled: params.enabled != 0,
        smoothing_radius: params.smoothing_radius.max(0) as u32,
        max_features: params.max_features.max(0) as u32,
        min_feature_quality: params.min_feature_quality,
        min_feature_distance: params.min_feature_distance,
        refresh_threshold_ratio: params.refresh_threshold_ratio,
        max_correction: params.max_correction,
        edge_mode: match params.edge_mode {
            1 => stab::EdgeMode::Pad,
            2 => stab::EdgeMode::Scale,
            _ => stab::EdgeMode::Crop,
        },
        adaptive: params.adaptive != 0,
        sensitivity: params.sensitivity,
    }
}

fn convert_format(tag: c_uint) -> Option<stab::PixelFormat> {
    match tag {
        0 => Some(stab::PixelFormat::I420),
        1 => Some(stab::PixelFormat::Nv12),
        2 => Some(stab::PixelFormat::Bgra),
        3 => Some(stab::PixelFormat::Rgba),
        _ => None,
    }
}

fn error_code(err: &StabilizerError) -> c_int {
    match err {
        StabilizerError::InvalidDimensions { .. } => AVS_ERR_INVALID_ARGUMENT,
        StabilizerError::UnsupportedFormat { .. } => AVS_ERR_UNSUPPORTED_FORMAT,
        StabilizerError::NotInitialized => AVS_ERR_NOT_INITIALIZED,
        StabilizerError::DimensionMismatch { .. } => AVS_ERR_DIMENSION_MISMATCH,
        StabilizerError::MalformedFrame { .. } => AVS_ERR_MALFORMED_FRAME,
        _ => AVS_ERR_INTERNAL,
    }
}

/// Builds a borrowed frame view over host memory. The caller must have
/// validated the format tag.
unsafe fn build_view<'a>(
    frame: &AvsFrame,
    format: stab::PixelFormat,
) -> Result<stab::FrameView<'a>, c_int> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let dims = plane_dimensions(format, width, height);

    let mut planes: [&'a [u8]; MAX_PLANES] = [&[], &[], &[], &[]];
    let mut strides = [0usize; MAX_PLANES];
    for i in 0..MAX_PLANES {
        let (plane_width, plane_height) = dims[i];
        if plane_width == 0 {
            continue;
        }
        if frame.planes[i].is_null() || frame.strides[i] < plane_width as ptrdiff_t {
            return Err(AVS_ERR_MALFORMED_FRAME);
        }
        let stride = frame.strides[i] as usize;
        let len = stride * (plane_height - 1) + plane_width;
        planes[i] = slice::from_raw_parts(frame.planes[i], len);
        strides[i] = stride;
    }

    Ok(stab::FrameView {
        width,
        height,
        format,
        planes,
        strides,
        timestamp_ns: frame.timestamp_ns,
    })
}

fn fill_output(frame: &stab::FrameBuffer, out: &mut AvsFrame) {
    let view = frame.as_view();
    out.width = view.width as c_uint;
    out.height = view.height as c_uint;
    out.format = match view.format {
        stab::PixelFormat::I420 => 0,
        stab::PixelFormat::Nv12 => 1,
        stab::PixelFormat::Bgra => 2,
        stab::PixelFormat::Rgba => 3,
    };
    for i in 0..MAX_PLANES {
        out.planes[i] = if view.planes[i].is_empty() {
            std::ptr::null()
        } else {
            view.planes[i].as_ptr()
        };
        out.strides[i] = view.strides[i] as ptrdiff_t;
    }
    out.timestamp_ns = view.timestamp_ns;
}

/// Create a stabilizer instance for the given frame geometry
///
/// Returns either `NULL` or a newly allocated `AvsContext` that must be
/// released with `avs_destroy`
#[no_mangle]
pub unsafe extern fn avs_create(
    width: c_uint,
    height: c_uint,
    params: *const AvsParams,
) -> *mut Context {
    if params.is_null() {
        return null_mut();
    }
    let params = convert_params(&*params);
    let created = panic::catch_unwind(move || {
        let mut core = stab::StabilizerCore::new();
        core.initialize(width as usize, height as usize, params)
            .ok()
            .map(|_| Context { core })
    });
    match created {
        Ok(Some(ctx)) => Box::into_raw(Box::new(ctx)),
        _ => null_mut(),
    }
}

/// Apply a new parameter set to the instance
///
/// Out-of-range values are clamped; this function never fails on values
#[no_mangle]
pub unsafe extern fn avs_update(ctx: *mut Context, params: *const AvsParams) {
    if ctx.is_null() || params.is_null() {
        return;
    }
    let ctx = &mut *ctx;
    let params = convert_params(&*params);
    let _ = panic::catch_unwind(AssertUnwindSafe(|| ctx.core.update_params(params)));
}

/// Stabilize one frame
///
/// On success, `out` describes a frame borrowed from the instance; it stays
/// valid until the next `avs_process` call on the same instance. Returns
/// `AVS_OK` or a negative `AVS_ERR_*` code
#[no_mangle]
pub unsafe extern fn avs_process(
    ctx: *mut Context,
    frame: *const AvsFrame,
    out: *mut AvsFrame,
) -> c_int {
    if ctx.is_null() || frame.is_null() || out.is_null() {
        return AVS_ERR_INVALID_ARGUMENT;
    }
    let ctx = &mut *ctx;
    let frame = &*frame;

    let format = match convert_format(frame.format) {
        Some(format) => format,
        None => return AVS_ERR_UNSUPPORTED_FORMAT,
    };
    let view = match build_view(frame, format) {
        Ok(view) => view,
        Err(code) => return code,
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        ctx.core.process_frame(&view).map(|stabilized| {
            fill_output(stabilized, &mut *out);
        })
    }));
    match outcome {
        Ok(Ok(())) => AVS_OK,
        Ok(Err(err)) => error_code(&err),
        Err(_) => AVS_ERR_INTERNAL,
    }
}

/// Clear all per-instance state; the next frame is a cold start
#[no_mangle]
pub unsafe extern fn avs_reset(ctx: *mut Context) {
    if ctx.is_null() {
        return;
    }
    let ctx = &mut *ctx;
    let _ = panic::catch_unwind(AssertUnwindSafe(|| ctx.core.reset()));
}

/// Read the instance's observability counters
///
/// Returns `AVS_OK` on success or `AVS_ERR_INVALID_ARGUMENT` on null input
#[no_mangle]
pub unsafe extern fn avs_metrics(ctx: *const Context, out: *mut AvsMetrics) -> c_int {
    if ctx.is_null() || out.is_null() {
        return AVS_ERR_INVALID_ARGUMENT;
    }
    let metrics = (*ctx).core.metrics();
    let out = &mut *out;
    out.last_frame_time_us = metrics.last_frame_time_us;
    out.cumulative_frames = metrics.cumulative_frames;
    out.tracked_features = metrics.tracked_features;
    out.last_motion_class = match metrics.last_motion_class {
        stab::MotionClass::Static => 0,
        stab::MotionClass::SlowMotion => 1,
        stab::MotionClass::FastMotion => 2,
        stab::MotionClass::PanZoom => 3,
        stab::MotionClass::CameraShake => 4,
    };
    out.history_len = metrics.history_len;
    out.consecutive_failures = metrics.consecutive_failures;
    out.effective_strength = metrics.effective_strength;
    AVS_OK
}

/// Drop the stabilizer context
///
/// This function drops the context and frees the memory
#[no_mangle]
pub unsafe extern fn avs_destroy(ctx: *mut Context) {
    if ctx.is_null() {
        return;
    }
    std::mem::drop(Box::from_raw(ctx));
}

/// The crate version as a static, NUL-terminated C string
#[no_mangle]
pub unsafe extern fn avs_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_params() -> AvsParams {
        AvsParams {
            enabled: 1,
            smoothing_radius: 30,
            max_features: 200,
            min_feature_quality: 0.01,
            min_feature_distance: 30.0,
            refresh_threshold_ratio: 0.5,
            max_correction: 1.0,
            edge_mode: 0,
            adaptive: 0,
            sensitivity: 1.0,
        }
    }

    fn i420_frame(width: usize, height: usize) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let mut y = vec![0u8; width * height];
        for (i, p) in y.iter_mut().enumerate() {
            *p = ((i % width) / 8 % 2 * 150 + 50) as u8;
        }
        let chroma = ((width + 1) / 2) * ((height + 1) / 2);
        (y, vec![128; chroma], vec![128; chroma])
    }

    fn frame_of(y: &[u8], u: &[u8], v: &[u8], width: usize, height: usize) -> AvsFrame {
        AvsFrame {
            width: width as c_uint,
            height: height as c_uint,
            format: 0,
            planes: [
                y.as_ptr(),
                u.as_ptr(),
                v.as_ptr(),
                std::ptr::null(),
            ],
            strides: [
                width as ptrdiff_t,
                ((width + 1) / 2) as ptrdiff_t,
                ((width + 1) / 2) as ptrdiff_t,
                0,
            ],
            timestamp_ns: 0,
        }
    }

    fn empty_out() -> AvsFrame {
        AvsFrame {
            width: 0,
            height: 0,
            format: 0,
            planes: [std::ptr::null(); MAX_PLANES],
            strides: [0; MAX_PLANES],
            timestamp_ns: 0,
        }
    }

    #[test]
    fn null_arguments_are_rejected() {
        unsafe {
            assert!(avs_create(64, 64, std::ptr::null()).is_null());
            assert_eq!(
                avs_process(null_mut(), std::ptr::null(), null_mut()),
                AVS_ERR_INVALID_ARGUMENT
            );
            avs_update(null_mut(), std::ptr::null());
            avs_reset(null_mut());
            avs_destroy(null_mut());
        }
    }

    #[test]
    fn create_rejects_bad_dimensions() {
        let params = default_params();
        unsafe {
            assert!(avs_create(16, 64, &params).is_null());
            assert!(avs_create(64, 9000, &params).is_null());
        }
    }

    #[test]
    fn process_round_trips_a_frame() {
        let params = default_params();
        let (y, u, v) = i420_frame(64, 64);
        let frame = frame_of(&y, &u, &v, 64, 64);
        let mut out = empty_out();

        unsafe {
            let ctx = avs_create(64, 64, &params);
            assert!(!ctx.is_null());
            assert_eq!(avs_process(ctx, &frame, &mut out), AVS_OK);
            assert_eq!(out.width, 64);
            assert_eq!(out.format, 0);
            assert!(!out.planes[0].is_null());

            let mut metrics = std::mem::zeroed::<AvsMetrics>();
            assert_eq!(avs_metrics(ctx, &mut metrics), AVS_OK);
            assert_eq!(metrics.cumulative_frames, 1);
            avs_destroy(ctx);
        }
    }

    #[test]
    fn unknown_format_tags_are_unsupported() {
        let params = default_params();
        let (y, u, v) = i420_frame(64, 64);
        let mut frame = frame_of(&y, &u, &v, 64, 64);
        frame.format = 9;
        let mut out = empty_out();

        unsafe {
            let ctx = avs_create(64, 64, &params);
            assert_eq!(avs_process(ctx, &frame, &mut out), AVS_ERR_UNSUPPORTED_FORMAT);
            avs_destroy(ctx);
        }
    }

    #[test]
    fn null_plane_is_a_malformed_frame() {
        let params = default_params();
        let (y, u, _v) = i420_frame(64, 64);
        let mut frame = frame_of(&y, &u, &u, 64, 64);
        frame.planes[2] = std::ptr::null();
        let mut out = empty_out();

        unsafe {
            let ctx = avs_create(64, 64, &params);
            assert_eq!(avs_process(ctx, &frame, &mut out), AVS_ERR_MALFORMED_FRAME);
            avs_destroy(ctx);
        }
    }

    #[test]
    fn version_is_a_nul_terminated_string() {
        unsafe {
            let version = std::ffi::CStr::from_ptr(avs_version());
            assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
        }
    }
}
