//! `av_stabilizer` is a real-time video stabilization engine intended to be
//! embedded in streaming hosts as a per-source video filter. It removes
//! inter-frame camera jitter while preserving intentional motion such as
//! pans and zooms.
//!
//! The entry point is [`StabilizerCore`](stabilize/struct.StabilizerCore.html),
//! which consumes borrowed frame views in planar YUV or packed RGB formats
//! and returns stabilized frames of identical dimensions and timestamps.

#![allow(clippy::cast_lossless)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::unreadable_literal)]
#![deny(missing_docs)]

#[macro_use]
extern crate err_derive;
#[macro_use]
extern crate itertools;

pub mod stabilize;

#[cfg(feature = "capi")]
mod capi;

#[cfg(feature = "capi")]
pub use capi::*;

/// Possible errors surfaced at the stabilizer boundary.
///
/// Internal algorithmic failures (tracking loss, degenerate estimation) are
/// never surfaced; they downgrade the affected frame to a pass-through.
/// This enum may be added to in the future and should not be assumed to be
/// exhaustive.
#[derive(Debug, Error)]
pub enum StabilizerError {
    /// Indicates the frame dimensions are outside the supported range.
    #[error(display = "Unsupported frame dimensions: {}", reason)]
    InvalidDimensions {
        #[doc(hidden)]
        reason: &'static str,
    },
    /// Indicates the input pixel format is not one of the supported formats.
    #[error(display = "Unsupported pixel format: {}", reason)]
    UnsupportedFormat {
        #[doc(hidden)]
        reason: &'static str,
    },
    /// Indicates `process_frame` was called before a successful `initialize`.
    #[error(display = "Stabilizer has not been initialized")]
    NotInitialized,
    /// Indicates a frame did not match the dimensions passed at initialize.
    #[error(display = "Frame does not match configured dimensions: {}", reason)]
    DimensionMismatch {
        #[doc(hidden)]
        reason: &'static str,
    },
    /// Indicates an input frame view that cannot be read safely.
    #[error(display = "Malformed input frame: {}", reason)]
    MalformedFrame {
        #[doc(hidden)]
        reason: &'static str,
    },
    /// Placeholder
    #[doc(hidden)]
    #[error(display = "Unreachable")]
    NonExhaustive,
}

#[cfg(test)]
#[inline(always)]
fn assert_close(expected: f32, value: f32, epsilon: f32) {
    assert!(
        (expected - value).abs() < epsilon,
        "Expected {}, got {}",
        expected,
        value
    );
}
