//! Contains a trait and utilities for feeding whole clips through the
//! stabilizer.
//!
//! Currently, y4m decoding support using the `y4m` crate is built-in to
//! this crate. The trait is extensible so users may implement their own
//! decoders.

use crate::stabilize::plane::PlaneData;
use crate::stabilize::{FrameBuffer, Metrics, Params, PixelFormat, StabilizerCore};
use crate::StabilizerError;

/// A trait for sources of decoded 8-bit video frames.
pub trait Decoder: Send {
    /// Video dimensions in pixels (width, height).
    fn dimensions(&self) -> (usize, usize);

    /// Nominal frame duration in nanoseconds, used to synthesize
    /// monotonic timestamps.
    fn frame_interval_ns(&self) -> u64;

    /// Read the next frame from the input video.
    ///
    /// Returns `None` at the end of the video or when a frame cannot be
    /// decoded.
    fn read_video_frame(&mut self) -> Option<FrameBuffer>;
}

/// Runs an entire clip through a freshly initialized stabilizer and returns
/// the final metrics.
///
/// Optionally, `frame_limit` can be set to only process the first
/// `frame_limit` frames of the video.
pub fn stabilize_video<D: Decoder>(
    decoder: &mut D,
    params: Params,
    frame_limit: Option<usize>,
) -> Result<Metrics, StabilizerError> {
    let (width, height) = decoder.dimensions();
    let mut core = StabilizerCore::new();
    core.initialize(width, height, params)?;

    let interval = decoder.frame_interval_ns();
    let mut frame_no = 0u64;
    loop {
        if let Some(limit) = frame_limit {
            if frame_no as usize >= limit {
                break;
            }
        }
        let mut frame = match decoder.read_video_frame() {
            Some(frame) => frame,
            None => break,
        };
        frame.timestamp_ns = frame_no * interval;
        core.process_frame(&frame.as_view())?;
        frame_no += 1;
    }

    Ok(core.metrics())
}

#[cfg(feature = "y4m-decode")]
impl<R: std::io::Read + Send> Decoder for y4m::Decoder<'_, R> {
    fn dimensions(&self) -> (usize, usize) {
        (self.get_width(), self.get_height())
    }

    fn frame_interval_ns(&self) -> u64 {
        let framerate = self.get_framerate();
        if framerate.num == 0 {
            return 33_333_333;
        }
        1_000_000_000u64 * framerate.den as u64 / framerate.num as u64
    }

    fn read_video_frame(&mut self) -> Option<FrameBuffer> {
        // The stabilizer operates on 8-bit 4:2:0 video.
        if self.get_bit_depth() != 8 {
            return None;
        }
        match self.get_colorspace() {
            y4m::Colorspace::C420
            | y4m::Colorspace::C420jpeg
            | y4m::Colorspace::C420paldv
            | y4m::Colorspace::C420mpeg2 => {}
            _ => return None,
        }
        let width = self.get_width();
        let height = self.get_height();
        let chroma_width = (width + 1) / 2;
        let chroma_height = (height + 1) / 2;

        self.read_frame().ok().map(|frame| {
            let mut y = PlaneData::new(width, height);
            let mut u = PlaneData::new(chroma_width, chroma_height);
            let mut v = PlaneData::new(chroma_width, chroma_height);
            y.copy_from_raw_u8(frame.get_y_plane(), width, 1);
            u.copy_from_raw_u8(frame.get_u_plane(), chroma_width, 1);
            v.copy_from_raw_u8(frame.get_v_plane(), chroma_width, 1);

            FrameBuffer {
                width,
                height,
                format: PixelFormat::I420,
                planes: [y, u, v, PlaneData::default()],
                timestamp_ns: 0,
            }
        })
    }
}
