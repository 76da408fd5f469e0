//! Boundary conversion between host frame views and owned planes.
//!
//! Extracts a single-channel luma image from any supported input layout,
//! validates frame geometry, and assembles the stabilized output frame in
//! the input's own pixel layout.

use crate::stabilize::plane::PlaneData;
use crate::stabilize::transform::Transform;
use crate::stabilize::warp::{
    chroma_sampling_transform, warp_interleaved, warp_plane,
};
use crate::stabilize::{plane_dimensions, EdgeMode, FrameBuffer, FrameView, PixelFormat};
use crate::StabilizerError;

/// BT.601 luma weights for packed RGB input, scaled by 2^16 for integer
/// arithmetic.
const LUMA_R: u32 = 19595;
const LUMA_G: u32 = 38470;
const LUMA_B: u32 = 7471;

/// Neutral chroma fill for padded regions; chroma black is mid-range.
const CHROMA_FILL: f32 = 128.0;
/// Padded packed pixels stay opaque.
const PACKED_FILL: [f32; 4] = [0.0, 0.0, 0.0, 255.0];

/// Checks that every plane the format requires is present, large enough and
/// at least as wide as one row of samples.
pub(crate) fn validate_frame(view: &FrameView<'_>) -> Result<(), StabilizerError> {
    let dims = plane_dimensions(view.format, view.width, view.height);
    for (i, &(plane_width, plane_height)) in dims.iter().enumerate() {
        if plane_width == 0 {
            continue;
        }
        if view.planes[i].is_empty() {
            return Err(StabilizerError::MalformedFrame {
                reason: "required plane is missing",
            });
        }
        if view.strides[i] < plane_width {
            return Err(StabilizerError::MalformedFrame {
                reason: "plane stride is smaller than the row width",
            });
        }
        let required = view.strides[i] * (plane_height - 1) + plane_width;
        if view.planes[i].len() < required {
            return Err(StabilizerError::MalformedFrame {
                reason: "plane buffer is too small for the frame geometry",
            });
        }
    }
    Ok(())
}

/// Extracts the luma channel of a validated frame into `dst`.
///
/// Planar formats copy the Y plane; packed formats derive luminance with
/// BT.601 weights.
pub(crate) fn extract_luma(view: &FrameView<'_>, dst: &mut PlaneData<u8>) {
    debug_assert_eq!(dst.width, view.width);
    debug_assert_eq!(dst.height, view.height);

    match view.format {
        PixelFormat::I420 | PixelFormat::Nv12 => {
            dst.copy_from_raw_u8(view.planes[0], view.strides[0], 1);
        }
        PixelFormat::Bgra | PixelFormat::Rgba => {
            let (r_off, g_off, b_off) = view.format.rgb_offsets();
            let width = view.width;
            for (out_row, in_row) in izip!(
                dst.data.chunks_mut(width),
                view.planes[0].chunks(view.strides[0])
            ) {
                for (out, pixel) in out_row.iter_mut().zip(in_row.chunks(4).take(width)) {
                    let weighted = LUMA_R * u32::from(pixel[r_off])
                        + LUMA_G * u32::from(pixel[g_off])
                        + LUMA_B * u32::from(pixel[b_off]);
                    *out = ((weighted + (1 << 15)) >> 16) as u8;
                }
            }
        }
    }
}

/// Resizes the output frame's planes for the given geometry. A no-op once
/// the frame is already shaped correctly.
pub(crate) fn ensure_output(out: &mut FrameBuffer, format: PixelFormat, width: usize, height: usize) {
    let dims = plane_dimensions(format, width, height);
    if out.format == format && out.width == width && out.height == height {
        return;
    }
    out.format = format;
    out.width = width;
    out.height = height;
    for (plane, &(plane_width, plane_height)) in out.planes.iter_mut().zip(dims.iter()) {
        *plane = PlaneData::new(plane_width, plane_height);
    }
}

/// Scratch planes for staging strided host chroma/packed data before
/// warping. Owned by the core so steady-state frames allocate nothing.
#[derive(Default)]
pub(crate) struct AdapterScratch {
    planes: [PlaneData<u8>; 2],
}

impl AdapterScratch {
    fn ensure(&mut self, dims: &[(usize, usize)]) {
        for (plane, &(width, height)) in self.planes.iter_mut().zip(dims.iter()) {
            if plane.width != width || plane.height != height {
                *plane = PlaneData::new(width, height);
            }
        }
    }
}

/// Copies the input frame into the output buffer unchanged (stride
/// normalization aside). Used for pass-through frames.
pub(crate) fn copy_frame(view: &FrameView<'_>, out: &mut FrameBuffer) {
    ensure_output(out, view.format, view.width, view.height);
    out.timestamp_ns = view.timestamp_ns;
    for (i, plane) in out.planes.iter_mut().enumerate() {
        if plane.width > 0 {
            plane.copy_from_raw_u8(view.planes[i], view.strides[i], 1);
        }
    }
}

/// Assembles the stabilized output frame.
///
/// The luma plane is warped from the already-extracted `luma` image; chroma
/// planes are warped from the input view with translation scaled to chroma
/// resolution; packed formats warp the packed data directly.
pub(crate) fn compose_output(
    view: &FrameView<'_>,
    luma: &PlaneData<u8>,
    sampling: &Transform,
    edge: EdgeMode,
    scratch: &mut AdapterScratch,
    out: &mut FrameBuffer,
) {
    ensure_output(out, view.format, view.width, view.height);
    out.timestamp_ns = view.timestamp_ns;

    let dims = plane_dimensions(view.format, view.width, view.height);
    match view.format {
        PixelFormat::I420 => {
            warp_plane(luma, &mut out.planes[0], sampling, edge, 0.0);
            let chroma_sampling = chroma_sampling_transform(sampling);
            scratch.ensure(&dims[1..3]);
            for i in 0..2 {
                scratch.planes[i].copy_from_raw_u8(view.planes[i + 1], view.strides[i + 1], 1);
                warp_plane(
                    &scratch.planes[i],
                    &mut out.planes[i + 1],
                    &chroma_sampling,
                    edge,
                    CHROMA_FILL,
                );
            }
        }
        PixelFormat::Nv12 => {
            warp_plane(luma, &mut out.planes[0], sampling, edge, 0.0);
            let chroma_sampling = chroma_sampling_transform(sampling);
            scratch.ensure(&dims[1..2]);
            scratch.planes[0].copy_from_raw_u8(view.planes[1], view.strides[1], 1);
            warp_interleaved(
                &scratch.planes[0],
                &mut out.planes[1],
                2,
                &chroma_sampling,
                edge,
                &[CHROMA_FILL, CHROMA_FILL],
            );
        }
        PixelFormat::Bgra | PixelFormat::Rgba => {
            scratch.ensure(&dims[..1]);
            scratch.planes[0].copy_from_raw_u8(view.planes[0], view.strides[0], 1);
            warp_interleaved(
                &scratch.planes[0],
                &mut out.planes[0],
                4,
                sampling,
                edge,
                &PACKED_FILL,
            );
        }
    }
}
