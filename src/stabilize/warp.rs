//! Correction warping with configurable boundary policy.
//!
//! The warp is an inverse mapping: every output pixel is mapped through the
//! sampling transform into the source image and bilinearly interpolated.
//! Pixels that land outside the source are resolved by the edge mode:
//! replicated edge pixels for `Crop` and `Scale`, a fill value for `Pad`.

use crate::stabilize::pixel::{CastFromPrimitive, Pixel};
use crate::stabilize::plane::PlaneData;
use crate::stabilize::transform::Transform;
use crate::stabilize::EdgeMode;
use num_traits::AsPrimitive;

/// Extra zoom applied in `Scale` mode so the valid region covers the output.
pub const SCALE_MARGIN: f32 = 0.05;

/// Computes the sampling transform (output position to source position) for
/// a correction under the given edge mode.
///
/// Returns `None` when the correction is not invertible; the caller treats
/// that as a warp failure and passes the frame through unchanged.
pub fn sampling_transform(
    correction: &Transform,
    edge: EdgeMode,
    width: f32,
    height: f32,
) -> Option<Transform> {
    let inverse = correction.invert()?;
    match edge {
        EdgeMode::Crop | EdgeMode::Pad => Some(inverse),
        EdgeMode::Scale => {
            let zoom = zoom_about_center(1.0 + SCALE_MARGIN, width * 0.5, height * 0.5);
            let inv_zoom = zoom.invert()?;
            // Output = zoom(corrected input), so sampling inverts the zoom
            // first and the correction second.
            Some(inv_zoom.then(&inverse))
        }
    }
}

fn zoom_about_center(factor: f32, cx: f32, cy: f32) -> Transform {
    Transform {
        a: factor,
        b: 0.0,
        tx: cx * (1.0 - factor),
        c: 0.0,
        d: factor,
        ty: cy * (1.0 - factor),
    }
}

/// Halves the translation of a sampling transform for use on a plane with
/// half the spatial resolution (4:2:0 chroma). The linear part is unchanged.
pub fn chroma_sampling_transform(sampling: &Transform) -> Transform {
    Transform {
        tx: sampling.tx * 0.5,
        ty: sampling.ty * 0.5,
        ..*sampling
    }
}

#[inline]
fn outside(x: f32, y: f32, width: usize, height: usize) -> bool {
    x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32
}

/// Warps a single-channel plane. `fill` is used for out-of-source pixels in
/// `Pad` mode; other modes replicate the nearest edge pixel.
pub fn warp_plane<T: Pixel>(
    src: &PlaneData<T>,
    dst: &mut PlaneData<T>,
    sampling: &Transform,
    edge: EdgeMode,
    fill: f32,
) {
    debug_assert_eq!(src.width, dst.width);
    debug_assert_eq!(src.height, dst.height);
    let pad = edge == EdgeMode::Pad;
    let max = T::sample_max() as f32;

    for y in 0..dst.height {
        let row = y as f32;
        for x in 0..dst.width {
            let (sx, sy) = sampling.apply(x as f32, row);
            let value = if pad && outside(sx, sy, src.width, src.height) {
                fill
            } else {
                src.sample_bilinear(sx, sy)
            };
            dst.data[y * dst.width + x] = T::cast_from(value.max(0.0).min(max).round() as u32);
        }
    }
}

/// Warps a channel-interleaved plane (NV12 chroma pairs, packed BGRA/RGBA).
///
/// `src.width` must be `channels` times the logical pixel width. `fill`
/// supplies one out-of-source value per channel for `Pad` mode.
pub fn warp_interleaved<T: Pixel>(
    src: &PlaneData<T>,
    dst: &mut PlaneData<T>,
    channels: usize,
    sampling: &Transform,
    edge: EdgeMode,
    fill: &[f32],
) {
    debug_assert_eq!(src.width, dst.width);
    debug_assert_eq!(src.height, dst.height);
    debug_assert_eq!(src.width % channels, 0);
    debug_assert_eq!(fill.len(), channels);

    let logical_width = src.width / channels;
    let pad = edge == EdgeMode::Pad;
    let max = T::sample_max() as f32;

    for y in 0..dst.height {
        let row = y as f32;
        for x in 0..logical_width {
            let (sx, sy) = sampling.apply(x as f32, row);
            let out_base = y * dst.width + x * channels;
            if pad && outside(sx, sy, logical_width, src.height) {
                for ch in 0..channels {
                    dst.data[out_base + ch] =
                        T::cast_from(fill[ch].max(0.0).min(max).round() as u32);
                }
                continue;
            }
            for ch in 0..channels {
                let value = sample_channel(src, logical_width, channels, ch, sx, sy);
                dst.data[out_base + ch] = T::cast_from(value.max(0.0).min(max).round() as u32);
            }
        }
    }
}

/// Bilinear sample of one channel in an interleaved plane, clamping
/// coordinates to the logical pixel bounds.
fn sample_channel<T: Pixel>(
    plane: &PlaneData<T>,
    logical_width: usize,
    channels: usize,
    channel: usize,
    x: f32,
    y: f32,
) -> f32 {
    let fetch = |px: isize, py: isize| -> f32 {
        let px = px.max(0).min(logical_width as isize - 1) as usize;
        let py = py.max(0).min(plane.height as isize - 1) as usize;
        plane.data[py * plane.width + px * channels + channel].as_()
    };

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as isize;
    let y0 = y0 as isize;

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let top = p00 + (p10 - p00) * fx;
    let bottom = p01 + (p11 - p01) * fx;
    top + (bottom - top) * fy
}
