//! Owned, tightly-packed image planes.
//!
//! All stabilizer algorithms operate on `PlaneData`, which stores pixels in
//! row-major order with no padding. Strided host memory is ingested through
//! `copy_from_raw_u8`, which also handles widening 16-bit little-endian
//! samples for high-bit-depth video.

use crate::stabilize::pixel::{CastFromPrimitive, Pixel};
use num_traits::AsPrimitive;

/// Contains the data for one plane of a video frame.
///
/// For chroma planes this data is stored in the original chroma sampling,
/// e.g. for 4:2:0 video the chroma planes have half the resolution of the
/// luma plane in each dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneData<T: Pixel> {
    /// The width, in pixels, of this plane.
    pub width: usize,
    /// The height, in pixels, of this plane.
    pub height: usize,
    /// The plane's pixels, in row-major order with no padding.
    pub data: Vec<T>,
}

impl<T: Pixel> Default for PlaneData<T> {
    fn default() -> Self {
        PlaneData::new(0, 0)
    }
}

impl<T: Pixel> PlaneData<T> {
    /// Creates a zero-filled plane of the given dimensions.
    pub fn new(width: usize, height: usize) -> Self {
        PlaneData {
            width,
            height,
            data: vec![T::zero(); width * height],
        }
    }

    /// Copies pixel data from a raw byte buffer with the given row stride.
    ///
    /// `source_bytewidth` is 1 for 8-bit sources and 2 for little-endian
    /// 16-bit sources. The source must contain at least `height` rows of
    /// `stride` bytes each.
    pub fn copy_from_raw_u8(&mut self, source: &[u8], source_stride: usize, source_bytewidth: usize) {
        for (y, row) in self.data.chunks_mut(self.width).enumerate() {
            let in_row = &source[y * source_stride..];
            match source_bytewidth {
                1 => {
                    for (out, input) in row.iter_mut().zip(in_row.iter().take(self.width)) {
                        *out = T::cast_from(*input);
                    }
                }
                2 => {
                    for (x, out) in row.iter_mut().enumerate() {
                        *out = T::cast_from(
                            u16::cast_from(in_row[x * 2 + 1]) << 8 | u16::cast_from(in_row[x * 2]),
                        );
                    }
                }
                _ => unreachable!("unsupported sample byte width"),
            }
        }
    }

    /// Returns one row of the plane.
    #[inline(always)]
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Returns the pixel at the given coordinates. Panics when out of bounds.
    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    /// Returns the pixel at the given coordinates as `f32`, clamping the
    /// coordinates to the plane bounds.
    #[inline(always)]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.max(0).min(self.width as isize - 1) as usize;
        let y = y.max(0).min(self.height as isize - 1) as usize;
        self.get(x, y).as_()
    }

    /// Samples the plane at a sub-pixel position with bilinear interpolation.
    /// Coordinates outside the plane are clamped to the nearest edge pixel.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let x0 = x0 as isize;
        let y0 = y0 as isize;

        let p00 = self.get_clamped(x0, y0);
        let p10 = self.get_clamped(x0 + 1, y0);
        let p01 = self.get_clamped(x0, y0 + 1);
        let p11 = self.get_clamped(x0 + 1, y0 + 1);

        let top = p00 + (p10 - p00) * fx;
        let bottom = p01 + (p11 - p01) * fx;
        top + (bottom - top) * fy
    }

    /// Downsamples the plane to half resolution with a 2x2 box filter.
    /// Used to build tracking pyramids.
    pub fn half_resolution(&self) -> PlaneData<T> {
        let out_w = (self.width / 2).max(1);
        let out_h = (self.height / 2).max(1);
        let mut out = PlaneData::new(out_w, out_h);
        for y in 0..out_h {
            let sy = (y * 2).min(self.height - 1);
            let sy1 = (y * 2 + 1).min(self.height - 1);
            for x in 0..out_w {
                let sx = (x * 2).min(self.width - 1);
                let sx1 = (x * 2 + 1).min(self.width - 1);
                let sum = u32::cast_from(self.get(sx, sy))
                    + u32::cast_from(self.get(sx1, sy))
                    + u32::cast_from(self.get(sx, sy1))
                    + u32::cast_from(self.get(sx1, sy1));
                out.data[y * out_w + x] = T::cast_from((sum + 2) >> 2);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_from_raw_u8_respects_stride() {
        let source = [1u8, 2, 3, 0xFF, 4, 5, 6, 0xFF];
        let mut plane: PlaneData<u8> = PlaneData::new(3, 2);
        plane.copy_from_raw_u8(&source, 4, 1);
        assert_eq!(plane.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let mut plane: PlaneData<u8> = PlaneData::new(2, 2);
        plane.data = vec![0, 100, 0, 100];
        crate::assert_close(50.0, plane.sample_bilinear(0.5, 0.5), 1e-4);
        crate::assert_close(0.0, plane.sample_bilinear(0.0, 0.0), 1e-4);
        crate::assert_close(100.0, plane.sample_bilinear(1.0, 1.0), 1e-4);
    }

    #[test]
    fn bilinear_clamps_at_edges() {
        let mut plane: PlaneData<u8> = PlaneData::new(2, 1);
        plane.data = vec![10, 20];
        crate::assert_close(10.0, plane.sample_bilinear(-5.0, 0.0), 1e-4);
        crate::assert_close(20.0, plane.sample_bilinear(9.0, 3.0), 1e-4);
    }

    #[test]
    fn half_resolution_averages_quads() {
        let mut plane: PlaneData<u8> = PlaneData::new(4, 4);
        plane.data = vec![
            10, 10, 20, 20, //
            10, 10, 20, 20, //
            30, 30, 40, 40, //
            30, 30, 40, 40,
        ];
        let half = plane.half_resolution();
        assert_eq!(half.width, 2);
        assert_eq!(half.height, 2);
        assert_eq!(half.data, vec![10, 20, 30, 40]);
    }
}
