//! Per-scanline channel conversion shared by every codec.
//!
//! [`convert_row`] reshapes one scanline from a source [`ChannelLayout`] into
//! an RGB-ordered target with 1 to 4 channels. [`Canvas`] owns the output
//! buffer of a decode and pushes each reconstructed row through the matrix,
//! changing sample depth on the way in if the caller asked for it.

use crate::error::Result;
use crate::limits::{Limits, checked_len};
use crate::pixel::{ChannelLayout, PixelBuffer, SampleDepth, narrow, widen};

/// Sample width the conversion matrix operates on.
pub(crate) trait Sample: Copy + Default {
    /// Fully opaque alpha.
    const OPAQUE: Self;

    /// Approximate luminance, weights 0.21 / 0.64 / 0.15.
    fn luma(r: Self, g: Self, b: Self) -> Self;
}

impl Sample for u8 {
    const OPAQUE: Self = u8::MAX;

    #[inline]
    fn luma(r: u8, g: u8, b: u8) -> u8 {
        ((u32::from(r) * 21 + u32::from(g) * 64 + u32::from(b) * 15) / 100) as u8
    }
}

impl Sample for u16 {
    const OPAQUE: Self = u16::MAX;

    #[inline]
    fn luma(r: u16, g: u16, b: u16) -> u16 {
        ((u32::from(r) * 21 + u32::from(g) * 64 + u32::from(b) * 15) / 100) as u16
    }
}

/// Convert one scanline of `source` pixels into `target` pixels.
///
/// `src` holds `width * source.channels()` samples and `dst` holds
/// `width * target.channels()`. `target` must be RGB-ordered.
pub(crate) fn convert_row<T: Sample>(
    source: ChannelLayout,
    target: ChannelLayout,
    src: &[T],
    dst: &mut [T],
) {
    let n = source.channels();
    let m = target.channels();
    debug_assert!(!matches!(target, ChannelLayout::Bgr | ChannelLayout::Bgra));
    debug_assert_eq!(src.len() / n, dst.len() / m);

    // BGR sources reuse the RGB rows with the red/blue offsets swapped.
    let (ri, bi) = match source {
        ChannelLayout::Bgr | ChannelLayout::Bgra => (2, 0),
        _ => (0, 2),
    };
    if source == target {
        dst.copy_from_slice(src);
        return;
    }

    let pixels = src.chunks_exact(n).zip(dst.chunks_exact_mut(m));
    match (n, m) {
        (1, 2) => pixels.for_each(|(s, d)| {
            d[0] = s[0];
            d[1] = T::OPAQUE;
        }),
        (1, 3) => pixels.for_each(|(s, d)| d.fill(s[0])),
        (1, 4) => pixels.for_each(|(s, d)| {
            d[..3].fill(s[0]);
            d[3] = T::OPAQUE;
        }),
        (2, 1) => pixels.for_each(|(s, d)| d[0] = s[0]),
        (2, 3) => pixels.for_each(|(s, d)| d.fill(s[0])),
        (2, 4) => pixels.for_each(|(s, d)| {
            d[..3].fill(s[0]);
            d[3] = s[1];
        }),
        (3, 1) => pixels.for_each(|(s, d)| d[0] = T::luma(s[ri], s[1], s[bi])),
        (3, 2) => pixels.for_each(|(s, d)| {
            d[0] = T::luma(s[ri], s[1], s[bi]);
            d[1] = T::OPAQUE;
        }),
        (3, 3) => pixels.for_each(|(s, d)| {
            d[0] = s[ri];
            d[1] = s[1];
            d[2] = s[bi];
        }),
        (3, 4) => pixels.for_each(|(s, d)| {
            d[0] = s[ri];
            d[1] = s[1];
            d[2] = s[bi];
            d[3] = T::OPAQUE;
        }),
        (4, 1) => pixels.for_each(|(s, d)| d[0] = T::luma(s[ri], s[1], s[bi])),
        (4, 2) => pixels.for_each(|(s, d)| {
            d[0] = T::luma(s[ri], s[1], s[bi]);
            d[1] = s[3];
        }),
        (4, 3) => pixels.for_each(|(s, d)| {
            d[0] = s[ri];
            d[1] = s[1];
            d[2] = s[bi];
        }),
        (4, 4) => pixels.for_each(|(s, d)| {
            d[0] = s[ri];
            d[1] = s[1];
            d[2] = s[bi];
            d[3] = s[3];
        }),
        // Remaining pairs are same-count RGB-ordered layouts, handled above.
        _ => dst.copy_from_slice(src),
    }
}

/// Output image under construction.
pub(crate) struct Canvas {
    width: usize,
    height: usize,
    source: ChannelLayout,
    target: ChannelLayout,
    pixels: PixelBuffer,
    scratch8: Vec<u8>,
    scratch16: Vec<u16>,
}

impl Canvas {
    pub(crate) fn new(
        width: u32,
        height: u32,
        source: ChannelLayout,
        target: ChannelLayout,
        depth: SampleDepth,
        limits: &Limits,
    ) -> Result<Self> {
        let (width, height) = (width as usize, height as usize);
        let len = checked_len(&[width, height, target.channels()])?;
        let pixels = PixelBuffer::zeroed(depth, len, limits)?;
        let scratch = checked_len(&[width, target.channels()])?;
        let (scratch8, scratch16) = match depth {
            SampleDepth::Eight => (Vec::new(), limits.alloc(scratch)?),
            SampleDepth::Sixteen => (limits.alloc(scratch)?, Vec::new()),
        };
        Ok(Self {
            width,
            height,
            source,
            target,
            pixels,
            scratch8,
            scratch16,
        })
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    /// Samples per output pixel.
    pub(crate) fn channels(&self) -> usize {
        self.target.channels()
    }

    /// Samples per output row.
    pub(crate) fn stride(&self) -> usize {
        self.width * self.target.channels()
    }

    /// Store row `y` given as 8-bit samples in the source layout.
    pub(crate) fn put_row_u8(&mut self, y: usize, row: &[u8]) {
        let stride = self.stride();
        let span = y * stride..(y + 1) * stride;
        let src = &row[..self.width * self.source.channels()];
        match &mut self.pixels {
            PixelBuffer::U8(out) => convert_row(self.source, self.target, src, &mut out[span]),
            PixelBuffer::U16(out) => {
                convert_row(self.source, self.target, src, &mut self.scratch8);
                for (d, &s) in out[span].iter_mut().zip(&self.scratch8) {
                    *d = widen(s);
                }
            }
        }
    }

    /// Store row `y` given as 16-bit samples in the source layout.
    pub(crate) fn put_row_u16(&mut self, y: usize, row: &[u16]) {
        let stride = self.stride();
        let span = y * stride..(y + 1) * stride;
        let src = &row[..self.width * self.source.channels()];
        match &mut self.pixels {
            PixelBuffer::U16(out) => convert_row(self.source, self.target, src, &mut out[span]),
            PixelBuffer::U8(out) => {
                convert_row(self.source, self.target, src, &mut self.scratch16);
                for (d, &s) in out[span].iter_mut().zip(&self.scratch16) {
                    *d = narrow(s);
                }
            }
        }
    }

    /// Copy every pixel of `part` to the position `place(x, y)` returns.
    ///
    /// Both canvases must share target layout and depth.
    pub(crate) fn scatter(&mut self, part: &Canvas, place: impl Fn(usize, usize) -> (usize, usize)) {
        let m = self.target.channels();
        debug_assert_eq!(m, part.target.channels());
        for y in 0..part.height {
            for x in 0..part.width {
                let (dx, dy) = place(x, y);
                let from = (y * part.width + x) * m;
                let to = (dy * self.width + dx) * m;
                match (&mut self.pixels, &part.pixels) {
                    (PixelBuffer::U8(d), PixelBuffer::U8(s)) => {
                        d[to..to + m].copy_from_slice(&s[from..from + m])
                    }
                    (PixelBuffer::U16(d), PixelBuffer::U16(s)) => {
                        d[to..to + m].copy_from_slice(&s[from..from + m])
                    }
                    _ => debug_assert!(false, "scatter across sample depths"),
                }
            }
        }
    }

    pub(crate) fn into_pixels(self) -> PixelBuffer {
        self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert8(source: ChannelLayout, target: ChannelLayout, src: &[u8]) -> Vec<u8> {
        let width = src.len() / source.channels();
        let mut dst = vec![0u8; width * target.channels()];
        convert_row(source, target, src, &mut dst);
        dst
    }

    #[test]
    fn gray_expands_with_opaque_alpha() {
        assert_eq!(
            convert8(ChannelLayout::Gray, ChannelLayout::Rgba, &[7, 9]),
            vec![7, 7, 7, 255, 9, 9, 9, 255]
        );
        assert_eq!(
            convert8(ChannelLayout::Gray, ChannelLayout::GrayAlpha, &[3]),
            vec![3, 255]
        );
    }

    #[test]
    fn sixteen_bit_alpha_is_full_range() {
        let mut dst = [0u16; 4];
        convert_row(ChannelLayout::Rgb, ChannelLayout::Rgba, &[1u16, 2, 3], &mut dst);
        assert_eq!(dst, [1, 2, 3, 65535]);
    }

    #[test]
    fn luminance_weights() {
        assert_eq!(convert8(ChannelLayout::Rgb, ChannelLayout::Gray, &[255, 255, 255]), vec![255]);
        assert_eq!(convert8(ChannelLayout::Rgb, ChannelLayout::Gray, &[255, 0, 0]), vec![53]);
        assert_eq!(convert8(ChannelLayout::Rgb, ChannelLayout::Gray, &[0, 255, 0]), vec![163]);
        assert_eq!(convert8(ChannelLayout::Rgb, ChannelLayout::Gray, &[0, 0, 255]), vec![38]);
        // floor(0.15 * 200)
        assert_eq!(convert8(ChannelLayout::Rgb, ChannelLayout::Gray, &[0, 0, 200]), vec![30]);
        assert_eq!(convert8(ChannelLayout::Bgra, ChannelLayout::Gray, &[200, 0, 0, 9]), vec![30]);
    }

    #[test]
    fn sixteen_bit_luminance_does_not_overflow() {
        let mut dst = [0u16; 1];
        convert_row(ChannelLayout::Rgb, ChannelLayout::Gray, &[65535u16, 65535, 65535], &mut dst);
        assert_eq!(dst, [65535]);
        convert_row(ChannelLayout::Rgb, ChannelLayout::Gray, &[0u16, 0, 1000], &mut dst);
        assert_eq!(dst, [150]);
    }

    #[test]
    fn bgr_sources_swap_red_and_blue() {
        assert_eq!(
            convert8(ChannelLayout::Bgr, ChannelLayout::Rgb, &[1, 2, 3]),
            vec![3, 2, 1]
        );
        assert_eq!(
            convert8(ChannelLayout::Bgra, ChannelLayout::Rgba, &[1, 2, 3, 4]),
            vec![3, 2, 1, 4]
        );
        assert_eq!(
            convert8(ChannelLayout::Bgr, ChannelLayout::Gray, &[0, 0, 255]),
            convert8(ChannelLayout::Rgb, ChannelLayout::Gray, &[255, 0, 0])
        );
    }

    #[test]
    fn alpha_is_dropped_or_kept() {
        assert_eq!(
            convert8(ChannelLayout::Rgba, ChannelLayout::Rgb, &[1, 2, 3, 4]),
            vec![1, 2, 3]
        );
        assert_eq!(
            convert8(ChannelLayout::GrayAlpha, ChannelLayout::Gray, &[8, 9]),
            vec![8]
        );
        assert_eq!(
            convert8(ChannelLayout::GrayAlpha, ChannelLayout::Rgba, &[8, 9]),
            vec![8, 8, 8, 9]
        );
    }

    #[test]
    fn canvas_widens_into_sixteen_bit() {
        let limits = Limits::none();
        let mut canvas = Canvas::new(
            2,
            1,
            ChannelLayout::Gray,
            ChannelLayout::GrayAlpha,
            SampleDepth::Sixteen,
            &limits,
        )
        .unwrap();
        canvas.put_row_u8(0, &[0, 255]);
        assert_eq!(
            canvas.into_pixels(),
            PixelBuffer::U16(vec![0, 65535, 65535, 65535])
        );
    }

    #[test]
    fn canvas_narrows_into_eight_bit() {
        let limits = Limits::none();
        let mut canvas = Canvas::new(
            1,
            2,
            ChannelLayout::Rgb,
            ChannelLayout::Rgb,
            SampleDepth::Eight,
            &limits,
        )
        .unwrap();
        canvas.put_row_u16(1, &[0x1234, 0xff00, 0x00ff]);
        assert_eq!(canvas.into_pixels(), PixelBuffer::U8(vec![0, 0, 0, 0x12, 0xff, 0x00]));
    }
}
