//! Pixel layouts, sample depths and owned pixel buffers.
//!
//! Typed views use `imgref::ImgRef` over pixels from the `rgb` crate.

pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb::{RGB8, RGBA8};

use crate::error::Result;
use crate::limits::Limits;

/// Arrangement of interleaved channels within one pixel.
///
/// The BGR variants exist because BMP and TGA store color pixels in that order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    Bgr,
    Bgra,
}

impl ChannelLayout {
    /// Number of interleaved samples per pixel.
    pub const fn channels(self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::GrayAlpha => 2,
            ChannelLayout::Rgb | ChannelLayout::Bgr => 3,
            ChannelLayout::Rgba | ChannelLayout::Bgra => 4,
        }
    }

    /// The RGB-ordered layout with `channels` samples (1..=4).
    pub const fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(ChannelLayout::Gray),
            2 => Some(ChannelLayout::GrayAlpha),
            3 => Some(ChannelLayout::Rgb),
            4 => Some(ChannelLayout::Rgba),
            _ => None,
        }
    }

    /// Same channels in RGB order.
    pub const fn rgb_ordered(self) -> Self {
        match self {
            ChannelLayout::Bgr => ChannelLayout::Rgb,
            ChannelLayout::Bgra => ChannelLayout::Rgba,
            other => other,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(
            self,
            ChannelLayout::GrayAlpha | ChannelLayout::Rgba | ChannelLayout::Bgra
        )
    }
}

/// Bits per sample of a decoded buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SampleDepth {
    #[default]
    Eight,
    Sixteen,
}

impl SampleDepth {
    pub const fn bits(self) -> u8 {
        match self {
            SampleDepth::Eight => 8,
            SampleDepth::Sixteen => 16,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            SampleDepth::Eight => 1,
            SampleDepth::Sixteen => 2,
        }
    }
}

/// Owned interleaved samples. Exactly one width is populated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelBuffer {
    /// Zeroed buffer of `len` samples at `depth`.
    pub(crate) fn zeroed(depth: SampleDepth, len: usize, limits: &Limits) -> Result<Self> {
        Ok(match depth {
            SampleDepth::Eight => PixelBuffer::U8(limits.alloc(len)?),
            SampleDepth::Sixteen => PixelBuffer::U16(limits.alloc(len)?),
        })
    }

    pub fn depth(&self) -> SampleDepth {
        match self {
            PixelBuffer::U8(_) => SampleDepth::Eight,
            PixelBuffer::U16(_) => SampleDepth::Sixteen,
        }
    }

    /// Number of samples (not bytes).
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            PixelBuffer::U8(v) => Some(v),
            PixelBuffer::U16(_) => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match self {
            PixelBuffer::U8(_) => None,
            PixelBuffer::U16(v) => Some(v),
        }
    }

    /// Convert to `depth`, allocating a new buffer when the width changes.
    ///
    /// Widening replicates the byte (`v * 257`) so 255 maps to 65535;
    /// narrowing keeps the high byte.
    pub fn into_depth(self, depth: SampleDepth) -> PixelBuffer {
        match (self, depth) {
            (PixelBuffer::U8(v), SampleDepth::Sixteen) => {
                PixelBuffer::U16(v.iter().map(|&s| widen(s)).collect())
            }
            (PixelBuffer::U16(v), SampleDepth::Eight) => {
                PixelBuffer::U8(v.iter().map(|&s| narrow(s)).collect())
            }
            (same, _) => same,
        }
    }
}

#[inline]
pub(crate) fn widen(sample: u8) -> u16 {
    u16::from(sample) * 257
}

#[inline]
pub(crate) fn narrow(sample: u16) -> u8 {
    (sample >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_channels() {
        assert_eq!(ChannelLayout::Bgra.channels(), 4);
        assert_eq!(ChannelLayout::from_channels(2), Some(ChannelLayout::GrayAlpha));
        assert_eq!(ChannelLayout::from_channels(5), None);
        assert!(!ChannelLayout::Bgr.has_alpha());
    }

    #[test]
    fn widen_and_narrow_extremes() {
        let wide = PixelBuffer::U8(vec![0, 128, 255]).into_depth(SampleDepth::Sixteen);
        assert_eq!(wide, PixelBuffer::U16(vec![0, 32896, 65535]));
        let back = wide.into_depth(SampleDepth::Eight);
        assert_eq!(back, PixelBuffer::U8(vec![0, 128, 255]));
    }

    #[test]
    fn same_depth_is_untouched() {
        let buf = PixelBuffer::U16(vec![1, 2, 3]);
        assert_eq!(buf.clone().into_depth(SampleDepth::Sixteen), buf);
    }
}
