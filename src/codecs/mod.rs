//! Format-specific codec implementations.
//!
//! Each module owns its header parsing and entropy/filter decoding and talks
//! to the rest of the crate only through [`Reader`](crate::transport::Reader),
//! [`Writer`](crate::transport::Writer), and the conversion [`Canvas`](crate::convert::Canvas).

use enough::Stop;

use crate::error::{CodecError, Result};
use crate::limits::Limits;
use crate::pixel::{ChannelLayout, SampleDepth};

#[cfg(feature = "png")]
pub(crate) mod png;

#[cfg(feature = "jpeg")]
pub(crate) mod jpeg;

#[cfg(feature = "bmp")]
pub(crate) mod bmp;

#[cfg(feature = "tga")]
pub(crate) mod tga;

/// Per-call decode settings handed to every codec.
pub(crate) struct DecodeContext<'a> {
    /// Requested output layout; `None` keeps the source channels.
    pub channels: Option<ChannelLayout>,
    /// Requested sample depth; `None` keeps the source depth.
    pub depth: Option<SampleDepth>,
    pub limits: &'a Limits,
    pub stop: &'a dyn Stop,
}

impl DecodeContext<'_> {
    /// Output layout for an image stored as `source`.
    pub(crate) fn target_layout(&self, source: ChannelLayout) -> ChannelLayout {
        self.channels.unwrap_or(source.rgb_ordered())
    }

    /// Output depth for an image natively stored at `native`.
    pub(crate) fn depth_for(&self, native: SampleDepth) -> SampleDepth {
        self.depth.unwrap_or(native)
    }

    pub(crate) fn check_stop(&self) -> Result<()> {
        self.stop.check().map_err(CodecError::from)
    }
}

/// Per-call encode settings handed to every encoder.
pub(crate) struct EncodeContext<'a> {
    pub width: u32,
    pub height: u32,
    /// Layout of `pixels`, always RGB-ordered.
    pub layout: ChannelLayout,
    pub pixels: &'a [u8],
    pub limits: &'a Limits,
    pub stop: &'a dyn Stop,
}

impl EncodeContext<'_> {
    /// Samples in one input row.
    pub(crate) fn stride(&self) -> usize {
        self.width as usize * self.layout.channels()
    }

    /// Input row `y`.
    pub(crate) fn row(&self, y: usize) -> &[u8] {
        let stride = self.stride();
        &self.pixels[y * stride..(y + 1) * stride]
    }

    pub(crate) fn check_stop(&self) -> Result<()> {
        self.stop.check().map_err(CodecError::from)
    }
}
