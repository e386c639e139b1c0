//! Image encoding.

use std::io;

use log::debug;

use crate::codecs::EncodeContext;
use crate::pixel::{ChannelLayout, ImgRef, RGB8, RGBA8};
use crate::registry::compiled_in;
use crate::transport::Writer;
use crate::{CodecError, CodecRegistry, ImageFormat, Limits, Stop, Unstoppable};

/// Encoded image output.
#[derive(Clone, Debug)]
pub struct EncodeOutput {
    /// Encoded image data.
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

/// Image encode request builder.
///
/// Pixels are interleaved 8-bit samples in RGB order with 1 to 4 channels.
///
/// # Example
///
/// ```no_run
/// use rastercodecs::{EncodeRequest, ImageFormat};
/// use rastercodecs::pixel::{ImgVec, RGBA8};
///
/// let pixels = ImgVec::new(vec![RGBA8::new(0, 0, 0, 255); 100 * 100], 100, 100);
/// let output = EncodeRequest::new(ImageFormat::Png).encode_rgba8(pixels.as_ref())?;
/// # Ok::<(), rastercodecs::CodecError>(())
/// ```
pub struct EncodeRequest<'a> {
    format: ImageFormat,
    limits: Option<&'a Limits>,
    stop: Option<&'a dyn Stop>,
    registry: Option<&'a CodecRegistry>,
}

impl<'a> EncodeRequest<'a> {
    /// Encode to a specific format.
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            limits: None,
            stop: None,
            registry: None,
        }
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set a cancellation token.
    pub fn with_stop(mut self, stop: &'a dyn Stop) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Set a codec registry to control which formats are enabled.
    pub fn with_registry(mut self, registry: &'a CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Encode into memory.
    ///
    /// `channels` of 0 infers the count from `pixels.len() / (width * height)`.
    pub fn encode(
        self,
        pixels: &[u8],
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<EncodeOutput, CodecError> {
        let format = self.format;
        let default_limits = Limits::none();
        let mut writer = Writer::to_memory_with_limits(self.limits.unwrap_or(&default_limits));
        self.write(&mut writer, pixels, width, height, channels)?;
        Ok(EncodeOutput {
            data: writer.finish()?,
            format,
        })
    }

    /// Encode into `sink`, flushing it at the end.
    pub fn encode_to(
        self,
        sink: &mut dyn io::Write,
        pixels: &[u8],
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<(), CodecError> {
        let mut writer = Writer::to_stream(sink);
        self.write(&mut writer, pixels, width, height, channels)?;
        writer.finish().map(|_| ())
    }

    /// Encode RGB8 pixels.
    pub fn encode_rgb8(self, img: ImgRef<'_, RGB8>) -> Result<EncodeOutput, CodecError> {
        let (buf, width, height) = img.to_contiguous_buf();
        self.encode(bytemuck::cast_slice::<RGB8, u8>(&buf), width as u32, height as u32, 3)
    }

    /// Encode RGBA8 pixels.
    pub fn encode_rgba8(self, img: ImgRef<'_, RGBA8>) -> Result<EncodeOutput, CodecError> {
        let (buf, width, height) = img.to_contiguous_buf();
        self.encode(bytemuck::cast_slice::<RGBA8, u8>(&buf), width as u32, height as u32, 4)
    }

    fn write(
        self,
        writer: &mut Writer<'_>,
        pixels: &[u8],
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<(), CodecError> {
        let format = self.format;
        let default_registry = CodecRegistry::all();
        let registry = self.registry.unwrap_or(&default_registry);
        if !compiled_in(format) {
            return Err(CodecError::UnsupportedFormat(format));
        }
        if !format.supports_encode() {
            return Err(CodecError::unsupported(format, "encoding"));
        }
        if !registry.can_encode(format) {
            return Err(CodecError::DisabledFormat(format));
        }

        let default_limits = Limits::none();
        let limits = self.limits.unwrap_or(&default_limits);
        limits.validate(width, height)?;
        let (layout, needed) = check_buffer(pixels.len(), width, height, channels)?;

        let ctx = EncodeContext {
            width,
            height,
            layout,
            pixels: &pixels[..needed],
            limits,
            stop: self.stop.unwrap_or(&Unstoppable),
        };
        debug!("encoding {width}x{height} {layout:?} as {format:?}");
        encode_format(writer, format, &ctx)
    }
}

/// Settle the channel count and the number of bytes the image occupies.
fn check_buffer(
    len: usize,
    width: u32,
    height: u32,
    channels: u8,
) -> Result<(ChannelLayout, usize), CodecError> {
    let area = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| CodecError::LimitExceeded("pixel count overflows usize".into()))?;
    let channels = if channels == 0 {
        if len % area != 0 {
            return Err(CodecError::InvalidInput(format!(
                "buffer of {len} bytes is not a whole number of {width}x{height} planes"
            )));
        }
        u8::try_from(len / area).unwrap_or(u8::MAX)
    } else {
        channels
    };
    let layout = ChannelLayout::from_channels(channels).ok_or_else(|| {
        CodecError::InvalidInput(format!("{channels} channels per pixel, expected 1 to 4"))
    })?;
    let needed = area * layout.channels();
    if len < needed {
        return Err(CodecError::InvalidInput(format!(
            "pixel buffer holds {len} bytes, {needed} needed"
        )));
    }
    Ok((layout, needed))
}

/// Dispatch to format-specific encoder.
fn encode_format(
    writer: &mut Writer<'_>,
    format: ImageFormat,
    ctx: &EncodeContext<'_>,
) -> Result<(), CodecError> {
    match format {
        #[cfg(feature = "png")]
        ImageFormat::Png => crate::codecs::png::encode(writer, ctx),
        #[cfg(feature = "bmp")]
        ImageFormat::Bmp => crate::codecs::bmp::encode(writer, ctx),
        #[cfg(feature = "tga")]
        ImageFormat::Tga => crate::codecs::tga::encode(writer, ctx),
        #[allow(unreachable_patterns)]
        _ => {
            let _ = (writer, ctx);
            Err(CodecError::UnsupportedFormat(format))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_pattern() {
        let registry = CodecRegistry::all();
        let request = EncodeRequest::new(ImageFormat::Tga).with_registry(&registry);
        assert_eq!(request.format, ImageFormat::Tga);
        assert!(request.registry.is_some());
    }

    #[cfg(feature = "jpeg")]
    #[test]
    fn jpeg_has_no_encoder() {
        let result = EncodeRequest::new(ImageFormat::Jpeg).encode(&[0; 3], 1, 1, 3);
        assert!(matches!(result, Err(CodecError::UnsupportedFeature { .. })));
    }

    #[cfg(feature = "bmp")]
    #[test]
    fn disabled_encoder() {
        let registry = CodecRegistry::all().with_encode(ImageFormat::Bmp, false);
        let result = EncodeRequest::new(ImageFormat::Bmp)
            .with_registry(&registry)
            .encode(&[0; 3], 1, 1, 3);
        assert!(matches!(result, Err(CodecError::DisabledFormat(_))));
    }

    #[test]
    fn channel_inference() {
        assert_eq!(check_buffer(24, 2, 3, 0).unwrap(), (ChannelLayout::Rgba, 24));
        assert_eq!(check_buffer(6, 2, 3, 0).unwrap(), (ChannelLayout::Gray, 6));
        assert!(matches!(check_buffer(7, 2, 3, 0), Err(CodecError::InvalidInput(_))));
        assert!(matches!(check_buffer(30, 2, 3, 0), Err(CodecError::InvalidInput(_))));
        assert!(matches!(check_buffer(12, 2, 3, 3), Err(CodecError::InvalidInput(_))));
        assert!(matches!(check_buffer(64, 2, 3, 5), Err(CodecError::InvalidInput(_))));
    }

    #[cfg(feature = "tga")]
    #[test]
    fn zero_dimensions_are_invalid() {
        let result = EncodeRequest::new(ImageFormat::Tga).encode(&[], 0, 4, 3);
        assert!(matches!(result, Err(CodecError::InvalidDimensions { .. })));
    }

    #[cfg(feature = "bmp")]
    #[test]
    fn memory_limit_covers_output() {
        let pixels = vec![7u8; 256 * 256 * 3];
        let limits = Limits::none().with_max_memory(1024);
        let result = EncodeRequest::new(ImageFormat::Bmp)
            .with_limits(&limits)
            .encode(&pixels, 256, 256, 3);
        assert!(matches!(result, Err(CodecError::LimitExceeded(_))));

        let limits = Limits::none().with_max_memory(256 * 1024);
        let output = EncodeRequest::new(ImageFormat::Bmp)
            .with_limits(&limits)
            .encode(&pixels, 256, 256, 3)
            .unwrap();
        assert_eq!(output.data.len(), 122 + 256 * 256 * 3);
    }

    #[cfg(feature = "png")]
    #[test]
    fn memory_limit_covers_row_buffers() {
        // 4096 RGBA samples per row cannot be staged under 1 KiB.
        let pixels = vec![0u8; 4096 * 4];
        let limits = Limits::none().with_max_memory(1024);
        let mut sink = Vec::new();
        let result = EncodeRequest::new(ImageFormat::Png)
            .with_limits(&limits)
            .encode_to(&mut sink, &pixels, 4096, 1, 4);
        assert!(matches!(result, Err(CodecError::LimitExceeded(_))));
    }

    #[cfg(feature = "tga")]
    #[test]
    fn encode_to_sink_matches_memory() {
        let pixels = [1u8, 2, 3, 4, 5, 6];
        let mut sink = Vec::new();
        EncodeRequest::new(ImageFormat::Tga)
            .encode_to(&mut sink, &pixels, 2, 1, 3)
            .unwrap();
        let memory = EncodeRequest::new(ImageFormat::Tga)
            .encode(&pixels, 2, 1, 3)
            .unwrap();
        assert_eq!(sink, memory.data);
    }
}
