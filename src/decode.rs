//! Image decoding.

use log::debug;

use crate::codecs::DecodeContext;
use crate::convert::Canvas;
use crate::pixel::{ChannelLayout, ImgRef, PixelBuffer, RGB8, RGBA8, SampleDepth};
use crate::transport::{Reader, Stream};
use crate::{CodecError, CodecRegistry, ImageFormat, ImageInfo, Limits, Stop, Unstoppable};

/// Decoded image output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeOutput {
    pub width: u32,
    pub height: u32,
    /// Channels per pixel in `pixels` (1 to 4, RGB-ordered).
    pub channels: u8,
    pub depth: SampleDepth,
    /// Channels as stored in the file.
    pub source_channels: u8,
    pub format: ImageFormat,
    pub pixels: PixelBuffer,
}

impl DecodeOutput {
    pub(crate) fn from_canvas(format: ImageFormat, source_channels: usize, canvas: Canvas) -> Self {
        let (width, height, channels) = (canvas.width(), canvas.height(), canvas.channels());
        let pixels = canvas.into_pixels();
        Self {
            width: width as u32,
            height: height as u32,
            channels: channels as u8,
            depth: pixels.depth(),
            source_channels: source_channels as u8,
            format,
            pixels,
        }
    }

    /// Header facts of the decoded image.
    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            width: self.width,
            height: self.height,
            channels: self.source_channels,
            format: self.format,
        }
    }

    fn view<T: bytemuck::Pod>(&self, channels: u8) -> Option<ImgRef<'_, T>> {
        if self.channels != channels {
            return None;
        }
        let samples = bytemuck::try_cast_slice(self.pixels.as_u8()?).ok()?;
        Some(ImgRef::new(samples, self.width as usize, self.height as usize))
    }

    /// Typed view of 8-bit single-channel output.
    pub fn as_gray8(&self) -> Option<ImgRef<'_, u8>> {
        self.view(1)
    }

    /// Typed view of 8-bit RGB output.
    pub fn as_rgb8(&self) -> Option<ImgRef<'_, RGB8>> {
        self.view(3)
    }

    /// Typed view of 8-bit RGBA output.
    pub fn as_rgba8(&self) -> Option<ImgRef<'_, RGBA8>> {
        self.view(4)
    }

    /// Convert the samples to `depth`; see [`PixelBuffer::into_depth`].
    pub fn into_depth(self, depth: SampleDepth) -> Self {
        Self {
            depth,
            pixels: self.pixels.into_depth(depth),
            ..self
        }
    }
}

enum Source<'a> {
    Memory(&'a [u8]),
    Stream(&'a mut dyn Stream),
}

/// Image decode request builder.
///
/// # Example
///
/// ```no_run
/// use rastercodecs::DecodeRequest;
///
/// let data: &[u8] = &[]; // your image bytes
/// let output = DecodeRequest::new(data).with_channels(4).decode()?;
/// println!("{}x{}", output.width, output.height);
/// # Ok::<(), rastercodecs::CodecError>(())
/// ```
pub struct DecodeRequest<'a> {
    source: Source<'a>,
    format: Option<ImageFormat>,
    channels: u8,
    depth: Option<SampleDepth>,
    limits: Option<&'a Limits>,
    stop: Option<&'a dyn Stop>,
    registry: Option<&'a CodecRegistry>,
}

impl<'a> DecodeRequest<'a> {
    /// Decode from memory.
    ///
    /// Format will be auto-detected from the leading bytes and the decoder
    /// keeps the source channel count and sample depth.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_source(Source::Memory(data))
    }

    /// Decode from a pull-based stream, buffered internally.
    pub fn from_stream(stream: &'a mut dyn Stream) -> Self {
        Self::with_source(Source::Stream(stream))
    }

    fn with_source(source: Source<'a>) -> Self {
        Self {
            source,
            format: None,
            channels: 0,
            depth: None,
            limits: None,
            stop: None,
            registry: None,
        }
    }

    /// Override format auto-detection.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Request 1 to 4 output channels; 0 keeps the source count.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    /// Request an output sample depth instead of the source's.
    pub fn with_depth(mut self, depth: SampleDepth) -> Self {
        self.depth = Some(depth);
        self
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

    /// Decode the image to pixels.
    pub fn decode(self) -> Result<DecodeOutput, CodecError> {
        let channels = match self.channels {
            0 => None,
            n => Some(ChannelLayout::from_channels(n).ok_or_else(|| {
                CodecError::InvalidInput(format!(
                    "requested {n} channels, at most 4 are supported"
                ))
            })?),
        };
        let default_limits = Limits::none();
        let ctx = DecodeContext {
            channels,
            depth: self.depth,
            limits: self.limits.unwrap_or(&default_limits),
            stop: self.stop.unwrap_or(&Unstoppable),
        };
        let (mut reader, format) = self.open()?;
        debug!("decoding {format:?}");
        decode_format(&mut reader, format, &ctx)
    }

    /// Read only the header.
    pub fn info(self) -> Result<ImageInfo, CodecError> {
        let default_limits = Limits::none();
        let limits = self.limits.unwrap_or(&default_limits);
        let (mut reader, format) = self.open()?;
        crate::info::read_info(&mut reader, format, limits)
    }

    /// Build the reader and settle the format.
    fn open(self) -> Result<(Reader<'a>, ImageFormat), CodecError> {
        let default_registry = CodecRegistry::all();
        let registry = self.registry.unwrap_or(&default_registry);

        let mut reader = match self.source {
            Source::Memory(data) => Reader::from_slice(data),
            Source::Stream(stream) => Reader::from_stream(stream),
        };
        let format = match self.format {
            Some(f) => f,
            None => match ImageFormat::detect_reader(&mut reader) {
                Some(f) => f,
                None => {
                    // A dead transport is reported as such, not as garbage.
                    reader.check()?;
                    return Err(CodecError::UnrecognizedFormat);
                }
            },
        };

        if !registry.can_decode(format) {
            return Err(CodecError::DisabledFormat(format));
        }
        Ok((reader, format))
    }
}

/// Dispatch to format-specific decoder.
fn decode_format(
    reader: &mut Reader<'_>,
    format: ImageFormat,
    ctx: &DecodeContext<'_>,
) -> Result<DecodeOutput, CodecError> {
    match format {
        #[cfg(feature = "png")]
        ImageFormat::Png => crate::codecs::png::decode(reader, ctx),
        #[cfg(feature = "jpeg")]
        ImageFormat::Jpeg => crate::codecs::jpeg::decode(reader, ctx),
        #[cfg(feature = "bmp")]
        ImageFormat::Bmp => crate::codecs::bmp::decode(reader, ctx),
        #[cfg(feature = "tga")]
        ImageFormat::Tga => crate::codecs::tga::decode(reader, ctx),
        #[allow(unreachable_patterns)]
        _ => {
            let _ = (reader, ctx);
            Err(CodecError::UnsupportedFormat(format))
        }
    }
}
