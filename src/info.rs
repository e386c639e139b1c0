//! Image metadata probing without full decode.

use crate::transport::Reader;
use crate::{CodecError, CodecRegistry, ImageFormat, Limits};

/// Header-level facts about an image; no pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Channels as stored in the file (1 to 4).
    pub channels: u8,
    pub format: ImageFormat,
}

impl ImageInfo {
    /// Whether the stored image carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        matches!(self.channels, 2 | 4)
    }
}

/// Probe image metadata without decoding pixels.
///
/// Uses format auto-detection and reads only the header. All compiled-in
/// codecs are attempted.
pub fn from_bytes(data: &[u8]) -> Result<ImageInfo, CodecError> {
    from_bytes_with_registry(data, &CodecRegistry::all())
}

/// Probe image metadata with a specific registry.
///
/// Only formats enabled in the registry will be attempted.
pub fn from_bytes_with_registry(
    data: &[u8],
    registry: &CodecRegistry,
) -> Result<ImageInfo, CodecError> {
    let mut reader = Reader::from_slice(data);
    let format = ImageFormat::detect_reader(&mut reader).ok_or(CodecError::UnrecognizedFormat)?;

    if !registry.can_decode(format) {
        return Err(CodecError::DisabledFormat(format));
    }

    read_info(&mut reader, format, &Limits::none())
}

/// Probe with a known format (skips auto-detection).
pub fn from_bytes_format(data: &[u8], format: ImageFormat) -> Result<ImageInfo, CodecError> {
    read_info(&mut Reader::from_slice(data), format, &Limits::none())
}

/// Dispatch to the format's header parser.
pub(crate) fn read_info(
    reader: &mut Reader<'_>,
    format: ImageFormat,
    limits: &Limits,
) -> Result<ImageInfo, CodecError> {
    match format {
        #[cfg(feature = "png")]
        ImageFormat::Png => crate::codecs::png::read_info(reader, limits),
        #[cfg(feature = "jpeg")]
        ImageFormat::Jpeg => crate::codecs::jpeg::read_info(reader, limits),
        #[cfg(feature = "bmp")]
        ImageFormat::Bmp => crate::codecs::bmp::read_info(reader, limits),
        #[cfg(feature = "tga")]
        ImageFormat::Tga => crate::codecs::tga::read_info(reader, limits),
        #[allow(unreachable_patterns)]
        _ => {
            let _ = (reader, limits);
            Err(CodecError::UnsupportedFormat(format))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_format() {
        let result = from_bytes(b"not an image");
        assert!(matches!(result, Err(CodecError::UnrecognizedFormat)));
    }

    #[cfg(feature = "jpeg")]
    #[test]
    fn disabled_format() {
        let jpeg_data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        let registry = CodecRegistry::none();

        let result = from_bytes_with_registry(&jpeg_data, &registry);
        assert!(matches!(result, Err(CodecError::DisabledFormat(_))));
    }

    #[cfg(feature = "tga")]
    #[test]
    fn header_only() {
        // 18-byte header, no pixel data at all.
        let mut tga = [0u8; 18];
        tga[2] = 2;
        tga[12] = 3;
        tga[14] = 2;
        tga[16] = 32;
        let info = from_bytes(&tga).unwrap();
        assert_eq!((info.width, info.height, info.channels), (3, 2, 4));
        assert!(info.has_alpha());
    }
}
