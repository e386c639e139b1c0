//! Image format detection and metadata.

use crate::transport::Reader;

/// Supported image formats.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Bmp,
    Tga,
}

impl ImageFormat {
    /// Order in which detection probes run. TGA has no signature, so it
    /// goes last.
    pub const DETECT_ORDER: [ImageFormat; 4] = [
        ImageFormat::Png,
        ImageFormat::Bmp,
        ImageFormat::Jpeg,
        ImageFormat::Tga,
    ];

    /// Detect format from leading bytes. Returns None if unrecognized.
    pub fn detect(data: &[u8]) -> Option<Self> {
        Self::detect_reader(&mut Reader::from_slice(data))
    }

    /// Run each compiled-in probe against `reader` in [`Self::DETECT_ORDER`].
    ///
    /// Every probe rewinds the reader, so it is positioned at byte 0 again
    /// on return whatever the outcome.
    pub fn detect_reader(reader: &mut Reader<'_>) -> Option<Self> {
        Self::DETECT_ORDER
            .into_iter()
            .find(|&format| format.probe(reader))
    }

    /// Whether this format's probe accepts the reader's contents.
    pub fn probe(self, reader: &mut Reader<'_>) -> bool {
        match self {
            #[cfg(feature = "png")]
            ImageFormat::Png => crate::codecs::png::detect(reader),
            #[cfg(feature = "jpeg")]
            ImageFormat::Jpeg => crate::codecs::jpeg::detect(reader),
            #[cfg(feature = "bmp")]
            ImageFormat::Bmp => crate::codecs::bmp::detect(reader),
            #[cfg(feature = "tga")]
            ImageFormat::Tga => crate::codecs::tga::detect(reader),
            #[allow(unreachable_patterns)]
            _ => {
                let _ = reader;
                false
            }
        }
    }

    /// Detect format from file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(ImageFormat::Jpeg),
            "bmp" | "dib" => Some(ImageFormat::Bmp),
            "tga" | "icb" | "vda" | "vst" => Some(ImageFormat::Tga),
            _ => None,
        }
    }

    /// MIME type string.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tga => "image/x-tga",
        }
    }

    /// Common file extensions.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ImageFormat::Png => &["png"],
            ImageFormat::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            ImageFormat::Bmp => &["bmp", "dib"],
            ImageFormat::Tga => &["tga", "icb", "vda", "vst"],
        }
    }

    /// Whether this library can write the format.
    pub fn supports_encode(self) -> bool {
        match self {
            ImageFormat::Png => true,
            ImageFormat::Jpeg => false,
            ImageFormat::Bmp => true,
            ImageFormat::Tga => true,
        }
    }

    /// Whether this format supports alpha channel.
    pub fn supports_alpha(self) -> bool {
        match self {
            ImageFormat::Png => true,
            ImageFormat::Jpeg => false,
            ImageFormat::Bmp => true,
            ImageFormat::Tga => true,
        }
    }
}
