//! Runtime codec registry for enabling/disabling formats.

use crate::ImageFormat;

/// Set of image formats represented as bitflags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FormatSet(u8);

impl FormatSet {
    const EMPTY: Self = FormatSet(0);

    const fn bit(format: ImageFormat) -> u8 {
        match format {
            ImageFormat::Png => 1 << 0,
            ImageFormat::Jpeg => 1 << 1,
            ImageFormat::Bmp => 1 << 2,
            ImageFormat::Tga => 1 << 3,
        }
    }

    /// Every format whose codec is compiled in.
    fn compiled() -> Self {
        let mut set = Self::EMPTY;
        for format in ImageFormat::DETECT_ORDER {
            if compiled_in(format) {
                set.insert(format);
            }
        }
        set
    }

    fn contains(self, format: ImageFormat) -> bool {
        self.0 & Self::bit(format) != 0
    }

    fn insert(&mut self, format: ImageFormat) {
        self.0 |= Self::bit(format);
    }

    fn remove(&mut self, format: ImageFormat) {
        self.0 &= !Self::bit(format);
    }

    fn iter(self) -> impl Iterator<Item = ImageFormat> {
        ImageFormat::DETECT_ORDER
            .into_iter()
            .filter(move |&f| self.contains(f))
    }
}

/// Whether the codec for `format` was compiled in.
pub(crate) fn compiled_in(format: ImageFormat) -> bool {
    match format {
        ImageFormat::Png => cfg!(feature = "png"),
        ImageFormat::Jpeg => cfg!(feature = "jpeg"),
        ImageFormat::Bmp => cfg!(feature = "bmp"),
        ImageFormat::Tga => cfg!(feature = "tga"),
    }
}

/// Runtime codec registry.
///
/// Controls which codecs are enabled for a given operation. Compile-time features
/// determine which codecs are *available*, while the registry controls which are
/// *enabled* at runtime.
#[derive(Clone, Debug)]
pub struct CodecRegistry {
    decode_enabled: FormatSet,
    encode_enabled: FormatSet,
}

impl CodecRegistry {
    /// All compiled-in codecs enabled.
    pub fn all() -> Self {
        let compiled = FormatSet::compiled();
        let mut encode = compiled;
        for format in compiled.iter() {
            if !format.supports_encode() {
                encode.remove(format);
            }
        }
        Self {
            decode_enabled: compiled,
            encode_enabled: encode,
        }
    }

    /// Nothing enabled; the caller must opt in.
    pub fn none() -> Self {
        Self {
            decode_enabled: FormatSet::EMPTY,
            encode_enabled: FormatSet::EMPTY,
        }
    }

    /// Enable or disable decoding for a format.
    pub fn with_decode(mut self, format: ImageFormat, enabled: bool) -> Self {
        if enabled {
            self.decode_enabled.insert(format);
        } else {
            self.decode_enabled.remove(format);
        }
        self
    }

    /// Enable or disable encoding for a format.
    pub fn with_encode(mut self, format: ImageFormat, enabled: bool) -> Self {
        if enabled {
            self.encode_enabled.insert(format);
        } else {
            self.encode_enabled.remove(format);
        }
        self
    }

    /// Is this format available (compiled in) AND enabled for decoding?
    pub fn can_decode(&self, format: ImageFormat) -> bool {
        self.decode_enabled.contains(format) && compiled_in(format)
    }

    /// Is this format available (compiled in) AND enabled for encoding?
    pub fn can_encode(&self, format: ImageFormat) -> bool {
        self.encode_enabled.contains(format) && compiled_in(format) && format.supports_encode()
    }

    /// Formats that are both compiled in and enabled for decoding.
    pub fn decodable_formats(&self) -> impl Iterator<Item = ImageFormat> + '_ {
        self.decode_enabled.iter().filter(|&f| self.can_decode(f))
    }

    /// Formats that are both compiled in and enabled for encoding.
    pub fn encodable_formats(&self) -> impl Iterator<Item = ImageFormat> + '_ {
        self.encode_enabled.iter().filter(|&f| self.can_encode(f))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::all()
    }
}
