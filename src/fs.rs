//! File-system convenience wrappers.
//!
//! These open the file, hand it to the stream-backed reader or writer, and
//! pick the encoder from the file extension. Failing to open or create the
//! file is reported as [`CodecError::Open`].

use std::fs::File;
use std::path::Path;

use crate::{CodecError, DecodeOutput, DecodeRequest, EncodeRequest, ImageFormat, ImageInfo};

fn open(path: &Path) -> Result<File, CodecError> {
    File::open(path).map_err(CodecError::Open)
}

/// Decode the image at `path` with `channels` output channels (0 keeps the
/// source count).
pub fn decode_file(path: impl AsRef<Path>, channels: u8) -> Result<DecodeOutput, CodecError> {
    let mut file = open(path.as_ref())?;
    DecodeRequest::from_stream(&mut file)
        .with_channels(channels)
        .decode()
}

/// Read only the header of the image at `path`.
pub fn info_file(path: impl AsRef<Path>) -> Result<ImageInfo, CodecError> {
    let mut file = open(path.as_ref())?;
    DecodeRequest::from_stream(&mut file).info()
}

/// Format implied by the extension of `path`.
pub fn format_for_path(path: impl AsRef<Path>) -> Option<ImageFormat> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormat::from_extension)
}

/// Encode `pixels` to `path`, choosing PNG, BMP or TGA by extension.
pub fn encode_file(
    path: impl AsRef<Path>,
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: u8,
) -> Result<(), CodecError> {
    let path = path.as_ref();
    let format = format_for_path(path).ok_or_else(|| {
        CodecError::InvalidInput(format!("no image format for {}", path.display()))
    })?;
    let mut file = File::create(path).map_err(CodecError::Open)?;
    EncodeRequest::new(format).encode_to(&mut file, pixels, width, height, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup() {
        assert_eq!(format_for_path("a/b/photo.JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(format_for_path("out.tga"), Some(ImageFormat::Tga));
        assert_eq!(format_for_path("noext"), None);
    }

    #[test]
    fn missing_file_is_open_error() {
        let result = decode_file("/nonexistent/definitely/missing.png", 0);
        assert!(matches!(result, Err(CodecError::Open(_))));
    }

    #[test]
    fn unknown_extension_is_rejected_before_creating() {
        let result = encode_file("/nonexistent/out.xyz", &[0; 3], 1, 1, 3);
        assert!(matches!(result, Err(CodecError::InvalidInput(_))));
    }

    #[cfg(feature = "bmp")]
    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("rastercodecs-fs-{}.bmp", std::process::id()));
        let pixels: Vec<u8> = (0..4 * 3 * 3).map(|i| i as u8 * 9).collect();
        encode_file(&path, &pixels, 4, 3, 3).unwrap();
        let info = info_file(&path).unwrap();
        assert_eq!((info.width, info.height, info.format), (4, 3, ImageFormat::Bmp));
        let out = decode_file(&path, 0).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(out.pixels.as_u8().unwrap(), &pixels[..]);
    }
}
