//! Unified error types for codec operations.

use std::io;

use crate::format::ImageFormat;

/// Unified error type for codec operations.
///
/// Every decode, info, and encode call returns exactly one of these. No error
/// is retried internally; the first failure aborts the call and every buffer
/// allocated for it is dropped before the error reaches the caller.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// A file could not be opened or created.
    #[error("could not open file: {0}")]
    Open(#[source] io::Error),
    /// Allocation failure.
    #[error("out of memory")]
    Oom,
    /// A read, seek, write, or flush on the underlying transport failed.
    #[error("transport failure: {0}")]
    Transport(#[source] io::Error),
    /// Structural or checksum violation in the input.
    #[error("malformed data: {0}")]
    Malformed(&'static str),
    /// Format not recognized from magic bytes.
    #[error("unrecognized image format")]
    UnrecognizedFormat,
    /// Format recognized but codec not compiled in.
    #[error("format {0:?} not supported (codec not compiled in)")]
    UnsupportedFormat(ImageFormat),
    /// Codec not enabled in the provided registry.
    #[error("format {0:?} is disabled in the codec registry")]
    DisabledFormat(ImageFormat),
    /// A recognized variant of the format that this library does not handle.
    #[error("format {format:?} does not support: {detail}")]
    UnsupportedFeature {
        format: ImageFormat,
        detail: &'static str,
    },
    /// Width or height is zero or otherwise unusable.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    /// Caller-supplied argument validation failed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource limit exceeded (image too large).
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
    /// The file is well formed but carries no image data.
    #[error("image contains no pixel data")]
    NoData,
    /// The input ended before the image was complete.
    #[error("insufficient data")]
    InsufficientData,
    /// The zlib stream could not be set up.
    #[error("compressor initialisation failed: {0}")]
    CompressorInit(String),
    /// The zlib stream reported an error while (de)compressing.
    #[error("compressed stream error: {0}")]
    CompressorStream(String),
    /// Operation cancelled via Stop token.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<enough::StopReason> for CodecError {
    fn from(_: enough::StopReason) -> Self {
        CodecError::Cancelled
    }
}

impl CodecError {
    /// Shorthand for an unsupported variant of `format`.
    pub(crate) fn unsupported(format: ImageFormat, detail: &'static str) -> Self {
        CodecError::UnsupportedFeature { format, detail }
    }

    /// Map a writer-side I/O failure.
    pub(crate) fn from_io(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::OutOfMemory {
            CodecError::Oom
        } else {
            CodecError::Transport(error)
        }
    }
}

pub(crate) type Result<T> = core::result::Result<T, CodecError>;
