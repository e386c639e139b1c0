//! # rastercodecs
//!
//! Self-contained raster image codecs: PNG, baseline JPEG, BMP and TGA
//! decoding into one pixel buffer type, and PNG, BMP and TGA encoding from it.
//!
//! Each codec is feature-gated; all are enabled by default:
//!
//! ```toml
//! [dependencies]
//! rastercodecs = { version = "0.1", default-features = false, features = ["png", "bmp"] }
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rastercodecs::{DecodeRequest, EncodeRequest, ImageFormat};
//!
//! // Detect and decode, asking for RGBA
//! let data: &[u8] = &[]; // your image bytes
//! let decoded = DecodeRequest::new(data).with_channels(4).decode()?;
//!
//! // Encode to a different format
//! let pixels = decoded.pixels.as_u8().unwrap_or_default();
//! let tga = EncodeRequest::new(ImageFormat::Tga)
//!     .encode(pixels, decoded.width, decoded.height, 4)?;
//! # Ok::<(), rastercodecs::CodecError>(())
//! ```
//!
//! Decoders read through [`transport::Reader`], which works over memory or
//! any `Read + Seek` stream and can rewind after format detection without
//! reopening the source.

#![forbid(unsafe_code)]

mod codecs;
mod convert;
#[cfg(feature = "png")]
mod crc32;
mod decode;
mod encode;
mod error;
mod format;
pub mod fs;
pub mod info;
mod limits;
pub mod pixel;
mod registry;
pub mod transport;

pub use decode::{DecodeOutput, DecodeRequest};
pub use encode::{EncodeOutput, EncodeRequest};
pub use enough::{Stop, StopReason, Unstoppable};
pub use error::CodecError;
pub use format::ImageFormat;
pub use info::ImageInfo;
pub use limits::{Limits, MAX_DIMENSION};
pub use pixel::{ChannelLayout, PixelBuffer, SampleDepth};
pub use registry::CodecRegistry;
