//! Byte transport between codecs and the caller's storage.
//!
//! [`Reader`] and [`Writer`] each pick their backing (memory or stream) once,
//! at construction; codecs only ever see the common contract.

mod reader;
mod writer;

pub use reader::{Reader, Stream};
pub use writer::Writer;
