//! PNG encoder: 8-bit, non-interlaced, Paeth on every scanline.

use flate2::{Compress, Compression, FlushCompress, Status};
use log::debug;

use super::filter::paeth_filter;
use super::{IDAT, IEND, IHDR, SIGNATURE};
use crate::codecs::EncodeContext;
use crate::crc32::Crc32;
use crate::error::{CodecError, Result};
use crate::transport::Writer;

/// Largest `IDAT` body emitted.
const IDAT_SIZE: usize = 8 * 1024;

fn write_chunk(w: &mut Writer<'_>, kind: &[u8; 4], data: &[u8]) -> Result<()> {
    w.write_u32_be(data.len() as u32)?;
    w.write(kind)?;
    w.write(data)?;
    let mut crc = Crc32::new();
    crc.update(kind);
    crc.update(data);
    w.write_u32_be(crc.finalize())
}

/// Deflate output staged into `IDAT`-sized pieces.
struct IdatWriter {
    compressor: Compress,
    out: Box<[u8]>,
    len: usize,
}

impl IdatWriter {
    fn new() -> Self {
        Self {
            compressor: Compress::new(Compression::default(), true),
            out: vec![0u8; IDAT_SIZE].into_boxed_slice(),
            len: 0,
        }
    }

    /// One compressor call; returns bytes consumed, bytes produced and the status.
    fn step(&mut self, input: &[u8], flush: FlushCompress) -> Result<(usize, usize, Status)> {
        let before_in = self.compressor.total_in();
        let before_out = self.compressor.total_out();
        let status = self
            .compressor
            .compress(input, &mut self.out[self.len..], flush)
            .map_err(|e| CodecError::CompressorStream(e.to_string()))?;
        let consumed = (self.compressor.total_in() - before_in) as usize;
        let produced = (self.compressor.total_out() - before_out) as usize;
        self.len += produced;
        Ok((consumed, produced, status))
    }

    fn emit(&mut self, w: &mut Writer<'_>) -> Result<()> {
        write_chunk(w, &IDAT, &self.out[..self.len])?;
        self.len = 0;
        Ok(())
    }

    fn push(&mut self, w: &mut Writer<'_>, mut input: &[u8]) -> Result<()> {
        while !input.is_empty() {
            if self.len == self.out.len() {
                self.emit(w)?;
            }
            let (consumed, produced, _) = self.step(input, FlushCompress::None)?;
            if consumed == 0 && produced == 0 && self.len < self.out.len() {
                return Err(CodecError::CompressorStream(
                    "deflate made no progress".into(),
                ));
            }
            input = &input[consumed..];
        }
        Ok(())
    }

    /// Flush the compressor; its tail goes into one last `IDAT`.
    fn finish(mut self, w: &mut Writer<'_>) -> Result<()> {
        loop {
            if self.len == self.out.len() {
                self.emit(w)?;
            }
            let (_, produced, status) = self.step(&[], FlushCompress::Finish)?;
            if status == Status::StreamEnd {
                break;
            }
            if produced == 0 && self.len < self.out.len() {
                return Err(CodecError::CompressorStream(
                    "deflate finish made no progress".into(),
                ));
            }
        }
        if self.len > 0 {
            self.emit(w)?;
        }
        Ok(())
    }
}

pub(crate) fn encode(w: &mut Writer<'_>, ctx: &EncodeContext<'_>) -> Result<()> {
    let color_type = match ctx.layout.channels() {
        1 => 0,
        2 => 4,
        3 => 2,
        _ => 6,
    };
    debug!(
        "png encode {}x{} color type {color_type}",
        ctx.width, ctx.height
    );

    w.write(&SIGNATURE)?;
    let mut ihdr = [0u8; 13];
    ihdr[..4].copy_from_slice(&ctx.width.to_be_bytes());
    ihdr[4..8].copy_from_slice(&ctx.height.to_be_bytes());
    ihdr[8] = 8;
    ihdr[9] = color_type;
    write_chunk(w, &IHDR, &ihdr)?;

    let stride = ctx.stride();
    let step = ctx.layout.channels();
    let mut prev: Vec<u8> = ctx.limits.alloc(stride)?;
    let mut filtered: Vec<u8> = ctx.limits.alloc(stride + 1)?;
    let mut idat = IdatWriter::new();
    for y in 0..ctx.height as usize {
        ctx.check_stop()?;
        let row = ctx.row(y);
        paeth_filter(row, &prev, step, &mut filtered);
        idat.push(w, &filtered)?;
        prev.copy_from_slice(row);
    }
    idat.finish(w)?;

    write_chunk(w, &IEND, &[])
}
