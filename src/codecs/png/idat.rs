//! Inflating the `IDAT` run one scanline at a time.

use flate2::{Decompress, FlushDecompress, Status};

use super::{ChunkHeader, IDAT, verify_crc};
use crate::crc32::Crc32;
use crate::error::{CodecError, Result};
use crate::transport::Reader;

/// Compressed bytes staged per read from the transport.
const INPUT_CHUNK: usize = 32 * 1024;

/// Zlib stream spread over consecutive `IDAT` chunks.
///
/// Chunk boundaries are invisible to the caller: when the staged input runs
/// dry the stream checks the finished chunk's CRC and continues with the next
/// `IDAT`. The first non-`IDAT` chunk header ends the run and is handed back
/// by [`IdatStream::finish`].
pub(super) struct IdatStream<'r, 'a> {
    reader: &'r mut Reader<'a>,
    inflater: Decompress,
    input: Box<[u8]>,
    in_pos: usize,
    in_len: usize,
    /// Unread body bytes of the current chunk.
    remaining: u32,
    crc: Crc32,
    /// Chunk header that ended the run, once seen.
    next: Option<ChunkHeader>,
    /// The zlib stream reported its end.
    ended: bool,
}

impl<'r, 'a> IdatStream<'r, 'a> {
    pub(super) fn new(reader: &'r mut Reader<'a>, first: ChunkHeader) -> Result<Self> {
        let mut input = Vec::new();
        input
            .try_reserve_exact(INPUT_CHUNK)
            .map_err(|_| CodecError::Oom)?;
        input.resize(INPUT_CHUNK, 0);
        Ok(Self {
            reader,
            inflater: Decompress::new(true),
            input: input.into_boxed_slice(),
            in_pos: 0,
            in_len: 0,
            remaining: first.length,
            crc: first.crc(),
            next: None,
            ended: false,
        })
    }

    /// Stage more compressed input. `Ok(false)` once the `IDAT` run is over.
    fn refill(&mut self) -> Result<bool> {
        while self.remaining == 0 {
            if self.next.is_some() {
                return Ok(false);
            }
            verify_crc(self.reader, &self.crc)?;
            let chunk = ChunkHeader::read(self.reader)?;
            if chunk.kind != IDAT {
                self.next = Some(chunk);
                return Ok(false);
            }
            self.remaining = chunk.length;
            self.crc = chunk.crc();
        }
        let n = (self.remaining as usize).min(self.input.len());
        self.reader.read_exact(&mut self.input[..n])?;
        self.crc.update(&self.input[..n]);
        self.remaining -= n as u32;
        self.in_pos = 0;
        self.in_len = n;
        Ok(true)
    }

    /// Inflate exactly `out.len()` bytes.
    pub(super) fn read_scanline(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            if self.ended {
                return Err(CodecError::Malformed("PNG image data ends early"));
            }
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = self
                .inflater
                .decompress(
                    &self.input[self.in_pos..self.in_len],
                    &mut out[filled..],
                    FlushDecompress::None,
                )
                .map_err(|e| CodecError::CompressorStream(e.to_string()))?;
            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            self.in_pos += consumed;
            filled += produced;

            if status == Status::StreamEnd {
                self.ended = true;
            } else if consumed == 0 && produced == 0 {
                if self.in_pos < self.in_len {
                    return Err(CodecError::CompressorStream(
                        "inflate made no progress".into(),
                    ));
                }
                if !self.refill()? {
                    return Err(CodecError::InsufficientData);
                }
            }
        }
        Ok(())
    }

    /// Drain the rest of the run, checksumming it, and return the chunk
    /// header that follows it.
    pub(super) fn finish(mut self) -> Result<ChunkHeader> {
        self.in_pos = self.in_len;
        while self.refill()? {
            self.in_pos = self.in_len;
        }
        self.next
            .take()
            .ok_or(CodecError::Malformed("PNG image data run did not terminate"))
    }
}
