//! Buffered byte reader over a memory region or a pull-based stream.
//!
//! Both modes share one contract: `reset` rewinds to byte 0 of the source
//! no matter how much has been consumed, `skip` discards without copying,
//! `read_slice` lends already-buffered bytes without copying. The first
//! failure latches: every later call reports it again and produces no bytes
//! until a `reset` rewinds past an end-of-input failure.

use std::io;

use crate::error::{CodecError, Result};

/// Lookahead window size for stream-backed readers.
const WINDOW: usize = 16 * 1024;

/// Pull-based byte source.
///
/// Implemented for every `Read + Seek`. `seek_by` moves relative to the
/// current position so sources that can only step backwards a bounded
/// amount still work for the rewinds format detection needs.
pub trait Stream {
    /// Read up to `buf.len()` bytes; `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the cursor by `delta` bytes relative to its current position.
    fn seek_by(&mut self, delta: i64) -> io::Result<()>;
}

impl<T: io::Read + io::Seek> Stream for T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn seek_by(&mut self, delta: i64) -> io::Result<()> {
        io::Seek::seek(self, io::SeekFrom::Current(delta)).map(|_| ())
    }
}

/// Why a reader stopped producing bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Failure {
    Exhausted,
    Io(io::ErrorKind),
}

impl Failure {
    fn to_error(self) -> CodecError {
        match self {
            Failure::Exhausted => CodecError::InsufficientData,
            Failure::Io(kind) => CodecError::Transport(io::Error::from(kind)),
        }
    }
}

/// Stream-backed lookahead state.
struct Window<'a> {
    source: &'a mut dyn Stream,
    buf: Box<[u8]>,
    /// Valid bytes in `buf`.
    len: usize,
    /// Cursor within `buf`.
    pos: usize,
    /// Absolute source offset of `buf[0]`.
    start: u64,
    /// Absolute offset the source cursor has reached.
    source_pos: u64,
}

impl Window<'_> {
    /// Refill from the source. `Ok(false)` means end of stream.
    fn fill(&mut self) -> io::Result<bool> {
        self.start += self.len as u64;
        self.len = 0;
        self.pos = 0;
        loop {
            match self.source.read(&mut self.buf) {
                Ok(n) => {
                    self.len = n;
                    self.source_pos += n as u64;
                    return Ok(n > 0);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn reset(&mut self) -> io::Result<()> {
        if self.start == 0 {
            // The window still begins at byte 0; no source seek needed.
            self.pos = 0;
            return Ok(());
        }
        let delta = i64::try_from(self.source_pos).map_err(io::Error::other)?;
        self.source.seek_by(-delta)?;
        self.source_pos = 0;
        self.start = 0;
        self.len = 0;
        self.pos = 0;
        self.fill().map(|_| ())
    }

    fn skip(&mut self, n: usize) -> io::Result<()> {
        let buffered = self.len - self.pos;
        if n <= buffered {
            self.pos += n;
            return Ok(());
        }
        let rest = (n - buffered) as i64;
        self.source.seek_by(rest)?;
        self.source_pos += rest as u64;
        self.start = self.source_pos;
        self.len = 0;
        self.pos = 0;
        Ok(())
    }
}

enum Inner<'a> {
    Memory { data: &'a [u8], pos: usize },
    Stream(Window<'a>),
}

/// Buffered reader handed to every codec.
pub struct Reader<'a> {
    inner: Inner<'a>,
    failed: Option<Failure>,
}

impl<'a> Reader<'a> {
    /// Reader over a fixed memory region.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self {
            inner: Inner::Memory { data, pos: 0 },
            failed: None,
        }
    }

    /// Reader pulling from a stream through a fixed lookahead window.
    ///
    /// The stream's current position is treated as byte 0.
    pub fn from_stream(source: &'a mut dyn Stream) -> Self {
        let mut window = Window {
            source,
            buf: vec![0u8; WINDOW].into_boxed_slice(),
            len: 0,
            pos: 0,
            start: 0,
            source_pos: 0,
        };
        let failed = match window.fill() {
            Ok(_) => None,
            Err(e) => Some(Failure::Io(e.kind())),
        };
        Self {
            inner: Inner::Stream(window),
            failed,
        }
    }

    /// Whether a read or seek has failed. Once set, nothing more is produced.
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// The latched failure as an error, if any.
    pub fn check(&self) -> Result<()> {
        match self.failed {
            Some(f) => Err(f.to_error()),
            None => Ok(()),
        }
    }

    fn fail(&mut self, failure: Failure) -> CodecError {
        let first = *self.failed.get_or_insert(failure);
        first.to_error()
    }

    /// True when no further bytes can be produced.
    pub fn at_end(&mut self) -> bool {
        if self.failed.is_some() {
            return true;
        }
        match &mut self.inner {
            Inner::Memory { data, pos } => *pos >= data.len(),
            Inner::Stream(w) => {
                if w.pos < w.len {
                    return false;
                }
                match w.fill() {
                    Ok(more) => !more,
                    Err(e) => {
                        self.failed = Some(Failure::Io(e.kind()));
                        true
                    }
                }
            }
        }
    }

    /// Rewind so the next byte produced is byte 0 of the source.
    ///
    /// Clears an end-of-input latch, since the rewound bytes are readable
    /// again. Transport failures stay latched.
    pub fn reset(&mut self) -> Result<()> {
        if self.failed == Some(Failure::Exhausted) {
            self.failed = None;
        }
        self.check()?;
        match &mut self.inner {
            Inner::Memory { pos, .. } => {
                *pos = 0;
                Ok(())
            }
            Inner::Stream(w) => match w.reset() {
                Ok(()) => Ok(()),
                Err(e) => Err(self.fail(Failure::Io(e.kind()))),
            },
        }
    }

    /// Discard `n` bytes without materialising them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check()?;
        match &mut self.inner {
            Inner::Memory { data, pos } => {
                if data.len() - *pos < n {
                    *pos = data.len();
                    return Err(self.fail(Failure::Exhausted));
                }
                *pos += n;
                Ok(())
            }
            Inner::Stream(w) => match w.skip(n) {
                Ok(()) => Ok(()),
                Err(e) => Err(self.fail(Failure::Io(e.kind()))),
            },
        }
    }

    /// Lend up to `max` already-buffered bytes, refilling once if empty.
    ///
    /// Returns fewer than `max` bytes when fewer are buffered; an empty
    /// slice only at end of input.
    pub fn read_slice(&mut self, max: usize) -> Result<&[u8]> {
        self.check()?;
        match &mut self.inner {
            Inner::Memory { data, pos } => {
                let data: &'a [u8] = *data;
                let n = max.min(data.len() - *pos);
                let out = &data[*pos..*pos + n];
                *pos += n;
                Ok(out)
            }
            Inner::Stream(w) => {
                if w.pos == w.len {
                    if let Err(e) = w.fill() {
                        self.failed = Some(Failure::Io(e.kind()));
                        return Err(Failure::Io(e.kind()).to_error());
                    }
                }
                let n = max.min(w.len - w.pos);
                let out = &w.buf[w.pos..w.pos + n];
                w.pos += n;
                Ok(out)
            }
        }
    }

    /// Fill `buf` completely or fail.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let chunk = self.read_slice(buf.len() - filled)?;
            if chunk.is_empty() {
                return Err(self.fail(Failure::Exhausted));
            }
            buf[filled..filled + chunk.len()].copy_from_slice(chunk);
            filled += chunk.len();
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        if let Inner::Memory { data, pos } = &mut self.inner {
            if self.failed.is_none() && *pos < data.len() {
                let b = data[*pos];
                *pos += 1;
                return Ok(b);
            }
        }
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        self.read_exact(&mut b)?;
        Ok(b)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }
}
