//! Buffered byte writer over a stream sink or a growable memory buffer.

use std::io;

use crate::error::{CodecError, Result};
use crate::limits::Limits;

/// Capacity of the staging buffer in front of a stream sink.
const STREAM_BUFFER: usize = 8 * 1024;

/// Starting capacity of a memory sink.
const MEMORY_START: usize = 1024;

enum Sink<'a> {
    Stream { out: &'a mut dyn io::Write, buf: Vec<u8> },
    Memory { buf: Vec<u8>, limits: Limits },
}

/// Output side of the transport used by every encoder.
pub struct Writer<'a> {
    sink: Sink<'a>,
}

impl<'a> Writer<'a> {
    /// Stage bytes in a fixed buffer, draining to `out` whenever it fills.
    pub fn to_stream(out: &'a mut dyn io::Write) -> Self {
        Self {
            sink: Sink::Stream {
                out,
                buf: Vec::with_capacity(STREAM_BUFFER),
            },
        }
    }

    /// Accumulate into memory, doubling capacity as needed.
    pub fn to_memory() -> Self {
        Self::to_memory_with_limits(&Limits::none())
    }

    /// Memory sink whose capacity may not exceed `limits.max_memory_bytes`.
    pub fn to_memory_with_limits(limits: &Limits) -> Self {
        Self {
            sink: Sink::Memory {
                buf: Vec::new(),
                limits: limits.clone(),
            },
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.sink {
            Sink::Stream { out, buf } => {
                if buf.len() + bytes.len() > STREAM_BUFFER {
                    drain(&mut **out, buf)?;
                }
                if bytes.len() >= STREAM_BUFFER {
                    out.write_all(bytes).map_err(CodecError::from_io)
                } else {
                    buf.extend_from_slice(bytes);
                    Ok(())
                }
            }
            Sink::Memory { buf, limits } => {
                let needed = buf
                    .len()
                    .checked_add(bytes.len())
                    .ok_or(CodecError::Oom)?;
                if needed > buf.capacity() {
                    let mut cap = buf.capacity().max(MEMORY_START);
                    while cap < needed {
                        cap = cap.checked_mul(2).ok_or(CodecError::Oom)?;
                    }
                    // Doubling may overshoot the limit; settle for the exact size.
                    if limits.check_memory(cap as u64).is_err() {
                        cap = needed;
                    }
                    limits
                        .check_memory(cap as u64)
                        .map_err(|msg| CodecError::LimitExceeded(msg.into()))?;
                    buf.try_reserve_exact(cap - buf.len())
                        .map_err(|_| CodecError::Oom)?;
                }
                buf.extend_from_slice(bytes);
                Ok(())
            }
        }
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write(&[v])
    }

    pub fn write_u16_le(&mut self, v: u16) -> Result<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, v: u32) -> Result<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn write_i32_le(&mut self, v: i32) -> Result<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn write_u32_be(&mut self, v: u32) -> Result<()> {
        self.write(&v.to_be_bytes())
    }

    /// Hand everything staged so far to the stream sink.
    pub fn weak_flush(&mut self) -> Result<()> {
        match &mut self.sink {
            Sink::Stream { out, buf } => drain(&mut **out, buf),
            Sink::Memory { .. } => Ok(()),
        }
    }

    /// Drain the staging buffer and ask the sink itself to flush.
    pub fn flush(&mut self) -> Result<()> {
        self.weak_flush()?;
        match &mut self.sink {
            Sink::Stream { out, .. } => out.flush().map_err(CodecError::from_io),
            Sink::Memory { .. } => Ok(()),
        }
    }

    /// Complete the output.
    ///
    /// Stream sinks are fully flushed and yield an empty vector. Memory
    /// sinks yield their bytes, trimmed only when more than a fifth of the
    /// capacity is unused.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush()?;
        match self.sink {
            Sink::Stream { .. } => Ok(Vec::new()),
            Sink::Memory { mut buf, .. } => {
                let slack = buf.capacity() - buf.len();
                if slack * 5 > buf.capacity() {
                    buf.shrink_to_fit();
                }
                Ok(buf)
            }
        }
    }
}

fn drain(out: &mut dyn io::Write, buf: &mut Vec<u8>) -> Result<()> {
    if !buf.is_empty() {
        out.write_all(buf).map_err(CodecError::from_io)?;
        buf.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_collects_bytes() {
        let mut w = Writer::to_memory();
        w.write_u16_le(0x0201).unwrap();
        w.write_u32_be(0x0304_0506).unwrap();
        w.write(&[7]).unwrap();
        assert_eq!(w.finish().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn memory_sink_grows_past_start_capacity() {
        let mut w = Writer::to_memory();
        let block = vec![0xabu8; 700];
        for _ in 0..10 {
            w.write(&block).unwrap();
        }
        let out = w.finish().unwrap();
        assert_eq!(out.len(), 7000);
        assert!(out.iter().all(|&b| b == 0xab));
    }

    #[test]
    fn memory_sink_respects_limit() {
        let limits = Limits::none().with_max_memory(1500);
        let mut w = Writer::to_memory_with_limits(&limits);
        w.write(&[1u8; 1000]).unwrap();
        // Doubling to 2048 would exceed the limit, the exact size does not.
        w.write(&[2u8; 500]).unwrap();
        assert!(matches!(w.write(&[3]), Err(CodecError::LimitExceeded(_))));
        let out = w.finish().unwrap();
        assert_eq!(out.len(), 1500);
    }

    #[test]
    fn stream_sink_receives_everything_in_order() {
        let mut out = Vec::new();
        {
            let mut w = Writer::to_stream(&mut out);
            for i in 0..STREAM_BUFFER + 10 {
                w.write_u8(i as u8).unwrap();
            }
            w.write(&vec![1u8; STREAM_BUFFER * 2]).unwrap();
            assert!(w.finish().unwrap().is_empty());
        }
        assert_eq!(out.len(), STREAM_BUFFER * 3 + 10);
        assert_eq!(out[STREAM_BUFFER + 9], ((STREAM_BUFFER + 9) % 256) as u8);
        assert_eq!(out[STREAM_BUFFER + 10], 1);
    }

    struct Broken;

    impl io::Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stream_write_failure_is_transport_error() {
        let mut sink = Broken;
        let mut w = Writer::to_stream(&mut sink);
        w.write(&[1, 2, 3]).unwrap();
        assert!(matches!(w.flush(), Err(CodecError::Transport(_))));
    }
}
