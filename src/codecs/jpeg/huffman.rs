//! Canonical Huffman tables, the entropy-coded bit reader, and block decode.

use crate::error::{CodecError, Result};
use crate::transport::Reader;

/// Zigzag position to natural (row-major) coefficient index.
pub(super) const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Decoding tables derived from a `DHT` segment (ITU T.81 Annex C).
pub(super) struct Huffman {
    values: [u8; 256],
    /// First code of each bit length.
    mincode: [u32; 17],
    /// Last code of each bit length, -1 when the length is unused.
    maxcode: [i32; 17],
    /// Index into `values` of the first symbol of each bit length.
    valptr: [u32; 17],
}

impl Huffman {
    pub(super) fn build(counts: &[u8; 16], symbols: &[u8]) -> Result<Self> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total > 256 || total != symbols.len() {
            return Err(CodecError::Malformed("bad Huffman symbol count"));
        }
        let mut values = [0u8; 256];
        values[..total].copy_from_slice(symbols);

        let mut mincode = [0u32; 17];
        let mut maxcode = [-1i32; 17];
        let mut valptr = [0u32; 17];
        let mut code = 0u32;
        let mut k = 0u32;
        for len in 1..=16 {
            let n = counts[len - 1] as u32;
            valptr[len] = k;
            mincode[len] = code;
            code += n;
            k += n;
            if code > 1 << len {
                return Err(CodecError::Malformed("bad Huffman code lengths"));
            }
            if n > 0 {
                maxcode[len] = code as i32 - 1;
            }
            code <<= 1;
        }
        Ok(Self {
            values,
            mincode,
            maxcode,
            valptr,
        })
    }
}

/// MSB-first reader over byte-stuffed entropy-coded data.
///
/// A marker ends the data: from then on zero bits are supplied so lookahead
/// can run past it, but consuming any of them is an error.
pub(super) struct BitReader<'r, 'a> {
    reader: &'r mut Reader<'a>,
    /// Buffered bits, MSB-aligned.
    buf: u32,
    count: u32,
    /// Buffered bits that came from real data rather than marker padding.
    valid: u32,
    marker: Option<u8>,
}

impl<'r, 'a> BitReader<'r, 'a> {
    pub(super) fn new(reader: &'r mut Reader<'a>) -> Self {
        Self {
            reader,
            buf: 0,
            count: 0,
            valid: 0,
            marker: None,
        }
    }

    /// Marker that terminated the data, if one has been reached.
    pub(super) fn marker(&self) -> Option<u8> {
        self.marker
    }

    /// Drop all buffered state after a restart marker.
    pub(super) fn reset(&mut self) {
        self.buf = 0;
        self.count = 0;
        self.valid = 0;
        self.marker = None;
    }

    fn next_byte(&mut self) -> Result<u8> {
        let b = self.reader.read_u8()?;
        if b != 0xFF {
            return Ok(b);
        }
        let mut next = self.reader.read_u8()?;
        while next == 0xFF {
            next = self.reader.read_u8()?;
        }
        if next == 0 {
            return Ok(0xFF);
        }
        self.marker = Some(next);
        Ok(0)
    }

    /// Top up the buffer to more than 24 bits.
    pub(super) fn fill(&mut self) -> Result<()> {
        while self.count <= 24 {
            let byte = match self.marker {
                Some(_) => 0,
                None => self.next_byte()?,
            };
            self.buf |= (byte as u32) << (24 - self.count);
            self.count += 8;
            if self.marker.is_none() {
                self.valid += 8;
            }
        }
        Ok(())
    }

    fn consume(&mut self, n: u32) -> Result<()> {
        if n > self.valid {
            return Err(CodecError::Malformed("marker inside entropy-coded data"));
        }
        self.buf <<= n;
        self.count -= n;
        self.valid -= n;
        Ok(())
    }

    /// Read `n` (1 to 16) raw bits.
    fn bits(&mut self, n: u32) -> Result<u32> {
        if self.count < n {
            self.fill()?;
        }
        let v = self.buf >> (32 - n);
        self.consume(n)?;
        Ok(v)
    }

    /// Read an `s`-bit magnitude and sign-extend it (T.81 F.2.2.1).
    fn receive_extend(&mut self, s: u32) -> Result<i32> {
        let v = self.bits(s)? as i32;
        Ok(if v < 1 << (s - 1) { v - (1 << s) + 1 } else { v })
    }

    /// Decode one symbol, extending the code one bit at a time.
    fn decode(&mut self, table: &Huffman) -> Result<u8> {
        if self.count < 16 {
            self.fill()?;
        }
        let look = self.buf >> 16;
        for len in 1..=16 {
            let code = (look >> (16 - len)) as i32;
            if code <= table.maxcode[len] {
                self.consume(len as u32)?;
                let idx = table.valptr[len] + code as u32 - table.mincode[len];
                return Ok(table.values[idx as usize]);
            }
        }
        Err(CodecError::Malformed("invalid Huffman code"))
    }
}

/// Decode and dequantize one 8x8 block into natural order.
///
/// `quant` is in zigzag order, as stored in `DQT`.
pub(super) fn decode_block(
    bits: &mut BitReader<'_, '_>,
    coeffs: &mut [i16; 64],
    dc: &Huffman,
    ac: &Huffman,
    quant: &[u16; 64],
    pred: &mut i32,
) -> Result<()> {
    coeffs.fill(0);

    let t = bits.decode(dc)? as u32;
    if t > 11 {
        return Err(CodecError::Malformed("DC difference category out of range"));
    }
    let diff = if t == 0 { 0 } else { bits.receive_extend(t)? };
    *pred = pred.wrapping_add(diff);
    coeffs[0] = pred.wrapping_mul(quant[0] as i32) as i16;

    let mut k = 1;
    while k < 64 {
        let rs = bits.decode(ac)?;
        let run = (rs >> 4) as usize;
        let size = (rs & 15) as u32;
        if size == 0 {
            if run != 15 {
                break; // end of block
            }
            k += 16;
            continue;
        }
        k += run;
        if k > 63 {
            return Err(CodecError::Malformed("AC coefficient index out of range"));
        }
        let v = bits.receive_extend(size)?;
        coeffs[ZIGZAG[k]] = v.wrapping_mul(quant[k] as i32) as i16;
        k += 1;
    }
    Ok(())
}
