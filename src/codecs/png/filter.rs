//! Scanline filters: reconstruction for decode, Paeth for encode.

use crate::error::{CodecError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FilterType {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl TryFrom<u8> for FilterType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => FilterType::None,
            1 => FilterType::Sub,
            2 => FilterType::Up,
            3 => FilterType::Average,
            4 => FilterType::Paeth,
            _ => return Err(CodecError::Malformed("invalid PNG filter type")),
        })
    }
}

/// Paeth predictor for filter type 4.
#[inline]
pub(crate) fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let a = a as i16;
    let b = b as i16;
    let c = c as i16;

    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Undo `filter` on `line` in place.
///
/// `prev` is the previous reconstructed line of the same pass (all zero for
/// the first line) and `step` the byte distance to the left neighbour.
pub(crate) fn unfilter(filter: FilterType, line: &mut [u8], prev: &[u8], step: usize) {
    let len = line.len();
    match filter {
        FilterType::None => {}
        FilterType::Sub => {
            for i in step..len {
                line[i] = line[i].wrapping_add(line[i - step]);
            }
        }
        FilterType::Up => {
            for (x, &b) in line.iter_mut().zip(prev) {
                *x = x.wrapping_add(b);
            }
        }
        FilterType::Average => {
            for i in 0..step.min(len) {
                line[i] = line[i].wrapping_add(prev[i] >> 1);
            }
            for i in step..len {
                let avg = ((line[i - step] as u16 + prev[i] as u16) >> 1) as u8;
                line[i] = line[i].wrapping_add(avg);
            }
        }
        FilterType::Paeth => {
            for i in 0..step.min(len) {
                // Left and upper-left are zero, so the predictor is `prev[i]`.
                line[i] = line[i].wrapping_add(prev[i]);
            }
            for i in step..len {
                let p = paeth_predictor(line[i - step], prev[i], prev[i - step]);
                line[i] = line[i].wrapping_add(p);
            }
        }
    }
}

/// Paeth-filter `line` into `out`, which receives the filter byte first.
pub(crate) fn paeth_filter(line: &[u8], prev: &[u8], step: usize, out: &mut [u8]) {
    out[0] = FilterType::Paeth as u8;
    let out = &mut out[1..];
    for i in 0..line.len() {
        let a = if i >= step { line[i - step] } else { 0 };
        let c = if i >= step { prev[i - step] } else { 0 };
        out[i] = line[i].wrapping_sub(paeth_predictor(a, prev[i], c));
    }
}
