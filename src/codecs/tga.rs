//! Truevision TGA decoder and RLE encoder.
//!
//! TGA has no signature, so detection checks that the fixed 18-byte header
//! is self-consistent. Decoding covers truecolor and grayscale images, raw
//! or run-length encoded. Color-mapped images are rejected.

use log::{debug, trace};

use crate::codecs::{DecodeContext, EncodeContext};
use crate::convert::{Canvas, convert_row};
use crate::decode::DecodeOutput;
use crate::error::{CodecError, Result};
use crate::format::ImageFormat;
use crate::info::ImageInfo;
use crate::limits::{Limits, checked_len};
use crate::pixel::{ChannelLayout, SampleDepth};
use crate::transport::{Reader, Writer};

const HEADER_LEN: usize = 18;
const FOOTER_SIGNATURE: &[u8; 18] = b"TRUEVISION-XFILE.\0";

// Image type codes.
const NO_IMAGE: u8 = 0;
const INDEXED: u8 = 1;
const TRUECOLOR: u8 = 2;
const GRAY: u8 = 3;
const RLE_INDEXED: u8 = 9;
const RLE_TRUECOLOR: u8 = 10;
const RLE_GRAY: u8 = 11;

// Image descriptor bits.
const RIGHT_TO_LEFT: u8 = 0x10;
const TOP_TO_BOTTOM: u8 = 0x20;

/// Longest run or raw span one packet can carry.
const MAX_PACKET: usize = 128;

fn unsupported(detail: &'static str) -> CodecError {
    CodecError::unsupported(ImageFormat::Tga, detail)
}

#[derive(Debug, Clone, Copy)]
struct Header {
    id_len: u8,
    colormap_type: u8,
    image_type: u8,
    colormap_len: u16,
    colormap_bits: u8,
    width: u16,
    height: u16,
    bits: u8,
    descriptor: u8,
}

impl Header {
    fn read(r: &mut Reader<'_>) -> Result<Self> {
        let mut b = [0u8; HEADER_LEN];
        r.read_exact(&mut b)?;
        let le = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        Ok(Self {
            id_len: b[0],
            colormap_type: b[1],
            image_type: b[2],
            colormap_len: le(5),
            colormap_bits: b[7],
            width: le(12),
            height: le(14),
            bits: b[16],
            descriptor: b[17],
        })
    }

    /// Structural checks used for detection.
    fn plausible(&self) -> bool {
        let indexed = matches!(self.image_type, INDEXED | RLE_INDEXED);
        let known = matches!(
            self.image_type,
            NO_IMAGE | INDEXED | TRUECOLOR | GRAY | RLE_INDEXED | RLE_TRUECOLOR | RLE_GRAY
        );
        let colormap_ok = match self.colormap_type {
            0 => !indexed,
            1 => matches!(self.colormap_bits, 15 | 16 | 24 | 32),
            _ => false,
        };
        let bits_ok = if indexed {
            matches!(self.bits, 8 | 16)
        } else {
            matches!(self.bits, 8 | 15 | 16 | 24 | 32)
        };
        known && colormap_ok && bits_ok && self.width > 0 && self.height > 0
    }

    fn is_rle(&self) -> bool {
        self.image_type >= RLE_INDEXED
    }

    /// Layout of decoded rows, validating the type and depth combination.
    fn source_layout(&self) -> Result<ChannelLayout> {
        match self.image_type {
            INDEXED | RLE_INDEXED => Err(unsupported("color-mapped images")),
            NO_IMAGE => Err(CodecError::NoData),
            TRUECOLOR | RLE_TRUECOLOR => match self.bits {
                15 | 16 => Ok(ChannelLayout::Rgb),
                24 => Ok(ChannelLayout::Bgr),
                32 => Ok(ChannelLayout::Bgra),
                _ => Err(unsupported("truecolor pixel depth")),
            },
            GRAY | RLE_GRAY => match self.bits {
                8 => Ok(ChannelLayout::Gray),
                16 => Ok(ChannelLayout::GrayAlpha),
                _ => Err(unsupported("grayscale pixel depth")),
            },
            _ => Err(CodecError::Malformed("unknown TGA image type")),
        }
    }

    /// Stored bytes per pixel.
    fn pixel_bytes(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }
}

/// Whether the reader starts with a plausible TGA header. Rewinds either way.
pub(crate) fn detect(reader: &mut Reader<'_>) -> bool {
    let matched = Header::read(reader).is_ok_and(|h| h.plausible());
    let rewound = reader.reset().is_ok();
    matched && rewound
}

/// Read the header and validate it for decoding.
fn read_header(r: &mut Reader<'_>, limits: &Limits) -> Result<(Header, ChannelLayout)> {
    let header = Header::read(r)?;
    if header.colormap_type > 1 {
        return Err(CodecError::Malformed("bad TGA color map type"));
    }
    let layout = header.source_layout()?;
    limits.validate(header.width as u32, header.height as u32)?;
    if header.descriptor & RIGHT_TO_LEFT != 0 {
        return Err(unsupported("right-to-left pixel order"));
    }
    debug!(
        "tga {}x{} type {} bits {} descriptor {:#04x}",
        header.width, header.height, header.image_type, header.bits, header.descriptor
    );
    Ok((header, layout))
}

pub(crate) fn read_info(r: &mut Reader<'_>, limits: &Limits) -> Result<ImageInfo> {
    let (header, layout) = read_header(r, limits)?;
    Ok(ImageInfo {
        width: header.width as u32,
        height: header.height as u32,
        channels: layout.channels() as u8,
        format: ImageFormat::Tga,
    })
}

/// Run-length decoder state; packets may continue across rows.
#[derive(Default)]
struct RleState {
    remaining: usize,
    run: bool,
    pixel: [u8; 4],
}

impl RleState {
    /// Fill `out` with whole pixels of `n` bytes.
    fn read_row(&mut self, r: &mut Reader<'_>, out: &mut [u8], n: usize) -> Result<()> {
        let count = out.len() / n;
        let mut x = 0;
        while x < count {
            if self.remaining == 0 {
                let h = r.read_u8()?;
                self.run = h & 0x80 != 0;
                self.remaining = (h & 0x7F) as usize + 1;
                if self.run {
                    r.read_exact(&mut self.pixel[..n])?;
                }
            }
            let take = self.remaining.min(count - x);
            let span = &mut out[x * n..(x + take) * n];
            if self.run {
                for px in span.chunks_exact_mut(n) {
                    px.copy_from_slice(&self.pixel[..n]);
                }
            } else {
                r.read_exact(span)?;
            }
            x += take;
            self.remaining -= take;
        }
        Ok(())
    }
}

/// Expand X1R5G5B5 little-endian pixels to RGB.
fn expand_555(src: &[u8], dst: &mut [u8]) {
    let scale = |c: u16| ((c & 31) * 255 / 31) as u8;
    for (px, out) in src.chunks_exact(2).zip(dst.chunks_exact_mut(3)) {
        let v = u16::from_le_bytes([px[0], px[1]]);
        out[0] = scale(v >> 10);
        out[1] = scale(v >> 5);
        out[2] = scale(v);
    }
}

pub(crate) fn decode(r: &mut Reader<'_>, ctx: &DecodeContext<'_>) -> Result<DecodeOutput> {
    let (header, source) = read_header(r, ctx.limits)?;
    r.skip(header.id_len as usize)?;
    if header.colormap_type == 1 {
        // A color map on a truecolor image carries nothing we use.
        let entry = (header.colormap_bits as usize).div_ceil(8);
        r.skip(header.colormap_len as usize * entry)?;
    }

    let (width, height) = (header.width as usize, header.height as usize);
    let target = ctx.target_layout(source);
    let depth = ctx.depth_for(SampleDepth::Eight);
    let mut canvas = Canvas::new(header.width as u32, header.height as u32, source, target, depth, ctx.limits)?;

    let n = header.pixel_bytes();
    let mut raw: Vec<u8> = ctx.limits.alloc(checked_len(&[width, n])?)?;
    let packed = n == 2 && source == ChannelLayout::Rgb;
    let mut expanded: Vec<u8> = if packed {
        ctx.limits.alloc(checked_len(&[width, 3])?)?
    } else {
        Vec::new()
    };
    let top_down = header.descriptor & TOP_TO_BOTTOM != 0;
    let mut rle = RleState::default();

    for i in 0..height {
        ctx.check_stop()?;
        if header.is_rle() {
            rle.read_row(r, &mut raw, n)?;
        } else {
            r.read_exact(&mut raw)?;
        }
        let y = if top_down { i } else { height - 1 - i };
        if packed {
            expand_555(&raw, &mut expanded);
            canvas.put_row_u8(y, &expanded);
        } else {
            canvas.put_row_u8(y, &raw);
        }
    }
    if rle.remaining > 0 {
        trace!("tga RLE packet runs past the last row");
    }

    Ok(DecodeOutput::from_canvas(
        ImageFormat::Tga,
        source.channels(),
        canvas,
    ))
}

/// Append the packets for one row of `n`-byte pixels.
///
/// Runs become run packets only when at least `min_run` pixels long, so a
/// run packet is always smaller than the raw bytes it replaces.
fn compress_row(row: &[u8], n: usize, out: &mut Vec<u8>) {
    let min_run = if n == 1 { 3 } else { 2 };
    let count = row.len() / n;
    let px = |i: usize| &row[i * n..(i + 1) * n];

    let flush_raw = |out: &mut Vec<u8>, from: usize, to: usize| {
        let mut start = from;
        while start < to {
            let len = (to - start).min(MAX_PACKET);
            out.push((len - 1) as u8);
            out.extend_from_slice(&row[start * n..(start + len) * n]);
            start += len;
        }
    };

    let mut raw_start = 0;
    let mut i = 0;
    while i < count {
        let mut run = 1;
        while i + run < count && run < MAX_PACKET && px(i + run) == px(i) {
            run += 1;
        }
        if run >= min_run {
            flush_raw(out, raw_start, i);
            out.push(0x80 | (run - 1) as u8);
            out.extend_from_slice(px(i));
            i += run;
            raw_start = i;
        } else {
            i += run;
        }
    }
    flush_raw(out, raw_start, count);
}

/// Write an RLE-compressed TGA, bottom-up, with the 2.0 footer.
pub(crate) fn encode(w: &mut Writer<'_>, ctx: &EncodeContext<'_>) -> Result<()> {
    let (Ok(width), Ok(height)) = (u16::try_from(ctx.width), u16::try_from(ctx.height)) else {
        return Err(CodecError::LimitExceeded("image too large for TGA".into()));
    };
    let layout = ctx.layout;
    let (image_type, target) = match layout.channels() {
        1 => (RLE_GRAY, ChannelLayout::Gray),
        2 => (RLE_GRAY, ChannelLayout::GrayAlpha),
        3 => (RLE_TRUECOLOR, ChannelLayout::Rgb),
        _ => (RLE_TRUECOLOR, ChannelLayout::Rgba),
    };
    let n = target.channels();
    let alpha_bits = if target.has_alpha() { 8 } else { 0 };
    debug!(
        "tga encode {width}x{height} type {image_type} bits {}",
        n * 8
    );

    let mut header = [0u8; HEADER_LEN];
    header[2] = image_type;
    header[12..14].copy_from_slice(&width.to_le_bytes());
    header[14..16].copy_from_slice(&height.to_le_bytes());
    header[16] = (n * 8) as u8;
    header[17] = alpha_bits;
    w.write(&header)?;

    let mut line: Vec<u8> = ctx.limits.alloc(width as usize * n)?;
    // Worst case: every byte literal plus one header per raw packet.
    let mut packets: Vec<u8> = ctx.limits.alloc(line.len() + line.len() / MAX_PACKET + 1)?;
    for y in (0..height as usize).rev() {
        ctx.check_stop()?;
        convert_row(layout, target, ctx.row(y), &mut line);
        if n >= 3 {
            for px in line.chunks_exact_mut(n) {
                px.swap(0, 2);
            }
        }
        packets.clear();
        compress_row(&line, n, &mut packets);
        w.write(&packets)?;
    }

    // Extension and developer area offsets, then the signature.
    w.write(&[0u8; 8])?;
    w.write(FOOTER_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use enough::Unstoppable;
    use proptest::prelude::*;

    fn header(image_type: u8, width: u16, height: u16, bits: u8, descriptor: u8) -> Vec<u8> {
        let mut h = vec![0u8; HEADER_LEN];
        h[2] = image_type;
        h[12..14].copy_from_slice(&width.to_le_bytes());
        h[14..16].copy_from_slice(&height.to_le_bytes());
        h[16] = bits;
        h[17] = descriptor;
        h
    }

    fn run(data: &[u8], channels: u8) -> Result<DecodeOutput> {
        let limits = Limits::none();
        let ctx = DecodeContext {
            channels: ChannelLayout::from_channels(channels),
            depth: None,
            limits: &limits,
            stop: &Unstoppable,
        };
        decode(&mut Reader::from_slice(data), &ctx)
    }

    fn encode_to_vec(pixels: &[u8], width: u32, height: u32, channels: u8) -> Vec<u8> {
        let ctx = EncodeContext {
            width,
            height,
            layout: ChannelLayout::from_channels(channels).unwrap(),
            pixels,
            limits: &Limits::none(),
            stop: &Unstoppable,
        };
        let mut w = Writer::to_memory();
        encode(&mut w, &ctx).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn five_identical_pixels_make_one_run_packet() {
        let data = encode_to_vec(&[10, 20, 30].repeat(5), 5, 1, 3);
        assert_eq!(&data[HEADER_LEN..HEADER_LEN + 4], &[0x84, 30, 20, 10]);
        assert_eq!(data.len(), HEADER_LEN + 4 + 26);
        assert_eq!(&data[data.len() - 18..], FOOTER_SIGNATURE);
    }

    #[test]
    fn short_gray_runs_stay_raw() {
        let mut out = Vec::new();
        compress_row(&[5, 5, 7, 7, 7], 1, &mut out);
        assert_eq!(out, [0x01, 5, 5, 0x82, 7]);
    }

    #[test]
    fn raw_spans_split_at_128() {
        let row: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let mut out = Vec::new();
        compress_row(&row, 1, &mut out);
        assert_eq!(out[0], 127);
        assert_eq!(out[129], 71);
        assert_eq!(out.len(), 202);
    }

    #[test]
    fn bottom_up_truecolor() {
        let mut data = header(TRUECOLOR, 1, 2, 24, 0);
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let out = run(&data, 0).unwrap();
        assert_eq!(out.pixels.as_u8().unwrap(), &[6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn top_down_flag() {
        let mut data = header(TRUECOLOR, 1, 2, 24, TOP_TO_BOTTOM);
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let out = run(&data, 0).unwrap();
        assert_eq!(out.pixels.as_u8().unwrap(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn rle_packet_spans_rows() {
        // 2x2 gray, one run of four pixels.
        let mut data = header(RLE_GRAY, 2, 2, 8, TOP_TO_BOTTOM);
        data.extend_from_slice(&[0x83, 77]);
        let out = run(&data, 0).unwrap();
        assert_eq!(out.pixels.as_u8().unwrap(), &[77; 4]);
    }

    #[test]
    fn sixteen_bit_color_expands() {
        let mut data = header(TRUECOLOR, 1, 1, 16, 0);
        data.extend_from_slice(&0x7C00u16.to_le_bytes()); // pure red
        let out = run(&data, 0).unwrap();
        assert_eq!(out.channels, 3);
        assert_eq!(out.pixels.as_u8().unwrap(), &[255, 0, 0]);
    }

    #[test]
    fn color_mapped_is_unsupported() {
        let mut data = header(INDEXED, 1, 1, 8, 0);
        data[1] = 1;
        data[5] = 1;
        data[7] = 24;
        data.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            run(&data, 0),
            Err(CodecError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn right_to_left_is_unsupported() {
        let mut data = header(TRUECOLOR, 1, 1, 24, RIGHT_TO_LEFT);
        data.extend_from_slice(&[0; 3]);
        assert!(matches!(
            run(&data, 0),
            Err(CodecError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn detection_checks_structure() {
        let data = header(RLE_TRUECOLOR, 4, 4, 32, 0);
        assert!(detect(&mut Reader::from_slice(&data)));
        assert!(!detect(&mut Reader::from_slice(&header(TRUECOLOR, 0, 4, 24, 0))));
        assert!(!detect(&mut Reader::from_slice(&header(7, 4, 4, 24, 0))));
        assert!(!detect(&mut Reader::from_slice(&header(TRUECOLOR, 4, 4, 12, 0))));
    }

    #[test]
    fn encode_then_decode_every_channel_count() {
        for channels in 1..=4u8 {
            let pixels: Vec<u8> = (0..6 * 4 * channels as usize)
                .map(|i| if i % 5 < 3 { 9 } else { (i * 31) as u8 })
                .collect();
            let out = run(&encode_to_vec(&pixels, 6, 4, channels), 0).unwrap();
            assert_eq!(out.channels, channels);
            assert_eq!(out.pixels.as_u8().unwrap(), &pixels[..], "channels {channels}");
        }
    }

    proptest! {
        #[test]
        fn rle_reproduces_rows(
            n in 1usize..=4,
            seed in prop::collection::vec(0u8..4, 1..300),
        ) {
            // Small alphabet so runs are common.
            let row: Vec<u8> = seed.iter().flat_map(|&v| std::iter::repeat_n(v, n)).collect();
            let mut packed = Vec::new();
            compress_row(&row, n, &mut packed);
            let mut decoded = vec![0u8; row.len()];
            RleState::default()
                .read_row(&mut Reader::from_slice(&packed), &mut decoded, n)
                .unwrap();
            prop_assert_eq!(decoded, row);
        }
    }
}
