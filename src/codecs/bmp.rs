//! BMP (Windows device-independent bitmap) decoder and encoder.
//!
//! Decodes uncompressed 8-bit palette, 24-bit and 32-bit images behind any of
//! the six DIB header revisions. 32-bit images may use `BI_BITFIELDS` as long
//! as every mask selects a whole byte. The encoder always writes a 108-byte
//! header, bottom-up.

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

const MAGIC: [u8; 2] = *b"BM";
const FILE_HEADER_LEN: usize = 14;
/// Known DIB header sizes: OS/2 core, INFO, V2, V3, V4, V5.
const DIB_SIZES: [u32; 6] = [12, 40, 52, 56, 108, 124];

const BI_RGB: u32 = 0;
const BI_RLE8: u32 = 1;
const BI_RLE4: u32 = 2;
const BI_BITFIELDS: u32 = 3;
const BI_JPEG: u32 = 4;
const BI_PNG: u32 = 5;
const BI_ALPHABITFIELDS: u32 = 6;

const V4_HEADER_LEN: u32 = 108;
/// `LCS_sRGB`, stored little-endian as "BGRs".
const LCS_SRGB: u32 = 0x7352_4742;
/// 72 DPI in pixels per metre.
const PELS_PER_METER: i32 = 2835;

fn unsupported(detail: &'static str) -> CodecError {
    CodecError::unsupported(ImageFormat::Bmp, detail)
}

/// Whether the reader holds a `BM` signature and a known DIB header size.
/// Rewinds either way.
pub(crate) fn detect(reader: &mut Reader<'_>) -> bool {
    let matched = probe(reader).unwrap_or(false);
    let rewound = reader.reset().is_ok();
    matched && rewound
}

fn probe(reader: &mut Reader<'_>) -> Result<bool> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Ok(false);
    }
    reader.skip(12)?;
    Ok(DIB_SIZES.contains(&reader.read_u32_le()?))
}

/// Byte positions of each channel within a 32-bit pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Masks {
    rgb: [usize; 3],
    alpha: Option<usize>,
}

impl Masks {
    fn from_bitfields(masks: [u32; 4]) -> Result<Self> {
        fn byte_of(mask: u32) -> Option<usize> {
            match mask {
                0x0000_00FF => Some(0),
                0x0000_FF00 => Some(1),
                0x00FF_0000 => Some(2),
                0xFF00_0000 => Some(3),
                _ => None,
            }
        }
        let (Some(r), Some(g), Some(b)) =
            (byte_of(masks[0]), byte_of(masks[1]), byte_of(masks[2]))
        else {
            return Err(unsupported("channel masks that are not byte-aligned"));
        };
        let alpha = match masks[3] {
            0 => None,
            m => Some(byte_of(m).ok_or_else(|| unsupported("channel masks that are not byte-aligned"))?),
        };
        let overlaps = r == g || g == b || r == b || alpha.is_some_and(|a| [r, g, b].contains(&a));
        if overlaps {
            return Err(CodecError::Malformed("overlapping BMP channel masks"));
        }
        Ok(Self {
            rgb: [r, g, b],
            alpha,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelFormat {
    Indexed,
    Bgr,
    /// 32-bit `BI_RGB`; alpha is ignored when every pixel has zero alpha.
    Bgra,
    Masked(Masks),
}

impl PixelFormat {
    fn source_layout(self) -> ChannelLayout {
        match self {
            PixelFormat::Indexed => ChannelLayout::Rgb,
            PixelFormat::Bgr => ChannelLayout::Bgr,
            PixelFormat::Bgra => ChannelLayout::Bgra,
            PixelFormat::Masked(m) if m.alpha.is_some() => ChannelLayout::Rgba,
            PixelFormat::Masked(_) => ChannelLayout::Rgb,
        }
    }
}

#[derive(Debug)]
struct Header {
    width: u32,
    height: u32,
    top_down: bool,
    bits: u16,
    format: PixelFormat,
    /// Palette entries in RGB order.
    palette: Vec<[u8; 3]>,
}

impl Header {
    /// Parse everything up to the pixel data and leave the reader there.
    /// With `with_palette` false the palette and the gap before the pixel
    /// data are left unread.
    fn read(r: &mut Reader<'_>, limits: &Limits, with_palette: bool) -> Result<Self> {
        let mut magic = [0u8; 2];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(CodecError::Malformed("missing BM signature"));
        }
        r.skip(8)?; // file size, reserved
        let data_offset = r.read_u32_le()? as usize;
        let dib = r.read_u32_le()?;
        if !DIB_SIZES.contains(&dib) {
            return Err(CodecError::Malformed("unknown DIB header size"));
        }

        let (width, height, planes, bits, compression, colors_used);
        let mut used = 4;
        if dib == 12 {
            width = r.read_u16_le()? as i32;
            height = r.read_u16_le()? as i32;
            planes = r.read_u16_le()?;
            bits = r.read_u16_le()?;
            compression = BI_RGB;
            colors_used = 0;
            used += 8;
        } else {
            width = r.read_i32_le()?;
            height = r.read_i32_le()?;
            planes = r.read_u16_le()?;
            bits = r.read_u16_le()?;
            compression = r.read_u32_le()?;
            r.skip(12)?; // image size, resolution
            colors_used = r.read_u32_le()? as usize;
            r.skip(4)?; // important colors
            used += 36;
        }

        let mut masks = [0u32; 4];
        if dib >= 52 {
            for m in &mut masks[..3] {
                *m = r.read_u32_le()?;
            }
            used += 12;
        }
        if dib >= 56 {
            masks[3] = r.read_u32_le()?;
            used += 4;
        }
        if dib >= 108 {
            let color_space = r.read_u32_le()?;
            used += 4;
            trace!("bmp color space {color_space:#010x}");
        }
        // Endpoints, gamma and the V5 profile fields are not used.
        r.skip((dib - used) as usize)?;
        let mut consumed = FILE_HEADER_LEN + dib as usize;

        if dib == 40 && matches!(compression, BI_BITFIELDS | BI_ALPHABITFIELDS) {
            let n = if compression == BI_ALPHABITFIELDS { 4 } else { 3 };
            for m in &mut masks[..n] {
                *m = r.read_u32_le()?;
            }
            consumed += 4 * n;
        }

        if planes != 1 {
            return Err(CodecError::Malformed("BMP plane count is not 1"));
        }
        if width <= 0 {
            return Err(CodecError::InvalidDimensions {
                width: width.max(0) as u32,
                height: height.unsigned_abs(),
            });
        }
        let top_down = height < 0;
        let (width, height) = (width as u32, height.unsigned_abs());
        limits.validate(width, height)?;

        let format = match (bits, compression) {
            (8, BI_RGB) => PixelFormat::Indexed,
            (24, BI_RGB) => PixelFormat::Bgr,
            (32, BI_RGB) => PixelFormat::Bgra,
            (32, BI_BITFIELDS | BI_ALPHABITFIELDS) => {
                PixelFormat::Masked(Masks::from_bitfields(masks)?)
            }
            (_, BI_RLE8 | BI_RLE4) => return Err(unsupported("RLE compression")),
            (_, BI_JPEG | BI_PNG) => return Err(unsupported("embedded JPEG or PNG data")),
            (1 | 4 | 16, _) => return Err(unsupported("1, 4 and 16-bit pixels")),
            (24, BI_BITFIELDS | BI_ALPHABITFIELDS) => {
                return Err(unsupported("bit masks on 24-bit pixels"));
            }
            _ => return Err(CodecError::Malformed("bad BMP bit depth or compression")),
        };
        debug!(
            "bmp {width}x{height} dib {dib} bits {bits} compression {compression} {}",
            if top_down { "top-down" } else { "bottom-up" }
        );

        let mut header = Header {
            width,
            height,
            top_down,
            bits,
            format,
            palette: Vec::new(),
        };
        if !with_palette {
            return Ok(header);
        }

        let gap = data_offset
            .checked_sub(consumed)
            .ok_or(CodecError::Malformed("BMP pixel data overlaps the header"))?;
        if format == PixelFormat::Indexed {
            let entry = if dib == 12 { 3 } else { 4 };
            let count = if colors_used == 0 {
                (gap / entry).min(256)
            } else {
                colors_used
            };
            if count == 0 || count > 256 || count * entry > gap {
                return Err(CodecError::Malformed("bad BMP palette size"));
            }
            let mut raw = vec![0u8; count * entry];
            r.read_exact(&mut raw)?;
            header.palette = raw
                .chunks_exact(entry)
                .map(|bgr| [bgr[2], bgr[1], bgr[0]])
                .collect();
            consumed += count * entry;
            trace!("bmp palette of {count} entries");
        }
        r.skip(data_offset - consumed)?;
        Ok(header)
    }

    /// Bytes per stored row, padded to a multiple of four.
    fn row_bytes(&self) -> Result<usize> {
        let packed = checked_len(&[self.width as usize, self.bits as usize / 8])?;
        packed
            .checked_add(3)
            .map(|n| n & !3)
            .ok_or_else(|| CodecError::LimitExceeded("BMP row size overflows usize".into()))
    }
}

pub(crate) fn read_info(r: &mut Reader<'_>, limits: &Limits) -> Result<ImageInfo> {
    let header = Header::read(r, limits, false)?;
    Ok(ImageInfo {
        width: header.width,
        height: header.height,
        channels: header.format.source_layout().channels() as u8,
        format: ImageFormat::Bmp,
    })
}

pub(crate) fn decode(r: &mut Reader<'_>, ctx: &DecodeContext<'_>) -> Result<DecodeOutput> {
    let header = Header::read(r, ctx.limits, true)?;
    let (width, height) = (header.width as usize, header.height as usize);
    let source = header.format.source_layout();
    let target = ctx.target_layout(source);
    let depth = ctx.depth_for(SampleDepth::Eight);
    let mut canvas = Canvas::new(header.width, header.height, source, target, depth, ctx.limits)?;

    let mut raw: Vec<u8> = ctx.limits.alloc(header.row_bytes()?)?;
    let mut row: Vec<u8> = ctx.limits.alloc(checked_len(&[width, source.channels()])?)?;
    // 32-bit BI_RGB rows are held back until we know whether alpha is used.
    let mut staged: Vec<u8> = if header.format == PixelFormat::Bgra {
        ctx.limits.alloc(checked_len(&[width, height, 4])?)?
    } else {
        Vec::new()
    };

    for i in 0..height {
        ctx.check_stop()?;
        r.read_exact(&mut raw)?;
        let y = if header.top_down { i } else { height - 1 - i };
        match header.format {
            PixelFormat::Indexed => {
                for (px, &index) in row.chunks_exact_mut(3).zip(&raw[..width]) {
                    let entry = header
                        .palette
                        .get(index as usize)
                        .ok_or(CodecError::Malformed("BMP palette index out of range"))?;
                    px.copy_from_slice(entry);
                }
                canvas.put_row_u8(y, &row);
            }
            PixelFormat::Bgr => canvas.put_row_u8(y, &raw),
            PixelFormat::Bgra => {
                let span = y * width * 4..(y + 1) * width * 4;
                staged[span].copy_from_slice(&raw[..width * 4]);
            }
            PixelFormat::Masked(masks) => {
                let n = source.channels();
                for (px, src) in row.chunks_exact_mut(n).zip(raw.chunks_exact(4)) {
                    for (c, &at) in masks.rgb.iter().enumerate() {
                        px[c] = src[at];
                    }
                    if let Some(at) = masks.alpha {
                        px[3] = src[at];
                    }
                }
                canvas.put_row_u8(y, &row);
            }
        }
    }

    if header.format == PixelFormat::Bgra {
        if staged.chunks_exact(4).all(|px| px[3] == 0) {
            trace!("bmp alpha channel is empty, treating as opaque");
            for px in staged.chunks_exact_mut(4) {
                px[3] = 255;
            }
        }
        for (y, line) in staged.chunks_exact(width * 4).enumerate() {
            canvas.put_row_u8(y, line);
        }
    }

    Ok(DecodeOutput::from_canvas(
        ImageFormat::Bmp,
        source.channels(),
        canvas,
    ))
}

/// Write a bottom-up BMP: 24-bit `BI_RGB` without alpha, 32-bit
/// `BI_BITFIELDS` with it. Gray input is expanded to color.
pub(crate) fn encode(w: &mut Writer<'_>, ctx: &EncodeContext<'_>) -> Result<()> {
    let alpha = ctx.layout.has_alpha();
    let target = if alpha {
        ChannelLayout::Rgba
    } else {
        ChannelLayout::Rgb
    };
    let n = target.channels();
    let width = ctx.width as usize;
    let packed = checked_len(&[width, n])?;
    let row_bytes = (packed + 3) & !3;
    let image_size = checked_len(&[row_bytes, ctx.height as usize])?;
    let too_large = || CodecError::LimitExceeded("image too large for BMP".into());
    let offset = FILE_HEADER_LEN as u32 + V4_HEADER_LEN;
    let image_size = u32::try_from(image_size).map_err(|_| too_large())?;
    let file_size = image_size.checked_add(offset).ok_or_else(too_large)?;
    let width_field = i32::try_from(ctx.width).map_err(|_| too_large())?;
    let height_field = i32::try_from(ctx.height).map_err(|_| too_large())?;
    debug!(
        "bmp encode {}x{} {} bits",
        ctx.width,
        ctx.height,
        n * 8
    );

    w.write(&MAGIC)?;
    w.write_u32_le(file_size)?;
    w.write_u32_le(0)?;
    w.write_u32_le(offset)?;

    w.write_u32_le(V4_HEADER_LEN)?;
    w.write_i32_le(width_field)?;
    w.write_i32_le(height_field)?;
    w.write_u16_le(1)?;
    w.write_u16_le((n * 8) as u16)?;
    w.write_u32_le(if alpha { BI_BITFIELDS } else { BI_RGB })?;
    w.write_u32_le(image_size)?;
    w.write_i32_le(PELS_PER_METER)?;
    w.write_i32_le(PELS_PER_METER)?;
    w.write_u32_le(0)?; // colors used
    w.write_u32_le(0)?; // colors important
    let masks = if alpha {
        [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000]
    } else {
        [0; 4]
    };
    for m in masks {
        w.write_u32_le(m)?;
    }
    w.write_u32_le(LCS_SRGB)?;
    w.write(&[0u8; 36])?; // endpoints
    w.write(&[0u8; 12])?; // gamma

    let mut line: Vec<u8> = ctx.limits.alloc(row_bytes)?;
    for y in (0..ctx.height as usize).rev() {
        ctx.check_stop()?;
        convert_row(ctx.layout, target, ctx.row(y), &mut line[..packed]);
        for px in line[..packed].chunks_exact_mut(n) {
            px.swap(0, 2);
        }
        w.write(&line)?;
    }
    Ok(())
}
