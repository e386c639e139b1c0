//! PNG codec.
//!
//! Decoding walks the chunk sequence `IHDR (PLTE)? (tRNS)? IDAT+ IEND`,
//! verifying every chunk CRC, and inflates the concatenated `IDAT` payload
//! one scanline at a time. Supports 8 and 16-bit gray, gray+alpha, RGB, RGBA,
//! 8-bit indexed with optional `tRNS`, and Adam7 interlacing.

mod encode;
mod filter;
mod idat;
mod interlace;

pub(crate) use encode::encode;

use log::{debug, trace};

use crate::codecs::DecodeContext;
use crate::convert::Canvas;
use crate::crc32::Crc32;
use crate::decode::DecodeOutput;
use crate::error::{CodecError, Result};
use crate::format::ImageFormat;
use crate::info::ImageInfo;
use crate::limits::{Limits, checked_len};
use crate::pixel::{ChannelLayout, SampleDepth};
use crate::transport::Reader;

use filter::{FilterType, unfilter};
use idat::IdatStream;
use interlace::ADAM7;

pub(crate) const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const IHDR: [u8; 4] = *b"IHDR";
const PLTE: [u8; 4] = *b"PLTE";
const TRNS: [u8; 4] = *b"tRNS";
const IDAT: [u8; 4] = *b"IDAT";
const IEND: [u8; 4] = *b"IEND";

/// Largest chunk length the format allows.
const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

/// Whether the reader starts with the PNG signature. Rewinds either way.
pub(crate) fn detect(reader: &mut Reader<'_>) -> bool {
    let mut sig = [0u8; 8];
    let matched = reader.read_exact(&mut sig).is_ok() && sig == SIGNATURE;
    let rewound = reader.reset().is_ok();
    matched && rewound
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColorType {
    Gray,
    Rgb,
    Indexed,
    GrayAlpha,
    Rgba,
}

impl ColorType {
    fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => ColorType::Gray,
            2 => ColorType::Rgb,
            3 => ColorType::Indexed,
            4 => ColorType::GrayAlpha,
            6 => ColorType::Rgba,
            _ => return Err(CodecError::Malformed("invalid PNG color type")),
        })
    }

    fn code(self) -> u8 {
        match self {
            ColorType::Gray => 0,
            ColorType::Rgb => 2,
            ColorType::Indexed => 3,
            ColorType::GrayAlpha => 4,
            ColorType::Rgba => 6,
        }
    }

    /// Samples stored per pixel in the raw scanline.
    fn samples(self) -> usize {
        match self {
            ColorType::Gray | ColorType::Indexed => 1,
            ColorType::GrayAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
        }
    }
}

/// Validated `IHDR` fields.
#[derive(Clone, Copy, Debug)]
struct Header {
    width: u32,
    height: u32,
    sixteen: bool,
    color: ColorType,
    interlaced: bool,
}

impl Header {
    fn parse(b: &[u8], limits: &Limits) -> Result<Self> {
        let width = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        let height = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
        if width > MAX_CHUNK_LEN || height > MAX_CHUNK_LEN {
            return Err(CodecError::Malformed("PNG dimension exceeds 2^31-1"));
        }
        limits.validate(width, height)?;

        let color = ColorType::from_code(b[9])?;
        let sixteen = match b[8] {
            8 => false,
            16 if color == ColorType::Indexed => {
                return Err(CodecError::Malformed("16-bit indexed PNG"));
            }
            16 => true,
            1 | 2 | 4 => {
                return Err(CodecError::unsupported(
                    ImageFormat::Png,
                    "bit depths below 8",
                ));
            }
            _ => return Err(CodecError::Malformed("invalid PNG bit depth")),
        };
        if b[10] != 0 {
            return Err(CodecError::Malformed("unknown PNG compression method"));
        }
        if b[11] != 0 {
            return Err(CodecError::Malformed("unknown PNG filter method"));
        }
        let interlaced = match b[12] {
            0 => false,
            1 => true,
            _ => return Err(CodecError::Malformed("unknown PNG interlace method")),
        };
        Ok(Self {
            width,
            height,
            sixteen,
            color,
            interlaced,
        })
    }

    fn depth(&self) -> SampleDepth {
        if self.sixteen {
            SampleDepth::Sixteen
        } else {
            SampleDepth::Eight
        }
    }

    /// Filter step: bytes per complete pixel.
    fn bytes_per_pixel(&self) -> usize {
        self.color.samples() * if self.sixteen { 2 } else { 1 }
    }
}

/// Palette with optional per-entry alpha from `tRNS`.
struct Palette {
    entries: Vec<[u8; 4]>,
    has_alpha: bool,
}

impl Palette {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() || data.len() % 3 != 0 || data.len() > 256 * 3 {
            return Err(CodecError::Malformed("invalid PLTE length"));
        }
        let entries = data
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2], 255])
            .collect();
        Ok(Self {
            entries,
            has_alpha: false,
        })
    }

    fn apply_transparency(&mut self, alpha: &[u8]) -> Result<()> {
        if alpha.len() > self.entries.len() {
            return Err(CodecError::Malformed("tRNS longer than palette"));
        }
        for (entry, &a) in self.entries.iter_mut().zip(alpha) {
            entry[3] = a;
        }
        self.has_alpha = true;
        Ok(())
    }

    fn layout(&self) -> ChannelLayout {
        if self.has_alpha {
            ChannelLayout::Rgba
        } else {
            ChannelLayout::Rgb
        }
    }

    /// Expand one line of indices into RGB or RGBA samples.
    fn expand(&self, indices: &[u8], out: &mut [u8]) -> Result<()> {
        let n = self.layout().channels();
        for (px, &i) in out.chunks_exact_mut(n).zip(indices) {
            let entry = self
                .entries
                .get(i as usize)
                .ok_or(CodecError::Malformed("palette index out of range"))?;
            px.copy_from_slice(&entry[..n]);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct ChunkHeader {
    length: u32,
    kind: [u8; 4],
}

impl ChunkHeader {
    fn read(r: &mut Reader<'_>) -> Result<Self> {
        let length = r.read_u32_be()?;
        if length > MAX_CHUNK_LEN {
            return Err(CodecError::Malformed("PNG chunk length exceeds 2^31-1"));
        }
        let mut kind = [0u8; 4];
        r.read_exact(&mut kind)?;
        trace!(
            "png chunk {} ({length} bytes)",
            String::from_utf8_lossy(&kind)
        );
        Ok(Self { length, kind })
    }

    /// CRC state primed with the chunk type.
    fn crc(&self) -> Crc32 {
        let mut crc = Crc32::new();
        crc.update(&self.kind);
        crc
    }
}

/// Compare the stored CRC that follows a chunk body against `crc`.
fn verify_crc(r: &mut Reader<'_>, crc: &Crc32) -> Result<()> {
    let stored = r.read_u32_be()?;
    if stored != crc.finalize() {
        return Err(CodecError::Malformed("PNG chunk CRC mismatch"));
    }
    Ok(())
}

/// Read a small chunk body of at most `max` bytes and verify its CRC.
fn read_body(r: &mut Reader<'_>, chunk: &ChunkHeader, max: usize) -> Result<Vec<u8>> {
    let len = chunk.length as usize;
    if len > max {
        return Err(CodecError::Malformed("PNG chunk too long for its type"));
    }
    let mut data = vec![0u8; len];
    r.read_exact(&mut data)?;
    let mut crc = chunk.crc();
    crc.update(&data);
    verify_crc(r, &crc)?;
    Ok(data)
}

/// Discard a chunk body, checksumming it on the way.
fn skip_chunk(r: &mut Reader<'_>, chunk: &ChunkHeader) -> Result<()> {
    let mut crc = chunk.crc();
    let mut remaining = chunk.length as usize;
    while remaining > 0 {
        let part = r.read_slice(remaining)?;
        if part.is_empty() {
            return Err(CodecError::InsufficientData);
        }
        crc.update(part);
        remaining -= part.len();
    }
    verify_crc(r, &crc)
}

/// Everything up to the first `IDAT` chunk.
struct Prelude {
    header: Header,
    palette: Option<Palette>,
    first_data: ChunkHeader,
}

impl Prelude {
    /// Layout of reconstructed pixels before target conversion.
    fn source_layout(&self) -> ChannelLayout {
        match (self.header.color, &self.palette) {
            (ColorType::Indexed, Some(palette)) => palette.layout(),
            (ColorType::Gray, _) => ChannelLayout::Gray,
            (ColorType::GrayAlpha, _) => ChannelLayout::GrayAlpha,
            (ColorType::Rgba, _) => ChannelLayout::Rgba,
            _ => ChannelLayout::Rgb,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Header,
    Palette,
}

fn read_prelude(r: &mut Reader<'_>, limits: &Limits) -> Result<Prelude> {
    let mut sig = [0u8; 8];
    r.read_exact(&mut sig)?;
    if sig != SIGNATURE {
        return Err(CodecError::Malformed("missing PNG signature"));
    }

    let first = ChunkHeader::read(r)?;
    if first.kind != IHDR || first.length != 13 {
        return Err(CodecError::Malformed("first PNG chunk must be a 13-byte IHDR"));
    }
    let header = Header::parse(&read_body(r, &first, 13)?, limits)?;
    debug!(
        "png {}x{} color type {} depth {} interlaced {}",
        header.width,
        header.height,
        header.color.code(),
        header.depth().bits(),
        header.interlaced
    );

    let mut stage = Stage::Header;
    let mut palette: Option<Palette> = None;
    loop {
        let chunk = ChunkHeader::read(r)?;
        match chunk.kind {
            IHDR => return Err(CodecError::Malformed("duplicate IHDR")),
            PLTE => {
                if stage != Stage::Header {
                    return Err(CodecError::Malformed("PLTE must directly follow IHDR"));
                }
                let parsed = Palette::parse(&read_body(r, &chunk, 256 * 3)?)?;
                // Truecolor images may carry a suggested palette; it is not used.
                if header.color == ColorType::Indexed {
                    palette = Some(parsed);
                }
                stage = Stage::Palette;
            }
            TRNS => {
                if header.color != ColorType::Indexed {
                    return Err(CodecError::unsupported(
                        ImageFormat::Png,
                        "tRNS on non-indexed color types",
                    ));
                }
                let pal = palette
                    .as_mut()
                    .ok_or(CodecError::Malformed("tRNS before PLTE"))?;
                if pal.has_alpha {
                    return Err(CodecError::Malformed("duplicate tRNS"));
                }
                pal.apply_transparency(&read_body(r, &chunk, 256)?)?;
            }
            IDAT => {
                if header.color == ColorType::Indexed && palette.is_none() {
                    return Err(CodecError::Malformed("indexed PNG without PLTE"));
                }
                return Ok(Prelude {
                    header,
                    palette,
                    first_data: chunk,
                });
            }
            IEND => return Err(CodecError::Malformed("IEND before image data")),
            _ => skip_chunk(r, &chunk)?,
        }
    }
}

/// Header-only query: stops at the first `IDAT`.
pub(crate) fn read_info(r: &mut Reader<'_>, limits: &Limits) -> Result<ImageInfo> {
    let prelude = read_prelude(r, limits)?;
    Ok(ImageInfo {
        width: prelude.header.width,
        height: prelude.header.height,
        channels: prelude.source_layout().channels() as u8,
        format: ImageFormat::Png,
    })
}

pub(crate) fn decode(r: &mut Reader<'_>, ctx: &DecodeContext<'_>) -> Result<DecodeOutput> {
    let prelude = read_prelude(r, ctx.limits)?;
    let source = prelude.source_layout();
    let target = ctx.target_layout(source);
    let depth = ctx.depth_for(prelude.header.depth());
    let Prelude {
        header,
        palette,
        first_data,
    } = prelude;

    let plan = Plan {
        header: &header,
        palette: palette.as_ref(),
        source,
        target,
        depth,
        ctx,
    };

    let mut stream = IdatStream::new(r, first_data)?;
    let canvas = if header.interlaced {
        let mut canvas = Canvas::new(header.width, header.height, source, target, depth, ctx.limits)?;
        for pass in &ADAM7 {
            let (w, h) = pass.size(header.width as usize, header.height as usize);
            if w == 0 || h == 0 {
                continue;
            }
            trace!("png adam7 pass {w}x{h}");
            let part = plan.decode_pass(&mut stream, w, h)?;
            canvas.scatter(&part, |x, y| pass.place(x, y));
        }
        canvas
    } else {
        plan.decode_pass(
            &mut stream,
            header.width as usize,
            header.height as usize,
        )?
    };
    let next = stream.finish()?;
    read_trailer(r, next)?;

    Ok(DecodeOutput::from_canvas(
        ImageFormat::Png,
        source.channels(),
        canvas,
    ))
}

/// Walk the chunks after the image data up to and including `IEND`.
fn read_trailer(r: &mut Reader<'_>, mut chunk: ChunkHeader) -> Result<()> {
    loop {
        match chunk.kind {
            IEND => {
                read_body(r, &chunk, 0)?;
                return Ok(());
            }
            IDAT => return Err(CodecError::Malformed("IDAT chunks are not consecutive")),
            IHDR | PLTE | TRNS => {
                return Err(CodecError::Malformed("critical chunk after image data"));
            }
            _ => skip_chunk(r, &chunk)?,
        }
        chunk = ChunkHeader::read(r)?;
    }
}

/// Fixed per-image decode parameters shared by every pass.
struct Plan<'p> {
    header: &'p Header,
    palette: Option<&'p Palette>,
    source: ChannelLayout,
    target: ChannelLayout,
    depth: SampleDepth,
    ctx: &'p DecodeContext<'p>,
}

impl Plan<'_> {
    /// Reconstruct one `width` x `height` (sub-)image from the stream.
    fn decode_pass(&self, stream: &mut IdatStream<'_, '_>, width: usize, height: usize) -> Result<Canvas> {
        let limits = self.ctx.limits;
        let mut canvas = Canvas::new(
            width as u32,
            height as u32,
            self.source,
            self.target,
            self.depth,
            limits,
        )?;
        let step = self.header.bytes_per_pixel();
        let line_len = checked_len(&[width, step])?;
        let mut prev: Vec<u8> = limits.alloc(line_len)?;
        let mut line: Vec<u8> = limits.alloc(line_len + 1)?;
        let mut expanded: Vec<u8> = match self.palette {
            Some(_) => limits.alloc(checked_len(&[width, self.source.channels()])?)?,
            None => Vec::new(),
        };
        let mut wide: Vec<u16> = if self.header.sixteen {
            limits.alloc(checked_len(&[width, self.header.color.samples()])?)?
        } else {
            Vec::new()
        };

        for y in 0..height {
            self.ctx.check_stop()?;
            stream.read_scanline(&mut line)?;
            let filter = FilterType::try_from(line[0])?;
            let cur = &mut line[1..];
            unfilter(filter, cur, &prev, step);

            if let Some(palette) = self.palette {
                palette.expand(cur, &mut expanded)?;
                canvas.put_row_u8(y, &expanded);
            } else if self.header.sixteen {
                for (d, s) in wide.iter_mut().zip(cur.chunks_exact(2)) {
                    *d = u16::from_be_bytes([s[0], s[1]]);
                }
                canvas.put_row_u16(y, &wide);
            } else {
                canvas.put_row_u8(y, cur);
            }
            prev.copy_from_slice(cur);
        }
        Ok(canvas)
    }
}
