//! Baseline JPEG decoder (ITU T.81, Huffman, 8-bit, sequential).
//!
//! Marker segments are processed until a scan header appears; each scan is
//! entropy-decoded straight into per-component planes, block by block,
//! with restart intervals honoured. After `EOI` the planes are upsampled
//! and converted from YCbCr row by row.

mod huffman;
mod idct;
mod upsample;

use log::{debug, trace};

use crate::codecs::DecodeContext;
use crate::convert::Canvas;
use crate::decode::DecodeOutput;
use crate::error::{CodecError, Result};
use crate::format::ImageFormat;
use crate::info::ImageInfo;
use crate::limits::{Limits, checked_len};
use crate::pixel::{ChannelLayout, SampleDepth};
use crate::transport::Reader;

use huffman::{BitReader, Huffman, decode_block};
use idct::idct_block;
use upsample::{Resample, ycbcr_to_rgb};

// Marker codes (the byte after 0xFF).
const SOF0: u8 = 0xC0;
const DHT: u8 = 0xC4;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DNL: u8 = 0xDC;
const DRI: u8 = 0xDD;
const APP0: u8 = 0xE0;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;

/// Whether the reader starts with an `SOI` marker. Rewinds either way.
pub(crate) fn detect(reader: &mut Reader<'_>) -> bool {
    let matched = matches!((reader.read_u8(), reader.read_u8()), (Ok(0xFF), Ok(SOI)));
    let rewound = reader.reset().is_ok();
    matched && rewound
}

fn unsupported(detail: &'static str) -> CodecError {
    CodecError::unsupported(ImageFormat::Jpeg, detail)
}

/// Bounds-checked cursor over one marker segment's payload.
struct Segment<'s> {
    data: &'s [u8],
    pos: usize,
}

impl<'s> Segment<'s> {
    fn new(data: &'s [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'s [u8]> {
        if self.remaining() < n {
            return Err(CodecError::Malformed("JPEG segment too short"));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}

struct Component {
    id: u8,
    h: usize,
    v: usize,
    /// Quantization table selector.
    tq: usize,
    /// Samples actually covered by this component.
    width: usize,
    height: usize,
    /// Plane geometry, padded to whole MCUs.
    stride: usize,
    rows: usize,
    plane: Vec<u8>,
    /// DC predictor.
    pred: i32,
}

struct Frame {
    width: u32,
    height: u32,
    components: Vec<Component>,
    hmax: usize,
    vmax: usize,
    mcus_x: usize,
    mcus_y: usize,
    /// Id of component 0; the rest follow consecutively.
    id_base: u8,
}

struct Tables {
    quant: [Option<[u16; 64]>; 4],
    dc: [Option<Huffman>; 4],
    ac: [Option<Huffman>; 4],
}

/// One component's part in a scan.
struct ScanComponent {
    index: usize,
    dc: usize,
    ac: usize,
}

struct Decoder<'r, 'a> {
    reader: &'r mut Reader<'a>,
    limits: &'r Limits,
    tables: Tables,
    /// MCUs per restart interval, 0 when disabled.
    restart_interval: usize,
    frame: Option<Frame>,
}

impl<'r, 'a> Decoder<'r, 'a> {
    fn new(reader: &'r mut Reader<'a>, limits: &'r Limits) -> Self {
        Self {
            reader,
            limits,
            tables: Tables {
                quant: [None; 4],
                dc: std::array::from_fn(|_| None),
                ac: std::array::from_fn(|_| None),
            },
            restart_interval: 0,
            frame: None,
        }
    }

    fn expect_soi(&mut self) -> Result<()> {
        if self.reader.read_u8()? != 0xFF || self.reader.read_u8()? != SOI {
            return Err(CodecError::Malformed("missing JPEG SOI marker"));
        }
        Ok(())
    }

    /// Next marker at a segment boundary. Fill bytes are skipped.
    fn read_marker(&mut self) -> Result<u8> {
        if self.reader.read_u8()? != 0xFF {
            return Err(CodecError::Malformed("expected JPEG marker"));
        }
        let mut m = self.reader.read_u8()?;
        while m == 0xFF {
            m = self.reader.read_u8()?;
        }
        if m == 0 {
            return Err(CodecError::Malformed("expected JPEG marker"));
        }
        Ok(m)
    }

    /// Scan forward past the tail of entropy-coded data to the next marker.
    /// Running out of input here counts as `EOI`.
    fn find_marker(&mut self) -> Result<u8> {
        loop {
            if self.reader.at_end() {
                self.reader.check()?;
                trace!("jpeg data ends without EOI");
                return Ok(EOI);
            }
            if self.reader.read_u8()? != 0xFF {
                continue;
            }
            let mut m = self.reader.read_u8()?;
            while m == 0xFF {
                m = self.reader.read_u8()?;
            }
            if m != 0 {
                return Ok(m);
            }
        }
    }

    fn segment_len(&mut self) -> Result<usize> {
        let len = self.reader.read_u16_be()? as usize;
        if len < 2 {
            return Err(CodecError::Malformed("bad JPEG segment length"));
        }
        Ok(len - 2)
    }

    fn read_segment(&mut self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.segment_len()?];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Handle any segment other than `SOF0`, `SOS` and `EOI`.
    fn handle(&mut self, marker: u8) -> Result<()> {
        match marker {
            DHT => self.read_huffman(),
            DQT => self.read_quant(),
            DRI => {
                let seg = self.read_segment()?;
                if seg.len() != 2 {
                    return Err(CodecError::Malformed("bad DRI length"));
                }
                self.restart_interval = u16::from_be_bytes([seg[0], seg[1]]) as usize;
                trace!("jpeg restart interval {}", self.restart_interval);
                Ok(())
            }
            APP0..=APP15 | COM => {
                let len = self.segment_len()?;
                trace!("jpeg skipping marker {marker:#04x} ({len} bytes)");
                self.reader.skip(len)
            }
            RST0..=RST7 => {
                trace!("jpeg stray restart marker");
                Ok(())
            }
            SOI => Err(CodecError::Malformed("unexpected SOI marker")),
            DNL => Err(unsupported("DNL marker")),
            0xC1..=0xCF => Err(unsupported(
                "progressive, lossless, extended or arithmetic-coded JPEG",
            )),
            _ => Err(unsupported("unknown JPEG marker")),
        }
    }

    fn read_quant(&mut self) -> Result<()> {
        let seg = self.read_segment()?;
        let mut s = Segment::new(&seg);
        while s.remaining() > 0 {
            let pq_tq = s.u8()?;
            let tq = (pq_tq & 15) as usize;
            if tq > 3 {
                return Err(CodecError::Malformed("bad quantization table id"));
            }
            let mut table = [0u16; 64];
            match pq_tq >> 4 {
                0 => {
                    for q in &mut table {
                        *q = s.u8()? as u16;
                    }
                }
                1 => {
                    for q in &mut table {
                        *q = s.u16()?;
                    }
                }
                _ => return Err(CodecError::Malformed("bad quantization table precision")),
            }
            trace!("jpeg DQT table {tq}");
            self.tables.quant[tq] = Some(table);
        }
        Ok(())
    }

    fn read_huffman(&mut self) -> Result<()> {
        let seg = self.read_segment()?;
        let mut s = Segment::new(&seg);
        while s.remaining() > 0 {
            let tc_th = s.u8()?;
            let class = tc_th >> 4;
            let th = (tc_th & 15) as usize;
            if class > 1 || th > 3 {
                return Err(CodecError::Malformed("bad Huffman table id"));
            }
            let mut counts = [0u8; 16];
            counts.copy_from_slice(s.take(16)?);
            let total = counts.iter().map(|&c| c as usize).sum();
            let table = Huffman::build(&counts, s.take(total)?)?;
            trace!(
                "jpeg DHT {} table {th} ({total} symbols)",
                if class == 0 { "DC" } else { "AC" }
            );
            if class == 0 {
                self.tables.dc[th] = Some(table);
            } else {
                self.tables.ac[th] = Some(table);
            }
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<()> {
        if self.frame.is_some() {
            return Err(CodecError::Malformed("duplicate JPEG frame header"));
        }
        let seg = self.read_segment()?;
        let mut s = Segment::new(&seg);
        if s.u8()? != 8 {
            return Err(unsupported("sample precision other than 8 bits"));
        }
        let height = s.u16()? as u32;
        let width = s.u16()? as u32;
        if height == 0 {
            return Err(unsupported("height defined by DNL"));
        }
        self.limits.validate(width, height)?;

        let n = s.u8()? as usize;
        match n {
            1 | 3 => {}
            4 => return Err(unsupported("four-component (CMYK) JPEG")),
            _ => return Err(CodecError::Malformed("bad JPEG component count")),
        }
        if seg.len() != 6 + 3 * n {
            return Err(CodecError::Malformed("bad SOF length"));
        }

        let mut components = Vec::with_capacity(n);
        let mut id_base = 0;
        for i in 0..n {
            let id = s.u8()?;
            let hv = s.u8()?;
            let tq = s.u8()? as usize;
            if i == 0 {
                if id > 1 {
                    return Err(CodecError::Malformed("bad JPEG component id"));
                }
                id_base = id;
            }
            if id as usize != id_base as usize + i {
                return Err(CodecError::Malformed("bad JPEG component id"));
            }
            let (h, v) = ((hv >> 4) as usize, (hv & 15) as usize);
            if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
                return Err(CodecError::Malformed("bad JPEG sampling factor"));
            }
            if tq > 3 {
                return Err(CodecError::Malformed("bad quantization table selector"));
            }
            components.push(Component {
                id,
                h,
                v,
                tq,
                width: 0,
                height: 0,
                stride: 0,
                rows: 0,
                plane: Vec::new(),
                pred: 0,
            });
        }
        if n > 1 && components.iter().map(|c| c.h * c.v).sum::<usize>() > 10 {
            return Err(CodecError::Malformed("too many data units per MCU"));
        }

        let hmax = components.iter().map(|c| c.h).max().unwrap_or(1);
        let vmax = components.iter().map(|c| c.v).max().unwrap_or(1);
        if components.iter().any(|c| hmax % c.h != 0 || vmax % c.v != 0) {
            return Err(unsupported("non-integral chroma sampling ratio"));
        }
        let mcus_x = (width as usize).div_ceil(8 * hmax);
        let mcus_y = (height as usize).div_ceil(8 * vmax);
        for c in &mut components {
            c.width = (width as usize * c.h).div_ceil(hmax);
            c.height = (height as usize * c.v).div_ceil(vmax);
            c.stride = mcus_x * c.h * 8;
            c.rows = mcus_y * c.v * 8;
        }
        debug!(
            "jpeg {width}x{height} components {n} sampling {:?}",
            components.iter().map(|c| (c.h, c.v)).collect::<Vec<_>>()
        );

        self.frame = Some(Frame {
            width,
            height,
            components,
            hmax,
            vmax,
            mcus_x,
            mcus_y,
            id_base,
        });
        Ok(())
    }

    fn allocate_planes(&mut self) -> Result<()> {
        let limits = self.limits;
        if let Some(frame) = &mut self.frame {
            for c in &mut frame.components {
                c.plane = limits.alloc(checked_len(&[c.stride, c.rows])?)?;
            }
        }
        Ok(())
    }

    fn read_scan(&mut self) -> Result<Vec<ScanComponent>> {
        let seg = self.read_segment()?;
        let frame = self
            .frame
            .as_ref()
            .ok_or(CodecError::Malformed("scan before frame header"))?;
        let mut s = Segment::new(&seg);
        let n = s.u8()? as usize;
        if n == 0 || n > frame.components.len() || seg.len() != 4 + 2 * n {
            return Err(CodecError::Malformed("bad SOS header"));
        }
        let mut scan = Vec::with_capacity(n);
        for _ in 0..n {
            let id = s.u8()?;
            let tables = s.u8()?;
            let index = id.wrapping_sub(frame.id_base) as usize;
            let component = frame
                .components
                .get(index)
                .ok_or(CodecError::Malformed("scan references unknown component"))?;
            let (dc, ac) = ((tables >> 4) as usize, (tables & 15) as usize);
            if dc > 3 || ac > 3 || self.tables.dc[dc].is_none() || self.tables.ac[ac].is_none() {
                return Err(CodecError::Malformed("scan references undefined Huffman table"));
            }
            if self.tables.quant[component.tq].is_none() {
                return Err(CodecError::Malformed("undefined quantization table"));
            }
            scan.push(ScanComponent { index, dc, ac });
        }
        let (ss, se, a) = (s.u8()?, s.u8()?, s.u8()?);
        if ss != 0 || se != 63 || a != 0 {
            return Err(CodecError::Malformed("non-baseline scan parameters"));
        }
        trace!(
            "jpeg scan over components {:?}",
            scan.iter().map(|c| frame.components[c.index].id).collect::<Vec<_>>()
        );
        Ok(scan)
    }

    /// Entropy-decode one scan into the component planes. Returns the marker
    /// that ended the data, if the bit reader ran into one.
    fn decode_scan(&mut self, scan: &[ScanComponent], ctx: &DecodeContext<'_>) -> Result<Option<u8>> {
        let Decoder {
            reader,
            tables,
            frame,
            restart_interval,
            ..
        } = self;
        let frame = frame
            .as_mut()
            .ok_or(CodecError::Malformed("scan before frame header"))?;
        let interval = *restart_interval;
        let mut bits = BitReader::new(reader);
        for c in &mut frame.components {
            c.pred = 0;
        }

        // A single-component scan is not interleaved: one block per MCU.
        let single = scan.len() == 1;
        let (mcus_x, mcus_y) = if single {
            let c = &frame.components[scan[0].index];
            (c.width.div_ceil(8), c.height.div_ceil(8))
        } else {
            (frame.mcus_x, frame.mcus_y)
        };
        let total = mcus_x * mcus_y;

        let mut coeffs = [0i16; 64];
        let mut done = 0;
        let mut todo = interval;
        for my in 0..mcus_y {
            ctx.check_stop()?;
            for mx in 0..mcus_x {
                for sc in scan {
                    let comp = &mut frame.components[sc.index];
                    let (Some(dc), Some(ac), Some(quant)) = (
                        tables.dc[sc.dc].as_ref(),
                        tables.ac[sc.ac].as_ref(),
                        tables.quant[comp.tq].as_ref(),
                    ) else {
                        return Err(CodecError::Malformed("scan references undefined table"));
                    };
                    let (bw, bh) = if single { (1, 1) } else { (comp.h, comp.v) };
                    for by in 0..bh {
                        for bx in 0..bw {
                            decode_block(&mut bits, &mut coeffs, dc, ac, quant, &mut comp.pred)?;
                            let x = (mx * bw + bx) * 8;
                            let y = (my * bh + by) * 8;
                            let stride = comp.stride;
                            idct_block(&coeffs, &mut comp.plane[y * stride + x..], stride);
                        }
                    }
                }
                done += 1;

                if interval == 0 {
                    continue;
                }
                todo -= 1;
                if todo == 0 {
                    bits.fill()?;
                    match bits.marker() {
                        Some(m @ RST0..=RST7) => {
                            trace!("jpeg restart marker {} after MCU {done}", m - RST0);
                            bits.reset();
                            for c in &mut frame.components {
                                c.pred = 0;
                            }
                            todo = interval;
                        }
                        _ if done < total => {
                            return Err(CodecError::Malformed("missing JPEG restart marker"));
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(bits.marker())
    }
}

/// Header-only query: stops at the frame header.
pub(crate) fn read_info(r: &mut Reader<'_>, limits: &Limits) -> Result<ImageInfo> {
    let mut d = Decoder::new(r, limits);
    d.expect_soi()?;
    loop {
        match d.read_marker()? {
            SOF0 => {
                d.read_frame()?;
                break;
            }
            SOS => return Err(CodecError::Malformed("scan before frame header")),
            EOI => return Err(CodecError::Malformed("no JPEG frame header")),
            m => d.handle(m)?,
        }
    }
    let frame = d
        .frame
        .as_ref()
        .ok_or(CodecError::Malformed("no JPEG frame header"))?;
    Ok(ImageInfo {
        width: frame.width,
        height: frame.height,
        channels: frame.components.len() as u8,
        format: ImageFormat::Jpeg,
    })
}

pub(crate) fn decode(r: &mut Reader<'_>, ctx: &DecodeContext<'_>) -> Result<DecodeOutput> {
    let mut d = Decoder::new(r, ctx.limits);
    d.expect_soi()?;

    let mut scans = 0;
    let mut marker = d.read_marker()?;
    loop {
        match marker {
            SOF0 => {
                d.read_frame()?;
                d.allocate_planes()?;
            }
            SOS => {
                let scan = d.read_scan()?;
                let pending = d.decode_scan(&scan, ctx)?;
                scans += 1;
                marker = match pending {
                    Some(m) => m,
                    None => d.find_marker()?,
                };
                continue;
            }
            EOI => break,
            m => d.handle(m)?,
        }
        marker = d.read_marker()?;
    }

    let frame = match d.frame {
        Some(frame) if scans > 0 => frame,
        _ => return Err(CodecError::NoData),
    };
    let canvas = reconstruct(&frame, ctx)?;
    Ok(DecodeOutput::from_canvas(
        ImageFormat::Jpeg,
        frame.components.len(),
        canvas,
    ))
}

/// Per-component upsampling cursor.
struct Upsampler {
    resample: Resample,
    hs: usize,
    vs: usize,
    /// Samples per row before horizontal expansion.
    w_lores: usize,
    ystep: usize,
    ypos: usize,
    /// Plane rows bracketing the current output row.
    line0: usize,
    line1: usize,
    out: Vec<u8>,
}

/// Upsample and color-convert the planes into the output canvas.
fn reconstruct(frame: &Frame, ctx: &DecodeContext<'_>) -> Result<Canvas> {
    let n = frame.components.len();
    let source = if n == 3 {
        ChannelLayout::Rgb
    } else {
        ChannelLayout::Gray
    };
    let target = ctx.target_layout(source);
    let depth = ctx.depth_for(SampleDepth::Eight);
    let mut canvas = Canvas::new(frame.width, frame.height, source, target, depth, ctx.limits)?;

    let width = frame.width as usize;
    let mut ups = Vec::with_capacity(n);
    for c in &frame.components {
        let hs = frame.hmax / c.h;
        let vs = frame.vmax / c.v;
        let w_lores = width.div_ceil(hs);
        ups.push(Upsampler {
            resample: Resample::select(hs, vs),
            hs,
            vs,
            w_lores,
            ystep: vs >> 1,
            ypos: 0,
            line0: 0,
            line1: 0,
            out: ctx.limits.alloc(checked_len(&[w_lores, hs])?)?,
        });
    }
    let mut rgb: Vec<u8> = if n == 3 {
        ctx.limits.alloc(checked_len(&[width, 3])?)?
    } else {
        Vec::new()
    };

    for y in 0..frame.height as usize {
        ctx.check_stop()?;
        for (u, c) in ups.iter_mut().zip(&frame.components) {
            let y_bot = u.ystep >= u.vs >> 1;
            let (near, far) = if y_bot {
                (u.line1, u.line0)
            } else {
                (u.line0, u.line1)
            };
            let row = |i: usize| &c.plane[i * c.stride..(i + 1) * c.stride];
            u.resample.run(&mut u.out, row(near), row(far), u.w_lores, u.hs);
            u.ystep += 1;
            if u.ystep >= u.vs {
                u.ystep = 0;
                u.line0 = u.line1;
                u.ypos += 1;
                if u.ypos < c.height {
                    u.line1 += 1;
                }
            }
        }
        if n == 3 {
            ycbcr_to_rgb(&mut rgb, &ups[0].out[..width], &ups[1].out, &ups[2].out);
            canvas.put_row_u8(y, &rgb);
        } else {
            canvas.put_row_u8(y, &ups[0].out[..width]);
        }
    }
    Ok(canvas)
}
