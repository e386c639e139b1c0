//! Cross-checks against the `png` and `image` crates.

use rastercodecs::{DecodeRequest, EncodeRequest, ImageFormat, SampleDepth};

fn gradient(width: u32, height: u32, channels: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity((width * height) as usize * channels as usize);
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels as u32 {
                let v = (x * 200 / width + y * 2 + c * 20).min(255);
                out.push(v as u8);
            }
        }
    }
    out
}

fn png_bytes(
    width: u32,
    height: u32,
    color: png::ColorType,
    depth: png::BitDepth,
    data: &[u8],
    setup: impl FnOnce(&mut png::Encoder<'_, &mut Vec<u8>>),
) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(depth);
        setup(&mut encoder);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
    }
    out
}

fn to_rgba(data: &[u8], format: image::ImageFormat) -> (u32, u32, Vec<u8>) {
    let img = image::load_from_memory_with_format(data, format).unwrap().to_rgba8();
    (img.width(), img.height(), img.into_raw())
}

fn expand_rgba(pixels: &[u8], channels: u8) -> Vec<u8> {
    pixels
        .chunks_exact(channels as usize)
        .flat_map(|p| match *p {
            [g] => [g, g, g, 255],
            [g, a] => [g, g, g, a],
            [r, g, b] => [r, g, b, 255],
            [r, g, b, a] => [r, g, b, a],
            _ => unreachable!(),
        })
        .collect()
}

#[test]
fn decodes_png_crate_rgb8() {
    let pixels = gradient(37, 11, 3);
    let data = png_bytes(37, 11, png::ColorType::Rgb, png::BitDepth::Eight, &pixels, |_| {});
    let out = DecodeRequest::new(&data).decode().unwrap();
    assert_eq!((out.width, out.height, out.channels), (37, 11, 3));
    assert_eq!(out.pixels.as_u8().unwrap(), &pixels[..]);
}

#[test]
fn decodes_png_crate_gray16() {
    let samples: Vec<u16> = (0..9 * 5).map(|i| (i * 1457) as u16).collect();
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
    let data = png_bytes(9, 5, png::ColorType::Grayscale, png::BitDepth::Sixteen, &bytes, |_| {});
    let out = DecodeRequest::new(&data).decode().unwrap();
    assert_eq!(out.depth, SampleDepth::Sixteen);
    assert_eq!(out.pixels.as_u16().unwrap(), &samples[..]);
}

#[test]
fn decodes_png_crate_palette_with_transparency() {
    let palette = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30];
    let indices = [0, 1, 2, 3, 3, 2, 1, 0];
    let data = png_bytes(4, 2, png::ColorType::Indexed, png::BitDepth::Eight, &indices, |e| {
        e.set_palette(palette);
        e.set_trns(vec![255, 128]);
    });
    let out = DecodeRequest::new(&data).with_channels(4).decode().unwrap();
    let px = out.pixels.as_u8().unwrap();
    assert_eq!(&px[..4], &[255, 0, 0, 255]);
    assert_eq!(&px[4..8], &[0, 255, 0, 128]);
    assert_eq!(&px[8..12], &[0, 0, 255, 255]);
    assert_eq!(&px[12..16], &[10, 20, 30, 255]);
    assert_eq!(&px[16..20], &[10, 20, 30, 255]);
}

#[test]
fn png_output_matches_image_crate() {
    for channels in 1..=4u8 {
        let pixels = gradient(23, 17, channels);
        let encoded = EncodeRequest::new(ImageFormat::Png)
            .encode(&pixels, 23, 17, channels)
            .unwrap();
        let (w, h, rgba) = to_rgba(&encoded.data, image::ImageFormat::Png);
        assert_eq!((w, h), (23, 17));
        assert_eq!(rgba, expand_rgba(&pixels, channels), "{channels} channels");
    }
}

#[test]
fn png_output_decodes_with_png_crate() {
    let pixels = gradient(64, 40, 4);
    let encoded = EncodeRequest::new(ImageFormat::Png)
        .encode(&pixels, 64, 40, 4)
        .unwrap();
    let decoder = png::Decoder::new(std::io::Cursor::new(encoded.data));
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size().unwrap()];
    let frame = reader.next_frame(&mut buf).unwrap();
    assert_eq!(frame.color_type, png::ColorType::Rgba);
    assert_eq!(&buf[..frame.buffer_size()], &pixels[..]);
}

#[test]
fn bmp_output_matches_image_crate() {
    for channels in 1..=4u8 {
        let pixels = gradient(13, 7, channels);
        let encoded = EncodeRequest::new(ImageFormat::Bmp)
            .encode(&pixels, 13, 7, channels)
            .unwrap();
        let (w, h, rgba) = to_rgba(&encoded.data, image::ImageFormat::Bmp);
        assert_eq!((w, h), (13, 7));
        assert_eq!(rgba, expand_rgba(&pixels, channels), "{channels} channels");
    }
}

#[test]
fn tga_output_matches_image_crate() {
    for channels in [1u8, 3, 4] {
        let pixels = gradient(19, 5, channels);
        let encoded = EncodeRequest::new(ImageFormat::Tga)
            .encode(&pixels, 19, 5, channels)
            .unwrap();
        let (w, h, rgba) = to_rgba(&encoded.data, image::ImageFormat::Tga);
        assert_eq!((w, h), (19, 5));
        assert_eq!(rgba, expand_rgba(&pixels, channels), "{channels} channels");
    }
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len());
    let total: u64 = a.iter().zip(b).map(|(&x, &y)| x.abs_diff(y) as u64).sum();
    total as f64 / a.len() as f64
}

fn jpeg_bytes(pixels: &[u8], width: u32, height: u32, color: image::ExtendedColorType) -> Vec<u8> {
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 92)
        .encode(pixels, width, height, color)
        .unwrap();
    out
}

#[test]
fn jpeg_color_close_to_image_crate() {
    let (width, height) = (45, 29);
    let pixels = gradient(width, height, 3);
    let data = jpeg_bytes(&pixels, width, height, image::ExtendedColorType::Rgb8);

    let out = DecodeRequest::new(&data).decode().unwrap();
    assert_eq!((out.width, out.height, out.channels), (width, height, 3));
    let ours = out.pixels.as_u8().unwrap();

    let theirs = image::load_from_memory_with_format(&data, image::ImageFormat::Jpeg)
        .unwrap()
        .to_rgb8()
        .into_raw();
    let diff = mean_abs_diff(ours, &theirs);
    assert!(diff < 3.0, "mean difference {diff}");
    let diff = mean_abs_diff(ours, &pixels);
    assert!(diff < 6.0, "mean difference from source {diff}");
}

#[test]
fn jpeg_gray_close_to_image_crate() {
    let (width, height) = (30, 18);
    let pixels = gradient(width, height, 1);
    let data = jpeg_bytes(&pixels, width, height, image::ExtendedColorType::L8);

    let out = DecodeRequest::new(&data).decode().unwrap();
    assert_eq!(out.channels, 1);
    let theirs = image::load_from_memory_with_format(&data, image::ImageFormat::Jpeg)
        .unwrap()
        .to_luma8()
        .into_raw();
    let diff = mean_abs_diff(out.pixels.as_u8().unwrap(), &theirs);
    assert!(diff < 2.0, "mean difference {diff}");
}

/// Baseline YCbCr JPEG assembled from flat 8x8 blocks (DC terms only), with
/// luma sampled at `h`x`v` and both chroma planes at 1x1.
fn flat_block_jpeg(width: u16, height: u16, h: u8, v: u8, level: impl Fn(usize, usize, usize) -> i32) -> Vec<u8> {
    fn segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
        out.extend_from_slice(&[0xFF, marker]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
    }

    struct Bits {
        out: Vec<u8>,
        acc: u32,
        len: u32,
    }

    impl Bits {
        fn put(&mut self, value: u32, len: u32) {
            for i in (0..len).rev() {
                self.acc = (self.acc << 1) | ((value >> i) & 1);
                self.len += 1;
                if self.len == 8 {
                    self.out.push(self.acc as u8);
                    if self.acc == 0xFF {
                        self.out.push(0);
                    }
                    self.acc = 0;
                    self.len = 0;
                }
            }
        }
    }

    let mut out = vec![0xFF, 0xD8];
    let mut dqt = vec![0x00];
    dqt.extend_from_slice(&[8; 64]);
    segment(&mut out, 0xDB, &dqt);
    let [wh, wl] = width.to_be_bytes();
    let [hh, hl] = height.to_be_bytes();
    segment(
        &mut out,
        0xC0,
        &[8, hh, hl, wh, wl, 3, 1, (h << 4) | v, 0, 2, 0x11, 0, 3, 0x11, 0],
    );
    let mut dc = vec![0x00, 0, 0, 0, 12];
    dc.extend_from_slice(&[0; 12]);
    dc.extend(0..12u8);
    segment(&mut out, 0xC4, &dc);
    let mut ac = vec![0x10, 1];
    ac.extend_from_slice(&[0; 15]);
    ac.push(0x00);
    segment(&mut out, 0xC4, &ac);
    segment(&mut out, 0xDA, &[3, 1, 0x00, 2, 0x00, 3, 0x00, 0, 63, 0]);

    let mut bits = Bits { out, acc: 0, len: 0 };
    let (h, v) = (h as usize, v as usize);
    let mut pred = [0i32; 3];
    for my in 0..(height as usize).div_ceil(8 * v) {
        for mx in 0..(width as usize).div_ceil(8 * h) {
            for (c, (ch, cv)) in [(h, v), (1, 1), (1, 1)].into_iter().enumerate() {
                for by in 0..cv {
                    for bx in 0..ch {
                        let dc = level(c, mx * ch + bx, my * cv + by) - 128;
                        let diff = dc - pred[c];
                        pred[c] = dc;
                        let size = 32 - diff.unsigned_abs().leading_zeros();
                        let magnitude = if diff < 0 { diff + (1 << size) - 1 } else { diff };
                        bits.put(size, 4);
                        bits.put(magnitude as u32, size);
                        bits.put(0, 1); // end of block
                    }
                }
            }
        }
    }
    let pad = (8 - bits.len) % 8;
    bits.put(0xFF, pad);
    bits.out.extend_from_slice(&[0xFF, 0xD9]);
    bits.out
}

fn block_level(c: usize, bx: usize, by: usize) -> i32 {
    let (bx, by) = (bx as i32, by as i32);
    match c {
        0 => 50 + 23 * bx + 31 * by,
        1 => 100 + 35 * bx - 12 * by,
        _ => 160 - 28 * bx + 19 * by,
    }
}

fn assert_close_to_image_crate(data: &[u8], width: u32, height: u32) {
    let out = DecodeRequest::new(data).decode().unwrap();
    assert_eq!((out.width, out.height, out.channels), (width, height, 3));
    let theirs = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .unwrap()
        .to_rgb8()
        .into_raw();
    let diff = mean_abs_diff(out.pixels.as_u8().unwrap(), &theirs);
    assert!(diff < 3.0, "mean difference {diff}");
}

#[test]
fn jpeg_horizontal_chroma_subsampling() {
    // Luma 2x1: chroma covers 16x8 pixels per block.
    let data = flat_block_jpeg(32, 16, 2, 1, block_level);
    assert_close_to_image_crate(&data, 32, 16);
}

#[test]
fn jpeg_vertical_chroma_subsampling() {
    // Luma 1x2: chroma covers 8x16 pixels per block.
    let data = flat_block_jpeg(16, 32, 1, 2, block_level);
    assert_close_to_image_crate(&data, 16, 32);
}
