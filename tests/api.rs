//! End-to-end behavior through the public API.

use std::io::Cursor;

use rastercodecs::transport::Reader;
use rastercodecs::{
    CodecError, CodecRegistry, DecodeRequest, EncodeRequest, ImageFormat, Limits, SampleDepth,
};

fn checker(width: u32, height: u32, channels: u8) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| {
            let on = ((i % width) + (i / width)) % 2 == 0;
            (0..channels).map(move |c| if on { 230 - c * 30 } else { 10 + c * 50 })
        })
        .collect()
}

fn encode(format: ImageFormat, pixels: &[u8], width: u32, height: u32, channels: u8) -> Vec<u8> {
    EncodeRequest::new(format)
        .encode(pixels, width, height, channels)
        .unwrap()
        .data
}

#[test]
fn lossless_formats_round_trip_every_channel_count() {
    for format in [ImageFormat::Png, ImageFormat::Bmp, ImageFormat::Tga] {
        for channels in 1..=4 {
            let pixels = checker(11, 6, channels);
            let data = encode(format, &pixels, 11, 6, channels);
            assert_eq!(ImageFormat::detect(&data), Some(format));

            let out = DecodeRequest::new(&data)
                .with_channels(channels)
                .decode()
                .unwrap();
            assert_eq!(out.format, format);
            assert_eq!((out.width, out.height, out.channels), (11, 6, channels));
            assert_eq!(out.pixels.as_u8().unwrap(), &pixels[..], "{format:?} {channels}");
        }
    }
}

#[test]
fn detection_leaves_reader_at_start() {
    let pixels = checker(3, 3, 3);
    for format in [ImageFormat::Png, ImageFormat::Bmp, ImageFormat::Tga] {
        let data = encode(format, &pixels, 3, 3, 3);
        let mut cursor = Cursor::new(data.clone());
        let mut reader = Reader::from_stream(&mut cursor);
        assert_eq!(ImageFormat::detect_reader(&mut reader), Some(format));
        let mut head = [0u8; 4];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(head, data[..4]);
    }
}

#[test]
fn stream_and_memory_agree() {
    let pixels = checker(17, 9, 4);
    let data = encode(ImageFormat::Png, &pixels, 17, 9, 4);
    let memory = DecodeRequest::new(&data).decode().unwrap();
    let mut cursor = Cursor::new(data);
    let stream = DecodeRequest::from_stream(&mut cursor).decode().unwrap();
    assert_eq!(memory, stream);
}

#[test]
fn info_matches_decode() {
    let pixels = checker(8, 5, 2);
    let data = encode(ImageFormat::Png, &pixels, 8, 5, 2);
    let info = rastercodecs::info::from_bytes(&data).unwrap();
    let out = DecodeRequest::new(&data).decode().unwrap();
    assert_eq!(info, out.info());
    assert!(info.has_alpha());
}

#[test]
fn channel_conversion_uses_luminance() {
    // Pure red, green and blue collapse to their weighted luminance.
    let pixels = [255, 0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 200];
    let data = encode(ImageFormat::Png, &pixels, 4, 1, 3);
    let out = DecodeRequest::new(&data).with_channels(1).decode().unwrap();
    assert_eq!(out.pixels.as_u8().unwrap(), &[53, 163, 38, 30]);
}

#[test]
fn sixteen_bit_output_replicates_bytes() {
    let pixels = [0x12, 0xFE, 0x00];
    let data = encode(ImageFormat::Bmp, &pixels, 1, 1, 3);
    let out = DecodeRequest::new(&data)
        .with_depth(SampleDepth::Sixteen)
        .decode()
        .unwrap();
    assert_eq!(out.pixels.as_u16().unwrap(), &[0x1212, 0xFEFE, 0x0000]);
}

#[test]
fn too_many_channels() {
    let data = encode(ImageFormat::Png, &[1, 2, 3], 1, 1, 3);
    let result = DecodeRequest::new(&data).with_channels(5).decode();
    assert!(matches!(result, Err(CodecError::InvalidInput(_))));
    let result = EncodeRequest::new(ImageFormat::Png).encode(&[0; 5], 1, 1, 5);
    assert!(matches!(result, Err(CodecError::InvalidInput(_))));
}

#[test]
fn pixel_limit_is_enforced() {
    let pixels = checker(20, 20, 1);
    let data = encode(ImageFormat::Tga, &pixels, 20, 20, 1);
    let limits = Limits::none().with_max_pixels(399);
    let result = DecodeRequest::new(&data).with_limits(&limits).decode();
    assert!(matches!(result, Err(CodecError::LimitExceeded(_))));
    let result = DecodeRequest::new(&data).with_limits(&limits).info();
    assert!(matches!(result, Err(CodecError::LimitExceeded(_))));
}

#[test]
fn truncated_files_fail_cleanly() {
    let pixels = checker(16, 16, 3);
    for format in [ImageFormat::Png, ImageFormat::Bmp, ImageFormat::Tga] {
        let data = encode(format, &pixels, 16, 16, 3);
        for cut in [20, data.len() / 3, data.len() / 2] {
            let result = DecodeRequest::new(&data[..cut]).decode();
            assert!(result.is_err(), "{format:?} cut at {cut} decoded");
        }
    }
}

#[test]
fn registry_gates_both_directions() {
    let registry = CodecRegistry::all()
        .with_decode(ImageFormat::Tga, false)
        .with_encode(ImageFormat::Png, false);
    let data = encode(ImageFormat::Tga, &[1, 2, 3], 1, 1, 3);
    let result = DecodeRequest::new(&data).with_registry(&registry).decode();
    assert!(matches!(result, Err(CodecError::DisabledFormat(ImageFormat::Tga))));
    let result = EncodeRequest::new(ImageFormat::Png)
        .with_registry(&registry)
        .encode(&[1, 2, 3], 1, 1, 3);
    assert!(matches!(result, Err(CodecError::DisabledFormat(ImageFormat::Png))));
}

#[test]
fn jpeg_cannot_be_encoded() {
    let result = EncodeRequest::new(ImageFormat::Jpeg).encode(&[0; 3], 1, 1, 3);
    assert!(matches!(result, Err(CodecError::UnsupportedFeature { .. })));
}

#[test]
fn stream_read_failure_is_transport_error() {
    struct Broken;
    impl std::io::Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk on fire"))
        }
    }
    impl std::io::Seek for Broken {
        fn seek(&mut self, _: std::io::SeekFrom) -> std::io::Result<u64> {
            Ok(0)
        }
    }
    let result = DecodeRequest::from_stream(&mut Broken).decode();
    assert!(matches!(result, Err(CodecError::Transport(_))));
}
