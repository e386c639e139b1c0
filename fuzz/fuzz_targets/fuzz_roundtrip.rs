#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rastercodecs::{DecodeRequest, EncodeRequest, ImageFormat};

#[derive(Arbitrary, Debug)]
struct Input {
    format: u8,
    width: u8,
    height: u8,
    channels: u8,
    seed: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let format = match input.format % 3 {
        0 => ImageFormat::Png,
        1 => ImageFormat::Bmp,
        _ => ImageFormat::Tga,
    };
    let width = u32::from(input.width % 64) + 1;
    let height = u32::from(input.height % 64) + 1;
    let channels = input.channels % 4 + 1;
    if input.seed.is_empty() {
        return;
    }
    let len = (width * height) as usize * channels as usize;
    let pixels: Vec<u8> = input.seed.iter().copied().cycle().take(len).collect();

    let encoded = EncodeRequest::new(format)
        .encode(&pixels, width, height, channels)
        .expect("encode of valid input");
    let decoded = DecodeRequest::new(&encoded.data)
        .with_channels(channels)
        .decode()
        .expect("decode of own output");
    assert_eq!((decoded.width, decoded.height), (width, height));
    assert_eq!(decoded.format, format);

    assert_eq!(decoded.pixels.as_u8().unwrap(), &pixels[..]);
});
