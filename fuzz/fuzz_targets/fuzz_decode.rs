#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rastercodecs::{DecodeRequest, Limits, SampleDepth};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    channels: u8,
    sixteen: bool,
    data: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    // Keep allocations bounded so the fuzzer explores parsers, not OOM.
    let limits = Limits::none()
        .with_max_pixels(1 << 22)
        .with_max_memory(64 << 20);
    let depth = if input.sixteen {
        SampleDepth::Sixteen
    } else {
        SampleDepth::Eight
    };
    let Ok(out) = DecodeRequest::new(input.data)
        .with_channels(input.channels % 5)
        .with_depth(depth)
        .with_limits(&limits)
        .decode()
    else {
        return;
    };
    let expected = out.width as usize * out.height as usize * out.channels as usize;
    assert_eq!(out.pixels.len(), expected);
});
