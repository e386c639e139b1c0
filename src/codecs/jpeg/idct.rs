//! Separable fixed-point inverse DCT with 12-bit constants.

/// `x` scaled by 4096 and rounded.
const fn f2f(x: f64) -> i64 {
    (x * 4096.0 + 0.5) as i64
}

/// One 8-point 1-D IDCT.
///
/// Returns the even-part sums `x0..x3` and the odd-part terms `t0..t3`;
/// output `i` and `7 - i` are `x[i] + t[3 - i]` and `x[i] - t[3 - i]`.
#[inline]
fn kernel(s: [i64; 8]) -> ([i64; 4], [i64; 4]) {
    let p2 = s[2];
    let p3 = s[6];
    let p1 = (p2 + p3) * f2f(0.5411961);
    let t2 = p1 + p3 * f2f(-1.847759065);
    let t3 = p1 + p2 * f2f(0.765366865);
    let t0 = (s[0] + s[4]) * 4096;
    let t1 = (s[0] - s[4]) * 4096;
    let x = [t0 + t3, t1 + t2, t1 - t2, t0 - t3];

    let (mut t0, mut t1, mut t2, mut t3) = (s[7], s[5], s[3], s[1]);
    let p3 = t0 + t2;
    let p4 = t1 + t3;
    let p1 = t0 + t3;
    let p2 = t1 + t2;
    let p5 = (p3 + p4) * f2f(1.175875602);
    t0 *= f2f(0.298631336);
    t1 *= f2f(2.053119869);
    t2 *= f2f(3.072711026);
    t3 *= f2f(1.501321110);
    let p1 = p5 + p1 * f2f(-0.899976223);
    let p2 = p5 + p2 * f2f(-2.562915447);
    let p3 = p3 * f2f(-1.961570560);
    let p4 = p4 * f2f(-0.390180644);
    t3 += p1 + p4;
    t2 += p2 + p3;
    t1 += p2 + p4;
    t0 += p1 + p3;
    (x, [t0, t1, t2, t3])
}

#[inline]
fn clamp(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

/// Transform dequantized natural-order `coeffs` into an 8x8 pixel block at
/// the start of `out`, rows `stride` bytes apart.
pub(super) fn idct_block(coeffs: &[i16; 64], out: &mut [u8], stride: usize) {
    let mut v = [0i64; 64];

    for col in 0..8 {
        let d = |row: usize| coeffs[row * 8 + col] as i64;
        if (1..8).all(|row| d(row) == 0) {
            // Flat column: every output equals the scaled DC term.
            let dc = d(0) * 4;
            for row in 0..8 {
                v[row * 8 + col] = dc;
            }
            continue;
        }
        let (x, t) = kernel([d(0), d(1), d(2), d(3), d(4), d(5), d(6), d(7)]);
        // Drop the 12-bit constant scale but keep two extra bits.
        for i in 0..4 {
            let xi = x[i] + 512;
            v[i * 8 + col] = (xi + t[3 - i]) >> 10;
            v[(7 - i) * 8 + col] = (xi - t[3 - i]) >> 10;
        }
    }

    for row in 0..8 {
        let s = &v[row * 8..row * 8 + 8];
        let (x, t) = kernel([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]);
        let o = &mut out[row * stride..row * stride + 8];
        // 1 << 17 of scale to remove; round and level-shift by 128 first.
        for i in 0..4 {
            let xi = x[i] + 65536 + (128 << 17);
            o[i] = clamp((xi + t[3 - i]) >> 17);
            o[7 - i] = clamp((xi - t[3 - i]) >> 17);
        }
    }
}
