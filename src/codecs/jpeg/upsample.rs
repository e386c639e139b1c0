//! Chroma upsampling and YCbCr to RGB conversion.

/// How one component's plane is stretched to full resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Resample {
    /// Full resolution already.
    Copy,
    /// Half vertical resolution, two-line linear.
    V2,
    /// Half horizontal resolution, linear.
    H2,
    /// Half resolution both ways, bilinear.
    Hv2,
    /// Any other integral ratio: nearest neighbour.
    Nearest,
}

impl Resample {
    pub(super) fn select(hs: usize, vs: usize) -> Self {
        match (hs, vs) {
            (1, 1) => Resample::Copy,
            (1, 2) => Resample::V2,
            (2, 1) => Resample::H2,
            (2, 2) => Resample::Hv2,
            _ => Resample::Nearest,
        }
    }

    /// Expand `w` low-resolution samples into `out`.
    ///
    /// `near` is the closer source line, `far` the other neighbour.
    pub(super) fn run(self, out: &mut [u8], near: &[u8], far: &[u8], w: usize, hs: usize) {
        match self {
            Resample::Copy => out[..w].copy_from_slice(&near[..w]),
            Resample::V2 => {
                for i in 0..w {
                    out[i] = div4(3 * near[i] as u32 + far[i] as u32 + 2);
                }
            }
            Resample::H2 => h2(out, near, w),
            Resample::Hv2 => hv2(out, near, far, w),
            Resample::Nearest => {
                for i in 0..w {
                    out[i * hs..(i + 1) * hs].fill(near[i]);
                }
            }
        }
    }
}

#[inline]
fn div4(x: u32) -> u8 {
    (x >> 2) as u8
}

#[inline]
fn div16(x: u32) -> u8 {
    (x >> 4) as u8
}

fn h2(out: &mut [u8], input: &[u8], w: usize) {
    if w == 1 {
        out[0] = input[0];
        out[1] = input[0];
        return;
    }
    let s = |i: usize| input[i] as u32;
    out[0] = input[0];
    out[1] = div4(s(0) * 3 + s(1) + 2);
    for i in 1..w - 1 {
        let n = 3 * s(i) + 2;
        out[i * 2] = div4(n + s(i - 1));
        out[i * 2 + 1] = div4(n + s(i + 1));
    }
    out[(w - 1) * 2] = div4(s(w - 2) * 3 + s(w - 1) + 2);
    out[(w - 1) * 2 + 1] = input[w - 1];
}

fn hv2(out: &mut [u8], near: &[u8], far: &[u8], w: usize) {
    let col = |i: usize| 3 * near[i] as u32 + far[i] as u32;
    if w == 1 {
        let v = div4(col(0) + 2);
        out[0] = v;
        out[1] = v;
        return;
    }
    let mut t1 = col(0);
    out[0] = div4(t1 + 2);
    for i in 1..w {
        let t0 = t1;
        t1 = col(i);
        out[i * 2 - 1] = div16(3 * t0 + t1 + 8);
        out[i * 2] = div16(3 * t1 + t0 + 8);
    }
    out[w * 2 - 1] = div4(t1 + 2);
}

/// 16.16 fixed-point conversion factors.
const CR_R: i32 = 91881; // 1.40200
const CB_G: i32 = 22554; // 0.34414
const CR_G: i32 = 46802; // 0.71414
const CB_B: i32 = 116130; // 1.77200

/// Convert one row of full-resolution Y, Cb, Cr into interleaved RGB.
pub(super) fn ycbcr_to_rgb(out: &mut [u8], y: &[u8], cb: &[u8], cr: &[u8]) {
    for (((px, &y), &cb), &cr) in out.chunks_exact_mut(3).zip(y).zip(cb).zip(cr) {
        let y = ((y as i32) << 16) + 32768;
        let cb = cb as i32 - 128;
        let cr = cr as i32 - 128;
        px[0] = clamp((y + cr * CR_R) >> 16);
        px[1] = clamp((y - cr * CR_G - cb * CB_G) >> 16);
        px[2] = clamp((y + cb * CB_B) >> 16);
    }
}

#[inline]
fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_is_gray() {
        let mut out = [0u8; 9];
        ycbcr_to_rgb(&mut out, &[0, 100, 255], &[128; 3], &[128; 3]);
        assert_eq!(out, [0, 0, 0, 100, 100, 100, 255, 255, 255]);
    }

    #[test]
    fn saturated_red() {
        let mut out = [0u8; 3];
        ycbcr_to_rgb(&mut out, &[76], &[85], &[255]);
        assert!(out[0] > 250 && out[1] < 5 && out[2] < 5, "{out:?}");
    }

    #[test]
    fn horizontal_doubling_interpolates() {
        let mut out = [0u8; 6];
        Resample::H2.run(&mut out, &[0, 100, 200], &[], 3, 2);
        assert_eq!(out, [0, 25, 75, 125, 125, 200]);
    }

    #[test]
    fn single_sample_rows() {
        let mut out = [0u8; 2];
        Resample::H2.run(&mut out, &[9], &[], 1, 2);
        assert_eq!(out, [9, 9]);
        Resample::Hv2.run(&mut out, &[8], &[4], 1, 2);
        assert_eq!(out, [7, 7]);
    }

    #[test]
    fn bilinear_flat_input_is_flat() {
        let mut out = [0u8; 8];
        Resample::Hv2.run(&mut out, &[50; 4], &[50; 4], 4, 2);
        assert!(out.iter().all(|&p| p == 50));
    }

    #[test]
    fn nearest_replicates() {
        let mut out = [0u8; 6];
        Resample::Nearest.run(&mut out, &[1, 2], &[], 2, 3);
        assert_eq!(out, [1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn selection() {
        assert_eq!(Resample::select(1, 1), Resample::Copy);
        assert_eq!(Resample::select(2, 2), Resample::Hv2);
        assert_eq!(Resample::select(4, 1), Resample::Nearest);
    }
}
