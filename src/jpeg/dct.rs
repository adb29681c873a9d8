//! Integer 8x8 forward and inverse DCT.
//!
//! Both transforms use the scaled even/odd butterfly decomposition with
//! 13-bit fixed-point constants. The inverse keeps 2 extra fraction bits
//! between passes (PASS1_BITS) and folds the +128 level shift into a
//! wraparound range-limit table so no per-pixel branch is needed to absorb
//! ringing on out-of-range coefficients.

pub const BLOCK_SIZE: usize = 64;

const CONST_BITS: i32 = 13;
const PASS1_BITS: i32 = 2;

const FIX_0_298631336: i32 = 2446;
const FIX_0_390180644: i32 = 3196;
const FIX_0_541196100: i32 = 4433;
const FIX_0_765366865: i32 = 6270;
const FIX_0_899976223: i32 = 7373;
const FIX_1_175875602: i32 = 9633;
const FIX_1_501321110: i32 = 12299;
const FIX_1_847759065: i32 = 15137;
const FIX_1_961570560: i32 = 16069;
const FIX_2_053119869: i32 = 16819;
const FIX_2_562915447: i32 = 20995;
const FIX_3_072711026: i32 = 25172;

/// Zigzag position -> natural (row-major) index.
pub const NATURAL_ORDER: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

#[inline]
const fn descale(x: i64, n: i32) -> i32 {
    ((x + (1i64 << (n - 1))) >> n) as i32
}

const CENTER: usize = 128;
const LIMIT_OFFSET: usize = 256 + CENTER;
const RANGE_MASK: i32 = 1023;

/// Wraparound clamp table sized 5*(255+1)+128, indexed at offset 384 with
/// a 10-bit mask. Maps centered IDCT output v to clamp(v+128, 0, 255) and
/// absorbs overshoot of up to +/-384 from wild coefficients.
const RANGE_LIMIT: [u8; 1408] = build_range_limit();

const fn build_range_limit() -> [u8; 1408] {
    let mut t = [0u8; 1408];
    let mut i = 0;
    while i < 256 {
        t[256 + i] = i as u8;
        i += 1;
    }
    let mut i = 512;
    while i < 896 {
        t[i] = 255;
        i += 1;
    }
    // 896..1280 stays zero; final 128 entries mirror 0..127 so small
    // negative values wrap to the identity band.
    let mut i = 0;
    while i < 128 {
        t[1280 + i] = i as u8;
        i += 1;
    }
    t
}

#[inline]
fn range_limit(v: i32) -> u8 {
    RANGE_LIMIT[LIMIT_OFFSET + (v & RANGE_MASK) as usize]
}

/// Inverse DCT of one dequantized coefficient block (natural order) into
/// 8-bit samples.
pub fn idct_block(coef: &[i32; 64], out: &mut [u8; 64]) {
    let mut workspace = [0i32; 64];

    // Pass 1: columns, keeping PASS1_BITS extra precision.
    for col in 0..8 {
        let c = |row: usize| coef[row * 8 + col] as i64;

        // A column whose AC terms are all zero is a constant.
        if (1..8).all(|row| coef[row * 8 + col] == 0) {
            let dc = (coef[col] << PASS1_BITS) as i32;
            for row in 0..8 {
                workspace[row * 8 + col] = dc;
            }
            continue;
        }

        // Even part.
        let z2 = c(2);
        let z3 = c(6);
        let z1 = (z2 + z3) * FIX_0_541196100 as i64;
        let tmp2 = z1 + z3 * -(FIX_1_847759065 as i64);
        let tmp3 = z1 + z2 * FIX_0_765366865 as i64;

        let z2 = c(0);
        let z3 = c(4);
        let tmp0 = (z2 + z3) << CONST_BITS;
        let tmp1 = (z2 - z3) << CONST_BITS;

        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        // Odd part.
        let tmp0 = c(7);
        let tmp1 = c(5);
        let tmp2 = c(3);
        let tmp3 = c(1);

        let z1 = tmp0 + tmp3;
        let z2 = tmp1 + tmp2;
        let z3 = tmp0 + tmp2;
        let z4 = tmp1 + tmp3;
        let z5 = (z3 + z4) * FIX_1_175875602 as i64;

        let tmp0 = tmp0 * FIX_0_298631336 as i64;
        let tmp1 = tmp1 * FIX_2_053119869 as i64;
        let tmp2 = tmp2 * FIX_3_072711026 as i64;
        let tmp3 = tmp3 * FIX_1_501321110 as i64;
        let z1 = z1 * -(FIX_0_899976223 as i64);
        let z2 = z2 * -(FIX_2_562915447 as i64);
        let z3 = z3 * -(FIX_1_961570560 as i64) + z5;
        let z4 = z4 * -(FIX_0_390180644 as i64) + z5;

        let tmp0 = tmp0 + z1 + z3;
        let tmp1 = tmp1 + z2 + z4;
        let tmp2 = tmp2 + z2 + z3;
        let tmp3 = tmp3 + z1 + z4;

        workspace[col] = descale(tmp10 + tmp3, CONST_BITS - PASS1_BITS);
        workspace[56 + col] = descale(tmp10 - tmp3, CONST_BITS - PASS1_BITS);
        workspace[8 + col] = descale(tmp11 + tmp2, CONST_BITS - PASS1_BITS);
        workspace[48 + col] = descale(tmp11 - tmp2, CONST_BITS - PASS1_BITS);
        workspace[16 + col] = descale(tmp12 + tmp1, CONST_BITS - PASS1_BITS);
        workspace[40 + col] = descale(tmp12 - tmp1, CONST_BITS - PASS1_BITS);
        workspace[24 + col] = descale(tmp13 + tmp0, CONST_BITS - PASS1_BITS);
        workspace[32 + col] = descale(tmp13 - tmp0, CONST_BITS - PASS1_BITS);
    }

    // Pass 2: rows, final descale and range limit.
    for row in 0..8 {
        let w = &workspace[row * 8..row * 8 + 8];

        if w[1..].iter().all(|&v| v == 0) {
            let dc = range_limit(descale(w[0] as i64, PASS1_BITS + 3));
            out[row * 8..row * 8 + 8].fill(dc);
            continue;
        }

        let z2 = w[2] as i64;
        let z3 = w[6] as i64;
        let z1 = (z2 + z3) * FIX_0_541196100 as i64;
        let tmp2 = z1 + z3 * -(FIX_1_847759065 as i64);
        let tmp3 = z1 + z2 * FIX_0_765366865 as i64;

        let tmp0 = ((w[0] as i64) + (w[4] as i64)) << CONST_BITS;
        let tmp1 = ((w[0] as i64) - (w[4] as i64)) << CONST_BITS;

        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        let tmp0 = w[7] as i64;
        let tmp1 = w[5] as i64;
        let tmp2 = w[3] as i64;
        let tmp3 = w[1] as i64;

        let z1 = tmp0 + tmp3;
        let z2 = tmp1 + tmp2;
        let z3 = tmp0 + tmp2;
        let z4 = tmp1 + tmp3;
        let z5 = (z3 + z4) * FIX_1_175875602 as i64;

        let tmp0 = tmp0 * FIX_0_298631336 as i64;
        let tmp1 = tmp1 * FIX_2_053119869 as i64;
        let tmp2 = tmp2 * FIX_3_072711026 as i64;
        let tmp3 = tmp3 * FIX_1_501321110 as i64;
        let z1 = z1 * -(FIX_0_899976223 as i64);
        let z2 = z2 * -(FIX_2_562915447 as i64);
        let z3 = z3 * -(FIX_1_961570560 as i64) + z5;
        let z4 = z4 * -(FIX_0_390180644 as i64) + z5;

        let tmp0 = tmp0 + z1 + z3;
        let tmp1 = tmp1 + z2 + z4;
        let tmp2 = tmp2 + z2 + z3;
        let tmp3 = tmp3 + z1 + z4;

        let shift = CONST_BITS + PASS1_BITS + 3;
        out[row * 8] = range_limit(descale(tmp10 + tmp3, shift));
        out[row * 8 + 7] = range_limit(descale(tmp10 - tmp3, shift));
        out[row * 8 + 1] = range_limit(descale(tmp11 + tmp2, shift));
        out[row * 8 + 6] = range_limit(descale(tmp11 - tmp2, shift));
        out[row * 8 + 2] = range_limit(descale(tmp12 + tmp1, shift));
        out[row * 8 + 5] = range_limit(descale(tmp12 - tmp1, shift));
        out[row * 8 + 3] = range_limit(descale(tmp13 + tmp0, shift));
        out[row * 8 + 4] = range_limit(descale(tmp13 - tmp0, shift));
    }
}

/// Forward DCT of one block of centered samples (sample - 128), natural
/// order. Output coefficients are scaled up by a factor of 8; the
/// quantizer divides it back out.
pub fn fdct_block(samples: &mut [i32; 64]) {
    // Pass 1: rows.
    for row in 0..8 {
        let d = &mut samples[row * 8..row * 8 + 8];
        let tmp0 = (d[0] + d[7]) as i64;
        let tmp7 = (d[0] - d[7]) as i64;
        let tmp1 = (d[1] + d[6]) as i64;
        let tmp6 = (d[1] - d[6]) as i64;
        let tmp2 = (d[2] + d[5]) as i64;
        let tmp5 = (d[2] - d[5]) as i64;
        let tmp3 = (d[3] + d[4]) as i64;
        let tmp4 = (d[3] - d[4]) as i64;

        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        d[0] = ((tmp10 + tmp11) << PASS1_BITS) as i32;
        d[4] = ((tmp10 - tmp11) << PASS1_BITS) as i32;

        let z1 = (tmp12 + tmp13) * FIX_0_541196100 as i64;
        d[2] = descale(z1 + tmp13 * FIX_0_765366865 as i64, CONST_BITS - PASS1_BITS);
        d[6] = descale(z1 + tmp12 * -(FIX_1_847759065 as i64), CONST_BITS - PASS1_BITS);

        let z1 = tmp4 + tmp7;
        let z2 = tmp5 + tmp6;
        let z3 = tmp4 + tmp6;
        let z4 = tmp5 + tmp7;
        let z5 = (z3 + z4) * FIX_1_175875602 as i64;

        let tmp4 = tmp4 * FIX_0_298631336 as i64;
        let tmp5 = tmp5 * FIX_2_053119869 as i64;
        let tmp6 = tmp6 * FIX_3_072711026 as i64;
        let tmp7 = tmp7 * FIX_1_501321110 as i64;
        let z1 = z1 * -(FIX_0_899976223 as i64);
        let z2 = z2 * -(FIX_2_562915447 as i64);
        let z3 = z3 * -(FIX_1_961570560 as i64) + z5;
        let z4 = z4 * -(FIX_0_390180644 as i64) + z5;

        d[7] = descale(tmp4 + z1 + z3, CONST_BITS - PASS1_BITS);
        d[5] = descale(tmp5 + z2 + z4, CONST_BITS - PASS1_BITS);
        d[3] = descale(tmp6 + z2 + z3, CONST_BITS - PASS1_BITS);
        d[1] = descale(tmp7 + z1 + z4, CONST_BITS - PASS1_BITS);
    }

    // Pass 2: columns.
    for col in 0..8 {
        let at = |row: usize| samples[row * 8 + col] as i64;

        let tmp0 = at(0) + at(7);
        let tmp7 = at(0) - at(7);
        let tmp1 = at(1) + at(6);
        let tmp6 = at(1) - at(6);
        let tmp2 = at(2) + at(5);
        let tmp5 = at(2) - at(5);
        let tmp3 = at(3) + at(4);
        let tmp4 = at(3) - at(4);

        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        samples[col] = descale(tmp10 + tmp11, PASS1_BITS);
        samples[32 + col] = descale(tmp10 - tmp11, PASS1_BITS);

        let z1 = (tmp12 + tmp13) * FIX_0_541196100 as i64;
        samples[16 + col] = descale(z1 + tmp13 * FIX_0_765366865 as i64, CONST_BITS + PASS1_BITS);
        samples[48 + col] =
            descale(z1 + tmp12 * -(FIX_1_847759065 as i64), CONST_BITS + PASS1_BITS);

        let z1 = tmp4 + tmp7;
        let z2 = tmp5 + tmp6;
        let z3 = tmp4 + tmp6;
        let z4 = tmp5 + tmp7;
        let z5 = (z3 + z4) * FIX_1_175875602 as i64;

        let tmp4 = tmp4 * FIX_0_298631336 as i64;
        let tmp5 = tmp5 * FIX_2_053119869 as i64;
        let tmp6 = tmp6 * FIX_3_072711026 as i64;
        let tmp7 = tmp7 * FIX_1_501321110 as i64;
        let z1 = z1 * -(FIX_0_899976223 as i64);
        let z2 = z2 * -(FIX_2_562915447 as i64);
        let z3 = z3 * -(FIX_1_961570560 as i64) + z5;
        let z4 = z4 * -(FIX_0_390180644 as i64) + z5;

        samples[56 + col] = descale(tmp4 + z1 + z3, CONST_BITS + PASS1_BITS);
        samples[40 + col] = descale(tmp5 + z2 + z4, CONST_BITS + PASS1_BITS);
        samples[24 + col] = descale(tmp6 + z2 + z3, CONST_BITS + PASS1_BITS);
        samples[8 + col] = descale(tmp7 + z1 + z4, CONST_BITS + PASS1_BITS);
    }
}

/// Quantize FDCT output (scaled by 8) in place, rounding to nearest.
pub fn quantize_block(coef: &mut [i32; 64], qtable: &[u16; 64]) {
    for i in 0..64 {
        let q = (qtable[i] as i32) << 3;
        let v = coef[i];
        let magnitude = v.abs() + (q >> 1);
        let quantized = magnitude / q;
        coef[i] = if v < 0 { -quantized } else { quantized };
    }
}

/// Expand quantized coefficients back to DCT-domain values.
pub fn dequantize_block(coef: &[i32; 64], qtable: &[u16; 64], out: &mut [i32; 64]) {
    for i in 0..64 {
        out[i] = coef[i] * qtable[i] as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_block_roundtrip() {
        let mut samples = [50i32 - 128; 64];
        fdct_block(&mut samples);
        // Undo the x8 forward scaling before feeding the inverse.
        let mut coef = [0i32; 64];
        for i in 0..64 {
            coef[i] = (samples[i] + 4) >> 3;
        }
        let mut out = [0u8; 64];
        idct_block(&coef, &mut out);
        for &p in &out {
            assert!((p as i32 - 50).abs() <= 1, "got {p}");
        }
    }

    #[test]
    fn idct_of_fdct_is_close() {
        let mut original = [0u8; 64];
        for (i, v) in original.iter_mut().enumerate() {
            *v = ((i * 37) % 256) as u8;
        }
        let mut samples = [0i32; 64];
        for i in 0..64 {
            samples[i] = original[i] as i32 - 128;
        }
        fdct_block(&mut samples);
        let mut coef = [0i32; 64];
        for i in 0..64 {
            coef[i] = if samples[i] < 0 {
                -((-samples[i] + 4) >> 3)
            } else {
                (samples[i] + 4) >> 3
            };
        }
        let mut out = [0u8; 64];
        idct_block(&coef, &mut out);
        for i in 0..64 {
            let diff = (out[i] as i32 - original[i] as i32).abs();
            assert!(diff <= 2, "index {i}: {} vs {}", out[i], original[i]);
        }
    }

    #[test]
    fn dc_only_block_broadcasts() {
        let mut coef = [0i32; 64];
        coef[0] = 64; // IDCT divides DC by 8, so this is +8 around center
        let mut out = [0u8; 64];
        idct_block(&coef, &mut out);
        assert!(out.iter().all(|&p| p == out[0]));
        assert_eq!(out[0], 136);
    }

    #[test]
    fn range_limit_absorbs_overshoot() {
        assert_eq!(range_limit(0), 128);
        assert_eq!(range_limit(127), 255);
        assert_eq!(range_limit(-128), 0);
        assert_eq!(range_limit(300), 255);
        assert_eq!(range_limit(-300), 0);
    }

    #[test]
    fn quantize_rounds_to_nearest() {
        let mut coef = [0i32; 64];
        coef[0] = 8 * 10; // value 10 at quant 4 -> 2.5, rounds away from zero
        coef[1] = -8 * 10;
        let mut q = [1u16; 64];
        q[0] = 4;
        q[1] = 4;
        quantize_block(&mut coef, &q);
        assert_eq!(coef[0], 3);
        assert_eq!(coef[1], -3);
    }

    #[test]
    fn natural_order_is_a_permutation() {
        let mut seen = [false; 64];
        for &i in &NATURAL_ORDER {
            assert!(!seen[i]);
            seen[i] = true;
        }
    }
}
