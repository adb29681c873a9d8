//! Fixed-point YCbCr color conversion and chroma upsampling.
//!
//! Conversion uses per-channel tables indexed by the 8-bit sample value so
//! the per-pixel work is adds and shifts only. Upsampling picks a variant
//! per component from its sampling ratio: identity, 2:1 "fancy" linear
//! interpolation (3/4-1/4 horizontally, 9/16-3/16-3/16-1/16 for 2x2), or
//! generic integer replication for unusual ratios.

const SCALE_BITS: i32 = 16;
const ONE_HALF: i32 = 1 << (SCALE_BITS - 1);

const fn fix(x: f64) -> i32 {
    (x * (1 << SCALE_BITS) as f64 + 0.5) as i32
}

/// Decode-side tables: contribution of each Cb/Cr value to R, G, B.
pub struct YcbcrToRgb {
    cr_r: [i32; 256],
    cb_b: [i32; 256],
    cr_g: [i32; 256],
    cb_g: [i32; 256],
}

impl YcbcrToRgb {
    pub fn new() -> Self {
        let mut t = Self {
            cr_r: [0; 256],
            cb_b: [0; 256],
            cr_g: [0; 256],
            cb_g: [0; 256],
        };
        for i in 0..256 {
            let x = i as i32 - 128;
            t.cr_r[i] = (fix(1.40200) * x + ONE_HALF) >> SCALE_BITS;
            t.cb_b[i] = (fix(1.77200) * x + ONE_HALF) >> SCALE_BITS;
            t.cr_g[i] = -fix(0.71414) * x;
            t.cb_g[i] = -fix(0.34414) * x + ONE_HALF;
        }
        t
    }

    #[inline]
    pub fn convert(&self, y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
        let y = y as i32;
        let r = y + self.cr_r[cr as usize];
        let g = y + ((self.cb_g[cb as usize] + self.cr_g[cr as usize]) >> SCALE_BITS);
        let b = y + self.cb_b[cb as usize];
        (clamp8(r), clamp8(g), clamp8(b))
    }
}

impl Default for YcbcrToRgb {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn clamp8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Encode-side conversion, same fixed-point scheme as the decoder tables.
#[inline]
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = (fix(0.29900) * r + fix(0.58700) * g + fix(0.11400) * b + ONE_HALF) >> SCALE_BITS;
    let cb = ((-fix(0.16874)) * r - fix(0.33126) * g + fix(0.50000) * b
        + (128 << SCALE_BITS)
        + ONE_HALF
        - 1)
        >> SCALE_BITS;
    let cr = (fix(0.50000) * r - fix(0.41869) * g - fix(0.08131) * b
        + (128 << SCALE_BITS)
        + ONE_HALF
        - 1)
        >> SCALE_BITS;
    (clamp8(y), clamp8(cb), clamp8(cr))
}

/// One component's sample plane at its own (possibly subsampled) resolution.
#[derive(Clone)]
pub struct SamplePlane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl SamplePlane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// Upsample `plane` to `out_width` x `out_height`.
///
/// Exact 2:1 ratios get the triangle-filter treatment; anything else is
/// integer pixel replication.
pub fn upsample(
    plane: &SamplePlane,
    h_ratio: usize,
    v_ratio: usize,
    out_width: usize,
    out_height: usize,
) -> SamplePlane {
    match (h_ratio, v_ratio) {
        (1, 1) => crop(plane, out_width, out_height),
        (2, 1) => fancy_h2v1(plane, out_width, out_height),
        (2, 2) => fancy_h2v2(plane, out_width, out_height),
        _ => replicate(plane, h_ratio, v_ratio, out_width, out_height),
    }
}

fn crop(plane: &SamplePlane, out_width: usize, out_height: usize) -> SamplePlane {
    let mut out = SamplePlane::new(out_width, out_height);
    for y in 0..out_height {
        let sy = y.min(plane.height - 1);
        for x in 0..out_width {
            let sx = x.min(plane.width - 1);
            out.data[y * out_width + x] = plane.at(sx, sy);
        }
    }
    out
}

/// Horizontal 2:1, weights 3/4 nearer + 1/4 further; edge pixels replicate.
fn fancy_h2v1(plane: &SamplePlane, out_width: usize, out_height: usize) -> SamplePlane {
    let mut out = SamplePlane::new(out_width, out_height);
    for y in 0..out_height {
        let sy = y.min(plane.height - 1);
        upsample_row_h2(plane, sy, &mut out.data[y * out_width..(y + 1) * out_width]);
    }
    out
}

fn upsample_row_h2(plane: &SamplePlane, sy: usize, out_row: &mut [u8]) {
    let w = plane.width;
    for ox in 0..out_row.len() {
        let sx = (ox / 2).min(w - 1);
        let cur = plane.at(sx, sy) as u32;
        let v = if ox % 2 == 0 {
            if sx == 0 {
                cur * 4
            } else {
                cur * 3 + plane.at(sx - 1, sy) as u32 + 1
            }
        } else if sx + 1 >= w {
            cur * 4
        } else {
            cur * 3 + plane.at(sx + 1, sy) as u32 + 2
        };
        out_row[ox] = (v / 4) as u8;
    }
}

/// 2x2 bilinear with weights 9/16, 3/16, 3/16, 1/16.
fn fancy_h2v2(plane: &SamplePlane, out_width: usize, out_height: usize) -> SamplePlane {
    let mut out = SamplePlane::new(out_width, out_height);
    let w = plane.width;
    let h = plane.height;
    for oy in 0..out_height {
        let sy = (oy / 2).min(h - 1);
        // The vertically nearer neighbour row.
        let ny = if oy % 2 == 0 {
            sy.saturating_sub(1)
        } else {
            (sy + 1).min(h - 1)
        };
        for ox in 0..out_width {
            let sx = (ox / 2).min(w - 1);
            let nx = if ox % 2 == 0 {
                sx.saturating_sub(1)
            } else {
                (sx + 1).min(w - 1)
            };
            let v = 9 * plane.at(sx, sy) as u32
                + 3 * plane.at(nx, sy) as u32
                + 3 * plane.at(sx, ny) as u32
                + plane.at(nx, ny) as u32;
            out.data[oy * out_width + ox] = ((v + 8) / 16) as u8;
        }
    }
    out
}

/// Generic integer replication for ratios other than 1 and 2.
fn replicate(
    plane: &SamplePlane,
    h_ratio: usize,
    v_ratio: usize,
    out_width: usize,
    out_height: usize,
) -> SamplePlane {
    let mut out = SamplePlane::new(out_width, out_height);
    for y in 0..out_height {
        let sy = (y / v_ratio.max(1)).min(plane.height - 1);
        for x in 0..out_width {
            let sx = (x / h_ratio.max(1)).min(plane.width - 1);
            out.data[y * out_width + x] = plane.at(sx, sy);
        }
    }
    out
}
