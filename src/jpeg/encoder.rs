//! Baseline JPEG encoder.
//!
//! Writes SOF0 streams with the Annex K example quantization tables
//! scaled by a libjpeg-style quality factor and the standard Huffman
//! tables. Color input is encoded as YCbCr without subsampling;
//! grayscale palettes collapse to a single-component frame.

use crate::error::{CodecError, Result};
use crate::image_data::{ImageData, PaletteData};
use crate::jpeg::color::rgb_to_ycbcr;
use crate::jpeg::dct::{fdct_block, quantize_block, NATURAL_ORDER};
use crate::jpeg::huffman::{
    HuffmanTable, STD_AC_CHROMA_LENGTHS, STD_AC_CHROMA_VALUES, STD_AC_LUMA_LENGTHS,
    STD_AC_LUMA_VALUES, STD_DC_CHROMA_LENGTHS, STD_DC_CHROMA_VALUES, STD_DC_LUMA_LENGTHS,
    STD_DC_LUMA_VALUES,
};
use crate::jpeg::marker::{MarkerCode, MARKER_PREFIX, RESTART_BASE, RESTART_MODULO};
use crate::stream::ByteWriter;

/// Annex K.1 luminance quantizers, natural order.
const BASE_LUMA_QUANT: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Annex K.2 chrominance quantizers, natural order.
const BASE_CHROMA_QUANT: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, //
    18, 21, 26, 66, 99, 99, 99, 99, //
    24, 26, 56, 99, 99, 99, 99, 99, //
    47, 66, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// MSB-first bit emitter with `FF 00` byte stuffing.
struct BitWriter<'a> {
    out: &'a mut ByteWriter,
    acc: u32,
    count: u32,
}

impl<'a> BitWriter<'a> {
    fn new(out: &'a mut ByteWriter) -> Self {
        Self { out, acc: 0, count: 0 }
    }

    fn put(&mut self, code: u32, length: u32) {
        for i in (0..length).rev() {
            self.acc = (self.acc << 1) | ((code >> i) & 1);
            self.count += 1;
            if self.count == 8 {
                let byte = self.acc as u8;
                self.out.write_u8(byte);
                if byte == 0xFF {
                    self.out.write_u8(0x00);
                }
                self.acc = 0;
                self.count = 0;
            }
        }
    }

    /// Pad to the byte boundary with one bits (F.1.2.3).
    fn flush(&mut self) {
        if self.count > 0 {
            let pad = 8 - self.count;
            self.put((1 << pad) - 1, pad);
        }
    }
}

pub struct JpegEncoder {
    quality: u8,
    restart_interval: u16,
}

impl JpegEncoder {
    pub fn new() -> Self {
        Self {
            quality: 75,
            restart_interval: 0,
        }
    }

    /// Quality 1 (worst) to 100 (best); out-of-range values are clamped.
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Emit a restart marker every `interval` MCUs (0 disables).
    pub fn restart_interval(mut self, interval: u16) -> Self {
        self.restart_interval = interval;
        self
    }

    pub fn encode(&self, image: &ImageData) -> Result<Vec<u8>> {
        if image.width == 0 || image.height == 0 {
            return Err(CodecError::InvalidImage("empty image"));
        }
        if image.width > 0xFFFF || image.height > 0xFFFF {
            return Err(CodecError::InvalidImage("image too large for jpeg"));
        }

        let grayscale = is_grayscale(image);
        let luma_quant = scale_quant(&BASE_LUMA_QUANT, self.quality);
        let chroma_quant = scale_quant(&BASE_CHROMA_QUANT, self.quality);

        let dc_luma = HuffmanTable::standard_dc_luma();
        let ac_luma = HuffmanTable::standard_ac_luma();
        let dc_chroma = HuffmanTable::standard_dc_chroma();
        let ac_chroma = HuffmanTable::standard_ac_chroma();

        let mut out = ByteWriter::new();
        write_marker(&mut out, MarkerCode::StartOfImage);
        write_app0_jfif(&mut out);
        write_dqt(&mut out, 0, &luma_quant);
        if !grayscale {
            write_dqt(&mut out, 1, &chroma_quant);
        }
        write_sof0(&mut out, image, grayscale);
        write_dht(&mut out, 0x00, &STD_DC_LUMA_LENGTHS, &STD_DC_LUMA_VALUES);
        write_dht(&mut out, 0x10, &STD_AC_LUMA_LENGTHS, &STD_AC_LUMA_VALUES);
        if !grayscale {
            write_dht(&mut out, 0x01, &STD_DC_CHROMA_LENGTHS, &STD_DC_CHROMA_VALUES);
            write_dht(&mut out, 0x11, &STD_AC_CHROMA_LENGTHS, &STD_AC_CHROMA_VALUES);
        }
        if self.restart_interval > 0 {
            write_marker(&mut out, MarkerCode::DefineRestartInterval);
            out.write_u16_be(4);
            out.write_u16_be(self.restart_interval);
        }
        write_sos(&mut out, grayscale);

        // Component sample planes at full resolution.
        let planes = build_planes(image, grayscale)?;
        let quants: Vec<&[u16; 64]> = if grayscale {
            vec![&luma_quant]
        } else {
            vec![&luma_quant, &chroma_quant, &chroma_quant]
        };
        let huffman: Vec<(&HuffmanTable, &HuffmanTable)> = if grayscale {
            vec![(&dc_luma, &ac_luma)]
        } else {
            vec![
                (&dc_luma, &ac_luma),
                (&dc_chroma, &ac_chroma),
                (&dc_chroma, &ac_chroma),
            ]
        };

        let mcus_x = image.width.div_ceil(8);
        let mcus_y = image.height.div_ceil(8);
        let mut dc_pred = vec![0i32; planes.len()];
        let mut writer = BitWriter::new(&mut out);
        let mut mcus_since_restart = 0u32;
        let mut restart_index = 0u8;

        for mcu_y in 0..mcus_y {
            for mcu_x in 0..mcus_x {
                if self.restart_interval > 0
                    && mcus_since_restart == self.restart_interval as u32
                {
                    writer.flush();
                    let out = &mut *writer.out;
                    out.write_u8(MARKER_PREFIX);
                    out.write_u8(RESTART_BASE + restart_index);
                    restart_index = (restart_index + 1) % RESTART_MODULO;
                    mcus_since_restart = 0;
                    dc_pred.iter_mut().for_each(|p| *p = 0);
                }
                for (c, plane) in planes.iter().enumerate() {
                    let mut block = [0i32; 64];
                    load_block(plane, image.width, image.height, mcu_x, mcu_y, &mut block);
                    fdct_block(&mut block);
                    quantize_block(&mut block, quants[c]);
                    let (dc, ac) = huffman[c];
                    encode_block(&mut writer, &block, dc, ac, &mut dc_pred[c]);
                }
                mcus_since_restart += 1;
            }
        }
        writer.flush();

        write_marker(&mut out, MarkerCode::EndOfImage);
        Ok(out.into_vec())
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// libjpeg quality curve: 5000/q below 50, 200-2q above.
fn scale_quant(base: &[u16; 64], quality: u8) -> [u16; 64] {
    let quality = quality.clamp(1, 100) as u32;
    let scale = if quality < 50 {
        5000 / quality
    } else {
        200 - 2 * quality
    };
    let mut table = [0u16; 64];
    for i in 0..64 {
        let v = (base[i] as u32 * scale + 50) / 100;
        table[i] = v.clamp(1, 255) as u16;
    }
    table
}

fn is_grayscale(image: &ImageData) -> bool {
    match &image.palette {
        PaletteData::Indexed(colors) => {
            image.depth <= 8
                && !colors.is_empty()
                && colors.iter().all(|c| c.red == c.green && c.green == c.blue)
        }
        PaletteData::Direct { .. } => false,
    }
}

/// Scale a masked channel value up to 8 bits.
fn channel(value: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    let bits = mask >> shift;
    let width = 32 - bits.leading_zeros();
    let v = (value & mask) >> shift;
    if width >= 8 {
        (v >> (width - 8)) as u8
    } else {
        ((v * 255) / bits) as u8
    }
}

fn rgb_at(image: &ImageData, x: usize, y: usize) -> (u8, u8, u8) {
    let value = image.pixel(x, y);
    match &image.palette {
        PaletteData::Indexed(colors) => {
            let c = colors.get(value as usize).copied().unwrap_or_default();
            (c.red, c.green, c.blue)
        }
        PaletteData::Direct {
            red_mask,
            green_mask,
            blue_mask,
        } => (
            channel(value, *red_mask),
            channel(value, *green_mask),
            channel(value, *blue_mask),
        ),
    }
}

fn build_planes(image: &ImageData, grayscale: bool) -> Result<Vec<Vec<u8>>> {
    let (w, h) = (image.width, image.height);
    if grayscale {
        let mut plane = vec![0u8; w * h];
        let colors = match &image.palette {
            PaletteData::Indexed(colors) => colors,
            PaletteData::Direct { .. } => {
                return Err(CodecError::InvalidImage("grayscale plane from direct palette"))
            }
        };
        for y in 0..h {
            for x in 0..w {
                let index = image.pixel(x, y) as usize;
                plane[y * w + x] = colors.get(index).map(|c| c.red).unwrap_or(0);
            }
        }
        return Ok(vec![plane]);
    }
    let mut yp = vec![0u8; w * h];
    let mut cbp = vec![0u8; w * h];
    let mut crp = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = rgb_at(image, x, y);
            let (yy, cb, cr) = rgb_to_ycbcr(r, g, b);
            yp[y * w + x] = yy;
            cbp[y * w + x] = cb;
            crp[y * w + x] = cr;
        }
    }
    Ok(vec![yp, cbp, crp])
}

/// Copy one 8x8 block, replicating edge samples past the image border,
/// and level-shift to signed range.
fn load_block(
    plane: &[u8],
    width: usize,
    height: usize,
    mcu_x: usize,
    mcu_y: usize,
    block: &mut [i32; 64],
) {
    for row in 0..8 {
        let sy = (mcu_y * 8 + row).min(height - 1);
        for col in 0..8 {
            let sx = (mcu_x * 8 + col).min(width - 1);
            block[row * 8 + col] = plane[sy * width + sx] as i32 - 128;
        }
    }
}

/// Number of magnitude bits for a coefficient (F.1.2.1).
fn category(value: i32) -> u32 {
    32 - (value.unsigned_abs()).leading_zeros()
}

/// Magnitude bits: the value itself for positive, value-1 two's
/// complement low bits for negative.
fn magnitude_bits(value: i32, s: u32) -> u32 {
    if value < 0 {
        (value - 1) as u32 & ((1 << s) - 1)
    } else {
        value as u32
    }
}

fn encode_block(
    writer: &mut BitWriter<'_>,
    block: &[i32; 64],
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    dc_pred: &mut i32,
) {
    let dc = block[0];
    let diff = dc - *dc_pred;
    *dc_pred = dc;
    let s = category(diff);
    let (code, len) = dc_table.code(s as u8);
    writer.put(code as u32, len as u32);
    if s > 0 {
        writer.put(magnitude_bits(diff, s), s);
    }

    let mut run = 0u32;
    for k in 1..64 {
        let v = block[NATURAL_ORDER[k]];
        if v == 0 {
            run += 1;
            continue;
        }
        while run > 15 {
            let (code, len) = ac_table.code(0xF0); // ZRL
            writer.put(code as u32, len as u32);
            run -= 16;
        }
        let s = category(v);
        let (code, len) = ac_table.code(((run as u8) << 4) | s as u8);
        writer.put(code as u32, len as u32);
        writer.put(magnitude_bits(v, s), s);
        run = 0;
    }
    if run > 0 {
        let (code, len) = ac_table.code(0x00); // EOB
        writer.put(code as u32, len as u32);
    }
}

fn write_marker(out: &mut ByteWriter, marker: MarkerCode) {
    out.write_u8(MARKER_PREFIX);
    out.write_u8(marker as u8);
}

fn write_app0_jfif(out: &mut ByteWriter) {
    write_marker(out, MarkerCode::ApplicationData0);
    out.write_u16_be(16);
    out.write_bytes(b"JFIF\0");
    out.write_u8(1); // version 1.1
    out.write_u8(1);
    out.write_u8(0); // aspect ratio units
    out.write_u16_be(1);
    out.write_u16_be(1);
    out.write_u8(0); // no thumbnail
    out.write_u8(0);
}

fn write_dqt(out: &mut ByteWriter, id: u8, table: &[u16; 64]) {
    write_marker(out, MarkerCode::DefineQuantizationTable);
    out.write_u16_be(2 + 1 + 64);
    out.write_u8(id); // 8-bit precision
    for k in 0..64 {
        out.write_u8(table[NATURAL_ORDER[k]] as u8);
    }
}

fn write_sof0(out: &mut ByteWriter, image: &ImageData, grayscale: bool) {
    let nf: u8 = if grayscale { 1 } else { 3 };
    write_marker(out, MarkerCode::StartOfFrameBaseline);
    out.write_u16_be(8 + 3 * nf as u16);
    out.write_u8(8); // sample precision
    out.write_u16_be(image.height as u16);
    out.write_u16_be(image.width as u16);
    out.write_u8(nf);
    for c in 0..nf {
        out.write_u8(c + 1); // component id
        out.write_u8(0x11); // no subsampling
        out.write_u8(if c == 0 { 0 } else { 1 }); // quant table
    }
}

fn write_dht(out: &mut ByteWriter, tc_th: u8, lengths: &[u8; 16], values: &[u8]) {
    write_marker(out, MarkerCode::DefineHuffmanTable);
    out.write_u16_be(2 + 1 + 16 + values.len() as u16);
    out.write_u8(tc_th);
    out.write_bytes(lengths);
    out.write_bytes(values);
}

fn write_sos(out: &mut ByteWriter, grayscale: bool) {
    let ns: u8 = if grayscale { 1 } else { 3 };
    write_marker(out, MarkerCode::StartOfScan);
    out.write_u16_be(6 + 2 * ns as u16);
    out.write_u8(ns);
    for c in 0..ns {
        out.write_u8(c + 1);
        out.write_u8(if c == 0 { 0x00 } else { 0x11 });
    }
    out.write_u8(0); // Ss
    out.write_u8(63); // Se
    out.write_u8(0); // Ah/Al
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_data::Rgb;
    use crate::jpeg::decoder::JpegDecoder;

    fn gray_palette() -> PaletteData {
        PaletteData::Indexed((0..256).map(|i| Rgb::new(i as u8, i as u8, i as u8)).collect())
    }

    #[test]
    fn category_widths() {
        assert_eq!(category(0), 0);
        assert_eq!(category(1), 1);
        assert_eq!(category(-1), 1);
        assert_eq!(category(255), 8);
        assert_eq!(category(-1024), 11);
    }

    #[test]
    fn quality_scaling_monotone() {
        let q10 = scale_quant(&BASE_LUMA_QUANT, 10);
        let q50 = scale_quant(&BASE_LUMA_QUANT, 50);
        let q95 = scale_quant(&BASE_LUMA_QUANT, 95);
        for i in 0..64 {
            assert!(q10[i] >= q50[i]);
            assert!(q50[i] >= q95[i]);
            assert!(q95[i] >= 1);
        }
        assert_eq!(q50, BASE_LUMA_QUANT);
    }

    #[test]
    fn gray_roundtrip_within_tolerance() {
        let mut image = ImageData::new(16, 16, 8, gray_palette());
        for y in 0..16 {
            for x in 0..16 {
                image.set_pixel(x, y, ((x * 16 + y * 3) & 0xFF) as u32);
            }
        }
        let bytes = JpegEncoder::new().quality(95).encode(&image).unwrap();
        let mut d = JpegDecoder::new();
        let decoded = d.decode(&bytes).unwrap();
        assert_eq!(decoded.width, 16);
        assert_eq!(decoded.depth, 8);
        for y in 0..16 {
            for x in 0..16 {
                let want = image.pixel(x, y) as i32;
                let got = decoded.pixel(x, y) as i32;
                assert!((want - got).abs() <= 12, "({x},{y}): {want} vs {got}");
            }
        }
    }

    #[test]
    fn color_roundtrip_within_tolerance() {
        let mut image = ImageData::new(8, 8, 24, PaletteData::direct_rgb24());
        for y in 0..8 {
            for x in 0..8 {
                let r = (x * 32) as u32;
                let g = (y * 32) as u32;
                let b = 128;
                image.set_pixel(x, y, r | (g << 8) | (b << 16));
            }
        }
        let bytes = JpegEncoder::new().quality(95).encode(&image).unwrap();
        let mut d = JpegDecoder::new();
        let decoded = d.decode(&bytes).unwrap();
        assert_eq!(decoded.depth, 24);
        for y in 0..8 {
            for x in 0..8 {
                let want = image.pixel(x, y);
                let got = decoded.pixel(x, y);
                for shift in [0, 8, 16] {
                    let a = ((want >> shift) & 0xFF) as i32;
                    let b = ((got >> shift) & 0xFF) as i32;
                    assert!((a - b).abs() <= 16, "({x},{y}) channel {shift}: {a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn restart_markers_present_and_decodable() {
        let mut image = ImageData::new(32, 8, 8, gray_palette());
        for x in 0..32 {
            image.set_pixel(x, 4, (x * 8) as u32);
        }
        let bytes = JpegEncoder::new()
            .quality(90)
            .restart_interval(1)
            .encode(&image)
            .unwrap();
        // Expect RST0..RST2 between the four MCUs.
        let mut found = 0;
        for w in bytes.windows(2) {
            if w[0] == 0xFF && (0xD0..=0xD7).contains(&w[1]) {
                found += 1;
            }
        }
        assert_eq!(found, 3);
        let mut d = JpegDecoder::new();
        let decoded = d.decode(&bytes).unwrap();
        assert_eq!(decoded.width, 32);
        assert!(d.warnings().is_empty(), "{:?}", d.warnings());
    }
}
