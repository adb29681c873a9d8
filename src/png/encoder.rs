//! PNG encoder: adaptive per-row filtering over a zlib-compressed IDAT.
//!
//! Indexed images become color type 3 with a PLTE (and tRNS when a
//! transparent index is set); direct-color images become truecolor,
//! gaining an alpha channel when the source carries an alpha plane.

use crate::deflate::{crc32, deflate_zlib, CompressionLevel};
use crate::error::{CodecError, Result};
use crate::image_data::{ImageData, PaletteData};
use crate::png::filter::{choose_filter, filter_row};
use crate::png::SIGNATURE;
use crate::stream::ByteWriter;

pub struct PngEncoder {
    level: CompressionLevel,
}

impl PngEncoder {
    pub fn new() -> Self {
        Self {
            level: CompressionLevel::Default,
        }
    }

    pub fn compression(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn encode(&self, image: &ImageData) -> Result<Vec<u8>> {
        if image.width == 0 || image.height == 0 {
            return Err(CodecError::InvalidImage("empty image"));
        }
        let mut out = ByteWriter::new();
        out.write_bytes(&SIGNATURE);

        match &image.palette {
            PaletteData::Indexed(colors) => {
                if image.depth > 8 {
                    return Err(CodecError::UnsupportedDepth(image.depth));
                }
                self.encode_indexed(image, colors, &mut out)?;
            }
            PaletteData::Direct { .. } => self.encode_direct(image, &mut out)?,
        }

        write_chunk(&mut out, b"IEND", &[]);
        Ok(out.into_vec())
    }

    fn encode_indexed(
        &self,
        image: &ImageData,
        colors: &[crate::image_data::Rgb],
        out: &mut ByteWriter,
    ) -> Result<()> {
        write_ihdr(out, image, 3, image.depth as u8);

        let mut plte = Vec::with_capacity(colors.len() * 3);
        for c in colors {
            plte.extend_from_slice(&[c.red, c.green, c.blue]);
        }
        write_chunk(out, b"PLTE", &plte);

        if let Some(index) = image.transparent_pixel {
            let mut trns = vec![255u8; index + 1];
            trns[index] = 0;
            write_chunk(out, b"tRNS", &trns);
        }

        // Raw scanlines are the packed index rows, without the stride pad.
        let row_bytes = (image.width * image.depth as usize).div_ceil(8);
        let rows: Vec<Vec<u8>> = (0..image.height)
            .map(|y| {
                let start = y * image.bytes_per_line;
                image.data[start..start + row_bytes].to_vec()
            })
            .collect();
        self.write_idat(out, &rows, 1);
        Ok(())
    }

    fn encode_direct(&self, image: &ImageData, out: &mut ByteWriter) -> Result<()> {
        let alpha = image.alpha_data.as_deref();
        let color_type = if alpha.is_some() { 6 } else { 2 };
        write_ihdr(out, image, color_type, 8);

        let channels = if alpha.is_some() { 4 } else { 3 };
        let rows: Vec<Vec<u8>> = (0..image.height)
            .map(|y| {
                let mut row = Vec::with_capacity(image.width * channels);
                for x in 0..image.width {
                    let pixel = image.pixel(x, y);
                    row.push(pixel as u8);
                    row.push((pixel >> 8) as u8);
                    row.push((pixel >> 16) as u8);
                    if let Some(alpha) = alpha {
                        row.push(alpha[y * image.width + x]);
                    }
                }
                row
            })
            .collect();
        self.write_idat(out, &rows, channels);
        Ok(())
    }

    fn write_idat(&self, out: &mut ByteWriter, rows: &[Vec<u8>], bpp: usize) {
        let mut raw = Vec::new();
        let mut prev: &[u8] = &[];
        for row in rows {
            let filter = choose_filter(row, prev, bpp);
            raw.push(filter as u8);
            filter_row(filter, row, prev, bpp, &mut raw);
            prev = row;
        }
        let idat = deflate_zlib(&raw, self.level);
        write_chunk(out, b"IDAT", &idat);
    }
}

impl Default for PngEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_ihdr(out: &mut ByteWriter, image: &ImageData, color_type: u8, bit_depth: u8) {
    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&(image.width as u32).to_be_bytes());
    ihdr.extend_from_slice(&(image.height as u32).to_be_bytes());
    ihdr.extend_from_slice(&[bit_depth, color_type, 0, 0, 0]);
    write_chunk(out, b"IHDR", &ihdr);
}

fn write_chunk(out: &mut ByteWriter, kind: &[u8; 4], payload: &[u8]) {
    out.write_u32_be(payload.len() as u32);
    out.write_bytes(kind);
    out.write_bytes(payload);
    let mut crc_input = kind.to_vec();
    crc_input.extend_from_slice(payload);
    out.write_u32_be(crc32(&crc_input));
}
