//! PNG decoder and encoder.
//!
//! The decoder enforces chunk ordering (IHDR first, PLTE before IDAT,
//! IEND last), verifies every chunk CRC, inflates the concatenated IDAT
//! payload, reverses scanline filters and de-interlaces Adam7 streams,
//! notifying the listener after each pass. Sixteen-bit channels are
//! folded to eight bits on output.

mod encoder;
mod filter;

pub use encoder::PngEncoder;

use crate::deflate::{crc32, inflate_zlib};
use crate::error::{CodecError, Result};
use crate::image_data::{DecodeListener, ImageData, LoaderEvent, NullListener, PaletteData, Rgb};
use crate::png::filter::{unfilter_row, FilterType};
use crate::stream::ByteReader;

pub(crate) const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn is_png(data: &[u8]) -> bool {
    data.len() >= 8 && data[..8] == SIGNATURE
}

/// Adam7 pass layout: x start, y start, x step, y step.
const ADAM7: [(usize, usize, usize, usize); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

const COLOR_GRAY: u8 = 0;
const COLOR_RGB: u8 = 2;
const COLOR_INDEXED: u8 = 3;
const COLOR_GRAY_ALPHA: u8 = 4;
const COLOR_RGBA: u8 = 6;

struct Header {
    width: usize,
    height: usize,
    bit_depth: u8,
    color_type: u8,
    interlaced: bool,
}

impl Header {
    fn channels(&self) -> usize {
        match self.color_type {
            COLOR_GRAY | COLOR_INDEXED => 1,
            COLOR_GRAY_ALPHA => 2,
            COLOR_RGB => 3,
            COLOR_RGBA => 4,
            _ => 0,
        }
    }

    /// Filter pixel offset in bytes, at least one.
    fn bytes_per_pixel(&self) -> usize {
        (self.channels() * self.bit_depth as usize / 8).max(1)
    }

    fn row_bytes(&self, width: usize) -> usize {
        (width * self.channels() * self.bit_depth as usize).div_ceil(8)
    }
}

/// Transparency info from tRNS, interpreted per color type.
enum Transparency {
    PaletteAlpha(Vec<u8>),
    GraySample(u16),
    RgbSample(u16, u16, u16),
}

pub struct PngDecoder {
    warnings: Vec<String>,
}

impl PngDecoder {
    pub fn new() -> Self {
        Self { warnings: Vec::new() }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn decode(&mut self, data: &[u8]) -> Result<ImageData> {
        self.decode_with_listener(data, &mut NullListener)
    }

    pub fn decode_with_listener(
        &mut self,
        data: &[u8],
        listener: &mut dyn DecodeListener,
    ) -> Result<ImageData> {
        if !is_png(data) {
            return Err(CodecError::InvalidImage("missing png signature"));
        }
        let mut reader = ByteReader::new(data);
        reader.skip(8)?;

        let mut header: Option<Header> = None;
        let mut palette: Option<Vec<Rgb>> = None;
        let mut transparency: Option<Transparency> = None;
        let mut idat: Vec<u8> = Vec::new();
        let mut saw_idat = false;
        let mut saw_iend = false;

        while !saw_iend {
            let (chunk_type, chunk) = read_chunk(&mut reader)?;
            match &chunk_type {
                b"IHDR" => {
                    if header.is_some() {
                        return Err(CodecError::InvalidImage("duplicate IHDR chunk"));
                    }
                    header = Some(parse_ihdr(&chunk)?);
                }
                _ if header.is_none() => {
                    return Err(CodecError::InvalidImage("chunk precedes IHDR"));
                }
                b"PLTE" => {
                    if palette.is_some() {
                        return Err(CodecError::InvalidImage("duplicate PLTE chunk"));
                    }
                    if saw_idat {
                        return Err(CodecError::InvalidImage("PLTE after IDAT"));
                    }
                    if chunk.is_empty() || chunk.len() % 3 != 0 || chunk.len() > 256 * 3 {
                        return Err(CodecError::InvalidImage("bad PLTE length"));
                    }
                    palette = Some(
                        chunk
                            .chunks_exact(3)
                            .map(|c| Rgb::new(c[0], c[1], c[2]))
                            .collect(),
                    );
                }
                b"tRNS" => {
                    if saw_idat {
                        return Err(CodecError::InvalidImage("tRNS after IDAT"));
                    }
                    let header = header.as_ref().ok_or(CodecError::InvalidImage("no IHDR"))?;
                    transparency = Some(parse_trns(&chunk, header, palette.as_deref())?);
                }
                b"IDAT" => {
                    saw_idat = true;
                    idat.extend_from_slice(&chunk);
                }
                b"IEND" => {
                    if !chunk.is_empty() {
                        return Err(CodecError::InvalidImage("IEND carries data"));
                    }
                    saw_iend = true;
                }
                other => {
                    // Bit 5 of the first type byte: 0 = critical.
                    if other[0] & 0x20 == 0 {
                        return Err(CodecError::InvalidImageDetail(format!(
                            "unknown critical chunk {}",
                            String::from_utf8_lossy(other)
                        )));
                    }
                }
            }
        }

        let header = header.ok_or(CodecError::InvalidImage("missing IHDR"))?;
        if !saw_idat {
            return Err(CodecError::InvalidImage("missing IDAT"));
        }
        if header.color_type == COLOR_INDEXED && palette.is_none() {
            return Err(CodecError::InvalidImage("indexed png without PLTE"));
        }

        let expected = expected_raw_size(&header);
        let raw = inflate_zlib(&idat, Some(expected))?;

        let mut image = prepare_image(&header, palette, transparency.as_ref())?;
        let passes: &[(usize, usize, usize, usize)] = if header.interlaced {
            &ADAM7
        } else {
            &[(0, 0, 1, 1)]
        };

        let mut offset = 0usize;
        let last_pass = passes
            .iter()
            .rposition(|&(sx, sy, dx, dy)| {
                pass_size(&header, sx, sy, dx, dy).is_some()
            })
            .unwrap_or(0);
        for (pass_index, &(sx, sy, dx, dy)) in passes.iter().enumerate() {
            let Some((pass_w, pass_h)) = pass_size(&header, sx, sy, dx, dy) else {
                continue;
            };
            let row_bytes = header.row_bytes(pass_w);
            let bpp = header.bytes_per_pixel();
            let mut prev: Vec<u8> = Vec::new();
            for row in 0..pass_h {
                let start = offset;
                let end = start + 1 + row_bytes;
                if end > raw.len() {
                    return Err(CodecError::InvalidImage("png pixel data truncated"));
                }
                let filter = FilterType::from_byte(raw[start])?;
                let mut line = raw[start + 1..end].to_vec();
                unfilter_row(filter, &mut line, &prev, bpp);
                place_row(&mut image, &header, &line, pass_w, sx, sy + row * dy, dx);
                prev = line;
                offset = end;
            }
            if header.interlaced {
                listener.image_progress(LoaderEvent {
                    image: &image,
                    pass: pass_index,
                    is_final: pass_index == last_pass,
                });
            }
        }

        // Palette transparency richer than one fully-clear entry needs a
        // per-pixel alpha plane resolved from the decoded indices.
        if let Some(Transparency::PaletteAlpha(alpha)) = &transparency {
            if image.transparent_pixel.is_none() && alpha.iter().any(|&a| a != 255) {
                let mut plane = vec![255u8; header.width * header.height];
                for y in 0..header.height {
                    for x in 0..header.width {
                        let index = image.pixel(x, y) as usize;
                        plane[y * header.width + x] =
                            alpha.get(index).copied().unwrap_or(255);
                    }
                }
                image.alpha_data = Some(plane);
            }
        }

        if !header.interlaced {
            listener.image_progress(LoaderEvent {
                image: &image,
                pass: 0,
                is_final: true,
            });
        }
        Ok(image)
    }
}

impl Default for PngDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_chunk<'a>(reader: &mut ByteReader<'a>) -> Result<([u8; 4], Vec<u8>)> {
    let length = reader.read_u32_be()? as usize;
    if length > 0x7FFF_FFFF {
        return Err(CodecError::InvalidImage("chunk length out of range"));
    }
    let type_bytes: [u8; 4] = reader
        .read_bytes(4)?
        .try_into()
        .map_err(|_| CodecError::InvalidImage("short chunk type"))?;
    let payload = reader.read_bytes(length)?;
    let stored_crc = reader.read_u32_be()?;
    let mut crc_input = Vec::with_capacity(4 + payload.len());
    crc_input.extend_from_slice(&type_bytes);
    crc_input.extend_from_slice(payload);
    let actual = crc32(&crc_input);
    if actual != stored_crc {
        return Err(CodecError::InvalidImageDetail(format!(
            "crc mismatch in {} chunk",
            String::from_utf8_lossy(&type_bytes)
        )));
    }
    Ok((type_bytes, payload.to_vec()))
}

fn parse_ihdr(chunk: &[u8]) -> Result<Header> {
    if chunk.len() != 13 {
        return Err(CodecError::InvalidImage("bad IHDR length"));
    }
    let width = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize;
    let height = u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as usize;
    if width == 0 || height == 0 {
        return Err(CodecError::InvalidImage("zero png dimensions"));
    }
    let bit_depth = chunk[8];
    let color_type = chunk[9];
    if chunk[10] != 0 {
        return Err(CodecError::InvalidImage("unknown compression method"));
    }
    if chunk[11] != 0 {
        return Err(CodecError::InvalidImage("unknown filter method"));
    }
    let interlaced = match chunk[12] {
        0 => false,
        1 => true,
        _ => return Err(CodecError::InvalidImage("unknown interlace method")),
    };

    let valid = match color_type {
        COLOR_GRAY => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
        COLOR_RGB | COLOR_GRAY_ALPHA | COLOR_RGBA => matches!(bit_depth, 8 | 16),
        COLOR_INDEXED => matches!(bit_depth, 1 | 2 | 4 | 8),
        _ => false,
    };
    if !valid {
        return Err(CodecError::InvalidImage("invalid bit depth / color type"));
    }
    Ok(Header {
        width,
        height,
        bit_depth,
        color_type,
        interlaced,
    })
}

fn parse_trns(
    chunk: &[u8],
    header: &Header,
    palette: Option<&[Rgb]>,
) -> Result<Transparency> {
    match header.color_type {
        COLOR_INDEXED => {
            let colors = palette.ok_or(CodecError::InvalidImage("tRNS before PLTE"))?;
            if chunk.len() > colors.len() {
                return Err(CodecError::InvalidImage("tRNS longer than palette"));
            }
            let mut alpha = vec![255u8; colors.len()];
            alpha[..chunk.len()].copy_from_slice(chunk);
            Ok(Transparency::PaletteAlpha(alpha))
        }
        COLOR_GRAY => {
            if chunk.len() != 2 {
                return Err(CodecError::InvalidImage("bad tRNS length for grayscale"));
            }
            Ok(Transparency::GraySample(u16::from_be_bytes([
                chunk[0], chunk[1],
            ])))
        }
        COLOR_RGB => {
            if chunk.len() != 6 {
                return Err(CodecError::InvalidImage("bad tRNS length for truecolor"));
            }
            Ok(Transparency::RgbSample(
                u16::from_be_bytes([chunk[0], chunk[1]]),
                u16::from_be_bytes([chunk[2], chunk[3]]),
                u16::from_be_bytes([chunk[4], chunk[5]]),
            ))
        }
        _ => Err(CodecError::InvalidImage("tRNS with alpha color type")),
    }
}

fn pass_size(
    header: &Header,
    sx: usize,
    sy: usize,
    dx: usize,
    dy: usize,
) -> Option<(usize, usize)> {
    if header.width <= sx || header.height <= sy {
        return None;
    }
    Some((
        (header.width - sx).div_ceil(dx),
        (header.height - sy).div_ceil(dy),
    ))
}

fn expected_raw_size(header: &Header) -> usize {
    let passes: &[(usize, usize, usize, usize)] = if header.interlaced {
        &ADAM7
    } else {
        &[(0, 0, 1, 1)]
    };
    passes
        .iter()
        .filter_map(|&(sx, sy, dx, dy)| pass_size(header, sx, sy, dx, dy))
        .map(|(w, h)| h * (1 + header.row_bytes(w)))
        .sum()
}

/// Shape the output image for the header's color model.
fn prepare_image(
    header: &Header,
    palette: Option<Vec<Rgb>>,
    transparency: Option<&Transparency>,
) -> Result<ImageData> {
    let (width, height) = (header.width, header.height);
    let mut image = match header.color_type {
        COLOR_INDEXED => {
            let colors = palette.ok_or(CodecError::InvalidImage("indexed png without PLTE"))?;
            ImageData::new(width, height, header.bit_depth as u16, PaletteData::Indexed(colors))
        }
        COLOR_GRAY | COLOR_GRAY_ALPHA => {
            let depth = if header.bit_depth == 16 || header.color_type == COLOR_GRAY_ALPHA {
                8
            } else {
                header.bit_depth as u16
            };
            let levels = 1usize << depth;
            let ramp = (0..levels)
                .map(|i| {
                    let v = (i * 255 / (levels - 1)) as u8;
                    Rgb::new(v, v, v)
                })
                .collect();
            ImageData::new(width, height, depth, PaletteData::Indexed(ramp))
        }
        _ => ImageData::new(width, height, 24, PaletteData::direct_rgb24()),
    };

    if header.color_type == COLOR_GRAY_ALPHA || header.color_type == COLOR_RGBA {
        image.alpha_data = Some(vec![255u8; width * height]);
    }
    match transparency {
        Some(Transparency::PaletteAlpha(alpha)) => {
            // A single fully-transparent index maps cleanly onto the
            // transparent-pixel convention; anything richer keeps a
            // full alpha plane.
            let opaque_but_one = alpha.iter().filter(|&&a| a != 255).count() == 1
                && alpha.iter().any(|&a| a == 0);
            if opaque_but_one {
                image.transparent_pixel = alpha.iter().position(|&a| a == 0);
            }
        }
        Some(Transparency::GraySample(sample)) => {
            let sample = if header.bit_depth == 16 {
                (*sample >> 8) as usize
            } else {
                *sample as usize
            };
            image.transparent_pixel = Some(sample);
        }
        Some(Transparency::RgbSample(r, g, b)) => {
            let to8 = |v: u16| {
                if header.bit_depth == 16 { (v >> 8) as usize } else { v as usize }
            };
            image.transparent_pixel =
                Some(to8(*r) | (to8(*g) << 8) | (to8(*b) << 16));
        }
        None => {}
    }
    Ok(image)
}

/// MSB-first sample extraction from one unfiltered scanline.
struct Samples<'a> {
    row: &'a [u8],
    bit_depth: u8,
    bit_pos: usize,
}

impl<'a> Samples<'a> {
    fn new(row: &'a [u8], bit_depth: u8) -> Self {
        Self { row, bit_depth, bit_pos: 0 }
    }

    fn next(&mut self) -> u16 {
        match self.bit_depth {
            16 => {
                let i = self.bit_pos / 8;
                self.bit_pos += 16;
                u16::from_be_bytes([self.row[i], self.row[i + 1]])
            }
            8 => {
                let i = self.bit_pos / 8;
                self.bit_pos += 8;
                self.row[i] as u16
            }
            depth => {
                let depth = depth as usize;
                let byte = self.row[self.bit_pos / 8];
                let shift = 8 - depth - (self.bit_pos % 8);
                self.bit_pos += depth;
                ((byte >> shift) as u16) & ((1 << depth) - 1)
            }
        }
    }
}

fn place_row(
    image: &mut ImageData,
    header: &Header,
    line: &[u8],
    pass_w: usize,
    x_start: usize,
    y: usize,
    x_step: usize,
) {
    let mut samples = Samples::new(line, header.bit_depth);
    let to8 = |v: u16| -> u32 {
        if header.bit_depth == 16 { (v >> 8) as u32 } else { v as u32 }
    };
    for i in 0..pass_w {
        let x = x_start + i * x_step;
        match header.color_type {
            COLOR_GRAY | COLOR_INDEXED => {
                let v = samples.next();
                let v = if header.bit_depth == 16 { (v >> 8) & 0xFF } else { v };
                image.set_pixel(x, y, v as u32);
            }
            COLOR_GRAY_ALPHA => {
                let v = to8(samples.next());
                let a = to8(samples.next());
                image.set_pixel(x, y, v);
                if let Some(alpha) = image.alpha_data.as_mut() {
                    alpha[y * header.width + x] = a as u8;
                }
            }
            COLOR_RGB => {
                let r = to8(samples.next());
                let g = to8(samples.next());
                let b = to8(samples.next());
                image.set_pixel(x, y, r | (g << 8) | (b << 16));
            }
            COLOR_RGBA => {
                let r = to8(samples.next());
                let g = to8(samples.next());
                let b = to8(samples.next());
                let a = to8(samples.next());
                image.set_pixel(x, y, r | (g << 8) | (b << 16));
                if let Some(alpha) = image.alpha_data.as_mut() {
                    alpha[y * header.width + x] = a as u8;
                }
            }
            _ => {}
        }
    }
}
