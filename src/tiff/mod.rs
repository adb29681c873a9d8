//! Baseline TIFF reader (both byte orders) and a PackBits writer.
//!
//! Supported images: bilevel (uncompressed, PackBits, or CCITT Modified
//! Huffman), 8-bit grayscale, 8-bit palette color, and 8-bit-per-sample
//! RGB, assembled from strips.

mod fax;
pub mod packbits;

use crate::error::{CodecError, Result};
use crate::image_data::{ImageData, PaletteData, Rgb};
use crate::stream::{ByteReader, ByteWriter};

const TIFF_MAGIC: u16 = 42;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_COLOR_MAP: u16 = 320;

const COMPRESSION_NONE: u32 = 1;
const COMPRESSION_CCITT_MH: u32 = 2;
const COMPRESSION_PACKBITS: u32 = 32773;

const PHOTOMETRIC_WHITE_IS_ZERO: u32 = 0;
const PHOTOMETRIC_BLACK_IS_ZERO: u32 = 1;
const PHOTOMETRIC_RGB: u32 = 2;
const PHOTOMETRIC_PALETTE: u32 = 3;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn read_u16(self, reader: &mut ByteReader<'_>) -> Result<u16> {
        match self {
            ByteOrder::Little => reader.read_u16_le(),
            ByteOrder::Big => reader.read_u16_be(),
        }
    }

    fn read_u32(self, reader: &mut ByteReader<'_>) -> Result<u32> {
        match self {
            ByteOrder::Little => reader.read_u32_le(),
            ByteOrder::Big => reader.read_u32_be(),
        }
    }
}

pub fn is_tiff(data: &[u8]) -> bool {
    matches!(data, [0x49, 0x49, 42, 0, ..] | [0x4D, 0x4D, 0, 42, ..])
}

/// One parsed IFD entry; values normalized to u32.
struct IfdEntry {
    values: Vec<u32>,
}

impl IfdEntry {
    fn first(&self) -> Option<u32> {
        self.values.first().copied()
    }
}

pub struct TiffDecoder {
    warnings: Vec<String>,
}

impl TiffDecoder {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn decode(&mut self, data: &[u8]) -> Result<ImageData> {
        let mut reader = ByteReader::new(data);
        let order = match reader.read_bytes(2)? {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return Err(CodecError::InvalidImage("not a tiff file")),
        };
        if order.read_u16(&mut reader)? != TIFF_MAGIC {
            return Err(CodecError::InvalidImage("bad tiff magic number"));
        }
        let ifd_offset = order.read_u32(&mut reader)? as usize;
        reader.seek(ifd_offset)?;
        self.decode_ifd(data, &mut reader, order)
    }

    fn decode_ifd(
        &mut self,
        data: &[u8],
        reader: &mut ByteReader<'_>,
        order: ByteOrder,
    ) -> Result<ImageData> {
        let entry_count = order.read_u16(reader)? as usize;
        let mut tags: Vec<(u16, IfdEntry)> = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let tag = order.read_u16(reader)?;
            let entry = read_entry(data, reader, order)?;
            tags.push((tag, entry));
        }
        if order.read_u32(reader).is_ok_and(|next| next != 0) {
            self.warnings
                .push("additional tiff directories ignored".into());
        }
        let find = |tag: u16| tags.iter().find(|(t, _)| *t == tag).map(|(_, e)| e);
        let scalar =
            |tag: u16, default: u32| find(tag).and_then(IfdEntry::first).unwrap_or(default);

        let width = scalar(TAG_IMAGE_WIDTH, 0) as usize;
        let height = scalar(TAG_IMAGE_LENGTH, 0) as usize;
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidImage("zero-sized tiff image"));
        }
        let samples = scalar(TAG_SAMPLES_PER_PIXEL, 1) as usize;
        let bits = find(TAG_BITS_PER_SAMPLE)
            .and_then(IfdEntry::first)
            .unwrap_or(1) as u16;
        let compression = scalar(TAG_COMPRESSION, COMPRESSION_NONE);
        let photometric = scalar(TAG_PHOTOMETRIC, PHOTOMETRIC_WHITE_IS_ZERO);
        let rows_per_strip = scalar(TAG_ROWS_PER_STRIP, height as u32) as usize;
        let offsets = find(TAG_STRIP_OFFSETS)
            .ok_or(CodecError::InvalidImage("tiff strip offsets missing"))?;
        let counts = find(TAG_STRIP_BYTE_COUNTS)
            .ok_or(CodecError::InvalidImage("tiff strip byte counts missing"))?;
        if offsets.values.len() != counts.values.len() {
            return Err(CodecError::InvalidImage("tiff strip table mismatch"));
        }

        match (samples, bits) {
            (1, 1) | (1, 8) => {}
            (3, 8) => {
                if photometric != PHOTOMETRIC_RGB {
                    return Err(CodecError::InvalidImage("tiff sample/photometric mismatch"));
                }
            }
            _ => return Err(CodecError::UnsupportedDepth(bits * samples as u16)),
        }
        if compression == COMPRESSION_CCITT_MH && bits != 1 {
            return Err(CodecError::InvalidImage("fax compression requires bilevel"));
        }

        // Assemble raw rows strip by strip.
        let row_bytes = (width * bits as usize * samples).div_ceil(8);
        let mut raw = Vec::with_capacity(row_bytes * height);
        let strip_count = offsets.values.len();
        for strip in 0..strip_count {
            if strip * rows_per_strip >= height {
                self.warnings.push("extra tiff strips ignored".into());
                break;
            }
            let offset = offsets.values[strip] as usize;
            let count = counts.values[strip] as usize;
            let bytes = data
                .get(offset..offset + count)
                .ok_or(CodecError::InvalidImage("tiff strip out of bounds"))?;
            let rows = rows_per_strip.min(height - strip * rows_per_strip);
            match compression {
                COMPRESSION_NONE => {
                    if bytes.len() < row_bytes * rows {
                        return Err(CodecError::InvalidImage("tiff strip too short"));
                    }
                    raw.extend_from_slice(&bytes[..row_bytes * rows]);
                }
                COMPRESSION_PACKBITS => {
                    raw.extend_from_slice(&packbits::decode(bytes, row_bytes * rows)?)
                }
                COMPRESSION_CCITT_MH => {
                    raw.extend_from_slice(&fax::decode_strip(bytes, width, rows)?)
                }
                other => {
                    return Err(CodecError::InvalidImageDetail(format!(
                        "unsupported tiff compression {other}"
                    )));
                }
            }
        }

        let palette = self.build_palette(photometric, bits, find(TAG_COLOR_MAP))?;
        Ok(assemble_image(&raw, width, height, bits, samples, palette))
    }

    fn build_palette(
        &mut self,
        photometric: u32,
        bits: u16,
        color_map: Option<&IfdEntry>,
    ) -> Result<PaletteData> {
        match photometric {
            PHOTOMETRIC_RGB => Ok(PaletteData::direct_rgb24()),
            PHOTOMETRIC_PALETTE => {
                let map = color_map
                    .ok_or(CodecError::InvalidImage("tiff palette image without map"))?;
                let entries = 1usize << bits;
                if map.values.len() < entries * 3 {
                    return Err(CodecError::InvalidImage("tiff color map too short"));
                }
                // Color map samples are 16-bit, channel-planar.
                let colors = (0..entries)
                    .map(|i| {
                        Rgb::new(
                            (map.values[i] >> 8) as u8,
                            (map.values[entries + i] >> 8) as u8,
                            (map.values[2 * entries + i] >> 8) as u8,
                        )
                    })
                    .collect();
                Ok(PaletteData::Indexed(colors))
            }
            PHOTOMETRIC_WHITE_IS_ZERO | PHOTOMETRIC_BLACK_IS_ZERO => {
                let entries = 1usize << bits.min(8);
                let max = (entries - 1) as u32;
                let colors = (0..entries as u32)
                    .map(|i| {
                        let level = if photometric == PHOTOMETRIC_WHITE_IS_ZERO {
                            ((max - i) * 255 / max) as u8
                        } else {
                            (i * 255 / max) as u8
                        };
                        Rgb::new(level, level, level)
                    })
                    .collect();
                Ok(PaletteData::Indexed(colors))
            }
            other => Err(CodecError::InvalidImageDetail(format!(
                "unsupported tiff photometric {other}"
            ))),
        }
    }
}

impl Default for TiffDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_entry(data: &[u8], reader: &mut ByteReader<'_>, order: ByteOrder) -> Result<IfdEntry> {
    let field_type = order.read_u16(reader)?;
    let count = order.read_u32(reader)? as usize;
    let size = match field_type {
        1 | 2 => 1, // BYTE, ASCII
        3 => 2,     // SHORT
        4 => 4,     // LONG
        _ => {
            // Rational and signed types are skipped; keep the offset slot.
            reader.skip(4)?;
            return Ok(IfdEntry { values: Vec::new() });
        }
    };
    let total = size * count;
    let value_pos = reader.position();
    let mut source = if total <= 4 {
        ByteReader::new(reader.read_bytes(4)?)
    } else {
        let offset = order.read_u32(reader)? as usize;
        if offset + total > data.len() {
            return Err(CodecError::InvalidImage("tiff value out of bounds"));
        }
        ByteReader::new(&data[offset..offset + total])
    };
    debug_assert_eq!(reader.position(), value_pos + 4);

    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(match field_type {
            1 | 2 => source.read_u8()? as u32,
            3 => order.read_u16(&mut source)? as u32,
            _ => order.read_u32(&mut source)?,
        });
    }
    Ok(IfdEntry { values })
}

fn assemble_image(
    raw: &[u8],
    width: usize,
    height: usize,
    bits: u16,
    samples: usize,
    palette: PaletteData,
) -> ImageData {
    let depth = if samples == 3 { 24 } else { bits };
    let mut image = ImageData::new(width, height, depth, palette);
    let row_bytes = (width * bits as usize * samples).div_ceil(8);
    for y in 0..height {
        let src = &raw[y * row_bytes..(y + 1) * row_bytes];
        let dest = y * image.bytes_per_line;
        // Packed sub-byte rows and RGB sample order both match the
        // in-memory layout directly.
        image.data[dest..dest + row_bytes].copy_from_slice(src);
    }
    image
}

/// Minimal little-endian writer: one IFD, PackBits-compressed strips,
/// one strip per image.
pub struct TiffEncoder;

impl TiffEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, image: &ImageData) -> Result<Vec<u8>> {
        if image.width == 0 || image.height == 0 {
            return Err(CodecError::InvalidImage("empty image"));
        }
        let (photometric, samples, bits) = match (&image.palette, image.depth) {
            (PaletteData::Indexed(_), 1) => (PHOTOMETRIC_BLACK_IS_ZERO, 1usize, 1u16),
            (PaletteData::Indexed(_), 8) => (PHOTOMETRIC_PALETTE, 1, 8),
            (PaletteData::Direct { .. }, 24) => (PHOTOMETRIC_RGB, 3, 8),
            _ => return Err(CodecError::UnsupportedDepth(image.depth)),
        };

        // Strip data: tightly packed rows, PackBits per row.
        let row_bytes = (image.width * bits as usize * samples).div_ceil(8);
        let mut strip = Vec::new();
        for y in 0..image.height {
            let src = y * image.bytes_per_line;
            strip.extend_from_slice(&packbits::encode(&image.data[src..src + row_bytes]));
        }

        let color_map: Vec<u16> = if photometric == PHOTOMETRIC_PALETTE {
            let colors = image.palette.colors().unwrap_or(&[]);
            let mut map = vec![0u16; 3 * 256];
            for (i, c) in colors.iter().enumerate().take(256) {
                map[i] = (c.red as u16) << 8;
                map[256 + i] = (c.green as u16) << 8;
                map[512 + i] = (c.blue as u16) << 8;
            }
            map
        } else {
            Vec::new()
        };

        let mut entries: Vec<(u16, u16, u32, u32)> = vec![
            (TAG_IMAGE_WIDTH, 4, 1, image.width as u32),
            (TAG_IMAGE_LENGTH, 4, 1, image.height as u32),
            (TAG_COMPRESSION, 3, 1, COMPRESSION_PACKBITS),
            (TAG_PHOTOMETRIC, 3, 1, photometric),
            (TAG_SAMPLES_PER_PIXEL, 3, 1, samples as u32),
            (TAG_ROWS_PER_STRIP, 4, 1, image.height as u32),
            (TAG_STRIP_BYTE_COUNTS, 4, 1, strip.len() as u32),
        ];
        if samples == 3 {
            // Out-of-line triple written after the strip data.
            entries.push((TAG_BITS_PER_SAMPLE, 3, 3, 0));
        } else {
            entries.push((TAG_BITS_PER_SAMPLE, 3, 1, bits as u32));
        }
        if !color_map.is_empty() {
            entries.push((TAG_COLOR_MAP, 3, color_map.len() as u32, 0));
        }
        entries.push((TAG_STRIP_OFFSETS, 4, 1, 0));
        entries.sort_by_key(|e| e.0);

        let ifd_offset = 8usize;
        let ifd_size = 2 + entries.len() * 12 + 4;
        let strip_offset = ifd_offset + ifd_size;
        let bits_offset = strip_offset + strip.len();
        let map_offset = bits_offset + if samples == 3 { 6 } else { 0 };

        let mut out = ByteWriter::new();
        out.write_bytes(b"II");
        out.write_u16_le(TIFF_MAGIC);
        out.write_u32_le(ifd_offset as u32);
        out.write_u16_le(entries.len() as u16);
        for (tag, field_type, count, value) in &entries {
            out.write_u16_le(*tag);
            out.write_u16_le(*field_type);
            out.write_u32_le(*count);
            let value = match *tag {
                TAG_STRIP_OFFSETS => strip_offset as u32,
                TAG_BITS_PER_SAMPLE if samples == 3 => bits_offset as u32,
                TAG_COLOR_MAP => map_offset as u32,
                _ => *value,
            };
            if *field_type == 3 && *count == 1 {
                out.write_u16_le(value as u16);
                out.write_u16_le(0);
            } else {
                out.write_u32_le(value);
            }
        }
        out.write_u32_le(0); // no next IFD
        out.write_bytes(&strip);
        if samples == 3 {
            for _ in 0..3 {
                out.write_u16_le(8);
            }
        }
        for value in &color_map {
            out.write_u16_le(*value);
        }
        Ok(out.into_vec())
    }
}

impl Default for TiffEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_roundtrip() {
        let palette: Vec<Rgb> = (0..5).map(|i| Rgb::new(i * 40, i * 30, i * 20)).collect();
        let mut image = ImageData::new(6, 4, 8, PaletteData::Indexed(palette));
        for y in 0..4 {
            for x in 0..6 {
                image.set_pixel(x, y, ((x * y + x) % 5) as u32);
            }
        }
        let bytes = TiffEncoder::new().encode(&image).unwrap();
        assert!(is_tiff(&bytes));
        let decoded = TiffDecoder::new().decode(&bytes).unwrap();
        assert_eq!(decoded.depth, 8);
        for y in 0..4 {
            for x in 0..6 {
                assert_eq!(decoded.pixel(x, y), image.pixel(x, y));
            }
        }
        assert_eq!(decoded.palette.colors().unwrap()[4], Rgb::new(160, 120, 80));
    }

    #[test]
    fn bilevel_roundtrip() {
        let palette = vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)];
        let mut image = ImageData::new(10, 3, 1, PaletteData::Indexed(palette));
        for x in 0..10 {
            image.set_pixel(x, 1, (x % 2) as u32);
        }
        let bytes = TiffEncoder::new().encode(&image).unwrap();
        let decoded = TiffDecoder::new().decode(&bytes).unwrap();
        for y in 0..3 {
            for x in 0..10 {
                assert_eq!(decoded.pixel(x, y), image.pixel(x, y));
            }
        }
    }

    #[test]
    fn rgb_roundtrip() {
        let mut image = ImageData::new(3, 3, 24, PaletteData::direct_rgb24());
        for y in 0..3 {
            for x in 0..3 {
                image.set_pixel(x, y, (x as u32 * 90) | ((y as u32 * 80) << 8) | 0x200000);
            }
        }
        let bytes = TiffEncoder::new().encode(&image).unwrap();
        let decoded = TiffDecoder::new().decode(&bytes).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(decoded.pixel(x, y), image.pixel(x, y));
            }
        }
    }

    #[test]
    fn decodes_big_endian_uncompressed_gray() {
        // Hand-built MM file: 2x2, 8-bit, BlackIsZero, one strip.
        let mut out = ByteWriter::new();
        out.write_bytes(b"MM");
        out.write_u16_be(42);
        out.write_u32_be(8);
        out.write_u16_be(8); // entry count
        let entries: [(u16, u16, u32, u32); 8] = [
            (TAG_IMAGE_WIDTH, 4, 1, 2),
            (TAG_IMAGE_LENGTH, 4, 1, 2),
            (TAG_BITS_PER_SAMPLE, 3, 1, 8 << 16),
            (TAG_COMPRESSION, 3, 1, 1 << 16),
            (TAG_PHOTOMETRIC, 3, 1, 1 << 16),
            (TAG_STRIP_OFFSETS, 4, 1, 110),
            (TAG_SAMPLES_PER_PIXEL, 3, 1, 1 << 16),
            (TAG_STRIP_BYTE_COUNTS, 4, 1, 4),
        ];
        for (tag, field_type, count, value) in entries {
            out.write_u16_be(tag);
            out.write_u16_be(field_type);
            out.write_u32_be(count);
            out.write_u32_be(value);
        }
        out.write_u32_be(0);
        // 8 + 2 + 96 + 4 = 110: strip follows immediately.
        out.write_bytes(&[0, 85, 170, 255]);
        let decoded = TiffDecoder::new().decode(out.as_slice()).unwrap();
        assert_eq!(decoded.pixel(1, 0), 85);
        assert_eq!(decoded.pixel(1, 1), 255);
        // BlackIsZero gray ramp.
        assert_eq!(decoded.palette.colors().unwrap()[85], Rgb::new(85, 85, 85));
    }

    #[test]
    fn decodes_fax_strip_with_inversion() {
        // 8x1 WhiteIsZero MH image: half white, half black.
        let mut out = ByteWriter::new();
        out.write_bytes(b"II");
        out.write_u16_le(42);
        out.write_u32_le(8);
        out.write_u16_le(7);
        let entries: [(u16, u16, u32, u32); 7] = [
            (TAG_IMAGE_WIDTH, 4, 1, 8),
            (TAG_IMAGE_LENGTH, 4, 1, 1),
            (TAG_BITS_PER_SAMPLE, 3, 1, 1),
            (TAG_COMPRESSION, 3, 1, COMPRESSION_CCITT_MH),
            (TAG_PHOTOMETRIC, 3, 1, PHOTOMETRIC_WHITE_IS_ZERO),
            (TAG_STRIP_OFFSETS, 4, 1, 98),
            (TAG_STRIP_BYTE_COUNTS, 4, 1, 1),
        ];
        for (tag, field_type, count, value) in entries {
            out.write_u16_le(tag);
            out.write_u16_le(field_type);
            out.write_u32_le(count);
            if field_type == 3 {
                out.write_u16_le(value as u16);
                out.write_u16_le(0);
            } else {
                out.write_u32_le(value);
            }
        }
        out.write_u32_le(0);
        // 8 + 2 + 84 + 4 = 98.
        out.write_u8(0b1011_0110); // white 4, black 4
        let decoded = TiffDecoder::new().decode(out.as_slice()).unwrap();
        // WhiteIsZero: index 0 renders white, fax black runs set bits.
        let colors = decoded.palette.colors().unwrap().to_vec();
        assert_eq!(colors[0], Rgb::new(255, 255, 255));
        assert_eq!(colors[1], Rgb::new(0, 0, 0));
        for x in 0..4 {
            assert_eq!(decoded.pixel(x, 0), 0, "white pixel {x}");
            assert_eq!(decoded.pixel(x + 4, 0), 1, "black pixel {x}");
        }
    }

    #[test]
    fn rejects_bad_header() {
        assert!(TiffDecoder::new().decode(b"XXXX").is_err());
        assert!(TiffDecoder::new().decode(b"II\x2B\x00\x08\x00\x00\x00").is_err());
        assert!(!is_tiff(b"II\x2B\x00"));
    }
}
