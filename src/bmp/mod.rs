//! Windows BMP reader and BI_RGB writer.
//!
//! Both DIB header generations are handled: the 12-byte OS/2 core header
//! and the 40-byte-and-up Windows info headers. Pixel rows are stored
//! bottom-up and padded to four bytes unless the height is negative.

pub mod ico;

use num_enum::TryFromPrimitive;

use crate::error::{CodecError, Result};
use crate::image_data::{ImageData, PaletteData, Rgb};
use crate::stream::{ByteReader, ByteWriter};

const FILE_HEADER_SIZE: usize = 14;
const OS2_HEADER_SIZE: u32 = 12;
const WINDOWS_HEADER_SIZE: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
enum Compression {
    Rgb = 0,
    Rle8 = 1,
    Rle4 = 2,
    Bitfields = 3,
}

pub fn is_bmp(data: &[u8]) -> bool {
    data.starts_with(b"BM")
}

#[derive(Debug)]
pub(crate) struct DibHeader {
    pub width: usize,
    pub height: usize,
    pub top_down: bool,
    pub bit_count: u16,
    compression: Compression,
    palette_entries: usize,
    os2: bool,
    masks: Option<(u32, u32, u32)>,
}

pub struct BmpDecoder {
    warnings: Vec<String>,
}

impl BmpDecoder {
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
        if reader.read_bytes(2)? != b"BM" {
            return Err(CodecError::InvalidImage("not a bmp file"));
        }
        let _file_size = reader.read_u32_le()?;
        reader.skip(4)?; // reserved
        let data_offset = reader.read_u32_le()? as usize;

        let header = read_dib_header(&mut reader)?;
        let palette = read_palette(&mut reader, &header)?;
        if data_offset < reader.position() || data_offset > data.len() {
            return Err(CodecError::InvalidImage("bad bmp pixel data offset"));
        }
        reader.seek(data_offset)?;
        decode_pixels(&mut reader, &header, palette, &mut self.warnings)
    }
}

impl Default for BmpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn read_dib_header(reader: &mut ByteReader<'_>) -> Result<DibHeader> {
    let header_start = reader.position();
    let header_size = reader.read_u32_le()?;
    let header = if header_size == OS2_HEADER_SIZE {
        let width = reader.read_u16_le()? as usize;
        let height = reader.read_u16_le()? as usize;
        let _planes = reader.read_u16_le()?;
        let bit_count = reader.read_u16_le()?;
        DibHeader {
            width,
            height,
            top_down: false,
            bit_count,
            compression: Compression::Rgb,
            palette_entries: default_palette_entries(bit_count, 0),
            os2: true,
            masks: None,
        }
    } else if header_size >= WINDOWS_HEADER_SIZE {
        let width_raw = reader.read_u32_le()? as i32;
        let height_raw = reader.read_u32_le()? as i32;
        let _planes = reader.read_u16_le()?;
        let bit_count = reader.read_u16_le()?;
        let compression = Compression::try_from(reader.read_u32_le()?)
            .map_err(|_| CodecError::InvalidImage("unknown bmp compression"))?;
        let _image_size = reader.read_u32_le()?;
        reader.skip(8)?; // resolution
        let colors_used = reader.read_u32_le()? as usize;
        let _colors_important = reader.read_u32_le()?;
        let masks = if compression == Compression::Bitfields {
            // V2+ headers embed the masks; the plain 40-byte header puts
            // them immediately after.
            Some((
                reader.read_u32_le()?,
                reader.read_u32_le()?,
                reader.read_u32_le()?,
            ))
        } else {
            None
        };
        // Skip whatever remains of larger header revisions.
        let consumed = reader.position() - header_start;
        if (header_size as usize) > consumed {
            reader.skip(header_size as usize - consumed)?;
        }
        if width_raw <= 0 {
            return Err(CodecError::InvalidImage("bad bmp width"));
        }
        DibHeader {
            width: width_raw as usize,
            height: height_raw.unsigned_abs() as usize,
            top_down: height_raw < 0,
            bit_count,
            compression,
            palette_entries: default_palette_entries(bit_count, colors_used),
            os2: false,
            masks,
        }
    } else {
        return Err(CodecError::InvalidImage("bad bmp header size"));
    };

    if header.width == 0 || header.height == 0 {
        return Err(CodecError::InvalidImage("zero-sized bmp"));
    }
    match header.bit_count {
        1 | 4 | 8 | 16 | 24 | 32 => Ok(header),
        other => Err(CodecError::UnsupportedDepth(other)),
    }
}

fn default_palette_entries(bit_count: u16, colors_used: usize) -> usize {
    if bit_count > 8 {
        0
    } else if colors_used != 0 {
        colors_used.min(1 << bit_count)
    } else {
        1 << bit_count
    }
}

pub(crate) fn read_palette(reader: &mut ByteReader<'_>, header: &DibHeader) -> Result<Vec<Rgb>> {
    let entry_size = if header.os2 { 3 } else { 4 };
    let bytes = reader.read_bytes(header.palette_entries * entry_size)?;
    Ok(bytes
        .chunks_exact(entry_size)
        .map(|e| Rgb::new(e[2], e[1], e[0]))
        .collect())
}

/// Decode the pixel array described by `header`. Shared with the ICO
/// reader, which halves the doubled height before calling in.
pub(crate) fn decode_pixels(
    reader: &mut ByteReader<'_>,
    header: &DibHeader,
    palette: Vec<Rgb>,
    warnings: &mut Vec<String>,
) -> Result<ImageData> {
    let palette_data = match header.bit_count {
        1 | 4 | 8 => {
            if palette.is_empty() {
                return Err(CodecError::InvalidImage("bmp palette missing"));
            }
            PaletteData::Indexed(palette)
        }
        16 => {
            let (r, g, b) = header.masks.unwrap_or((0x7C00, 0x03E0, 0x001F));
            PaletteData::Direct {
                red_mask: r,
                green_mask: g,
                blue_mask: b,
            }
        }
        24 => PaletteData::direct_rgb24(),
        _ => {
            let (r, g, b) = header.masks.unwrap_or((0xFF0000, 0x00FF00, 0x0000FF));
            PaletteData::Direct {
                red_mask: r,
                green_mask: g,
                blue_mask: b,
            }
        }
    };
    let mut image = ImageData::new(header.width, header.height, header.bit_count, palette_data);

    match header.compression {
        Compression::Rgb | Compression::Bitfields => {
            decode_uncompressed(reader, header, &mut image)?
        }
        Compression::Rle8 => {
            if header.bit_count != 8 {
                return Err(CodecError::InvalidImage("rle8 requires 8-bit pixels"));
            }
            decode_rle(reader, header, &mut image, false, warnings)?;
        }
        Compression::Rle4 => {
            if header.bit_count != 4 {
                return Err(CodecError::InvalidImage("rle4 requires 4-bit pixels"));
            }
            decode_rle(reader, header, &mut image, true, warnings)?;
        }
    }
    Ok(image)
}

fn decode_uncompressed(
    reader: &mut ByteReader<'_>,
    header: &DibHeader,
    image: &mut ImageData,
) -> Result<()> {
    let stride = ImageData::row_stride(header.width, header.bit_count, 4);
    for file_row in 0..header.height {
        let row = reader.read_bytes(stride)?;
        let y = if header.top_down {
            file_row
        } else {
            header.height - 1 - file_row
        };
        let dest = y * image.bytes_per_line;
        image.data[dest..dest + stride].copy_from_slice(row);
        if header.bit_count == 24 {
            // File order is B,G,R; in-memory direct color is R,G,B.
            for x in 0..header.width {
                image.data.swap(dest + x * 3, dest + x * 3 + 2);
            }
        }
    }
    Ok(())
}

/// RLE4/RLE8 with the four escape codes: end-of-line, end-of-bitmap,
/// delta, and absolute runs (padded to a word boundary).
fn decode_rle(
    reader: &mut ByteReader<'_>,
    header: &DibHeader,
    image: &mut ImageData,
    nibbles: bool,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let (width, height) = (header.width, header.height);
    let mut x = 0usize;
    let mut file_row = 0usize;
    loop {
        let count = reader.read_u8()? as usize;
        if count > 0 {
            let value = reader.read_u8()?;
            for i in 0..count {
                if x >= width || file_row >= height {
                    warnings.push("bmp rle run exceeds image bounds".into());
                    break;
                }
                let pixel = if nibbles {
                    if i & 1 == 0 { value >> 4 } else { value & 0x0F }
                } else {
                    value
                };
                image.set_pixel(x, height - 1 - file_row, pixel as u32);
                x += 1;
            }
            continue;
        }
        match reader.read_u8()? {
            0 => {
                x = 0;
                file_row += 1;
            }
            1 => return Ok(()),
            2 => {
                x += reader.read_u8()? as usize;
                file_row += reader.read_u8()? as usize;
            }
            run => {
                let run = run as usize;
                let bytes = if nibbles { run.div_ceil(2) } else { run };
                let padded = bytes.next_multiple_of(2);
                let data = reader.read_bytes(padded)?;
                for i in 0..run {
                    if x >= width || file_row >= height {
                        warnings.push("bmp rle run exceeds image bounds".into());
                        break;
                    }
                    let pixel = if nibbles {
                        let byte = data[i / 2];
                        if i & 1 == 0 { byte >> 4 } else { byte & 0x0F }
                    } else {
                        data[i]
                    };
                    image.set_pixel(x, height - 1 - file_row, pixel as u32);
                    x += 1;
                }
            }
        }
    }
}

pub struct BmpEncoder;

impl BmpEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Write an uncompressed BI_RGB bitmap with a 40-byte info header.
    pub fn encode(&self, image: &ImageData) -> Result<Vec<u8>> {
        if image.width == 0 || image.height == 0 {
            return Err(CodecError::InvalidImage("empty image"));
        }
        let palette: &[Rgb] = match (&image.palette, image.depth) {
            (PaletteData::Indexed(colors), 1 | 4 | 8) => colors,
            (PaletteData::Direct { .. }, 24) => &[],
            _ => return Err(CodecError::UnsupportedDepth(image.depth)),
        };
        let entries = if palette.is_empty() {
            0
        } else {
            1usize << image.depth
        };
        if palette.len() > entries {
            return Err(CodecError::InvalidImage("palette exceeds bmp depth"));
        }

        let stride = ImageData::row_stride(image.width, image.depth, 4);
        let data_offset = FILE_HEADER_SIZE + WINDOWS_HEADER_SIZE as usize + entries * 4;
        let image_size = stride * image.height;

        let mut out = ByteWriter::new();
        out.write_bytes(b"BM");
        out.write_u32_le((data_offset + image_size) as u32);
        out.write_u32_le(0);
        out.write_u32_le(data_offset as u32);

        out.write_u32_le(WINDOWS_HEADER_SIZE);
        out.write_u32_le(image.width as u32);
        out.write_u32_le(image.height as u32);
        out.write_u16_le(1); // planes
        out.write_u16_le(image.depth);
        out.write_u32_le(Compression::Rgb as u32);
        out.write_u32_le(image_size as u32);
        out.write_u32_le(2835); // 72 dpi
        out.write_u32_le(2835);
        out.write_u32_le(palette.len() as u32);
        out.write_u32_le(0);

        for i in 0..entries {
            let color = palette.get(i).copied().unwrap_or_default();
            out.write_bytes(&[color.blue, color.green, color.red, 0]);
        }

        let mut row = vec![0u8; stride];
        for y in (0..image.height).rev() {
            let src = y * image.bytes_per_line;
            row[..stride.min(image.bytes_per_line)]
                .copy_from_slice(&image.data[src..src + stride.min(image.bytes_per_line)]);
            if image.depth == 24 {
                for x in 0..image.width {
                    row.swap(x * 3, x * 3 + 2);
                }
            }
            out.write_bytes(&row);
        }
        Ok(out.into_vec())
    }
}

impl Default for BmpEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_indexed(depth: u16, colors: usize) -> ImageData {
        let palette: Vec<Rgb> = (0..colors)
            .map(|i| Rgb::new((i * 37) as u8, (i * 59) as u8, (i * 83) as u8))
            .collect();
        let mut image = ImageData::new(7, 5, depth, PaletteData::Indexed(palette));
        for y in 0..5 {
            for x in 0..7 {
                image.set_pixel(x, y, ((x + y) % colors) as u32);
            }
        }
        image
    }

    #[test]
    fn indexed_roundtrips() {
        for (depth, colors) in [(1u16, 2usize), (4, 16), (8, 200)] {
            let image = sample_indexed(depth, colors);
            let bytes = BmpEncoder::new().encode(&image).unwrap();
            let decoded = BmpDecoder::new().decode(&bytes).unwrap();
            assert_eq!(decoded.depth, depth);
            for y in 0..5 {
                for x in 0..7 {
                    assert_eq!(decoded.pixel(x, y), image.pixel(x, y), "depth {depth}");
                }
            }
        }
    }

    #[test]
    fn truecolor_roundtrips() {
        let mut image = ImageData::new(3, 2, 24, PaletteData::direct_rgb24());
        image.set_pixel(0, 0, 0x0000FF); // blue high byte
        image.set_pixel(1, 0, 0x00FF00);
        image.set_pixel(2, 0, 0x0000F0);
        image.set_pixel(0, 1, 0x123456);
        let bytes = BmpEncoder::new().encode(&image).unwrap();
        let decoded = BmpDecoder::new().decode(&bytes).unwrap();
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(decoded.pixel(x, y), image.pixel(x, y));
            }
        }
    }

    #[test]
    fn decodes_os2_core_header() {
        // 2x2, 8-bit, OS/2 header with 3-byte palette entries.
        let mut out = ByteWriter::new();
        out.write_bytes(b"BM");
        out.write_u32_le(0);
        out.write_u32_le(0);
        let data_offset = 14 + 12 + 256 * 3;
        out.write_u32_le(data_offset as u32);
        out.write_u32_le(12);
        out.write_u16_le(2);
        out.write_u16_le(2);
        out.write_u16_le(1);
        out.write_u16_le(8);
        for i in 0..256u32 {
            out.write_bytes(&[i as u8, i as u8, i as u8]);
        }
        // Bottom row first, rows padded to 4.
        out.write_bytes(&[10, 11, 0, 0]);
        out.write_bytes(&[20, 21, 0, 0]);
        let decoded = BmpDecoder::new().decode(out.as_slice()).unwrap();
        assert_eq!(decoded.pixel(0, 0), 20);
        assert_eq!(decoded.pixel(1, 0), 21);
        assert_eq!(decoded.pixel(0, 1), 10);
    }

    #[test]
    fn decodes_rle8() {
        // 4x2: run of 3 zeros + literal, EOL, absolute run, EOB.
        let mut out = ByteWriter::new();
        out.write_bytes(b"BM");
        out.write_u32_le(0);
        out.write_u32_le(0);
        let data_offset = 14 + 40 + 256 * 4;
        out.write_u32_le(data_offset as u32);
        out.write_u32_le(40);
        out.write_u32_le(4);
        out.write_u32_le(2);
        out.write_u16_le(1);
        out.write_u16_le(8);
        out.write_u32_le(Compression::Rle8 as u32);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        for i in 0..256u32 {
            out.write_bytes(&[i as u8, i as u8, i as u8, 0]);
        }
        out.write_bytes(&[3, 7, 1, 9]); // run 3x7, run 1x9 (bottom row)
        out.write_bytes(&[0, 0]); // end of line
        out.write_bytes(&[0, 4, 1, 2, 3, 4]); // absolute 4 pixels (top row)
        out.write_bytes(&[0, 1]); // end of bitmap
        let decoded = BmpDecoder::new().decode(out.as_slice()).unwrap();
        assert_eq!(
            (0..4).map(|x| decoded.pixel(x, 1)).collect::<Vec<_>>(),
            vec![7, 7, 7, 9]
        );
        assert_eq!(
            (0..4).map(|x| decoded.pixel(x, 0)).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn decodes_rle4_with_delta() {
        let mut out = ByteWriter::new();
        out.write_bytes(b"BM");
        out.write_u32_le(0);
        out.write_u32_le(0);
        let data_offset = 14 + 40 + 16 * 4;
        out.write_u32_le(data_offset as u32);
        out.write_u32_le(40);
        out.write_u32_le(4);
        out.write_u32_le(2);
        out.write_u16_le(1);
        out.write_u16_le(4);
        out.write_u32_le(Compression::Rle4 as u32);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        for i in 0..16u32 {
            out.write_bytes(&[i as u8 * 16, 0, 0, 0]);
        }
        out.write_bytes(&[3, 0xAB]); // pixels A,B,A on bottom row
        out.write_bytes(&[0, 2, 1, 1]); // delta right 1, up 1
        out.write_bytes(&[0, 1]);
        let decoded = BmpDecoder::new().decode(out.as_slice()).unwrap();
        assert_eq!(decoded.pixel(0, 1), 0xA);
        assert_eq!(decoded.pixel(1, 1), 0xB);
        assert_eq!(decoded.pixel(2, 1), 0xA);
        // Deltas leave skipped pixels at their initial zero.
        assert_eq!(decoded.pixel(3, 1), 0);
    }

    #[test]
    fn rejects_bad_magic_and_sizes() {
        assert!(BmpDecoder::new().decode(b"XX\0\0").is_err());
        let image = sample_indexed(8, 4);
        let mut bytes = BmpEncoder::new().encode(&image).unwrap();
        // Zero the width field.
        bytes[18..22].fill(0);
        assert!(BmpDecoder::new().decode(&bytes).is_err());
    }
}
