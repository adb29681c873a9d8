//! Windows icon (.ico) reader.
//!
//! An icon file is a small directory of images. Each entry is either a
//! BMP DIB whose header height covers both the XOR color plane and the
//! 1-bit AND transparency mask, or (in modern files) a complete PNG.

use crate::error::{CodecError, Result};
use crate::image_data::ImageData;
use crate::png;
use crate::stream::ByteReader;

pub fn is_ico(data: &[u8]) -> bool {
    data.len() >= 6 && data[..4] == [0x00, 0x00, 0x01, 0x00]
}

pub struct IcoDecoder {
    warnings: Vec<String>,
}

impl IcoDecoder {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Decode every image in the icon directory.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<ImageData>> {
        let mut reader = ByteReader::new(data);
        if reader.read_u16_le()? != 0 || reader.read_u16_le()? != 1 {
            return Err(CodecError::InvalidImage("not an ico file"));
        }
        let count = reader.read_u16_le()? as usize;
        if count == 0 {
            return Err(CodecError::InvalidImage("empty ico directory"));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            reader.skip(8)?; // dimensions, colors, planes, bit count
            let size = reader.read_u32_le()? as usize;
            let offset = reader.read_u32_le()? as usize;
            if offset + size > data.len() {
                return Err(CodecError::InvalidImage("ico entry out of bounds"));
            }
            entries.push(&data[offset..offset + size]);
        }

        let mut images = Vec::with_capacity(count);
        for entry in entries {
            images.push(self.decode_entry(entry)?);
        }
        Ok(images)
    }

    fn decode_entry(&mut self, entry: &[u8]) -> Result<ImageData> {
        if png::is_png(entry) {
            let mut decoder = png::PngDecoder::new();
            let image = decoder.decode(entry)?;
            self.warnings.extend(decoder.warnings().iter().cloned());
            return Ok(image);
        }

        let mut reader = ByteReader::new(entry);
        let mut header = super::read_dib_header(&mut reader)?;
        // DIB height spans the XOR plane plus the AND mask.
        if header.height % 2 != 0 {
            return Err(CodecError::InvalidImage("ico height not doubled"));
        }
        header.height /= 2;
        let palette = super::read_palette(&mut reader, &header)?;
        let mut image = super::decode_pixels(&mut reader, &header, palette, &mut self.warnings)?;

        let mut alpha = self.embedded_alpha(&image);
        if alpha.is_none() {
            alpha = Some(read_and_mask(&mut reader, header.width, header.height)?);
        }
        image.alpha_data = alpha;
        Ok(image)
    }

    /// 32-bit entries may carry per-pixel alpha in the fourth channel;
    /// use it when any pixel sets it, otherwise fall back to the mask.
    fn embedded_alpha(&self, image: &ImageData) -> Option<Vec<u8>> {
        if image.depth != 32 {
            return None;
        }
        let mut alpha = Vec::with_capacity(image.width * image.height);
        let mut any = false;
        for y in 0..image.height {
            for x in 0..image.width {
                let a = (image.pixel(x, y) >> 24) as u8;
                any |= a != 0;
                alpha.push(a);
            }
        }
        any.then_some(alpha)
    }
}

impl Default for IcoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// The AND mask is a bottom-up 1-bit plane padded to four bytes; a set
/// bit marks a transparent pixel.
fn read_and_mask(reader: &mut ByteReader<'_>, width: usize, height: usize) -> Result<Vec<u8>> {
    let stride = ImageData::row_stride(width, 1, 4);
    let mut alpha = vec![255u8; width * height];
    for file_row in 0..height {
        let row = reader.read_bytes(stride)?;
        let y = height - 1 - file_row;
        for x in 0..width {
            if row[x / 8] >> (7 - (x & 7)) & 1 != 0 {
                alpha[y * width + x] = 0;
            }
        }
    }
    Ok(alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_data::PaletteData;
    use crate::png::PngEncoder;
    use crate::stream::ByteWriter;

    fn directory(entries: &[&[u8]]) -> Vec<u8> {
        let mut out = ByteWriter::new();
        out.write_u16_le(0);
        out.write_u16_le(1);
        out.write_u16_le(entries.len() as u16);
        let mut offset = 6 + entries.len() * 16;
        for entry in entries {
            out.write_bytes(&[0; 8]);
            out.write_u32_le(entry.len() as u32);
            out.write_u32_le(offset as u32);
            offset += entry.len();
        }
        for entry in entries {
            out.write_bytes(entry);
        }
        out.into_vec()
    }

    fn bmp_entry() -> Vec<u8> {
        // 2x2 4-bit DIB, doubled height, AND mask hiding pixel (1,0).
        let mut out = ByteWriter::new();
        out.write_u32_le(40);
        out.write_u32_le(2);
        out.write_u32_le(4); // doubled height
        out.write_u16_le(1);
        out.write_u16_le(4);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        out.write_u32_le(0);
        for i in 0..16u32 {
            out.write_bytes(&[i as u8 * 17, 0, 0, 0]);
        }
        out.write_bytes(&[0x21, 0, 0, 0]); // bottom row: pixels 2,1
        out.write_bytes(&[0x43, 0, 0, 0]); // top row: pixels 4,3
        out.write_bytes(&[0x00, 0, 0, 0]); // mask bottom row
        out.write_bytes(&[0x40, 0, 0, 0]); // mask top row: hide x=1
        out.into_vec()
    }

    #[test]
    fn decodes_bmp_entry_with_mask() {
        let ico = directory(&[&bmp_entry()]);
        assert!(is_ico(&ico));
        let images = IcoDecoder::new().decode(&ico).unwrap();
        assert_eq!(images.len(), 1);
        let image = &images[0];
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.pixel(0, 0), 4);
        assert_eq!(image.pixel(1, 0), 3);
        assert_eq!(image.pixel(0, 1), 2);
        assert_eq!(image.pixel(1, 1), 1);
        assert_eq!(image.alpha_data, Some(vec![255, 0, 255, 255]));
    }

    #[test]
    fn decodes_png_entry() {
        let mut source = ImageData::new(2, 1, 24, PaletteData::direct_rgb24());
        source.set_pixel(0, 0, 0x112233);
        let png_bytes = PngEncoder::new().encode(&source).unwrap();
        let ico = directory(&[&png_bytes]);
        let images = IcoDecoder::new().decode(&ico).unwrap();
        assert_eq!(images[0].pixel(0, 0), 0x112233);
    }

    #[test]
    fn rejects_bad_directory() {
        assert!(IcoDecoder::new().decode(&[0, 0, 2, 0, 1, 0]).is_err());
        assert!(!is_ico(b"BM"));
    }
}
