//! GIF87a/89a reader and GIF89a writer.
//!
//! A GIF is a block sequence: header, logical screen descriptor, optional
//! global color table, then image and extension blocks until the trailer.
//! A graphics-control extension applies to the next image block only. The
//! decoder keeps every frame it managed to decode when the stream goes bad
//! partway through a later one.

mod lzw;

use crate::error::{CodecError, Result};
use crate::image_data::{
    DecodeListener, DisposalMethod, ImageData, LoaderEvent, NullListener, PaletteData, Rgb,
};
use crate::stream::{ByteReader, ByteWriter};

const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_TRAILER: u8 = 0x3B;

const EXT_GRAPHICS_CONTROL: u8 = 0xF9;
const EXT_COMMENT: u8 = 0xFE;
const EXT_PLAIN_TEXT: u8 = 0x01;
const EXT_APPLICATION: u8 = 0xFF;

/// Interlaced frames store rows in four passes: every 8th row from 0,
/// every 8th from 4, every 4th from 2, every 2nd from 1.
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

pub fn is_gif(data: &[u8]) -> bool {
    data.len() >= 6 && &data[..3] == b"GIF" && (&data[3..6] == b"87a" || &data[3..6] == b"89a")
}

/// Graphics-control state carried from a GCE to the image block after it.
#[derive(Default)]
struct GraphicsControl {
    disposal: DisposalMethod,
    delay_cs: u16,
    transparent_index: Option<u8>,
}

pub struct GifDecoder {
    warnings: Vec<String>,
    loop_count: Option<u16>,
    screen_width: usize,
    screen_height: usize,
}

impl GifDecoder {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            loop_count: None,
            screen_width: 0,
            screen_height: 0,
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Netscape application-extension loop count, when the file has one.
    /// Zero means loop forever.
    pub fn loop_count(&self) -> Option<u16> {
        self.loop_count
    }

    /// Logical screen size from the screen descriptor.
    pub fn screen_size(&self) -> (usize, usize) {
        (self.screen_width, self.screen_height)
    }

    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<ImageData>> {
        self.decode_with_listener(data, &mut NullListener)
    }

    pub fn decode_with_listener(
        &mut self,
        data: &[u8],
        listener: &mut dyn DecodeListener,
    ) -> Result<Vec<ImageData>> {
        let mut reader = ByteReader::new(data);
        let signature = reader.read_bytes(6)?;
        if &signature[..3] != b"GIF" {
            return Err(CodecError::InvalidImage("not a gif file"));
        }
        if &signature[3..] != b"87a" && &signature[3..] != b"89a" {
            return Err(CodecError::InvalidImage("unknown gif version"));
        }

        self.screen_width = reader.read_u16_le()? as usize;
        self.screen_height = reader.read_u16_le()? as usize;
        let flags = reader.read_u8()?;
        let _background_index = reader.read_u8()?;
        let _aspect_ratio = reader.read_u8()?;

        let global_palette = if flags & 0x80 != 0 {
            let size = 2usize << (flags & 0x07);
            Some(read_color_table(&mut reader, size)?)
        } else {
            None
        };

        let mut frames = Vec::new();
        let mut control = GraphicsControl::default();
        loop {
            let block = match reader.read_u8() {
                Ok(b) => b,
                Err(err) => {
                    if frames.is_empty() {
                        return Err(err);
                    }
                    self.warnings.push("gif ends without trailer".into());
                    break;
                }
            };
            match block {
                BLOCK_TRAILER => break,
                BLOCK_EXTENSION => {
                    if let Err(err) = self.read_extension(&mut reader, &mut control) {
                        if frames.is_empty() {
                            return Err(err);
                        }
                        self.warnings.push(format!("gif extension error: {err}"));
                        break;
                    }
                }
                BLOCK_IMAGE => {
                    let control = std::mem::take(&mut control);
                    let result = self.read_image(
                        &mut reader,
                        global_palette.as_deref(),
                        control,
                        frames.len(),
                        listener,
                    );
                    match result {
                        Ok(frame) => frames.push(frame),
                        Err(err) if !frames.is_empty() => {
                            self.warnings.push(format!("gif frame error: {err}"));
                            break;
                        }
                        Err(err) => return Err(err),
                    }
                }
                other => {
                    if frames.is_empty() {
                        return Err(CodecError::InvalidImageDetail(format!(
                            "unknown gif block 0x{other:02X}"
                        )));
                    }
                    self.warnings
                        .push(format!("unknown gif block 0x{other:02X}"));
                    break;
                }
            }
        }
        if frames.is_empty() {
            return Err(CodecError::InvalidImage("gif contains no images"));
        }
        Ok(frames)
    }

    fn read_extension(
        &mut self,
        reader: &mut ByteReader<'_>,
        control: &mut GraphicsControl,
    ) -> Result<()> {
        let label = reader.read_u8()?;
        match label {
            EXT_GRAPHICS_CONTROL => {
                let payload = read_sub_blocks(reader)?;
                if payload.len() < 4 {
                    return Err(CodecError::InvalidImage("short graphics control extension"));
                }
                let packed = payload[0];
                control.disposal = match (packed >> 2) & 0x07 {
                    0 => DisposalMethod::Unspecified,
                    1 => DisposalMethod::FillNone,
                    2 => DisposalMethod::FillBackground,
                    3 => DisposalMethod::FillPrevious,
                    other => {
                        self.warnings
                            .push(format!("unknown gif disposal method {other}"));
                        DisposalMethod::Unspecified
                    }
                };
                control.delay_cs = u16::from_le_bytes([payload[1], payload[2]]);
                control.transparent_index = (packed & 0x01 != 0).then_some(payload[3]);
            }
            EXT_APPLICATION => {
                let payload = read_sub_blocks(reader)?;
                // Netscape looping extension: 11-byte identifier then a
                // sub-block of 01 <count LE>.
                if payload.len() >= 14
                    && (&payload[..11] == b"NETSCAPE2.0" || &payload[..11] == b"ANIMEXTS1.0")
                    && payload[11] == 0x01
                {
                    self.loop_count = Some(u16::from_le_bytes([payload[12], payload[13]]));
                }
            }
            EXT_COMMENT | EXT_PLAIN_TEXT => {
                read_sub_blocks(reader)?;
            }
            other => {
                self.warnings
                    .push(format!("unknown gif extension 0x{other:02X}"));
                read_sub_blocks(reader)?;
            }
        }
        Ok(())
    }

    fn read_image(
        &mut self,
        reader: &mut ByteReader<'_>,
        global_palette: Option<&[Rgb]>,
        control: GraphicsControl,
        frame_index: usize,
        listener: &mut dyn DecodeListener,
    ) -> Result<ImageData> {
        let x = reader.read_u16_le()? as usize;
        let y = reader.read_u16_le()? as usize;
        let width = reader.read_u16_le()? as usize;
        let height = reader.read_u16_le()? as usize;
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidImage("zero-sized gif image"));
        }
        let flags = reader.read_u8()?;
        let interlaced = flags & 0x40 != 0;

        let palette: Vec<Rgb> = if flags & 0x80 != 0 {
            let size = 2usize << (flags & 0x07);
            read_color_table(reader, size)?
        } else {
            global_palette
                .ok_or(CodecError::InvalidImage("gif image has no color table"))?
                .to_vec()
        };

        let min_code_size = reader.read_u8()?;
        let compressed = read_sub_blocks(reader)?;
        let pixels = lzw::decode(&compressed, min_code_size)?;
        if pixels.len() < width * height {
            return Err(CodecError::InvalidImage("truncated gif image data"));
        }

        let depth = palette_depth(palette.len());
        let mut image = ImageData::new(width, height, depth, PaletteData::Indexed(palette.clone()));
        image.x = x;
        image.y = y;
        image.delay_time_cs = control.delay_cs;
        image.disposal_method = control.disposal;
        // Out-of-range transparent indices are dropped rather than failing;
        // some writers emit them against a smaller color table.
        image.transparent_pixel = control
            .transparent_index
            .map(usize::from)
            .filter(|&index| index < palette.len());
        if control.transparent_index.is_some() && image.transparent_pixel.is_none() {
            self.warnings
                .push("gif transparent index exceeds color table".into());
        }

        let limit = (1u16 << depth) - 1;
        if interlaced {
            for (pass, &(start, step)) in INTERLACE_PASSES.iter().enumerate() {
                let mut source_row = interlace_rows_before(height, pass);
                for row in (start..height).step_by(step) {
                    place_row(&mut image, &pixels, source_row, row, limit);
                    source_row += 1;
                }
                listener.image_progress(LoaderEvent {
                    image: &image,
                    pass,
                    is_final: false,
                });
            }
        } else {
            for row in 0..height {
                place_row(&mut image, &pixels, row, row, limit);
            }
        }
        listener.image_progress(LoaderEvent {
            image: &image,
            pass: frame_index,
            is_final: true,
        });
        Ok(image)
    }
}

impl Default for GifDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of rows emitted by passes before `pass` for an image of `height`.
fn interlace_rows_before(height: usize, pass: usize) -> usize {
    INTERLACE_PASSES[..pass]
        .iter()
        .map(|&(start, step)| (start..height).step_by(step).count())
        .sum()
}

fn place_row(image: &mut ImageData, pixels: &[u8], source_row: usize, dest_row: usize, limit: u16) {
    let width = image.width;
    for x in 0..width {
        let value = pixels[source_row * width + x] as u32;
        image.set_pixel(x, dest_row, value.min(limit as u32));
    }
}

fn palette_depth(colors: usize) -> u16 {
    match colors {
        0..=2 => 1,
        3..=16 => 4,
        _ => 8,
    }
}

fn read_color_table(reader: &mut ByteReader<'_>, size: usize) -> Result<Vec<Rgb>> {
    let bytes = reader.read_bytes(size * 3)?;
    Ok(bytes
        .chunks_exact(3)
        .map(|c| Rgb::new(c[0], c[1], c[2]))
        .collect())
}

/// Concatenate length-prefixed sub-blocks up to the zero terminator.
fn read_sub_blocks(reader: &mut ByteReader<'_>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let len = reader.read_u8()? as usize;
        if len == 0 {
            return Ok(out);
        }
        out.extend_from_slice(reader.read_bytes(len)?);
    }
}

pub struct GifEncoder {
    loop_count: Option<u16>,
}

impl GifEncoder {
    pub fn new() -> Self {
        Self { loop_count: None }
    }

    /// Emit a Netscape looping extension; zero loops forever.
    pub fn loop_count(mut self, count: u16) -> Self {
        self.loop_count = Some(count);
        self
    }

    pub fn encode(&self, image: &ImageData) -> Result<Vec<u8>> {
        self.encode_frames(std::slice::from_ref(image))
    }

    pub fn encode_frames(&self, frames: &[ImageData]) -> Result<Vec<u8>> {
        let first = frames
            .first()
            .ok_or(CodecError::InvalidImage("no frames to encode"))?;
        let global_palette = indexed_palette(first)?;

        let mut out = ByteWriter::new();
        out.write_bytes(b"GIF89a");

        // Logical screen covers every frame's placement.
        let screen_w = frames.iter().map(|f| f.x + f.width).max().unwrap_or(0);
        let screen_h = frames.iter().map(|f| f.y + f.height).max().unwrap_or(0);
        out.write_u16_le(screen_w as u16);
        out.write_u16_le(screen_h as u16);

        let table_bits = color_table_bits(global_palette.len());
        out.write_u8(0x80 | 0x70 | (table_bits - 1));
        out.write_u8(0); // background color index
        out.write_u8(0); // pixel aspect ratio
        write_color_table(&mut out, global_palette, table_bits);

        if frames.len() > 1 || self.loop_count.is_some() {
            let count = self.loop_count.unwrap_or(0);
            out.write_bytes(&[BLOCK_EXTENSION, EXT_APPLICATION, 11]);
            out.write_bytes(b"NETSCAPE2.0");
            out.write_bytes(&[3, 1]);
            out.write_u16_le(count);
            out.write_u8(0);
        }

        for frame in frames {
            let palette = indexed_palette(frame)?;
            let local = palette != global_palette;
            self.write_frame(&mut out, frame, palette, local, frames.len() > 1)?;
        }
        out.write_u8(BLOCK_TRAILER);
        Ok(out.into_vec())
    }

    fn write_frame(
        &self,
        out: &mut ByteWriter,
        frame: &ImageData,
        palette: &[Rgb],
        local_table: bool,
        animated: bool,
    ) -> Result<()> {
        if frame.width == 0 || frame.height == 0 {
            return Err(CodecError::InvalidImage("zero-sized frame"));
        }

        let needs_control = animated
            || frame.transparent_pixel.is_some()
            || frame.delay_time_cs != 0
            || frame.disposal_method != DisposalMethod::Unspecified;
        if needs_control {
            let disposal = match frame.disposal_method {
                DisposalMethod::Unspecified => 0u8,
                DisposalMethod::FillNone => 1,
                DisposalMethod::FillBackground => 2,
                DisposalMethod::FillPrevious => 3,
            };
            let transparent = frame.transparent_pixel.filter(|&i| i < palette.len());
            let packed = (disposal << 2) | transparent.is_some() as u8;
            out.write_bytes(&[BLOCK_EXTENSION, EXT_GRAPHICS_CONTROL, 4, packed]);
            out.write_u16_le(frame.delay_time_cs);
            out.write_u8(transparent.unwrap_or(0) as u8);
            out.write_u8(0);
        }

        out.write_u8(BLOCK_IMAGE);
        out.write_u16_le(frame.x as u16);
        out.write_u16_le(frame.y as u16);
        out.write_u16_le(frame.width as u16);
        out.write_u16_le(frame.height as u16);
        if local_table {
            let bits = color_table_bits(palette.len());
            out.write_u8(0x80 | (bits - 1));
            write_color_table(out, palette, bits);
        } else {
            out.write_u8(0);
        }

        let min_code_size = color_table_bits(palette.len()).max(2);
        let mut pixels = Vec::with_capacity(frame.width * frame.height);
        for y in 0..frame.height {
            for x in 0..frame.width {
                pixels.push(frame.pixel(x, y) as u8);
            }
        }
        let compressed = lzw::encode(&pixels, min_code_size)?;
        out.write_u8(min_code_size);
        for chunk in compressed.chunks(255) {
            out.write_u8(chunk.len() as u8);
            out.write_bytes(chunk);
        }
        out.write_u8(0);
        Ok(())
    }
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn indexed_palette(image: &ImageData) -> Result<&[Rgb]> {
    if image.depth > 8 {
        return Err(CodecError::UnsupportedDepth(image.depth));
    }
    match &image.palette {
        PaletteData::Indexed(colors) if !colors.is_empty() => Ok(colors),
        PaletteData::Indexed(_) => Err(CodecError::InvalidImage("empty palette")),
        PaletteData::Direct { .. } => Err(CodecError::InvalidImage(
            "gif requires an indexed palette",
        )),
    }
}

/// Bits needed to address the color table, 1..=8. GIF tables always hold
/// a power-of-two entry count.
fn color_table_bits(colors: usize) -> u8 {
    let mut bits = 1u8;
    while (1usize << bits) < colors {
        bits += 1;
    }
    bits.min(8)
}

fn write_color_table(out: &mut ByteWriter, palette: &[Rgb], bits: u8) {
    for color in palette {
        out.write_bytes(&[color.red, color.green, color.blue]);
    }
    for _ in palette.len()..(1 << bits) {
        out.write_bytes(&[0, 0, 0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_color_image() -> ImageData {
        let palette = vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)];
        let mut image = ImageData::new(2, 2, 1, PaletteData::Indexed(palette));
        image.set_pixel(0, 0, 0);
        image.set_pixel(1, 0, 1);
        image.set_pixel(0, 1, 1);
        image.set_pixel(1, 1, 0);
        image
    }

    #[test]
    fn two_by_two_layout() {
        let bytes = GifEncoder::new().encode(&two_color_image()).unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");
        // Screen descriptor flags: global table present, 2 entries.
        assert_eq!(bytes[10] & 0x87, 0x80);
        // Global color table is black then white.
        assert_eq!(&bytes[13..19], &[0, 0, 0, 255, 255, 255]);
        assert_eq!(bytes[19], BLOCK_IMAGE);
        assert_eq!(*bytes.last().unwrap(), BLOCK_TRAILER);
    }

    #[test]
    fn roundtrip_single_frame() {
        let image = two_color_image();
        let bytes = GifEncoder::new().encode(&image).unwrap();
        let frames = GifDecoder::new().decode(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!((frame.width, frame.height), (2, 2));
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(frame.pixel(x, y), image.pixel(x, y));
            }
        }
    }

    #[test]
    fn roundtrip_animation_with_controls() {
        let palette = vec![Rgb::new(10, 20, 30), Rgb::new(40, 50, 60)];
        let mut a = ImageData::new(3, 3, 1, PaletteData::Indexed(palette.clone()));
        a.delay_time_cs = 10;
        a.disposal_method = DisposalMethod::FillBackground;
        let mut b = ImageData::new(2, 1, 1, PaletteData::Indexed(palette));
        b.x = 1;
        b.y = 2;
        b.set_pixel(0, 0, 1);
        b.transparent_pixel = Some(0);
        b.delay_time_cs = 25;

        let bytes = GifEncoder::new()
            .loop_count(3)
            .encode_frames(&[a, b])
            .unwrap();
        let mut decoder = GifDecoder::new();
        let frames = decoder.decode(&bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(decoder.loop_count(), Some(3));
        assert_eq!(decoder.screen_size(), (3, 3));
        assert_eq!(frames[0].delay_time_cs, 10);
        assert_eq!(frames[0].disposal_method, DisposalMethod::FillBackground);
        assert_eq!((frames[1].x, frames[1].y), (1, 2));
        assert_eq!(frames[1].transparent_pixel, Some(0));
        assert_eq!(frames[1].pixel(0, 0), 1);
        assert!(decoder.warnings().is_empty());
    }

    #[test]
    fn decodes_interlaced_image() {
        // Hand-build an interlaced 2-color 4x4: encoder always writes
        // sequential rows, so construct the container directly.
        let rows = [
            [0u8, 0, 0, 0], // row 0 (pass 1)
            [1, 1, 1, 1],   // row 1 (pass 4)
            [0, 1, 0, 1],   // row 2 (pass 3)
            [1, 0, 1, 0],   // row 3 (pass 4)
        ];
        // Stream order for 4 rows: pass1 row0, pass3 row2, pass4 rows 1,3.
        let mut pixels = Vec::new();
        for &r in &[0usize, 2, 1, 3] {
            pixels.extend_from_slice(&rows[r]);
        }
        let lzw = lzw::encode(&pixels, 2).unwrap();

        let mut out = ByteWriter::new();
        out.write_bytes(b"GIF89a");
        out.write_u16_le(4);
        out.write_u16_le(4);
        out.write_bytes(&[0x80, 0, 0]); // GCT, 2 entries
        out.write_bytes(&[0, 0, 0, 255, 255, 255]);
        out.write_u8(BLOCK_IMAGE);
        out.write_u16_le(0);
        out.write_u16_le(0);
        out.write_u16_le(4);
        out.write_u16_le(4);
        out.write_u8(0x40); // interlaced, no local table
        out.write_u8(2); // min code size
        out.write_u8(lzw.len() as u8);
        out.write_bytes(&lzw);
        out.write_u8(0);
        out.write_u8(BLOCK_TRAILER);

        let frames = GifDecoder::new().decode(&out.into_vec()).unwrap();
        let frame = &frames[0];
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(frame.pixel(x, y), rows[y][x] as u32, "at ({x},{y})");
            }
        }
    }

    #[test]
    fn transparent_index_out_of_range_is_dropped() {
        let image = two_color_image();
        let mut bytes = GifEncoder::new().encode(&image).unwrap();
        // Splice in a GCE claiming transparent index 200 before the
        // image descriptor.
        let pos = bytes.iter().position(|&b| b == BLOCK_IMAGE).unwrap();
        let gce = [BLOCK_EXTENSION, EXT_GRAPHICS_CONTROL, 4, 0x01, 0, 0, 200, 0];
        bytes.splice(pos..pos, gce);
        let mut decoder = GifDecoder::new();
        let frames = decoder.decode(&bytes).unwrap();
        assert_eq!(frames[0].transparent_pixel, None);
        assert_eq!(decoder.warnings().len(), 1);
    }

    #[test]
    fn salvages_frames_before_corruption() {
        let image = two_color_image();
        let mut bytes = GifEncoder::new()
            .encode_frames(&[image.clone(), image])
            .unwrap();
        // Truncate inside the second frame's data.
        bytes.truncate(bytes.len() - 6);
        let mut decoder = GifDecoder::new();
        let frames = decoder.decode(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(!decoder.warnings().is_empty());
    }

    #[test]
    fn rejects_bad_signature() {
        assert!(GifDecoder::new().decode(b"GIF90a\0\0\0\0\0\0\0").is_err());
        assert!(!is_gif(b"PNG"));
        assert!(is_gif(b"GIF87a"));
    }

    #[test]
    fn listener_sees_interlace_passes() {
        struct Counter(usize, usize);
        impl DecodeListener for Counter {
            fn image_progress(&mut self, event: LoaderEvent<'_>) {
                if event.is_final {
                    self.1 += 1;
                } else {
                    self.0 += 1;
                }
            }
        }
        let image = two_color_image();
        let bytes = GifEncoder::new().encode(&image).unwrap();
        let mut counter = Counter(0, 0);
        GifDecoder::new()
            .decode_with_listener(&bytes, &mut counter)
            .unwrap();
        // Non-interlaced frame: one final event, no pass events.
        assert_eq!((counter.0, counter.1), (0, 1));
    }
}
