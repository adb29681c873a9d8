//! Decoded-image container types shared by every codec.
//!
//! An [`ImageData`] is a flat scanline buffer plus the metadata needed to
//! interpret it: bit depth, palette, stride, optional alpha plane, and the
//! per-frame animation fields GIF carries. Codecs fill one `ImageData` per
//! frame and hand it to the caller (or to a [`DecodeListener`] for
//! incremental display).

/// One palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// Indexed or direct (mask-based) color model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaletteData {
    /// Pixel values index into the color table.
    Indexed(Vec<Rgb>),
    /// Pixel values hold channel bits selected by the masks.
    Direct {
        red_mask: u32,
        green_mask: u32,
        blue_mask: u32,
    },
}

impl PaletteData {
    /// Direct RGB palette for 24-bit data laid out R, G, B in memory.
    pub fn direct_rgb24() -> Self {
        PaletteData::Direct {
            red_mask: 0xFF,
            green_mask: 0xFF00,
            blue_mask: 0xFF_0000,
        }
    }

    pub fn colors(&self) -> Option<&[Rgb]> {
        match self {
            PaletteData::Indexed(colors) => Some(colors),
            PaletteData::Direct { .. } => None,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, PaletteData::Direct { .. })
    }
}

/// How a GIF frame is disposed of before the next one is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    #[default]
    Unspecified,
    FillNone,
    FillBackground,
    FillPrevious,
}

/// A decoded frame: flat pixel buffer plus interpretation metadata.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: usize,
    pub height: usize,
    /// Bits per pixel: 1, 2, 4, 8, 16, 24 or 32.
    pub depth: u16,
    /// Scanline padding in bytes; `bytes_per_line` is rounded up to it.
    pub scanline_pad: usize,
    pub bytes_per_line: usize,
    pub palette: PaletteData,
    pub data: Vec<u8>,
    /// Separate 8-bit alpha plane, one byte per pixel, when present.
    pub alpha_data: Option<Vec<u8>>,
    /// Palette index rendered as transparent, for indexed formats.
    pub transparent_pixel: Option<usize>,
    /// Frame placement and timing for animation formats.
    pub x: usize,
    pub y: usize,
    pub delay_time_cs: u16,
    pub disposal_method: DisposalMethod,
}

impl ImageData {
    /// Bytes needed for one row of `width` pixels at `depth` bits,
    /// rounded up to `scanline_pad`.
    pub fn row_stride(width: usize, depth: u16, scanline_pad: usize) -> usize {
        let bits = width * depth as usize;
        let bytes = bits.div_ceil(8);
        bytes.div_ceil(scanline_pad) * scanline_pad
    }

    pub fn new(width: usize, height: usize, depth: u16, palette: PaletteData) -> Self {
        Self::with_pad(width, height, depth, palette, 4)
    }

    pub fn with_pad(
        width: usize,
        height: usize,
        depth: u16,
        palette: PaletteData,
        scanline_pad: usize,
    ) -> Self {
        let bytes_per_line = Self::row_stride(width, depth, scanline_pad);
        Self {
            width,
            height,
            depth,
            scanline_pad,
            bytes_per_line,
            palette,
            data: vec![0; bytes_per_line * height],
            alpha_data: None,
            transparent_pixel: None,
            x: 0,
            y: 0,
            delay_time_cs: 0,
            disposal_method: DisposalMethod::default(),
        }
    }

    /// Read one pixel value. Bit-packed depths are MSB-first within a byte.
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        let row = y * self.bytes_per_line;
        match self.depth {
            1 => (self.data[row + x / 8] >> (7 - (x & 7))) as u32 & 1,
            2 => (self.data[row + x / 4] >> (2 * (3 - (x & 3)))) as u32 & 3,
            4 => {
                let b = self.data[row + x / 2];
                if x & 1 == 0 { (b >> 4) as u32 } else { (b & 0x0F) as u32 }
            }
            8 => self.data[row + x] as u32,
            16 => {
                let i = row + x * 2;
                u16::from_le_bytes([self.data[i], self.data[i + 1]]) as u32
            }
            24 => {
                let i = row + x * 3;
                (self.data[i] as u32) | (self.data[i + 1] as u32) << 8 | (self.data[i + 2] as u32) << 16
            }
            32 => {
                let i = row + x * 4;
                u32::from_le_bytes([
                    self.data[i],
                    self.data[i + 1],
                    self.data[i + 2],
                    self.data[i + 3],
                ])
            }
            _ => 0,
        }
    }

    /// Write one pixel value; inverse of [`ImageData::pixel`].
    pub fn set_pixel(&mut self, x: usize, y: usize, value: u32) {
        let row = y * self.bytes_per_line;
        match self.depth {
            1 => {
                let mask = 1u8 << (7 - (x & 7));
                let byte = &mut self.data[row + x / 8];
                if value & 1 != 0 { *byte |= mask } else { *byte &= !mask }
            }
            2 => {
                let shift = 2 * (3 - (x & 3));
                let byte = &mut self.data[row + x / 4];
                *byte = (*byte & !(3 << shift)) | (((value as u8) & 3) << shift);
            }
            4 => {
                let byte = &mut self.data[row + x / 2];
                if x & 1 == 0 {
                    *byte = (*byte & 0x0F) | ((value as u8) << 4);
                } else {
                    *byte = (*byte & 0xF0) | ((value as u8) & 0x0F);
                }
            }
            8 => self.data[row + x] = value as u8,
            16 => {
                let i = row + x * 2;
                self.data[i..i + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            24 => {
                let i = row + x * 3;
                self.data[i] = value as u8;
                self.data[i + 1] = (value >> 8) as u8;
                self.data[i + 2] = (value >> 16) as u8;
            }
            32 => {
                let i = row + x * 4;
                self.data[i..i + 4].copy_from_slice(&value.to_le_bytes());
            }
            _ => {}
        }
    }
}

/// Progress notification payload.
#[derive(Debug)]
pub struct LoaderEvent<'a> {
    pub image: &'a ImageData,
    /// GIF frame index, PNG interlace pass, or JPEG progressive scan index.
    pub pass: usize,
    pub is_final: bool,
}

/// Incremental display hook, called after each GIF frame, PNG interlace
/// pass, and JPEG progressive scan.
pub trait DecodeListener {
    fn image_progress(&mut self, event: LoaderEvent<'_>);
}

/// Listener that discards every notification.
pub struct NullListener;

impl DecodeListener for NullListener {
    fn image_progress(&mut self, _event: LoaderEvent<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_stride_pads_to_four() {
        assert_eq!(ImageData::row_stride(1, 1, 4), 4);
        assert_eq!(ImageData::row_stride(33, 1, 4), 8);
        assert_eq!(ImageData::row_stride(3, 24, 4), 12);
        assert_eq!(ImageData::row_stride(5, 8, 4), 8);
        assert_eq!(ImageData::row_stride(5, 8, 1), 5);
    }

    #[test]
    fn pixel_roundtrip_packed_depths() {
        for depth in [1u16, 2, 4, 8, 16, 24, 32] {
            let max = if depth >= 32 { u32::MAX } else { (1u32 << depth) - 1 };
            let mut image = ImageData::new(9, 3, depth, PaletteData::Indexed(Vec::new()));
            for y in 0..3 {
                for x in 0..9 {
                    let v = (x as u32 * 31 + y as u32 * 7) & max;
                    image.set_pixel(x, y, v);
                }
            }
            for y in 0..3 {
                for x in 0..9 {
                    let v = (x as u32 * 31 + y as u32 * 7) & max;
                    assert_eq!(image.pixel(x, y), v, "depth {depth} at ({x},{y})");
                }
            }
        }
    }
}
