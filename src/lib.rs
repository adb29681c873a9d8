//! rastex-rs - raster image codecs implemented from scratch.
//!
//! Decoders for GIF (LZW, animation, interlace), PNG (inflate, filters,
//! Adam7), baseline and progressive JPEG (Huffman entropy coding, IDCT,
//! chroma upsampling), BMP/ICO, and baseline TIFF (PackBits, CCITT
//! Modified Huffman); encoders for GIF89a, PNG, baseline JPEG, BMP
//! (BI_RGB), and TIFF (PackBits). The [`format`] module sniffs file
//! signatures and dispatches to the right codec.

pub mod bmp;
pub mod deflate;
pub mod error;
pub mod format;
pub mod gif;
pub mod image_data;
pub mod jpeg;
pub mod png;
pub mod stream;
pub mod tiff;

pub use error::{CodecError, Result};
pub use format::{decode, decode_all, encode, sniff, ImageFormat};
pub use image_data::{
    DecodeListener, DisposalMethod, ImageData, LoaderEvent, PaletteData, Rgb,
};
