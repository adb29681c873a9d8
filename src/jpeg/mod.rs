//! JPEG codec: baseline and progressive DCT with Huffman coding.

mod bit_reader;
mod color;
mod dct;
mod entropy;
mod huffman;
mod marker;

pub mod decoder;
pub mod encoder;

pub use decoder::JpegDecoder;
pub use encoder::JpegEncoder;

/// SOI signature check.
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}
