//! DEFLATE compression and decompression plus the checksums that frame it.

pub mod checksum;
mod deflate;
mod huffman;
mod inflate;
mod lz77;

pub use checksum::{adler32, crc32, update_crc32};
pub use deflate::{deflate_raw, deflate_zlib, CompressionLevel};
pub use inflate::{inflate_raw, inflate_zlib};
