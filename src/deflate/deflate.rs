//! DEFLATE compression: LZ77 tokens entropy-coded with the fixed Huffman
//! tables, with a stored-block fallback for incompressible input.

use crate::deflate::checksum::adler32;
use crate::deflate::huffman::{canonical_codes, fixed_distance_lengths, fixed_litlen_lengths};
use crate::deflate::inflate::{DIST_BASE, DIST_EXTRA, LENGTH_BASE, LENGTH_EXTRA};
use crate::deflate::lz77::{MatchFinder, Token};

const STORED_CHUNK: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Stored blocks only; no entropy coding.
    Stored,
    /// Fixed Huffman coding without match finding.
    Fast,
    /// Fixed Huffman with moderate match search depth.
    Default,
    /// Deepest match search.
    Best,
}

/// Compress into a zlib container: header, deflate stream, Adler-32.
pub fn deflate_zlib(data: &[u8], level: CompressionLevel) -> Vec<u8> {
    let body = deflate_raw(data, level);
    let mut out = Vec::with_capacity(body.len() + 6);
    out.extend_from_slice(&zlib_header(level));
    out.extend_from_slice(&body);
    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

/// Compress into a bare DEFLATE stream.
pub fn deflate_raw(data: &[u8], level: CompressionLevel) -> Vec<u8> {
    if level == CompressionLevel::Stored {
        return stored_blocks(data);
    }
    let tokens = match level {
        CompressionLevel::Fast => data.iter().map(|&b| Token::Literal(b)).collect(),
        CompressionLevel::Best => MatchFinder::new(9).tokenize(data),
        _ => MatchFinder::new(6).tokenize(data),
    };
    let fixed = fixed_huffman_block(&tokens);
    // Incompressible input: stored framing is cheaper.
    let stored_size = data.len() + (data.len() / STORED_CHUNK + 1) * 5;
    if fixed.len() > stored_size {
        stored_blocks(data)
    } else {
        fixed
    }
}

fn stored_blocks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / STORED_CHUNK * 5 + 8);
    if data.is_empty() {
        out.extend_from_slice(&[0x01, 0x00, 0x00, 0xFF, 0xFF]);
        return out;
    }
    let chunks: Vec<&[u8]> = data.chunks(STORED_CHUNK).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let len = chunk.len() as u16;
        out.push(if i + 1 == chunks.len() { 0x01 } else { 0x00 });
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out
}

fn fixed_huffman_block(tokens: &[Token]) -> Vec<u8> {
    let litlen = canonical_codes(&fixed_litlen_lengths());
    let dist = canonical_codes(&fixed_distance_lengths());

    let mut writer = LsbWriter::new();
    writer.write_bits(1, 1); // BFINAL
    writer.write_bits(1, 2); // BTYPE = 01, fixed

    for token in tokens {
        match *token {
            Token::Literal(byte) => writer.write_code(litlen[byte as usize]),
            Token::Match { length, distance } => {
                let (symbol, extra_bits, extra) = length_code(length);
                writer.write_code(litlen[symbol as usize]);
                writer.write_bits(extra as u32, extra_bits);

                let (symbol, extra_bits, extra) = distance_code(distance);
                writer.write_code(dist[symbol as usize]);
                writer.write_bits(extra as u32, extra_bits);
            }
        }
    }
    writer.write_code(litlen[256]); // end of block
    writer.finish()
}

/// Map a match length 3..=258 to (symbol, extra bit count, extra value).
fn length_code(length: u16) -> (u16, u8, u16) {
    debug_assert!((3..=258).contains(&length));
    let mut index = LENGTH_BASE.partition_point(|&base| base <= length) - 1;
    if length == 258 {
        index = 28; // length 258 has a dedicated code
    }
    (257 + index as u16, LENGTH_EXTRA[index], length - LENGTH_BASE[index])
}

/// Map a match distance 1..=32768 to (symbol, extra bit count, extra value).
fn distance_code(distance: u16) -> (u16, u8, u16) {
    debug_assert!(distance >= 1);
    let index = DIST_BASE.partition_point(|&base| base <= distance) - 1;
    (index as u16, DIST_EXTRA[index], distance - DIST_BASE[index])
}

fn zlib_header(level: CompressionLevel) -> [u8; 2] {
    let cmf: u8 = 0x78; // deflate, 32K window
    let flevel: u8 = match level {
        CompressionLevel::Stored | CompressionLevel::Fast => 1,
        CompressionLevel::Default => 2,
        CompressionLevel::Best => 3,
    };
    let mut flg = flevel << 6;
    let fcheck = (31 - ((cmf as u16 * 256 + flg as u16) % 31)) % 31;
    flg |= fcheck as u8;
    [cmf, flg]
}

/// LSB-first bit packer. Huffman code values are written most significant
/// code bit first, which means reversing them into the LSB stream.
struct LsbWriter {
    out: Vec<u8>,
    acc: u32,
    count: u8,
}

impl LsbWriter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            acc: 0,
            count: 0,
        }
    }

    fn write_bits(&mut self, value: u32, bits: u8) {
        self.acc |= value << self.count;
        self.count += bits;
        while self.count >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.count -= 8;
        }
    }

    fn write_code(&mut self, (code, length): (u16, u8)) {
        let mut reversed = 0u32;
        let mut code = code as u32;
        for _ in 0..length {
            reversed = (reversed << 1) | (code & 1);
            code >>= 1;
        }
        self.write_bits(reversed, length);
    }

    fn finish(mut self) -> Vec<u8> {
        if self.count > 0 {
            self.out.push(self.acc as u8);
        }
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deflate::inflate::{inflate_raw, inflate_zlib};

    #[test]
    fn length_code_boundaries() {
        assert_eq!(length_code(3), (257, 0, 0));
        assert_eq!(length_code(10), (264, 0, 0));
        assert_eq!(length_code(11), (265, 1, 0));
        assert_eq!(length_code(12), (265, 1, 1));
        assert_eq!(length_code(257), (284, 5, 30));
        assert_eq!(length_code(258), (285, 0, 0));
    }

    #[test]
    fn distance_code_boundaries() {
        assert_eq!(distance_code(1), (0, 0, 0));
        assert_eq!(distance_code(4), (3, 0, 0));
        assert_eq!(distance_code(5), (4, 1, 0));
        assert_eq!(distance_code(6), (4, 1, 1));
        assert_eq!(distance_code(24577), (29, 13, 0));
        assert_eq!(distance_code(32768), (29, 13, 8191));
    }

    #[test]
    fn zlib_header_check_bits_valid() {
        for level in [
            CompressionLevel::Stored,
            CompressionLevel::Fast,
            CompressionLevel::Default,
            CompressionLevel::Best,
        ] {
            let [cmf, flg] = zlib_header(level);
            assert_eq!((cmf as u16 * 256 + flg as u16) % 31, 0);
        }
    }

    #[test]
    fn fast_mode_roundtrip() {
        let data = b"literal only coding path";
        let encoded = deflate_zlib(data, CompressionLevel::Fast);
        assert_eq!(inflate_zlib(&encoded, None).unwrap(), data);
    }

    #[test]
    fn repetitive_input_compresses() {
        let data = vec![b'x'; 10_000];
        let encoded = deflate_raw(&data, CompressionLevel::Default);
        assert!(encoded.len() < 200);
        let mut out = Vec::new();
        inflate_raw(&encoded, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn stored_fallback_keeps_size_bounded() {
        // Pseudo-random bytes defeat matching; output must not blow up
        // past the stored-block framing overhead.
        let mut state = 0x12345678u32;
        let data: Vec<u8> = (0..70_000)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 24) as u8
            })
            .collect();
        let encoded = deflate_raw(&data, CompressionLevel::Default);
        assert!(encoded.len() <= data.len() + (data.len() / STORED_CHUNK + 1) * 5);
        let mut out = Vec::new();
        inflate_raw(&encoded, &mut out).unwrap();
        assert_eq!(out, data);
    }
}
