//! Canonical Huffman codes for DEFLATE.
//!
//! Both halves of the codec work from code-length lists (RFC 1951
//! section 3.2.2): the decoder builds a counts/first-code walk table,
//! the encoder assigns the canonical code values directly.

use crate::error::{CodecError, Result};

pub const MAX_CODE_BITS: usize = 15;

/// Decode-side table built from canonical code lengths.
#[derive(Clone, Debug)]
pub struct CodeTree {
    counts: [u16; MAX_CODE_BITS + 1],
    first_code: [u16; MAX_CODE_BITS + 1],
    first_symbol: [u16; MAX_CODE_BITS + 1],
    symbols: Vec<u16>,
    max_bits: usize,
}

impl CodeTree {
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_BITS + 1];
        for &len in lengths {
            if len as usize > MAX_CODE_BITS {
                return Err(CodecError::InvalidImage("huffman code length exceeds 15"));
            }
            if len > 0 {
                counts[len as usize] += 1;
            }
        }
        let max_bits = (1..=MAX_CODE_BITS)
            .rev()
            .find(|&b| counts[b] > 0)
            .unwrap_or(0);
        if max_bits == 0 {
            return Err(CodecError::InvalidImage("huffman tree has no codes"));
        }

        let mut first_code = [0u16; MAX_CODE_BITS + 1];
        let mut next_code = [0u16; MAX_CODE_BITS + 1];
        let mut code = 0u16;
        for bits in 1..=MAX_CODE_BITS {
            code = (code + counts[bits - 1]) << 1;
            first_code[bits] = code;
            next_code[bits] = code;
        }

        // Oversubscribed trees decode ambiguously; reject them.
        let mut remaining = 1i64;
        for bits in 1..=MAX_CODE_BITS {
            remaining = (remaining << 1) - counts[bits] as i64;
            if remaining < 0 {
                return Err(CodecError::InvalidImage("oversubscribed huffman tree"));
            }
        }

        let mut first_symbol = [0u16; MAX_CODE_BITS + 1];
        let mut sum = 0u16;
        for bits in 1..=MAX_CODE_BITS {
            first_symbol[bits] = sum;
            sum += counts[bits];
        }

        let mut symbols = vec![0u16; sum as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            let len = len as usize;
            if len == 0 {
                continue;
            }
            let index =
                first_symbol[len] as usize + (next_code[len] - first_code[len]) as usize;
            symbols[index] = symbol as u16;
            next_code[len] += 1;
        }

        Ok(Self {
            counts,
            first_code,
            first_symbol,
            symbols,
            max_bits,
        })
    }

    /// Decode one symbol, pulling bits from `next_bit` (LSB-first stream,
    /// codes packed most significant bit first per RFC 1951).
    pub fn decode<F>(&self, mut next_bit: F) -> Result<u16>
    where
        F: FnMut() -> Result<u16>,
    {
        let mut code: u16 = 0;
        for len in 1..=self.max_bits {
            code = (code << 1) | next_bit()?;
            let count = self.counts[len];
            if count == 0 {
                continue;
            }
            let first = self.first_code[len];
            if code >= first && code < first + count {
                let index = self.first_symbol[len] as usize + (code - first) as usize;
                return Ok(self.symbols[index]);
            }
        }
        Err(CodecError::InvalidImage("invalid huffman code"))
    }
}

/// Encode-side canonical code assignment: symbol index to (code, length).
/// Zero-length entries are unused symbols.
pub fn canonical_codes(lengths: &[u8]) -> Vec<(u16, u8)> {
    let mut counts = [0u16; MAX_CODE_BITS + 1];
    for &len in lengths {
        counts[len as usize] += 1;
    }
    counts[0] = 0;
    let mut next_code = [0u16; MAX_CODE_BITS + 1];
    let mut code = 0u16;
    for bits in 1..=MAX_CODE_BITS {
        code = (code + counts[bits - 1]) << 1;
        next_code[bits] = code;
    }
    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                (0, 0)
            } else {
                let c = next_code[len as usize];
                next_code[len as usize] += 1;
                (c, len)
            }
        })
        .collect()
}

/// Fixed literal/length code lengths (RFC 1951 section 3.2.6).
pub fn fixed_litlen_lengths() -> [u8; 288] {
    let mut lengths = [8u8; 288];
    for l in lengths.iter_mut().take(256).skip(144) {
        *l = 9;
    }
    for l in lengths.iter_mut().take(280).skip(256) {
        *l = 7;
    }
    lengths
}

/// Fixed distance codes are all five bits.
pub fn fixed_distance_lengths() -> [u8; 30] {
    [5u8; 30]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_from(data: &[u16]) -> impl FnMut() -> Result<u16> + '_ {
        let mut iter = data.iter();
        move || {
            iter.next()
                .copied()
                .ok_or(CodecError::InvalidImage("out of bits"))
        }
    }

    #[test]
    fn canonical_assignment_matches_rfc_example() {
        // RFC 1951 3.2.2 example: lengths (3,3,3,3,3,2,4,4) for A..H.
        let lengths = [3u8, 3, 3, 3, 3, 2, 4, 4];
        let codes = canonical_codes(&lengths);
        assert_eq!(codes[5], (0b00, 2)); // F
        assert_eq!(codes[0], (0b010, 3)); // A
        assert_eq!(codes[4], (0b110, 3)); // E
        assert_eq!(codes[6], (0b1110, 4)); // G
        assert_eq!(codes[7], (0b1111, 4)); // H
    }

    #[test]
    fn decode_follows_canonical_codes() {
        let lengths = [3u8, 3, 3, 3, 3, 2, 4, 4];
        let tree = CodeTree::from_lengths(&lengths).unwrap();
        // Code 00 -> symbol 5; code 1111 -> symbol 7.
        assert_eq!(tree.decode(bits_from(&[0, 0])).unwrap(), 5);
        assert_eq!(tree.decode(bits_from(&[1, 1, 1, 1])).unwrap(), 7);
    }

    #[test]
    fn rejects_oversubscribed_tree() {
        // Three codes of length 1 cannot exist.
        let err = CodeTree::from_lengths(&[1, 1, 1]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidImage(_)));
    }

    #[test]
    fn fixed_tables_have_expected_shape() {
        let litlen = fixed_litlen_lengths();
        assert_eq!(litlen[0], 8);
        assert_eq!(litlen[143], 8);
        assert_eq!(litlen[144], 9);
        assert_eq!(litlen[255], 9);
        assert_eq!(litlen[256], 7);
        assert_eq!(litlen[279], 7);
        assert_eq!(litlen[280], 8);
        assert_eq!(litlen[287], 8);
        assert!(CodeTree::from_lengths(&litlen).is_ok());
        assert!(CodeTree::from_lengths(&fixed_distance_lengths()).is_ok());
    }
}
