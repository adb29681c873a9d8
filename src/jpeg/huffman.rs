//! Canonical Huffman tables for JPEG entropy coding.
//!
//! A table is built once per DHT segment from the 16-entry code-length
//! histogram plus the symbol list, following Annex C.2: codes are assigned
//! in increasing length, incrementing within a length and left-shifting
//! between lengths. Decoding takes an 8-bit lookahead fast path and falls
//! back to the `max_code`/`val_ptr` walk for longer codes.

use crate::error::{CodecError, Result};
use crate::jpeg::bit_reader::BitReader;

const LOOKAHEAD_BITS: u32 = 8;

#[derive(Clone)]
pub struct HuffmanTable {
    /// Indexed by code length 1..=16; -1 marks an unused length.
    max_code: [i32; 17],
    min_code: [i32; 17],
    val_ptr: [i32; 17],
    symbols: Vec<u8>,
    /// Fast path: next 8 raw bits -> (code length, symbol); length 0 means
    /// the code is longer than 8 bits.
    look_length: [u8; 256],
    look_symbol: [u8; 256],
    /// Encode side: symbol -> (code, length).
    codes: [(u16, u8); 256],
}

impl HuffmanTable {
    /// Build from a DHT-style spec. `dc` restricts symbols to the DC
    /// magnitude-category alphabet 0..=15.
    pub fn from_spec(lengths: &[u8; 16], symbols: &[u8], dc: bool) -> Result<Self> {
        let total: usize = lengths.iter().map(|&n| n as usize).sum();
        if total != symbols.len() || total == 0 || total > 256 {
            return Err(CodecError::InvalidImage("huffman table symbol count"));
        }
        if dc && symbols.iter().any(|&s| s > 15) {
            return Err(CodecError::InvalidImage("dc huffman symbol out of range"));
        }

        let mut table = Self {
            max_code: [-1; 17],
            min_code: [0; 17],
            val_ptr: [0; 17],
            symbols: symbols.to_vec(),
            look_length: [0; 256],
            look_symbol: [0; 256],
            codes: [(0, 0); 256],
        };

        let mut code: i32 = 0;
        let mut index = 0usize;
        for l in 1..=16usize {
            let count = lengths[l - 1] as usize;
            if count == 0 {
                code <<= 1;
                continue;
            }
            table.val_ptr[l] = index as i32;
            table.min_code[l] = code;
            for _ in 0..count {
                if code >= (1 << l) {
                    return Err(CodecError::InvalidImage("huffman code table overruns"));
                }
                let symbol = symbols[index];
                table.codes[symbol as usize] = (code as u16, l as u8);
                if l as u32 <= LOOKAHEAD_BITS {
                    // Every bit pattern with this code as prefix maps to it.
                    let shift = LOOKAHEAD_BITS as usize - l;
                    let base = (code as usize) << shift;
                    for fill in 0..(1usize << shift) {
                        table.look_length[base | fill] = l as u8;
                        table.look_symbol[base | fill] = symbol;
                    }
                }
                code += 1;
                index += 1;
            }
            table.max_code[l] = code - 1;
            code <<= 1;
        }
        Ok(table)
    }

    /// Decode the next symbol from the bit stream.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let look = reader.peek_bits(LOOKAHEAD_BITS) as usize;
        let len = self.look_length[look];
        if len != 0 {
            reader.drop_bits(len as u32);
            return Ok(self.look_symbol[look]);
        }
        // Slow path: walk the canonical tree bit by bit.
        let mut code: i32 = 0;
        for l in 1..=16usize {
            code = (code << 1) | reader.get_bit() as i32;
            if self.max_code[l] >= 0 && code <= self.max_code[l] && code >= self.min_code[l] {
                let idx = self.val_ptr[l] + (code - self.min_code[l]);
                return Ok(self.symbols[idx as usize]);
            }
        }
        Err(CodecError::InvalidImage("bad huffman code"))
    }

    /// Encode-side lookup; length 0 means the symbol has no code.
    pub fn code(&self, symbol: u8) -> (u16, u8) {
        self.codes[symbol as usize]
    }

    /// Raw DHT payload (lengths then symbols) for the encoder's tables.
    pub fn to_dht_payload(lengths: &[u8; 16], symbols: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + symbols.len());
        out.extend_from_slice(lengths);
        out.extend_from_slice(symbols);
        out
    }
}

// Standard tables from Annex K.3, used by the encoder and by streams that
// omit DHT in favor of the typical tables.

pub const STD_DC_LUMA_LENGTHS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
pub const STD_DC_LUMA_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

pub const STD_DC_CHROMA_LENGTHS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
pub const STD_DC_CHROMA_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

pub const STD_AC_LUMA_LENGTHS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125];
pub const STD_AC_LUMA_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61,
    0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52,
    0xd1, 0xf0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25,
    0x26, 0x27, 0x28, 0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45,
    0x46, 0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64,
    0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83,
    0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99,
    0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3,
    0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8,
    0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa,
];

pub const STD_AC_CHROMA_LENGTHS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119];
pub const STD_AC_CHROMA_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61,
    0x71, 0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33,
    0x52, 0xf0, 0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18,
    0x19, 0x1a, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44,
    0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63,
    0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a,
    0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97,
    0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca,
    0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7,
    0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa,
];

impl HuffmanTable {
    pub fn standard_dc_luma() -> Self {
        Self::from_spec(&STD_DC_LUMA_LENGTHS, &STD_DC_LUMA_VALUES, true).expect("standard table")
    }

    pub fn standard_dc_chroma() -> Self {
        Self::from_spec(&STD_DC_CHROMA_LENGTHS, &STD_DC_CHROMA_VALUES, true)
            .expect("standard table")
    }

    pub fn standard_ac_luma() -> Self {
        Self::from_spec(&STD_AC_LUMA_LENGTHS, &STD_AC_LUMA_VALUES, false).expect("standard table")
    }

    pub fn standard_ac_chroma() -> Self {
        Self::from_spec(&STD_AC_CHROMA_LENGTHS, &STD_AC_CHROMA_VALUES, false)
            .expect("standard table")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-by-bit canonical walk used as the oracle for decode().
    fn slow_decode(table: &HuffmanTable, bits: &mut impl Iterator<Item = u32>) -> Option<u8> {
        let mut code: i32 = 0;
        for l in 1..=16usize {
            code = (code << 1) | bits.next()? as i32;
            if table.max_code[l] >= 0 && code <= table.max_code[l] && code >= table.min_code[l] {
                let idx = table.val_ptr[l] + (code - table.min_code[l]);
                return Some(table.symbols[idx as usize]);
            }
        }
        None
    }

    fn bits_of(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
        bytes
            .iter()
            .flat_map(|&b| (0..8).rev().map(move |i| (b as u32 >> i) & 1))
    }

    #[test]
    fn lookahead_matches_canonical_walk() {
        let table = HuffmanTable::standard_ac_luma();
        // A stretch of pseudo-random bytes; both decoders must agree until
        // one hits an invalid code.
        let data: Vec<u8> = (0u16..64).map(|i| (i * 37 + 11) as u8).collect();
        let mut fast = BitReader::new(&data);
        let mut oracle = bits_of(&data);
        for _ in 0..24 {
            let expect = slow_decode(&table, &mut oracle);
            match expect {
                Some(sym) => assert_eq!(table.decode(&mut fast).unwrap(), sym),
                None => break,
            }
        }
    }

    #[test]
    fn canonical_code_assignment() {
        // lengths: two 2-bit codes, one 3-bit code
        let mut lengths = [0u8; 16];
        lengths[1] = 2;
        lengths[2] = 1;
        let table = HuffmanTable::from_spec(&lengths, &[5, 9, 2], false).unwrap();
        assert_eq!(table.code(5), (0b00, 2));
        assert_eq!(table.code(9), (0b01, 2));
        assert_eq!(table.code(2), (0b100, 3));
    }

    #[test]
    fn overfull_table_rejected() {
        let mut lengths = [0u8; 16];
        lengths[0] = 3; // three 1-bit codes cannot exist
        let err = HuffmanTable::from_spec(&lengths, &[1, 2, 3], false);
        assert!(err.is_err());
    }

    #[test]
    fn dc_symbol_range_enforced() {
        let mut lengths = [0u8; 16];
        lengths[1] = 1;
        assert!(HuffmanTable::from_spec(&lengths, &[16], true).is_err());
        assert!(HuffmanTable::from_spec(&lengths, &[15], true).is_ok());
    }
}
