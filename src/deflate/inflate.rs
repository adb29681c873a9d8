//! DEFLATE (RFC 1951) and zlib (RFC 1950) decompression.
//!
//! Handles stored, fixed-Huffman and dynamic-Huffman blocks, verifies the
//! zlib header check bits and the trailing Adler-32, and rejects preset
//! dictionaries.

use crate::deflate::checksum::adler32;
use crate::deflate::huffman::{fixed_distance_lengths, fixed_litlen_lengths, CodeTree};
use crate::error::{CodecError, Result};

pub const MAX_DISTANCE: usize = 32 * 1024;

pub(crate) const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];
pub(crate) const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
pub(crate) const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
pub(crate) const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12,
    13, 13,
];

/// Order in which code-length code lengths are transmitted.
pub(crate) const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Decompress a zlib-wrapped stream. When `expected_size` is given the
/// output is pre-allocated and the final length validated.
pub fn inflate_zlib(data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
    if data.len() < 6 {
        return Err(CodecError::InvalidImage("zlib stream too short"));
    }
    let cmf = data[0];
    let flg = data[1];
    if cmf & 0x0F != 8 {
        return Err(CodecError::InvalidImage("zlib compression method is not deflate"));
    }
    if cmf >> 4 > 7 {
        return Err(CodecError::InvalidImage("zlib window size out of range"));
    }
    if (u16::from(cmf) * 256 + u16::from(flg)) % 31 != 0 {
        return Err(CodecError::InvalidImage("zlib header check failed"));
    }
    if flg & 0x20 != 0 {
        return Err(CodecError::NotImplemented("zlib preset dictionary"));
    }

    let adler_offset = data.len() - 4;
    let payload = &data[2..adler_offset];
    let expected = u32::from_be_bytes([
        data[adler_offset],
        data[adler_offset + 1],
        data[adler_offset + 2],
        data[adler_offset + 3],
    ]);

    let mut out = Vec::with_capacity(expected_size.unwrap_or(0));
    inflate_raw(payload, &mut out)?;

    let actual = adler32(&out);
    if actual != expected {
        return Err(CodecError::InvalidImageDetail(format!(
            "adler-32 mismatch: expected {expected:#010x}, got {actual:#010x}"
        )));
    }
    if let Some(size) = expected_size {
        if out.len() != size {
            return Err(CodecError::InvalidImageDetail(format!(
                "decompressed size mismatch: expected {size}, got {}",
                out.len()
            )));
        }
    }
    Ok(out)
}

/// Decompress a bare DEFLATE stream into `out`.
pub fn inflate_raw(input: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut reader = InflateBits::new(input);
    loop {
        let last = reader.read_bits(1)? != 0;
        match reader.read_bits(2)? {
            0 => stored_block(&mut reader, out)?,
            1 => {
                let litlen = CodeTree::from_lengths(&fixed_litlen_lengths())?;
                let dist = CodeTree::from_lengths(&fixed_distance_lengths())?;
                compressed_block(&mut reader, out, &litlen, &dist)?;
            }
            2 => {
                let (litlen, dist) = dynamic_trees(&mut reader)?;
                compressed_block(&mut reader, out, &litlen, &dist)?;
            }
            _ => return Err(CodecError::InvalidImage("reserved deflate block type")),
        }
        if last {
            break;
        }
    }
    Ok(())
}

fn stored_block(reader: &mut InflateBits<'_>, out: &mut Vec<u8>) -> Result<()> {
    reader.align_byte();
    let len = reader.read_aligned_u16()?;
    let nlen = reader.read_aligned_u16()?;
    if len != !nlen {
        return Err(CodecError::InvalidImage("stored block length check failed"));
    }
    let bytes = reader.read_aligned_bytes(len as usize)?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn compressed_block(
    reader: &mut InflateBits<'_>,
    out: &mut Vec<u8>,
    litlen: &CodeTree,
    dist: &CodeTree,
) -> Result<()> {
    loop {
        let symbol = litlen.decode(|| reader.read_bits(1).map(|b| b as u16))?;
        match symbol {
            0..=255 => out.push(symbol as u8),
            256 => break,
            257..=285 => {
                let index = (symbol - 257) as usize;
                let length = LENGTH_BASE[index] as usize
                    + reader.read_bits(LENGTH_EXTRA[index])? as usize;

                let dist_symbol = dist.decode(|| reader.read_bits(1).map(|b| b as u16))?;
                if dist_symbol >= 30 {
                    return Err(CodecError::InvalidImage("distance symbol out of range"));
                }
                let distance = DIST_BASE[dist_symbol as usize] as usize
                    + reader.read_bits(DIST_EXTRA[dist_symbol as usize])? as usize;
                if distance == 0 || distance > out.len() || distance > MAX_DISTANCE {
                    return Err(CodecError::InvalidImage("invalid back-reference distance"));
                }

                // Byte-at-a-time copy handles overlapping references.
                let target = out.len() + length;
                while out.len() < target {
                    let byte = out[out.len() - distance];
                    out.push(byte);
                }
            }
            _ => return Err(CodecError::InvalidImage("invalid literal/length symbol")),
        }
    }
    Ok(())
}

fn dynamic_trees(reader: &mut InflateBits<'_>) -> Result<(CodeTree, CodeTree)> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;

    let mut cl_lengths = [0u8; 19];
    for &index in CODE_LENGTH_ORDER.iter().take(hclen) {
        cl_lengths[index] = reader.read_bits(3)? as u8;
    }
    let cl_tree = CodeTree::from_lengths(&cl_lengths)?;

    let total = hlit + hdist;
    let mut lengths: Vec<u8> = Vec::with_capacity(total);
    while lengths.len() < total {
        let symbol = cl_tree.decode(|| reader.read_bits(1).map(|b| b as u16))?;
        match symbol {
            0..=15 => lengths.push(symbol as u8),
            16 => {
                let last = *lengths
                    .last()
                    .ok_or(CodecError::InvalidImage("length repeat with no prior code"))?;
                let repeat = 3 + reader.read_bits(2)? as usize;
                lengths.extend(std::iter::repeat(last).take(repeat));
            }
            17 => {
                let repeat = 3 + reader.read_bits(3)? as usize;
                lengths.extend(std::iter::repeat(0u8).take(repeat));
            }
            18 => {
                let repeat = 11 + reader.read_bits(7)? as usize;
                lengths.extend(std::iter::repeat(0u8).take(repeat));
            }
            _ => return Err(CodecError::InvalidImage("invalid code length symbol")),
        }
        if lengths.len() > total {
            return Err(CodecError::InvalidImage("code lengths overrun header counts"));
        }
    }

    let litlen = CodeTree::from_lengths(&lengths[..hlit])?;
    let dist_lengths = &lengths[hlit..];
    if dist_lengths.iter().all(|&l| l == 0) {
        return Err(CodecError::InvalidImage("distance tree has no codes"));
    }
    let dist = CodeTree::from_lengths(dist_lengths)?;
    Ok((litlen, dist))
}

/// LSB-first bit reader over the DEFLATE payload.
struct InflateBits<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_buf: u32,
    bit_count: u8,
}

impl<'a> InflateBits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn read_bits(&mut self, bits: u8) -> Result<u32> {
        if bits == 0 {
            return Ok(0);
        }
        while self.bit_count < bits {
            let byte = *self
                .data
                .get(self.byte_pos)
                .ok_or(CodecError::InvalidImage("deflate stream truncated"))?;
            self.bit_buf |= (byte as u32) << self.bit_count;
            self.bit_count += 8;
            self.byte_pos += 1;
        }
        let value = self.bit_buf & ((1u32 << bits) - 1);
        self.bit_buf >>= bits;
        self.bit_count -= bits;
        Ok(value)
    }

    fn align_byte(&mut self) {
        let drop = self.bit_count % 8;
        self.bit_buf >>= drop;
        self.bit_count -= drop;
    }

    fn read_aligned_u16(&mut self) -> Result<u16> {
        debug_assert_eq!(self.bit_count % 8, 0);
        // Whole bytes may still sit in the bit buffer after align_byte.
        let lo = self.read_bits(8)? as u16;
        let hi = self.read_bits(8)? as u16;
        Ok(lo | (hi << 8))
    }

    fn read_aligned_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        // Stored data always follows LEN/NLEN, by which point the bit
        // buffer has been drained to the byte boundary.
        debug_assert_eq!(self.bit_count, 0);
        let end = self
            .byte_pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(CodecError::InvalidImage("stored block overruns input"))?;
        let bytes = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        Ok(bytes)
    }
}
