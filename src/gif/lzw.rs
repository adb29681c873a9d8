//! GIF-variant LZW with variable code widths.
//!
//! Codes start at `min_code_size + 1` bits and grow to twelve as the
//! dictionary fills; a clear code resets the dictionary and width. Codes
//! are packed LSB-first into the byte stream (the sub-block framing is
//! the container's concern, not this module's).

use crate::error::{CodecError, Result};

const MAX_CODE_WIDTH: u32 = 12;
const TABLE_SIZE: usize = 1 << MAX_CODE_WIDTH;

/// Decode an LZW stream of `min_code_size`-bit symbols. Decoding stops at
/// the end-of-information code or when the input runs out.
pub fn decode(data: &[u8], min_code_size: u8) -> Result<Vec<u8>> {
    if !(2..=8).contains(&min_code_size) {
        return Err(CodecError::InvalidImage("bad lzw minimum code size"));
    }
    let clear_code = 1u16 << min_code_size;
    let end_code = clear_code + 1;

    // Dictionary as prefix links plus final byte; roots are implicit.
    let mut prefix = [0u16; TABLE_SIZE];
    let mut suffix = [0u8; TABLE_SIZE];
    let mut next_code = end_code + 1;
    let mut width = min_code_size as u32 + 1;

    let mut reader = LzwBits::new(data);
    let mut out = Vec::new();
    let mut stack = Vec::with_capacity(TABLE_SIZE);
    let mut previous: Option<u16> = None;

    while let Some(code) = reader.read_bits(width) {
        if code == clear_code {
            next_code = end_code + 1;
            width = min_code_size as u32 + 1;
            previous = None;
            continue;
        }
        if code == end_code {
            break;
        }

        let code_defined = code < next_code && code != clear_code && code != end_code;
        if !code_defined && !(code == next_code && previous.is_some()) {
            return Err(CodecError::InvalidImage("lzw code out of sequence"));
        }

        // Expand the code (or, for the just-about-to-be-defined code,
        // the previous string plus its own first byte).
        stack.clear();
        let mut walk = if code_defined {
            code
        } else {
            let prev = previous.unwrap_or(0);
            stack.push(first_byte(&prefix, &suffix, prev, clear_code));
            prev
        };
        while walk >= clear_code + 2 {
            stack.push(suffix[walk as usize]);
            walk = prefix[walk as usize];
        }
        stack.push(walk as u8);

        let first = *stack.last().unwrap_or(&0);
        out.extend(stack.iter().rev());

        if let Some(prev) = previous {
            if next_code < TABLE_SIZE as u16 {
                prefix[next_code as usize] = prev;
                suffix[next_code as usize] = first;
                next_code += 1;
                // Width grows when the next code would not fit; at twelve
                // bits the dictionary stays frozen until a clear code.
                if next_code == (1 << width) && width < MAX_CODE_WIDTH {
                    width += 1;
                }
            }
        }
        previous = Some(code);
    }
    Ok(out)
}

fn first_byte(prefix: &[u16; TABLE_SIZE], suffix: &[u8; TABLE_SIZE], code: u16, clear: u16) -> u8 {
    let mut walk = code;
    while walk >= clear + 2 {
        walk = prefix[walk as usize];
    }
    walk as u8
}

/// Encode pixels as an LZW stream, emitting a leading clear code and a
/// trailing end-of-information code.
pub fn encode(pixels: &[u8], min_code_size: u8) -> Result<Vec<u8>> {
    if !(2..=8).contains(&min_code_size) {
        return Err(CodecError::InvalidImage("bad lzw minimum code size"));
    }
    let clear_code = 1u16 << min_code_size;
    let end_code = clear_code + 1;
    let root_limit = 1u16 << min_code_size;

    // Dictionary keyed by (prefix code, next byte).
    let mut table: std::collections::HashMap<(u16, u8), u16> = std::collections::HashMap::new();
    let mut next_code = end_code + 1;
    let mut width = min_code_size as u32 + 1;

    let mut writer = LzwBitWriter::new();
    writer.write_bits(clear_code as u32, width);

    let mut current: Option<u16> = None;
    for &pixel in pixels {
        if pixel as u16 >= root_limit {
            return Err(CodecError::InvalidImage("pixel exceeds lzw root codes"));
        }
        let Some(prefix) = current else {
            current = Some(pixel as u16);
            continue;
        };
        if let Some(&code) = table.get(&(prefix, pixel)) {
            current = Some(code);
            continue;
        }
        writer.write_bits(prefix as u32, width);
        if next_code < TABLE_SIZE as u16 {
            table.insert((prefix, pixel), next_code);
            next_code += 1;
            if next_code == (1 << width) + 1 && width < MAX_CODE_WIDTH {
                // The decoder widens after defining code (1<<width)-1;
                // mirror that timing from the encoder side.
                width += 1;
            }
        } else {
            // Table full: reset so decode state stays in sync.
            writer.write_bits(clear_code as u32, width);
            table.clear();
            next_code = end_code + 1;
            width = min_code_size as u32 + 1;
        }
        current = Some(pixel as u16);
    }
    if let Some(code) = current {
        writer.write_bits(code as u32, width);
    }
    writer.write_bits(end_code as u32, width);
    Ok(writer.finish())
}

struct LzwBits<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_buf: u32,
    bit_count: u32,
}

impl<'a> LzwBits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn read_bits(&mut self, width: u32) -> Option<u16> {
        while self.bit_count < width {
            let byte = *self.data.get(self.byte_pos)?;
            self.bit_buf |= (byte as u32) << self.bit_count;
            self.bit_count += 8;
            self.byte_pos += 1;
        }
        let value = (self.bit_buf & ((1 << width) - 1)) as u16;
        self.bit_buf >>= width;
        self.bit_count -= width;
        Some(value)
    }
}

struct LzwBitWriter {
    out: Vec<u8>,
    acc: u32,
    count: u32,
}

impl LzwBitWriter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            acc: 0,
            count: 0,
        }
    }

    fn write_bits(&mut self, value: u32, width: u32) {
        self.acc |= value << self.count;
        self.count += width;
        while self.count >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.count -= 8;
        }
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

    #[test]
    fn roundtrip_simple() {
        let pixels = b"aabbbccccdddddeeeee";
        let encoded = encode(pixels, 8).unwrap();
        assert_eq!(decode(&encoded, 8).unwrap(), pixels);
    }

    #[test]
    fn roundtrip_two_bit_palette() {
        let pixels: Vec<u8> = (0..200).map(|i| (i % 4) as u8).collect();
        let encoded = encode(&pixels, 2).unwrap();
        assert_eq!(decode(&encoded, 2).unwrap(), pixels);
    }

    #[test]
    fn roundtrip_fills_dictionary_past_reset() {
        // Non-repeating byte pairs force steady dictionary growth well
        // past 4096 entries, exercising the clear-code reset.
        let mut pixels = Vec::new();
        for i in 0..40_000u32 {
            pixels.push((i.wrapping_mul(2_654_435_761) >> 24) as u8);
        }
        let encoded = encode(&pixels, 8).unwrap();
        assert_eq!(decode(&encoded, 8).unwrap(), pixels);
    }

    #[test]
    fn decodes_kwkwk_pattern() {
        // The classic code-equal-to-next-code case: string + its own
        // first character.
        let pixels = b"abababab";
        let encoded = encode(pixels, 8).unwrap();
        assert_eq!(decode(&encoded, 8).unwrap(), pixels);
    }

    #[test]
    fn rejects_pixel_out_of_root_range() {
        assert!(encode(&[5], 2).is_err());
    }

    #[test]
    fn rejects_bad_code_size() {
        assert!(decode(&[0], 1).is_err());
        assert!(encode(&[0], 9).is_err());
    }

    #[test]
    fn stops_at_end_code() {
        let pixels = b"xyz";
        let mut encoded = encode(pixels, 8).unwrap();
        // Trailing garbage after end-of-information is ignored.
        encoded.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert_eq!(decode(&encoded, 8).unwrap(), pixels);
    }
}
