//! PackBits byte-oriented run-length coding (TIFF compression 32773).

use crate::error::{CodecError, Result};

/// Decode until `expected` output bytes are produced. A -128 control
/// byte is a no-op.
pub fn decode(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0usize;
    while out.len() < expected {
        let control = *data
            .get(pos)
            .ok_or(CodecError::InvalidImage("truncated packbits data"))? as i8;
        pos += 1;
        if control >= 0 {
            let count = control as usize + 1;
            let literal = data
                .get(pos..pos + count)
                .ok_or(CodecError::InvalidImage("truncated packbits literal"))?;
            out.extend_from_slice(literal);
            pos += count;
        } else if control != -128 {
            let count = (1 - control as isize) as usize;
            let value = *data
                .get(pos)
                .ok_or(CodecError::InvalidImage("truncated packbits run"))?;
            pos += 1;
            out.resize(out.len() + count, value);
        }
    }
    if out.len() > expected {
        out.truncate(expected);
    }
    Ok(out)
}

/// Encode one buffer (TIFF compresses each row separately). Runs of
/// three or more identical bytes become repeat packets.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let run = run_length(&data[pos..]);
        if run >= 3 {
            let run = run.min(128);
            out.push((1isize - run as isize) as u8);
            out.push(data[pos]);
            pos += run;
            continue;
        }
        // Literal packet: extend until a 3-byte run starts or 128 bytes.
        let start = pos;
        pos += run;
        while pos < data.len() && pos - start < 128 {
            let next = run_length(&data[pos..]);
            if next >= 3 {
                break;
            }
            pos += next;
        }
        let len = (pos - start).min(128);
        out.push(len as u8 - 1);
        out.extend_from_slice(&data[start..start + len]);
        pos = start + len;
    }
    out
}

fn run_length(data: &[u8]) -> usize {
    let first = data[0];
    data.iter().take_while(|&&b| b == first).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_apple_example() {
        // The worked example from the PackBits specification.
        let packed = [
            0xFEu8, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected = [
            0xAAu8, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(decode(&packed, expected.len()).unwrap(), expected);
    }

    #[test]
    fn roundtrips() {
        let cases: [&[u8]; 5] = [
            b"",
            b"a",
            b"aaaaaaa",
            b"abcabcabc",
            b"aaabbbcdddddefffffffffffg",
        ];
        for case in cases {
            let packed = encode(case);
            assert_eq!(decode(&packed, case.len()).unwrap(), case, "{case:?}");
        }
    }

    #[test]
    fn roundtrips_long_run() {
        let data = vec![7u8; 300];
        let packed = encode(&data);
        assert_eq!(decode(&packed, 300).unwrap(), data);
        assert!(packed.len() <= 8);
    }

    #[test]
    fn noop_control_is_skipped() {
        assert_eq!(decode(&[0x80, 0x00, 0x41], 1).unwrap(), b"A");
    }

    #[test]
    fn truncated_input_fails() {
        assert!(decode(&[0x02, 0x41], 3).is_err());
        assert!(decode(&[0xFE], 3).is_err());
    }
}
