//! Adler-32 (RFC 1950) and CRC-32 (IEEE, as used by PNG) checksums.

const ADLER_MOD: u32 = 65521;
/// Largest n with 255*n*(n+1)/2 + (n+1)*(65520) < 2^32, per zlib.
const ADLER_NMAX: usize = 5552;

/// Adler-32 over `data`, seeded with the standard initial value 1.
pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for chunk in data.chunks(ADLER_NMAX) {
        for &byte in chunk {
            a += byte as u32;
            b += a;
        }
        a %= ADLER_MOD;
        b %= ADLER_MOD;
    }
    (b << 16) | a
}

const CRC_POLY: u32 = 0xEDB8_8320;

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { CRC_POLY ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

/// CRC-32 of `data` in one shot.
pub fn crc32(data: &[u8]) -> u32 {
    update_crc32(0xFFFF_FFFF, data) ^ 0xFFFF_FFFF
}

/// Running CRC-32: feed the pre-inverted state through successive chunks,
/// then xor with all-ones at the end.
pub fn update_crc32(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adler32_known_vectors() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"hello"), 0x062C_0215);
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn adler32_large_input_stays_reduced() {
        let data = vec![0xFFu8; 100_000];
        let v = adler32(&data);
        assert!((v & 0xFFFF) < ADLER_MOD);
        assert!((v >> 16) < ADLER_MOD);
    }

    #[test]
    fn crc32_known_vectors() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        // The CRC PNG stores for an empty IEND chunk.
        assert_eq!(crc32(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn crc32_incremental_matches_oneshot() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut crc = 0xFFFF_FFFF;
        for chunk in data.chunks(7) {
            crc = update_crc32(crc, chunk);
        }
        assert_eq!(crc ^ 0xFFFF_FFFF, crc32(data));
    }
}
