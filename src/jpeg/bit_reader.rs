//! Entropy-coded segment bit reader.
//!
//! Accumulates bytes MSB-first into a register. A stuffed `FF 00` pair
//! decodes as a literal 0xFF data byte; any other `FF xx` stops the
//! reader at the marker so the scan decoder can resynchronize. When the
//! segment runs dry mid-symbol the reader pads with zero bits and raises
//! the `insufficient` flag instead of failing, so truncated scans decode
//! to neutral output.

pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    bit_buffer: u32,
    bit_count: u32,
    pending_marker: Option<u8>,
    insufficient: bool,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            bit_buffer: 0,
            bit_count: 0,
            pending_marker: None,
            insufficient: false,
        }
    }

    /// Marker byte the reader stopped at, if any.
    pub fn pending_marker(&self) -> Option<u8> {
        self.pending_marker
    }

    /// True once any read had to be satisfied with zero padding.
    pub fn ran_dry(&self) -> bool {
        self.insufficient
    }

    /// Byte offset of the next unconsumed byte in the segment.
    pub fn byte_position(&self) -> usize {
        self.position
    }

    fn next_data_byte(&mut self) -> Option<u8> {
        if self.pending_marker.is_some() {
            return None;
        }
        let byte = *self.data.get(self.position)?;
        if byte != 0xFF {
            self.position += 1;
            return Some(byte);
        }
        // Skip fill bytes, then classify what follows the 0xFF run.
        let mut look = self.position + 1;
        while self.data.get(look) == Some(&0xFF) {
            look += 1;
        }
        match self.data.get(look) {
            Some(0x00) => {
                // Byte stuffing: a literal 0xFF data byte.
                self.position = look + 1;
                Some(0xFF)
            }
            Some(&marker) => {
                // Leave the cursor on the 0xFF so the container parser can
                // re-read the full marker.
                self.pending_marker = Some(marker);
                None
            }
            None => None,
        }
    }

    /// Ensure at least `n` bits are buffered, zero-padding at end of data.
    fn fill(&mut self, n: u32) {
        debug_assert!(n <= 25);
        while self.bit_count < n {
            match self.next_data_byte() {
                Some(byte) => {
                    self.bit_buffer = (self.bit_buffer << 8) | byte as u32;
                    self.bit_count += 8;
                }
                None => {
                    self.bit_buffer <<= 8;
                    self.bit_count += 8;
                    // Stopping at a marker is expected; only a true end of
                    // data counts as running dry.
                    if self.pending_marker.is_none() {
                        self.insufficient = true;
                    }
                }
            }
        }
    }

    /// Read `n` bits MSB-first.
    pub fn get_bits(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        self.fill(n);
        let shift = self.bit_count - n;
        let value = (self.bit_buffer >> shift) & ((1 << n) - 1);
        self.bit_count = shift;
        value
    }

    /// Read a single bit.
    pub fn get_bit(&mut self) -> u32 {
        self.get_bits(1)
    }

    /// Look at the next `n` bits without consuming them.
    pub fn peek_bits(&mut self, n: u32) -> u32 {
        self.fill(n);
        (self.bit_buffer >> (self.bit_count - n)) & ((1 << n) - 1)
    }

    pub fn drop_bits(&mut self, n: u32) {
        debug_assert!(n <= self.bit_count);
        self.bit_count -= n;
    }

    /// Discard buffered bits down to the byte boundary. Padding bits that
    /// were synthesized at end of data are discarded too.
    pub fn align(&mut self) {
        self.bit_buffer = 0;
        self.bit_count = 0;
    }

    /// Consume a pending marker, returning its code byte. The cursor
    /// advances past the `FF xx` pair.
    pub fn take_marker(&mut self) -> Option<u8> {
        let marker = self.pending_marker.take()?;
        while self.data.get(self.position) == Some(&0xFF) {
            self.position += 1;
        }
        self.position += 1; // the marker code byte itself
        self.align();
        Some(marker)
    }

    /// Scan forward for the next `FF xx` (xx not 0x00/0xFF) without regard
    /// to entropy-coded content. Used for restart resynchronization after
    /// corrupt data.
    pub fn seek_next_marker(&mut self) -> Option<u8> {
        self.align();
        self.pending_marker = None;
        while self.position + 1 < self.data.len() {
            if self.data[self.position] == 0xFF {
                let next = self.data[self.position + 1];
                if next != 0x00 && next != 0xFF {
                    self.pending_marker = Some(next);
                    return Some(next);
                }
            }
            self.position += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_first_extraction() {
        let mut r = BitReader::new(&[0b1011_0010, 0b0100_0001]);
        assert_eq!(r.get_bits(3), 0b101);
        assert_eq!(r.get_bits(5), 0b10010);
        assert_eq!(r.get_bits(8), 0b0100_0001);
        assert!(!r.ran_dry());
    }

    #[test]
    fn stuffed_ff_reads_as_literal() {
        let mut r = BitReader::new(&[0xFF, 0x00, 0x80]);
        assert_eq!(r.get_bits(8), 0xFF);
        assert_eq!(r.get_bits(8), 0x80);
    }

    #[test]
    fn marker_stops_reader_and_pads() {
        let mut r = BitReader::new(&[0xAB, 0xFF, 0xD9]);
        assert_eq!(r.get_bits(8), 0xAB);
        assert_eq!(r.get_bits(4), 0);
        assert!(!r.ran_dry());
        assert_eq!(r.pending_marker(), Some(0xD9));
        assert_eq!(r.take_marker(), Some(0xD9));
    }

    #[test]
    fn end_of_data_pads_and_flags() {
        let mut r = BitReader::new(&[0xAA]);
        assert_eq!(r.get_bits(8), 0xAA);
        assert_eq!(r.get_bits(4), 0);
        assert!(r.ran_dry());
        assert_eq!(r.pending_marker(), None);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut r = BitReader::new(&[0b1100_0000]);
        assert_eq!(r.peek_bits(2), 0b11);
        assert_eq!(r.peek_bits(2), 0b11);
        assert_eq!(r.get_bits(2), 0b11);
        assert_eq!(r.get_bits(2), 0b00);
    }
}
