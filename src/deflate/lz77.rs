//! LZ77 match finding over a 32 KiB sliding window.
//!
//! Hash chains index 4-byte prefixes; lazy evaluation defers a match by
//! one byte when the next position would match longer.

use crate::deflate::inflate::MAX_DISTANCE;

pub const MIN_MATCH: usize = 3;
pub const MAX_MATCH: usize = 258;

const HASH_SIZE: usize = 1 << 15;
/// Matches at least this long are taken without lazy evaluation.
const GOOD_MATCH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Match { length: u16, distance: u16 },
}

#[inline]
fn hash4(data: &[u8], pos: usize) -> usize {
    if pos + 4 > data.len() {
        return 0;
    }
    let v = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
    (v.wrapping_mul(0x1E35_A7BD) >> 17) as usize & (HASH_SIZE - 1)
}

pub struct MatchFinder {
    head: Vec<i32>,
    prev: Vec<i32>,
    max_chain: usize,
    lazy: bool,
}

impl MatchFinder {
    /// `effort` 1..=9 trades chain depth (and lazy matching) for speed.
    pub fn new(effort: u8) -> Self {
        let effort = effort.clamp(1, 9);
        let max_chain = 1usize << effort.min(8);
        Self {
            head: vec![-1; HASH_SIZE],
            prev: vec![-1; MAX_DISTANCE],
            max_chain,
            lazy: effort >= 4,
        }
    }

    pub fn tokenize(&mut self, data: &[u8]) -> Vec<Token> {
        self.head.fill(-1);
        self.prev.fill(-1);
        let mut tokens = Vec::with_capacity(data.len() / 2 + 16);
        let mut pos = 0;
        while pos < data.len() {
            match self.longest_match(data, pos) {
                Some((length, distance)) => {
                    if self.lazy && length < GOOD_MATCH && pos + 1 < data.len() {
                        self.insert(data, pos);
                        if let Some((next_length, _)) = self.longest_match(data, pos + 1) {
                            if next_length > length + 1 {
                                tokens.push(Token::Literal(data[pos]));
                                pos += 1;
                                continue;
                            }
                        }
                        // Position already inserted; index the rest.
                        for i in 1..length {
                            self.insert(data, pos + i);
                        }
                    } else {
                        for i in 0..length {
                            self.insert(data, pos + i);
                        }
                    }
                    tokens.push(Token::Match {
                        length: length as u16,
                        distance: distance as u16,
                    });
                    pos += length;
                }
                None => {
                    tokens.push(Token::Literal(data[pos]));
                    self.insert(data, pos);
                    pos += 1;
                }
            }
        }
        tokens
    }

    fn longest_match(&self, data: &[u8], pos: usize) -> Option<(usize, usize)> {
        if pos + MIN_MATCH > data.len() {
            return None;
        }
        let hash = hash4(data, pos);
        let mut candidate = self.head[hash];
        let mut best_length = MIN_MATCH - 1;
        let mut best_distance = 0;
        let mut chain = 0;

        while candidate >= 0 && chain < self.max_chain {
            let match_pos = candidate as usize;
            let distance = pos - match_pos;
            if distance > MAX_DISTANCE {
                break;
            }
            // A longer match must agree at the current best end.
            if pos + best_length < data.len()
                && match_pos + best_length < data.len()
                && data[match_pos + best_length] == data[pos + best_length]
            {
                let length = match_run(data, match_pos, pos);
                if length > best_length {
                    best_length = length;
                    best_distance = distance;
                    if length >= MAX_MATCH {
                        break;
                    }
                }
            }
            candidate = self.prev[match_pos % MAX_DISTANCE];
            chain += 1;
        }

        (best_length >= MIN_MATCH).then_some((best_length, best_distance))
    }

    #[inline]
    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + 4 > data.len() {
            return;
        }
        let hash = hash4(data, pos);
        self.prev[pos % MAX_DISTANCE] = self.head[hash];
        self.head[hash] = pos as i32;
    }
}

#[inline]
fn match_run(data: &[u8], mut a: usize, b: usize) -> usize {
    let limit = (data.len() - b).min(MAX_MATCH);
    let mut length = 0;
    let mut c = b;
    while length < limit && data[a] == data[c] {
        a += 1;
        c += 1;
        length += 1;
    }
    length
}
