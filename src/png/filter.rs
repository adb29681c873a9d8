//! PNG scanline filters (spec section 9): None, Sub, Up, Average, Paeth.
//!
//! Filters operate byte-wise with a pixel offset of `bpp` bytes; for
//! depths below eight bits the offset is a single byte.

use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl FilterType {
    pub fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => FilterType::None,
            1 => FilterType::Sub,
            2 => FilterType::Up,
            3 => FilterType::Average,
            4 => FilterType::Paeth,
            _ => return Err(CodecError::InvalidImage("unknown png filter type")),
        })
    }
}

#[inline]
pub fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (a as i16, b as i16, c as i16);
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Reverse a filter in place. `prev` is the reconstructed prior scanline,
/// empty for the first row.
pub fn unfilter_row(filter: FilterType, row: &mut [u8], prev: &[u8], bpp: usize) {
    match filter {
        FilterType::None => {}
        FilterType::Sub => {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        FilterType::Up => {
            if !prev.is_empty() {
                for i in 0..row.len() {
                    row[i] = row[i].wrapping_add(prev[i]);
                }
            }
        }
        FilterType::Average => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 } as u16;
                let up = prev.get(i).copied().unwrap_or(0) as u16;
                row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
            }
        }
        FilterType::Paeth => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let up = prev.get(i).copied().unwrap_or(0);
                let up_left = if i >= bpp {
                    prev.get(i - bpp).copied().unwrap_or(0)
                } else {
                    0
                };
                row[i] = row[i].wrapping_add(paeth_predictor(left, up, up_left));
            }
        }
    }
}

/// Apply a filter, writing the filtered bytes into `out`.
pub fn filter_row(filter: FilterType, row: &[u8], prev: &[u8], bpp: usize, out: &mut Vec<u8>) {
    match filter {
        FilterType::None => out.extend_from_slice(row),
        FilterType::Sub => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                out.push(row[i].wrapping_sub(left));
            }
        }
        FilterType::Up => {
            for i in 0..row.len() {
                let up = prev.get(i).copied().unwrap_or(0);
                out.push(row[i].wrapping_sub(up));
            }
        }
        FilterType::Average => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 } as u16;
                let up = prev.get(i).copied().unwrap_or(0) as u16;
                out.push(row[i].wrapping_sub(((left + up) / 2) as u8));
            }
        }
        FilterType::Paeth => {
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let up = prev.get(i).copied().unwrap_or(0);
                let up_left = if i >= bpp {
                    prev.get(i - bpp).copied().unwrap_or(0)
                } else {
                    0
                };
                out.push(row[i].wrapping_sub(paeth_predictor(left, up, up_left)));
            }
        }
    }
}

/// Pick the filter minimizing the sum of absolute filtered values, the
/// heuristic the PNG spec suggests for adaptive filtering.
pub fn choose_filter(row: &[u8], prev: &[u8], bpp: usize) -> FilterType {
    let candidates = [
        FilterType::None,
        FilterType::Sub,
        FilterType::Up,
        FilterType::Average,
        FilterType::Paeth,
    ];
    let mut best = FilterType::None;
    let mut best_score = u64::MAX;
    let mut scratch = Vec::with_capacity(row.len());
    for candidate in candidates {
        scratch.clear();
        filter_row(candidate, row, prev, bpp, &mut scratch);
        let score: u64 = scratch.iter().map(|&b| (b as i8).unsigned_abs() as u64).sum();
        if score < best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paeth_prefers_closest_neighbor() {
        assert_eq!(paeth_predictor(10, 20, 30), 10);
        assert_eq!(paeth_predictor(100, 101, 100), 101);
        assert_eq!(paeth_predictor(0, 0, 0), 0);
    }

    #[test]
    fn all_filters_invert() {
        let prev: Vec<u8> = (0..30).map(|i| (i * 7) as u8).collect();
        let row: Vec<u8> = (0..30).map(|i| (255 - i * 3) as u8).collect();
        for filter in [
            FilterType::None,
            FilterType::Sub,
            FilterType::Up,
            FilterType::Average,
            FilterType::Paeth,
        ] {
            for bpp in [1usize, 3, 4] {
                let mut filtered = Vec::new();
                filter_row(filter, &row, &prev, bpp, &mut filtered);
                unfilter_row(filter, &mut filtered, &prev, bpp);
                assert_eq!(filtered, row, "{filter:?} bpp={bpp}");
            }
        }
    }

    #[test]
    fn first_row_has_no_up_neighbors() {
        let row: Vec<u8> = vec![5, 10, 15, 20];
        for filter in [FilterType::Up, FilterType::Average, FilterType::Paeth] {
            let mut filtered = Vec::new();
            filter_row(filter, &row, &[], 1, &mut filtered);
            unfilter_row(filter, &mut filtered, &[], 1);
            assert_eq!(filtered, row);
        }
    }

    #[test]
    fn flat_row_prefers_cheap_filter() {
        let row = vec![42u8; 64];
        let prev = vec![42u8; 64];
        let chosen = choose_filter(&row, &prev, 3);
        // Any filter but None zeroes this row out.
        assert_ne!(chosen, FilterType::None);
    }

    #[test]
    fn rejects_unknown_filter_byte() {
        assert!(FilterType::from_byte(5).is_err());
        assert_eq!(FilterType::from_byte(4).unwrap(), FilterType::Paeth);
    }
}
