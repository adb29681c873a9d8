//! Huffman entropy decoding primitives for sequential and progressive
//! scans.
//!
//! Each function decodes one 8x8 block's worth of one scan's contribution.
//! The MCU loop, restart handling and coefficient storage live in the
//! container decoder; these routines only touch the bit reader and the
//! coefficient block. Progressive AC scans communicate the pending
//! end-of-band run through `eobrun`, which must be reset at scan starts
//! and restart markers along with the DC predictors.

use crate::error::{CodecError, Result};
use crate::jpeg::bit_reader::BitReader;
use crate::jpeg::dct::NATURAL_ORDER;
use crate::jpeg::huffman::HuffmanTable;

/// Which decoding state machine a scan header selects. Chosen once per
/// scan, never per MCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Baseline,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

impl ScanKind {
    pub fn classify(progressive: bool, ss: u8, se: u8, ah: u8) -> Result<Self> {
        if !progressive {
            if ss != 0 || se != 63 {
                return Err(CodecError::InvalidImage("bad spectral selection in sequential scan"));
            }
            return Ok(ScanKind::Baseline);
        }
        if ss == 0 {
            if se != 0 {
                return Err(CodecError::InvalidImage("dc scan with nonzero Se"));
            }
            Ok(if ah == 0 { ScanKind::DcFirst } else { ScanKind::DcRefine })
        } else {
            if se < ss || se > 63 {
                return Err(CodecError::InvalidImage("bad ac spectral band"));
            }
            Ok(if ah == 0 { ScanKind::AcFirst } else { ScanKind::AcRefine })
        }
    }
}

/// Sign-extend `value` read as an `s`-bit magnitude (F.2.2.1).
#[inline]
pub fn extend(value: u32, s: u32) -> i32 {
    if s == 0 {
        return 0;
    }
    let v = value as i32;
    if v < (1 << (s - 1)) {
        v - (1 << s) + 1
    } else {
        v
    }
}

/// Decode a full baseline block into natural order.
pub fn decode_block_baseline(
    reader: &mut BitReader<'_>,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    dc_pred: &mut i32,
    coef: &mut [i32; 64],
) -> Result<()> {
    coef.fill(0);

    let s = dc_table.decode(reader)? as u32;
    let diff = extend(reader.get_bits(s), s);
    *dc_pred += diff;
    coef[0] = *dc_pred;

    let mut k = 1usize;
    while k < 64 {
        let rs = ac_table.decode(reader)?;
        let r = (rs >> 4) as usize;
        let s = (rs & 0x0F) as u32;
        if s != 0 {
            k += r;
            if k > 63 {
                return Err(CodecError::InvalidImage("ac run overruns block"));
            }
            coef[NATURAL_ORDER[k]] = extend(reader.get_bits(s), s);
            k += 1;
        } else if r == 15 {
            k += 16; // ZRL
        } else {
            break; // EOB
        }
    }
    Ok(())
}

/// Progressive DC, first pass: decoded difference scaled by the point
/// transform.
pub fn decode_dc_first(
    reader: &mut BitReader<'_>,
    dc_table: &HuffmanTable,
    dc_pred: &mut i32,
    al: u8,
    coef: &mut [i32; 64],
) -> Result<()> {
    let s = dc_table.decode(reader)? as u32;
    let diff = extend(reader.get_bits(s), s);
    *dc_pred += diff;
    coef[0] = *dc_pred << al;
    Ok(())
}

/// Progressive DC, refinement pass: one correction bit per block.
pub fn decode_dc_refine(reader: &mut BitReader<'_>, al: u8, coef: &mut [i32; 64]) {
    if reader.get_bit() != 0 {
        coef[0] |= 1 << al;
    }
}

/// Progressive AC, first pass for the band `ss..=se`, with EOB-run coding.
pub fn decode_ac_first(
    reader: &mut BitReader<'_>,
    ac_table: &HuffmanTable,
    coef: &mut [i32; 64],
    ss: u8,
    se: u8,
    al: u8,
    eobrun: &mut u32,
) -> Result<()> {
    if *eobrun > 0 {
        *eobrun -= 1;
        return Ok(());
    }
    let mut k = ss as usize;
    while k <= se as usize {
        let rs = ac_table.decode(reader)?;
        let r = (rs >> 4) as usize;
        let s = (rs & 0x0F) as u32;
        if s != 0 {
            k += r;
            if k > se as usize {
                return Err(CodecError::InvalidImage("ac run overruns band"));
            }
            coef[NATURAL_ORDER[k]] = extend(reader.get_bits(s), s) << al;
            k += 1;
        } else if r == 15 {
            k += 16;
        } else {
            // EOB run: 2^r base plus r extra bits, covering this block.
            *eobrun = (1 << r) - 1;
            if r > 0 {
                *eobrun += reader.get_bits(r as u32);
            }
            break;
        }
    }
    Ok(())
}

/// Progressive AC refinement: appends one bit of precision to the band.
///
/// Newly-nonzero coefficients arrive with a sign bit; already-nonzero ones
/// get a correction bit. Input is fully buffered, so the suspend-and-
/// rollback path of streaming decoders does not exist here.
pub fn decode_ac_refine(
    reader: &mut BitReader<'_>,
    ac_table: &HuffmanTable,
    coef: &mut [i32; 64],
    ss: u8,
    se: u8,
    al: u8,
    eobrun: &mut u32,
) -> Result<()> {
    let p1: i32 = 1 << al;
    let m1: i32 = -1 << al;
    let se = se as usize;
    let mut k = ss as usize;

    if *eobrun == 0 {
        while k <= se {
            let rs = ac_table.decode(reader)?;
            let mut r = (rs >> 4) as usize;
            let s = (rs & 0x0F) as u32;
            let mut new_value = 0i32;
            if s != 0 {
                if s != 1 {
                    return Err(CodecError::InvalidImage("bad refinement magnitude"));
                }
                new_value = if reader.get_bit() != 0 { p1 } else { m1 };
            } else if r != 15 {
                *eobrun = 1 << r;
                if r > 0 {
                    *eobrun += reader.get_bits(r as u32);
                }
                break;
            }
            // Advance past `r` zero-history coefficients, emitting
            // correction bits for nonzero ones along the way.
            while k <= se {
                let pos = NATURAL_ORDER[k];
                if coef[pos] != 0 {
                    if reader.get_bit() != 0 && (coef[pos] & p1) == 0 {
                        coef[pos] += if coef[pos] >= 0 { p1 } else { m1 };
                    }
                } else {
                    if r == 0 {
                        break;
                    }
                    r -= 1;
                }
                k += 1;
            }
            if new_value != 0 && k <= se {
                coef[NATURAL_ORDER[k]] = new_value;
            }
            k += 1;
        }
    }

    if *eobrun > 0 {
        // Remainder of the band still carries correction bits.
        while k <= se {
            let pos = NATURAL_ORDER[k];
            if coef[pos] != 0 && reader.get_bit() != 0 && (coef[pos] & p1) == 0 {
                coef[pos] += if coef[pos] >= 0 { p1 } else { m1 };
            }
            k += 1;
        }
        *eobrun -= 1;
    }
    Ok(())
}
