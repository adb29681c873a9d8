//! Marker-driven JPEG decoder: baseline and extended sequential (SOF0,
//! SOF1) and progressive (SOF2) frames with Huffman entropy coding.
//!
//! The container loop walks marker segments with a [`ByteReader`]; each
//! SOS hands the remaining bytes to a [`BitReader`] for entropy decoding
//! and resumes marker parsing where the scan stopped. Baseline scans
//! dequantize and inverse-transform each block as it is decoded;
//! progressive scans accumulate coefficients per component and render
//! after every completed scan so listeners can display the refinement.

use crate::error::{CodecError, Result};
use crate::image_data::{DecodeListener, ImageData, LoaderEvent, NullListener, PaletteData, Rgb};
use crate::jpeg::bit_reader::BitReader;
use crate::jpeg::color::{upsample, SamplePlane, YcbcrToRgb};
use crate::jpeg::dct::{dequantize_block, idct_block, NATURAL_ORDER};
use crate::jpeg::entropy::{
    decode_ac_first, decode_ac_refine, decode_block_baseline, decode_dc_first, decode_dc_refine,
    ScanKind,
};
use crate::jpeg::huffman::HuffmanTable;
use crate::jpeg::marker::{MarkerCode, MARKER_PREFIX, RESTART_BASE, RESTART_MODULO};
use crate::stream::ByteReader;

const MAX_SAMPLING: usize = 4;
/// B.2.2: an interleaved MCU may hold at most ten blocks.
const MAX_BLOCKS_PER_MCU: usize = 10;

struct Component {
    id: u8,
    h: usize,
    v: usize,
    quant_sel: usize,
    /// Sample dimensions at this component's own resolution.
    width: usize,
    height: usize,
    /// Block grid padded out to whole MCUs.
    blocks_w: usize,
    blocks_h: usize,
    plane: SamplePlane,
    /// Flat coefficient store, progressive frames only.
    coef: Option<Vec<i32>>,
    dc_pred: i32,
}

impl Component {
    fn store_block(&mut self, bx: usize, by: usize, samples: &[u8; 64]) {
        let stride = self.plane.width;
        for row in 0..8 {
            let dst = (by * 8 + row) * stride + bx * 8;
            self.plane.data[dst..dst + 8].copy_from_slice(&samples[row * 8..row * 8 + 8]);
        }
    }

    fn coef_block_mut(&mut self, bx: usize, by: usize) -> &mut [i32] {
        let offset = (by * self.blocks_w + bx) * 64;
        let len = self.blocks_w * self.blocks_h * 64;
        let coef = self.coef.get_or_insert_with(|| vec![0; len]);
        &mut coef[offset..offset + 64]
    }
}

struct FrameInfo {
    progressive: bool,
    width: usize,
    height: usize,
    hmax: usize,
    vmax: usize,
    mcus_x: usize,
    mcus_y: usize,
    components: Vec<Component>,
}

struct ScanComponent {
    comp_idx: usize,
    dc_sel: usize,
    ac_sel: usize,
}

struct ScanHeader {
    components: Vec<ScanComponent>,
    ss: u8,
    se: u8,
    al: u8,
    kind: ScanKind,
}

/// Adobe APP14 color transform values.
const ADOBE_TRANSFORM_RGB: u8 = 0;

pub struct JpegDecoder {
    quant_tables: [Option<[u16; 64]>; 4],
    dc_tables: [Option<HuffmanTable>; 4],
    ac_tables: [Option<HuffmanTable>; 4],
    restart_interval: u32,
    adobe_transform: Option<u8>,
    warnings: Vec<String>,
}

impl JpegDecoder {
    pub fn new() -> Self {
        Self {
            quant_tables: [None, None, None, None],
            dc_tables: [None, None, None, None],
            ac_tables: [None, None, None, None],
            restart_interval: 0,
            adobe_transform: None,
            warnings: Vec::new(),
        }
    }

    /// Non-fatal anomalies noticed while decoding.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn decode(&mut self, data: &[u8]) -> Result<ImageData> {
        self.decode_with_listener(data, &mut NullListener)
    }

    pub fn decode_with_listener(
        &mut self,
        data: &[u8],
        listener: &mut dyn DecodeListener,
    ) -> Result<ImageData> {
        let mut reader = ByteReader::new(data);
        if reader.read_u8()? != MARKER_PREFIX
            || reader.read_u8()? != MarkerCode::StartOfImage as u8
        {
            return Err(CodecError::InvalidImage("missing jpeg signature"));
        }

        let mut frame: Option<FrameInfo> = None;
        let mut scan_index = 0usize;
        let mut saw_scan = false;

        loop {
            let code = match self.next_marker(&mut reader) {
                Ok(code) => code,
                Err(_) if saw_scan => {
                    self.warnings.push("missing end-of-image marker".into());
                    break;
                }
                Err(e) => return Err(e),
            };

            if code == 0x01 {
                // TEM is standalone, no length field.
                continue;
            }

            let marker = match MarkerCode::try_from(code) {
                Ok(marker) => marker,
                Err(_) => {
                    // Unknown but parameterized segment; skip by length.
                    self.skip_segment(&mut reader)?;
                    continue;
                }
            };

            if marker.is_frame() && !marker.is_supported_frame() {
                return Err(CodecError::NotImplemented(
                    "lossless, differential or arithmetic-coded frame",
                ));
            }

            match marker {
                MarkerCode::StartOfFrameBaseline
                | MarkerCode::StartOfFrameExtended
                | MarkerCode::StartOfFrameProgressive => {
                    if frame.is_some() {
                        return Err(CodecError::InvalidImage("multiple frame headers"));
                    }
                    let progressive = marker == MarkerCode::StartOfFrameProgressive;
                    frame = Some(self.parse_frame(&mut reader, progressive)?);
                }
                MarkerCode::DefineQuantizationTable => self.parse_dqt(&mut reader)?,
                MarkerCode::DefineHuffmanTable => self.parse_dht(&mut reader)?,
                MarkerCode::DefineRestartInterval => {
                    let len = reader.read_u16_be()? as usize;
                    if len != 4 {
                        return Err(CodecError::InvalidImage("bad DRI length"));
                    }
                    self.restart_interval = reader.read_u16_be()? as u32;
                }
                MarkerCode::StartOfScan => {
                    let frame = frame
                        .as_mut()
                        .ok_or(CodecError::InvalidImage("scan before frame header"))?;
                    let scan = self.parse_scan_header(&mut reader, frame)?;
                    let mut bits = BitReader::new(reader.remaining());
                    self.decode_scan(&mut bits, frame, &scan)?;
                    if bits.ran_dry() {
                        self.warnings.push("truncated entropy-coded segment".into());
                    }
                    reader.skip(bits.byte_position())?;
                    saw_scan = true;
                    if frame.progressive {
                        let image = self.render(frame)?;
                        listener.image_progress(LoaderEvent {
                            image: &image,
                            pass: scan_index,
                            is_final: false,
                        });
                    }
                    scan_index += 1;
                }
                MarkerCode::DefineNumberOfLines => {
                    // Height was known up front (zero heights are rejected
                    // at SOF), so the segment is informational.
                    self.skip_segment(&mut reader)?;
                }
                MarkerCode::ApplicationData0 => self.parse_app0(&mut reader)?,
                MarkerCode::ApplicationData14 => self.parse_app14(&mut reader)?,
                MarkerCode::EndOfImage => break,
                MarkerCode::StartOfImage => {
                    return Err(CodecError::InvalidImage("nested start-of-image"));
                }
                m if m.is_restart() => {
                    // Stray restart outside a scan; ignore.
                }
                _ => self.skip_segment(&mut reader)?,
            }
        }

        let frame = frame.ok_or(CodecError::InvalidImage("no frame header"))?;
        if !saw_scan {
            return Err(CodecError::InvalidImage("no scan data"));
        }
        let image = self.render(&frame)?;
        listener.image_progress(LoaderEvent {
            image: &image,
            pass: scan_index,
            is_final: true,
        });
        Ok(image)
    }

    /// Advance to the next marker code, tolerating pad 0xFF bytes and
    /// (with a warning) stray garbage between segments.
    fn next_marker(&mut self, reader: &mut ByteReader<'_>) -> Result<u8> {
        let mut skipped = 0usize;
        loop {
            let byte = reader.read_u8()?;
            if byte != MARKER_PREFIX {
                skipped += 1;
                continue;
            }
            let mut code = reader.read_u8()?;
            while code == MARKER_PREFIX {
                code = reader.read_u8()?;
            }
            if code == 0x00 {
                // Stuffed byte outside entropy data; keep scanning.
                skipped += 2;
                continue;
            }
            if skipped > 0 {
                self.warnings
                    .push(format!("skipped {skipped} stray bytes before marker"));
            }
            return Ok(code);
        }
    }

    fn skip_segment(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        let len = reader.read_u16_be()? as usize;
        if len < 2 {
            return Err(CodecError::InvalidImage("bad segment length"));
        }
        reader.skip(len - 2)
    }

    fn parse_frame(&mut self, reader: &mut ByteReader<'_>, progressive: bool) -> Result<FrameInfo> {
        let len = reader.read_u16_be()? as usize;
        let precision = reader.read_u8()?;
        if precision != 8 {
            return Err(CodecError::UnsupportedDepth(precision as u16));
        }
        let height = reader.read_u16_be()? as usize;
        let width = reader.read_u16_be()? as usize;
        let nf = reader.read_u8()? as usize;
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidImage("zero frame dimensions"));
        }
        if len != 8 + 3 * nf {
            return Err(CodecError::InvalidImage("bad frame header length"));
        }
        match nf {
            1 | 3 => {}
            4 => return Err(CodecError::NotImplemented("four-component color")),
            _ => return Err(CodecError::InvalidImage("bad component count")),
        }

        let mut raw = Vec::with_capacity(nf);
        for _ in 0..nf {
            let id = reader.read_u8()?;
            let hv = reader.read_u8()?;
            let tq = reader.read_u8()? as usize;
            let (h, v) = ((hv >> 4) as usize, (hv & 0x0F) as usize);
            if !(1..=MAX_SAMPLING).contains(&h) || !(1..=MAX_SAMPLING).contains(&v) {
                return Err(CodecError::InvalidImage("bad sampling factors"));
            }
            if tq > 3 {
                return Err(CodecError::InvalidImage("bad quantization table id"));
            }
            if raw.iter().any(|&(other, _, _, _)| other == id) {
                return Err(CodecError::InvalidImage("duplicate component id"));
            }
            raw.push((id, h, v, tq));
        }

        // A single-component frame is never interleaved; its declared
        // sampling factors do not affect the block layout.
        if nf == 1 {
            let (id, _, _, tq) = raw[0];
            raw = vec![(id, 1, 1, tq)];
        }
        let hmax = raw.iter().map(|&(_, h, _, _)| h).max().unwrap_or(1);
        let vmax = raw.iter().map(|&(_, _, v, _)| v).max().unwrap_or(1);
        if nf > 1 {
            let blocks: usize = raw.iter().map(|&(_, h, v, _)| h * v).sum();
            if blocks > MAX_BLOCKS_PER_MCU {
                return Err(CodecError::InvalidImage("mcu exceeds ten blocks"));
            }
        }
        let mcus_x = width.div_ceil(8 * hmax);
        let mcus_y = height.div_ceil(8 * vmax);

        let components = raw
            .into_iter()
            .map(|(id, h, v, quant_sel)| {
                let comp_w = (width * h).div_ceil(hmax);
                let comp_h = (height * v).div_ceil(vmax);
                let blocks_w = mcus_x * h;
                let blocks_h = mcus_y * v;
                let mut plane = SamplePlane::new(blocks_w * 8, blocks_h * 8);
                plane.data.fill(128);
                Component {
                    id,
                    h,
                    v,
                    quant_sel,
                    width: comp_w,
                    height: comp_h,
                    blocks_w,
                    blocks_h,
                    plane,
                    coef: progressive.then(|| vec![0i32; blocks_w * blocks_h * 64]),
                    dc_pred: 0,
                }
            })
            .collect();

        Ok(FrameInfo {
            progressive,
            width,
            height,
            hmax,
            vmax,
            mcus_x,
            mcus_y,
            components,
        })
    }

    fn parse_dqt(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        let len = reader.read_u16_be()? as usize;
        if len < 2 {
            return Err(CodecError::InvalidImage("bad DQT length"));
        }
        let end = reader.position() + len - 2;
        while reader.position() < end {
            let pq_tq = reader.read_u8()?;
            let (pq, tq) = ((pq_tq >> 4) as usize, (pq_tq & 0x0F) as usize);
            if pq > 1 || tq > 3 {
                return Err(CodecError::InvalidImage("bad DQT precision or id"));
            }
            let mut table = [0u16; 64];
            for i in 0..64 {
                let value = if pq == 1 {
                    reader.read_u16_be()?
                } else {
                    reader.read_u8()? as u16
                };
                if value == 0 {
                    return Err(CodecError::InvalidImage("zero quantizer value"));
                }
                // Segments carry zigzag order; store natural order.
                table[NATURAL_ORDER[i]] = value;
            }
            self.quant_tables[tq] = Some(table);
        }
        Ok(())
    }

    fn parse_dht(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        let len = reader.read_u16_be()? as usize;
        if len < 2 {
            return Err(CodecError::InvalidImage("bad DHT length"));
        }
        let end = reader.position() + len - 2;
        while reader.position() < end {
            let tc_th = reader.read_u8()?;
            let (tc, th) = ((tc_th >> 4) as usize, (tc_th & 0x0F) as usize);
            if tc > 1 || th > 3 {
                return Err(CodecError::InvalidImage("bad DHT class or id"));
            }
            let mut lengths = [0u8; 16];
            lengths.copy_from_slice(reader.read_bytes(16)?);
            let total: usize = lengths.iter().map(|&c| c as usize).sum();
            let symbols = reader.read_bytes(total)?;
            let table = HuffmanTable::from_spec(&lengths, symbols, tc == 0)?;
            if tc == 0 {
                self.dc_tables[th] = Some(table);
            } else {
                self.ac_tables[th] = Some(table);
            }
        }
        Ok(())
    }

    fn parse_app0(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        let len = reader.read_u16_be()? as usize;
        if len < 2 {
            return Err(CodecError::InvalidImage("bad APP0 length"));
        }
        let payload = reader.read_bytes(len - 2)?;
        if payload.len() >= 7 && &payload[0..5] == b"JFIF\0" {
            let major = payload[5];
            if major != 1 {
                self.warnings
                    .push(format!("unexpected JFIF major version {major}"));
            }
        }
        Ok(())
    }

    fn parse_app14(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        let len = reader.read_u16_be()? as usize;
        if len < 2 {
            return Err(CodecError::InvalidImage("bad APP14 length"));
        }
        let payload = reader.read_bytes(len - 2)?;
        if payload.len() >= 12 && &payload[0..5] == b"Adobe" {
            self.adobe_transform = Some(payload[11]);
        }
        Ok(())
    }

    fn parse_scan_header(
        &mut self,
        reader: &mut ByteReader<'_>,
        frame: &FrameInfo,
    ) -> Result<ScanHeader> {
        let len = reader.read_u16_be()? as usize;
        let ns = reader.read_u8()? as usize;
        if ns == 0 || ns > frame.components.len() {
            return Err(CodecError::InvalidImage("bad scan component count"));
        }
        if len != 6 + 2 * ns {
            return Err(CodecError::InvalidImage("bad scan header length"));
        }

        let mut components = Vec::with_capacity(ns);
        for _ in 0..ns {
            let id = reader.read_u8()?;
            let tables = reader.read_u8()?;
            let comp_idx = frame
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or(CodecError::InvalidImage("scan names unknown component"))?;
            if components.iter().any(|sc: &ScanComponent| sc.comp_idx == comp_idx) {
                return Err(CodecError::InvalidImage("component repeated in scan"));
            }
            components.push(ScanComponent {
                comp_idx,
                dc_sel: (tables >> 4) as usize,
                ac_sel: (tables & 0x0F) as usize,
            });
        }

        let ss = reader.read_u8()?;
        let se = reader.read_u8()?;
        let ah_al = reader.read_u8()?;
        let (ah, al) = (ah_al >> 4, ah_al & 0x0F);
        let kind = ScanKind::classify(frame.progressive, ss, se, ah)?;

        if matches!(kind, ScanKind::AcFirst | ScanKind::AcRefine) && ns != 1 {
            return Err(CodecError::InvalidImage("interleaved ac scan"));
        }
        if ah != 0 && ah != al + 1 {
            self.warnings
                .push(format!("unusual successive approximation {ah}/{al}"));
        }

        // Validate the tables each state machine will consult.
        for sc in &components {
            let needs_dc = matches!(kind, ScanKind::Baseline | ScanKind::DcFirst);
            let needs_ac =
                matches!(kind, ScanKind::Baseline | ScanKind::AcFirst | ScanKind::AcRefine);
            if sc.dc_sel > 3 || sc.ac_sel > 3 {
                return Err(CodecError::InvalidImage("bad huffman table id"));
            }
            if needs_dc && self.dc_tables[sc.dc_sel].is_none() {
                return Err(CodecError::InvalidImage("undefined dc huffman table"));
            }
            if needs_ac && self.ac_tables[sc.ac_sel].is_none() {
                return Err(CodecError::InvalidImage("undefined ac huffman table"));
            }
            if !frame.progressive && self.quant_tables[frame.components[sc.comp_idx].quant_sel].is_none() {
                return Err(CodecError::InvalidImage("undefined quantization table"));
            }
        }

        Ok(ScanHeader {
            components,
            ss,
            se,
            al,
            kind,
        })
    }

    /// Decode the entropy-coded data of one scan. Corrupt entropy data
    /// resynchronizes at the next restart marker when the frame uses
    /// restart intervals; otherwise the scan stops where it broke. Either
    /// way a warning records the damage.
    fn decode_scan(
        &mut self,
        reader: &mut BitReader<'_>,
        frame: &mut FrameInfo,
        scan: &ScanHeader,
    ) -> Result<()> {
        for sc in &scan.components {
            frame.components[sc.comp_idx].dc_pred = 0;
        }
        let mut eobrun = 0u32;
        let mut restart_index = 0u8;
        let mut mcus_since_restart = 0u32;
        let interval = self.restart_interval as usize;

        // Geometry: an interleaved scan walks the MCU grid; a
        // single-component scan walks that component's own block grid.
        let interleaved = scan.components.len() > 1;
        let (units_x, units_y) = if interleaved {
            (frame.mcus_x, frame.mcus_y)
        } else {
            let comp = &frame.components[scan.components[0].comp_idx];
            (comp.width.div_ceil(8), comp.height.div_ceil(8))
        };
        let total_units = units_x * units_y;

        let mut unit = 0usize;
        while unit < total_units {
            if interval > 0 && mcus_since_restart == self.restart_interval {
                match self.read_restart(reader, restart_index) {
                    Ok(()) => {}
                    Err(e) => {
                        self.warnings
                            .push(format!("entropy data lost at restart: {e}"));
                        break;
                    }
                }
                restart_index = (restart_index + 1) % RESTART_MODULO;
                mcus_since_restart = 0;
                eobrun = 0;
                for sc in &scan.components {
                    frame.components[sc.comp_idx].dc_pred = 0;
                }
            }

            let (unit_x, unit_y) = (unit % units_x, unit / units_x);
            match self.decode_mcu(reader, frame, scan, unit_x, unit_y, &mut eobrun) {
                Ok(()) => {
                    unit += 1;
                    mcus_since_restart += 1;
                }
                Err(e) if interval > 0 => {
                    // Skip to the next restart marker and resume at the
                    // MCU boundary it delimits.
                    self.warnings
                        .push(format!("corrupt entropy data, resynchronizing: {e}"));
                    let is_rst =
                        |m: u8| (RESTART_BASE..RESTART_BASE + RESTART_MODULO).contains(&m);
                    let marker = match reader.pending_marker() {
                        Some(m) if is_rst(m) => reader.take_marker(),
                        _ => match reader.seek_next_marker() {
                            Some(m) if is_rst(m) => reader.take_marker(),
                            Some(_) | None => {
                                self.warnings.push("entropy data lost".into());
                                return Ok(());
                            }
                        },
                    };
                    let Some(marker) = marker else {
                        return Ok(());
                    };
                    restart_index = (marker - RESTART_BASE + 1) % RESTART_MODULO;
                    unit = (unit / interval + 1) * interval;
                    mcus_since_restart = 0;
                    eobrun = 0;
                    for sc in &scan.components {
                        frame.components[sc.comp_idx].dc_pred = 0;
                    }
                }
                Err(e) => {
                    self.warnings
                        .push(format!("corrupt entropy data, scan salvaged: {e}"));
                    break;
                }
            }
        }
        Ok(())
    }

    fn decode_mcu(
        &mut self,
        reader: &mut BitReader<'_>,
        frame: &mut FrameInfo,
        scan: &ScanHeader,
        unit_x: usize,
        unit_y: usize,
        eobrun: &mut u32,
    ) -> Result<()> {
        let interleaved = scan.components.len() > 1;
        for sc in &scan.components {
            let (h, v) = {
                let comp = &frame.components[sc.comp_idx];
                if interleaved {
                    (comp.h, comp.v)
                } else {
                    (1, 1)
                }
            };
            for by in 0..v {
                for bx in 0..h {
                    let (block_x, block_y) = if interleaved {
                        (unit_x * h + bx, unit_y * v + by)
                    } else {
                        (unit_x, unit_y)
                    };
                    self.decode_block(reader, frame, scan, sc, block_x, block_y, eobrun)?;
                }
            }
        }
        Ok(())
    }

    fn decode_block(
        &mut self,
        reader: &mut BitReader<'_>,
        frame: &mut FrameInfo,
        scan: &ScanHeader,
        sc: &ScanComponent,
        block_x: usize,
        block_y: usize,
        eobrun: &mut u32,
    ) -> Result<()> {
        let comp = &mut frame.components[sc.comp_idx];
        match scan.kind {
            ScanKind::Baseline => {
                let dc = self.dc_tables[sc.dc_sel]
                    .as_ref()
                    .ok_or(CodecError::InvalidImage("undefined dc huffman table"))?;
                let ac = self.ac_tables[sc.ac_sel]
                    .as_ref()
                    .ok_or(CodecError::InvalidImage("undefined ac huffman table"))?;
                let qtable = self.quant_tables[comp.quant_sel]
                    .as_ref()
                    .ok_or(CodecError::InvalidImage("undefined quantization table"))?;
                let mut coef = [0i32; 64];
                decode_block_baseline(reader, dc, ac, &mut comp.dc_pred, &mut coef)?;
                let mut dequant = [0i32; 64];
                dequantize_block(&coef, qtable, &mut dequant);
                let mut samples = [0u8; 64];
                idct_block(&dequant, &mut samples);
                comp.store_block(block_x, block_y, &samples);
            }
            ScanKind::DcFirst => {
                let dc = self.dc_tables[sc.dc_sel]
                    .as_ref()
                    .ok_or(CodecError::InvalidImage("undefined dc huffman table"))?;
                let block = comp.coef_block_mut(block_x, block_y);
                let mut fixed = [0i32; 64];
                fixed.copy_from_slice(block);
                let mut pred = comp.dc_pred;
                decode_dc_first(reader, dc, &mut pred, scan.al, &mut fixed)?;
                comp.dc_pred = pred;
                comp.coef_block_mut(block_x, block_y).copy_from_slice(&fixed);
            }
            ScanKind::DcRefine => {
                let block = comp.coef_block_mut(block_x, block_y);
                let mut fixed = [0i32; 64];
                fixed.copy_from_slice(block);
                decode_dc_refine(reader, scan.al, &mut fixed);
                block.copy_from_slice(&fixed);
            }
            ScanKind::AcFirst => {
                let ac = self.ac_tables[sc.ac_sel]
                    .as_ref()
                    .ok_or(CodecError::InvalidImage("undefined ac huffman table"))?;
                let block = comp.coef_block_mut(block_x, block_y);
                let mut fixed = [0i32; 64];
                fixed.copy_from_slice(block);
                decode_ac_first(reader, ac, &mut fixed, scan.ss, scan.se, scan.al, eobrun)?;
                comp.coef_block_mut(block_x, block_y).copy_from_slice(&fixed);
            }
            ScanKind::AcRefine => {
                let ac = self.ac_tables[sc.ac_sel]
                    .as_ref()
                    .ok_or(CodecError::InvalidImage("undefined ac huffman table"))?;
                let block = comp.coef_block_mut(block_x, block_y);
                let mut fixed = [0i32; 64];
                fixed.copy_from_slice(block);
                decode_ac_refine(reader, ac, &mut fixed, scan.ss, scan.se, scan.al, eobrun)?;
                comp.coef_block_mut(block_x, block_y).copy_from_slice(&fixed);
            }
        }
        Ok(())
    }

    /// Consume the restart marker due at this MCU boundary. A marker up to
    /// two positions ahead of the expected index is accepted with a
    /// warning; anything else triggers a forward resynchronization scan.
    fn read_restart(&mut self, reader: &mut BitReader<'_>, expected: u8) -> Result<()> {
        reader.align();
        if reader.pending_marker().is_none() {
            // Touch the stream so a marker at the cursor is detected.
            let _ = reader.peek_bits(8);
        }
        let marker = match reader.take_marker() {
            Some(m) => m,
            None => reader
                .seek_next_marker()
                .and_then(|_| reader.take_marker())
                .ok_or(CodecError::InvalidImage("missing restart marker"))?,
        };
        if !(RESTART_BASE..RESTART_BASE + RESTART_MODULO).contains(&marker) {
            return Err(CodecError::InvalidImageDetail(format!(
                "expected restart marker, found FF {marker:02X}"
            )));
        }
        let got = marker - RESTART_BASE;
        let ahead = (got + RESTART_MODULO - expected) % RESTART_MODULO;
        if ahead != 0 {
            if ahead <= 2 {
                self.warnings.push(format!(
                    "restart marker out of sync: expected RST{expected}, found RST{got}"
                ));
            } else {
                return Err(CodecError::InvalidImageDetail(format!(
                    "restart marker out of sync: expected RST{expected}, found RST{got}"
                )));
            }
        }
        Ok(())
    }

    /// Build the output image from the current component state.
    fn render(&mut self, frame: &FrameInfo) -> Result<ImageData> {
        let mut planes = Vec::with_capacity(frame.components.len());
        for comp in &frame.components {
            let plane = if frame.progressive {
                let qtable = self.quant_tables[comp.quant_sel]
                    .as_ref()
                    .ok_or(CodecError::InvalidImage("undefined quantization table"))?;
                inverse_transform(comp, qtable)
            } else {
                comp.plane.clone()
            };
            let h_ratio = ratio(frame.hmax, comp.h)?;
            let v_ratio = ratio(frame.vmax, comp.v)?;
            planes.push(upsample(&plane, h_ratio, v_ratio, frame.width, frame.height));
        }

        if planes.len() == 1 {
            let gray = (0..256)
                .map(|i| Rgb::new(i as u8, i as u8, i as u8))
                .collect();
            let mut image =
                ImageData::new(frame.width, frame.height, 8, PaletteData::Indexed(gray));
            for y in 0..frame.height {
                let src = &planes[0].data[y * frame.width..(y + 1) * frame.width];
                let dst = y * image.bytes_per_line;
                image.data[dst..dst + frame.width].copy_from_slice(src);
            }
            return Ok(image);
        }

        let rgb_passthrough = self.adobe_transform == Some(ADOBE_TRANSFORM_RGB);
        let converter = YcbcrToRgb::new();
        let mut image =
            ImageData::new(frame.width, frame.height, 24, PaletteData::direct_rgb24());
        for y in 0..frame.height {
            let row = y * frame.width;
            let dst_row = y * image.bytes_per_line;
            for x in 0..frame.width {
                let c0 = planes[0].data[row + x];
                let c1 = planes[1].data[row + x];
                let c2 = planes[2].data[row + x];
                let (r, g, b) = if rgb_passthrough {
                    (c0, c1, c2)
                } else {
                    converter.convert(c0, c1, c2)
                };
                let i = dst_row + x * 3;
                image.data[i] = r;
                image.data[i + 1] = g;
                image.data[i + 2] = b;
            }
        }
        Ok(image)
    }
}

impl Default for JpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(max: usize, own: usize) -> Result<usize> {
    if max % own != 0 {
        return Err(CodecError::NotImplemented("fractional chroma subsampling"));
    }
    Ok(max / own)
}

/// Dequantize and inverse-transform a progressive component's coefficient
/// store into its sample plane.
fn inverse_transform(comp: &Component, qtable: &[u16; 64]) -> SamplePlane {
    let mut plane = SamplePlane::new(comp.blocks_w * 8, comp.blocks_h * 8);
    let coef = match &comp.coef {
        Some(coef) => coef,
        None => return plane,
    };
    let stride = plane.width;
    for by in 0..comp.blocks_h {
        for bx in 0..comp.blocks_w {
            let offset = (by * comp.blocks_w + bx) * 64;
            let mut block = [0i32; 64];
            block.copy_from_slice(&coef[offset..offset + 64]);
            let mut dequant = [0i32; 64];
            dequantize_block(&block, qtable, &mut dequant);
            let mut samples = [0u8; 64];
            idct_block(&dequant, &mut samples);
            for row in 0..8 {
                let dst = (by * 8 + row) * stride + bx * 8;
                plane.data[dst..dst + 8].copy_from_slice(&samples[row * 8..row * 8 + 8]);
            }
        }
    }
    plane
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::huffman::{
        STD_AC_LUMA_LENGTHS, STD_AC_LUMA_VALUES, STD_DC_LUMA_LENGTHS, STD_DC_LUMA_VALUES,
    };
    use crate::stream::ByteWriter;

    fn segment(w: &mut ByteWriter, code: u8, payload: &[u8]) {
        w.write_u8(0xFF);
        w.write_u8(code);
        w.write_u16_be((payload.len() + 2) as u16);
        w.write_bytes(payload);
    }

    /// 1x1 grayscale baseline JPEG with unit quantizers and the standard
    /// luma Huffman tables. The single sample is black.
    fn tiny_black_jpeg() -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u8(0xFF);
        w.write_u8(0xD8);

        let mut dqt = vec![0x00];
        dqt.extend(std::iter::repeat(1u8).take(64));
        segment(&mut w, 0xDB, &dqt);

        segment(
            &mut w,
            0xC0,
            &[8, 0, 1, 0, 1, 1, 1, 0x11, 0], // precision, 1x1, one comp
        );

        let mut dht = vec![0x00];
        dht.extend_from_slice(&STD_DC_LUMA_LENGTHS);
        dht.extend_from_slice(&STD_DC_LUMA_VALUES);
        segment(&mut w, 0xC4, &dht);
        let mut dht = vec![0x10];
        dht.extend_from_slice(&STD_AC_LUMA_LENGTHS);
        dht.extend_from_slice(&STD_AC_LUMA_VALUES);
        segment(&mut w, 0xC4, &dht);

        segment(&mut w, 0xDA, &[1, 1, 0x00, 0, 63, 0]);

        // Entropy data: a flat black block has DC coefficient -1024
        // (category 11, magnitude bits 1023), then EOB. 9 + 11 + 4 bits.
        let dc = HuffmanTable::standard_dc_luma();
        let ac = HuffmanTable::standard_ac_luma();
        let (dc_code, dc_len) = dc.code(11);
        let (eob_code, eob_len) = ac.code(0x00);
        let mut acc: u32 = 0;
        let mut count = 0u32;
        let mut bytes = Vec::new();
        let mut push = |acc: &mut u32, count: &mut u32, value: u32, n: u32| {
            for i in (0..n).rev() {
                *acc = (*acc << 1) | ((value >> i) & 1);
                *count += 1;
                if *count == 8 {
                    bytes.push(*acc as u8);
                    if *acc as u8 == 0xFF {
                        bytes.push(0x00);
                    }
                    *acc = 0;
                    *count = 0;
                }
            }
        };
        push(&mut acc, &mut count, dc_code as u32, dc_len as u32);
        push(&mut acc, &mut count, 1023, 11);
        push(&mut acc, &mut count, eob_code as u32, eob_len as u32);
        if count > 0 {
            let pad = 8 - count;
            push(&mut acc, &mut count, (1 << pad) - 1, pad);
        }
        w.write_bytes(&bytes);

        w.write_u8(0xFF);
        w.write_u8(0xD9);
        w.into_vec()
    }

    #[test]
    fn rejects_bad_signature() {
        let mut d = JpegDecoder::new();
        let err = d.decode(&[0x00, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidImage(_)));
    }

    #[test]
    fn rejects_zero_width_frame() {
        let mut w = ByteWriter::new();
        w.write_u8(0xFF);
        w.write_u8(0xD8);
        segment(&mut w, 0xC0, &[8, 0, 1, 0, 0, 1, 1, 0x11, 0]);
        let mut d = JpegDecoder::new();
        let err = d.decode(w.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::InvalidImage(_)));
    }

    #[test]
    fn rejects_arithmetic_frame() {
        let mut w = ByteWriter::new();
        w.write_u8(0xFF);
        w.write_u8(0xD8);
        segment(&mut w, 0xC9, &[8, 0, 1, 0, 1, 1, 1, 0x11, 0]);
        let mut d = JpegDecoder::new();
        let err = d.decode(w.as_slice()).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn decodes_one_by_one_black() {
        let data = tiny_black_jpeg();
        let mut d = JpegDecoder::new();
        let image = d.decode(&data).unwrap();
        assert_eq!(image.width, 1);
        assert_eq!(image.height, 1);
        assert_eq!(image.depth, 8);
        let v = image.pixel(0, 0);
        assert!(v <= 2, "expected near-black, got {v}");
        assert!(d.warnings().is_empty(), "{:?}", d.warnings());
    }

    #[test]
    fn truncated_scan_is_salvaged_with_warning() {
        let data = tiny_black_jpeg();
        // Chop off the entropy tail and EOI.
        let mut d = JpegDecoder::new();
        let image = d.decode(&data[..data.len() - 4]).unwrap();
        assert_eq!(image.width, 1);
        assert!(!d.warnings().is_empty());
    }
}
