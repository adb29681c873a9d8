//! Slice-backed byte cursor with big- and little-endian integer reads and
//! a bounded unread, used by every container parser. Format sniffing peeks
//! at signature bytes and pushes them back before dispatching.

use crate::error::{CodecError, Result};

pub struct ByteReader<'a> {
    source: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self { source, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.source[self.position..]
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.source.len()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        if self.position >= self.source.len() {
            return Err(CodecError::InvalidImage("unexpected end of stream"));
        }
        let v = self.source[self.position];
        self.position += 1;
        Ok(v)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&e| e <= self.source.len())
            .ok_or(CodecError::InvalidImage("unexpected end of stream"))?;
        let slice = &self.source[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Push back the last `count` consumed bytes.
    pub fn unread(&mut self, count: usize) -> Result<()> {
        if count > self.position {
            return Err(CodecError::InvalidImage("unread past start of stream"));
        }
        self.position -= count;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.source.len() {
            return Err(CodecError::InvalidImage("seek past end of stream"));
        }
        self.position = position;
        Ok(())
    }
}

/// Growable output buffer with endian-aware integer writes.
#[derive(Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.data.extend_from_slice(v);
    }

    pub fn write_u16_be(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u16_le(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32_be(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Overwrite previously written bytes, for length fields patched after
    /// the payload is known.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
