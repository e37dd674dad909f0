//! Little-endian, 4-byte aligned framing shared by every update message.

use crate::constants::{WIRE_ALIGNMENT, WORD};
use crate::sync::SyncError;

/// Rounds `n` up to the next multiple of the wire alignment.
pub fn align(n: usize) -> usize {
    n.div_ceil(WIRE_ALIGNMENT) * WIRE_ALIGNMENT
}

/// Encoded size of a length-prefixed block carrying `len` bytes.
pub fn block_len(len: usize) -> usize {
    align(WORD + len)
}

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes `[u32 len][bytes]` and zero-pads to the alignment.
    pub fn block(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self.pad();
    }

    /// Appends bytes with no framing.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn pad(&mut self) {
        let target = align(self.buf.len());
        self.buf.resize(target, 0);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn u32(&mut self) -> Result<u32, SyncError> {
        let raw = self.take(WORD)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Reads exactly `len` bytes without realigning.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], SyncError> {
        if len > self.remaining() {
            return Err(SyncError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.bytes[start..self.pos])
    }

    /// Reads a `[u32 len][bytes]` block and skips its padding.
    ///
    /// Missing padding at the very end of the buffer is tolerated.
    pub fn block(&mut self) -> Result<&'a [u8], SyncError> {
        let len = self.u32()? as usize;
        let data = self.take(len)?;
        self.realign();
        Ok(data)
    }

    pub fn realign(&mut self) {
        self.pos = align(self.pos).min(self.bytes.len());
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let start = self.pos;
        self.pos = self.bytes.len();
        &self.bytes[start..]
    }
}
