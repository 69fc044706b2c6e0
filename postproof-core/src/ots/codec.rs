//! Low-level reader/writer for the proof container byte grammar.
//!
//! Integers are unsigned LEB128 ("varuint"); byte strings are a varuint length
//! followed by the bytes ("varbytes").

use crate::error::{ProofError, Result};

/// Cursor over a proof byte slice.
pub struct ProofReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ProofReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| corrupt(format!("unexpected end of proof at byte {}", self.pos)))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                corrupt(format!(
                    "need {len} bytes at offset {}, only {} left",
                    self.pos,
                    self.bytes.len() - self.pos
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_varuint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.read_byte()?;
            if shift >= 64 || (shift == 63 && (b & 0x7f) > 1) {
                return Err(corrupt("varuint overflows 64 bits"));
            }
            value |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a length-prefixed byte string with inclusive bounds on its length.
    pub fn read_varbytes(&mut self, min_len: usize, max_len: usize) -> Result<&'a [u8]> {
        let len = self.read_varuint()?;
        let len = usize::try_from(len).map_err(|_| corrupt("varbytes length too large"))?;
        if len < min_len || len > max_len {
            return Err(corrupt(format!(
                "varbytes length {len} outside {min_len}..={max_len}"
            )));
        }
        self.read_bytes(len)
    }

    pub fn assert_eof(&self) -> Result<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(corrupt(format!(
                "{} trailing bytes after proof",
                self.bytes.len() - self.pos
            )))
        }
    }
}

pub fn write_varuint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_varbytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varuint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub(crate) fn corrupt(msg: impl Into<String>) -> ProofError {
    ProofError::CorruptProof(msg.into())
}
