// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Little-endian byte readers and writers for method bytecode.

use alloc::vec::Vec;
use core::fmt;

/// A decode error for bytecode streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended in the middle of an instruction.
    UnexpectedEof {
        /// Offset at which more bytes were needed.
        offset: usize,
    },
    /// A length/offset was out of bounds.
    OutOfBounds,
    /// The opcode byte is not part of the instruction set.
    UnknownOpcode {
        /// Offset of the opcode byte.
        offset: usize,
        /// The unrecognized byte.
        opcode: u8,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof { offset } => write!(f, "unexpected end of input at {offset}"),
            Self::OutOfBounds => write!(f, "out of bounds"),
            Self::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode 0x{opcode:02x} at {offset}")
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// A simple byte reader with bounds checks.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Returns the current cursor offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .offset
            .checked_add(N)
            .ok_or(DecodeError::OutOfBounds)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.offset,
            })?;
        let mut out = [0_u8; N];
        out.copy_from_slice(slice);
        self.offset = end;
        Ok(out)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }
}

/// A simple byte writer.
#[derive(Clone, Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a reference to the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the writer and returns the underlying byte buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends a `u8`.
    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    /// Appends a little-endian `u16`.
    pub fn write_u16_le(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `i32`.
    pub fn write_i32_le(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `i64`.
    pub fn write_i64_le(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Overwrites four bytes at `at` with a little-endian `i32`.
    ///
    /// Returns [`DecodeError::OutOfBounds`] if the window does not fit.
    pub fn patch_i32_le(&mut self, at: usize, v: i32) -> Result<(), DecodeError> {
        let end = at.checked_add(4).ok_or(DecodeError::OutOfBounds)?;
        let window = self
            .bytes
            .get_mut(at..end)
            .ok_or(DecodeError::OutOfBounds)?;
        window.copy_from_slice(&v.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_eof_offset() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.read_u16_le().unwrap(), 0x0201);
        assert_eq!(
            r.read_i32_le(),
            Err(DecodeError::UnexpectedEof { offset: 2 })
        );
        // A failed read does not advance the cursor.
        assert_eq!(r.offset(), 2);
        assert_eq!(r.read_u8().unwrap(), 3);
        assert!(r.is_empty());
    }

    #[test]
    fn writer_patches_in_place() {
        let mut w = Writer::new();
        w.write_u8(0xAA);
        w.write_i32_le(0);
        w.patch_i32_le(1, -2).unwrap();
        assert_eq!(w.as_slice(), &[0xAA, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(w.patch_i32_le(3, 1), Err(DecodeError::OutOfBounds));
    }
}
