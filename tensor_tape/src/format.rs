// Copyright 2026 the Tensor Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Encoding/decoding primitives for the `tensor_tape` executable format.
//!
//! The wire format matches the producing toolchain's stream conventions:
//! fixed-width little-endian integers, strings as a `u64` length followed by
//! UTF-8 bytes, lists as a `u64` count followed by elements. The format is
//! not portable across endiannesses.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A decode error for `tensor_tape` binary artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended unexpectedly.
    UnexpectedEof,
    /// A length or count was out of bounds.
    OutOfBounds,
    /// A UTF-8 string was invalid.
    InvalidUtf8,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::OutOfBounds => write!(f, "length or count out of bounds"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// A bounds-checked byte reader.
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

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(DecodeError::OutOfBounds)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.offset = end;
        Ok(slice)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64_le()? as i64)
    }

    /// Reads a `u64` count and converts it to `usize`.
    pub fn read_count(&mut self) -> Result<usize, DecodeError> {
        usize::try_from(self.read_u64_le()?).map_err(|_| DecodeError::OutOfBounds)
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }

    /// Reads `len` bytes and validates UTF-8.
    pub fn read_str(&mut self, len: usize) -> Result<&'a str, DecodeError> {
        let b = self.take(len)?;
        core::str::from_utf8(b).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_count()?;
        Ok(String::from(self.read_str(len)?))
    }

    /// Reads a count-prefixed list of length-prefixed strings.
    pub fn read_string_list(&mut self) -> Result<Vec<String>, DecodeError> {
        let n = self.read_count()?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_string()?);
        }
        Ok(out)
    }
}

/// A byte writer.
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

    /// Appends a little-endian `u64`.
    pub fn write_u64_le(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `i64`.
    pub fn write_i64_le(&mut self, v: i64) {
        self.write_u64_le(v as u64);
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_u64_le(s.len() as u64);
        self.bytes.extend_from_slice(s.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_roundtrip() {
        let mut w = Writer::new();
        w.write_u64_le(u64::MAX);
        w.write_i64_le(-5);
        w.write_i64_le(i64::MIN);

        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.read_u64_le(), Ok(u64::MAX));
        assert_eq!(r.read_i64_le(), Ok(-5));
        assert_eq!(r.read_i64_le(), Ok(i64::MIN));
        assert_eq!(r.offset(), 24);
    }

    #[test]
    fn strings_roundtrip() {
        let mut w = Writer::new();
        w.write_string("main");
        w.write_string("");

        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.read_string().as_deref(), Ok("main"));
        assert_eq!(r.read_string().as_deref(), Ok(""));
    }

    #[test]
    fn string_list_roundtrips() {
        let mut w = Writer::new();
        w.write_u64_le(2);
        w.write_string("a");
        w.write_string("bc");

        let mut r = Reader::new(w.as_slice());
        let list = r.read_string_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], "a");
        assert_eq!(list[1], "bc");
    }

    #[test]
    fn short_read_is_eof() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.read_u64_le(), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn truncated_string_is_eof() {
        let mut w = Writer::new();
        w.write_u64_le(16);
        w.write_bytes(b"short");
        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.read_string(), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut w = Writer::new();
        w.write_u64_le(2);
        w.write_bytes(&[0xff, 0xfe]);
        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.read_string(), Err(DecodeError::InvalidUtf8));
    }
}
