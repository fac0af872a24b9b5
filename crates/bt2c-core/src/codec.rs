//! Canonical byte encoding for consensus-visible structures.
//!
//! The encoding is the one every node must agree on: fixed field order,
//! big-endian integers, raw 32-byte hashes and addresses, and
//! u32-length-prefixed byte strings and vectors. Hashing, signing and the
//! wire all run over these bytes; `decode(encode(x)) == x` holds for every
//! transaction and block.

use crate::error::Bt2cError;

// ── Writer ───────────────────────────────────────────────────────────────────

/// Append-only canonical byte writer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Raw 32-byte value (address, tx hash, block hash) — no length prefix.
    pub fn put_hash(&mut self, v: &[u8; 32]) {
        self.buf.extend_from_slice(v);
    }

    /// u32-length-prefixed byte string (keys, signatures).
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
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

// ── Reader ───────────────────────────────────────────────────────────────────

/// Cursor over canonical bytes. Every read is bounds-checked; running past
/// the end or leaving trailing bytes is a decode error, never a panic.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Bt2cError> {
        if self.pos + n > self.buf.len() {
            return Err(Bt2cError::Serialization(format!(
                "truncated input: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, Bt2cError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, Bt2cError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, Bt2cError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64, Bt2cError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    pub fn get_i64(&mut self) -> Result<i64, Bt2cError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }

    pub fn get_hash(&mut self) -> Result<[u8; 32], Bt2cError> {
        let b = self.take(32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(b);
        Ok(arr)
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>, Bt2cError> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Assert the whole input was consumed.
    pub fn finish(self) -> Result<(), Bt2cError> {
        if self.remaining() != 0 {
            return Err(Bt2cError::Serialization(format!(
                "{} trailing bytes after decode",
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Anything with a canonical byte form.
pub trait CanonicalEncode: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self, Bt2cError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reader_round_trip() {
        let mut w = Writer::new();
        w.put_u8(0xAB);
        w.put_u32(123_456);
        w.put_u64(u64::MAX);
        w.put_i64(-42);
        w.put_hash(&[9u8; 32]);
        w.put_bytes(b"hello");
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_u8().unwrap(), 0xAB);
        assert_eq!(r.get_u32().unwrap(), 123_456);
        assert_eq!(r.get_u64().unwrap(), u64::MAX);
        assert_eq!(r.get_i64().unwrap(), -42);
        assert_eq!(r.get_hash().unwrap(), [9u8; 32]);
        assert_eq!(r.get_bytes().unwrap(), b"hello");
        r.finish().unwrap();
    }

    #[test]
    fn integers_are_big_endian() {
        let mut w = Writer::new();
        w.put_u32(1);
        assert_eq!(w.into_bytes(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut r = Reader::new(&[0, 0]);
        assert!(r.get_u32().is_err());
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let r = Reader::new(&[1, 2, 3]);
        assert!(r.finish().is_err());
    }
}
