//! Primitive encoding/decoding for the archive format.
//!
//! Implements varint, signed varint (zigzag), floats, ids and
//! length-prefixed strings and byte arrays.

use uuid::Uuid;

use crate::error::DecodeError;
use crate::limits::MAX_VARINT_BYTES;
use crate::model::{Id, Quaternion, Vector3};

// =============================================================================
// DECODING
// =============================================================================

/// Bounds-checked cursor over an archive body.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEof { context })?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof { context })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, context)?);
        Ok(out)
    }

    #[inline]
    pub fn read_id(&mut self, context: &'static str) -> Result<Id, DecodeError> {
        Ok(Uuid::from_bytes(self.read_array::<16>(context)?))
    }

    /// Reads an unsigned varint (LEB128).
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for _ in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u64;

            if shift == 63 && value > 1 {
                return Err(DecodeError::VarintOverflow);
            }
            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(DecodeError::VarintTooLong)
    }

    /// Reads a signed varint (zigzag encoded).
    pub fn read_signed_varint(&mut self, context: &'static str) -> Result<i64, DecodeError> {
        Ok(zigzag_decode(self.read_varint(context)?))
    }

    /// Reads a varint that must fit in a `u32`.
    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let value = self.read_varint(field)?;
        u32::try_from(value).map_err(|_| DecodeError::ValueOutOfRange { field, value })
    }

    /// Reads a varint count and checks it against `max`.
    pub fn read_count(&mut self, max: usize, field: &'static str) -> Result<usize, DecodeError> {
        let len = self.read_varint(field)? as usize;
        if len > max {
            return Err(DecodeError::LengthExceedsLimit { field, len, max });
        }
        Ok(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let len = self.read_count(max_len, field)?;
        let bytes = self.read_bytes(len, field)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    /// Reads a length-prefixed byte array.
    pub fn read_bytes_prefixed(&mut self, max_len: usize, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_count(max_len, field)?;
        Ok(self.read_bytes(len, field)?.to_vec())
    }

    /// Reads a little-endian f32.
    #[inline]
    pub fn read_f32(&mut self, context: &'static str) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.read_array::<4>(context)?))
    }

    pub fn read_f32_array<const N: usize>(&mut self, context: &'static str) -> Result<[f32; N], DecodeError> {
        let mut out = [0f32; N];
        for slot in &mut out {
            *slot = self.read_f32(context)?;
        }
        Ok(out)
    }

    pub fn read_vector(&mut self, context: &'static str) -> Result<Vector3, DecodeError> {
        let [x, y, z] = self.read_f32_array::<3>(context)?;
        Ok(Vector3::new(x, y, z))
    }

    pub fn read_quaternion(&mut self, context: &'static str) -> Result<Quaternion, DecodeError> {
        let [x, y, z, w] = self.read_f32_array::<4>(context)?;
        Ok(Quaternion::new(x, y, z, w))
    }

    /// Reads a vector of ids with length prefix.
    pub fn read_id_vec(&mut self, max_len: usize, field: &'static str) -> Result<Vec<Id>, DecodeError> {
        let count = self.read_count(max_len, field)?;
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.read_id(field)?);
        }
        Ok(ids)
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Growable output buffer for an archive body.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    pub fn write_id(&mut self, id: &Id) {
        self.buf.extend_from_slice(id.as_bytes());
    }

    /// Writes an unsigned varint (LEB128).
    pub fn write_varint(&mut self, mut value: u64) {
        let mut scratch = [0u8; MAX_VARINT_BYTES];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            scratch[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.buf.extend_from_slice(&scratch[..len]);
    }

    /// Writes a signed varint (zigzag encoded).
    pub fn write_signed_varint(&mut self, value: i64) {
        self.write_varint(zigzag_encode(value));
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_varint(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_bytes_prefixed(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32_slice(&mut self, values: &[f32]) {
        for value in values {
            self.write_f32(*value);
        }
    }

    pub fn write_vector(&mut self, v: &Vector3) {
        self.write_f32_slice(&[v.x, v.y, v.z]);
    }

    pub fn write_quaternion(&mut self, q: &Quaternion) {
        self.write_f32_slice(&[q.x, q.y, q.z, q.w]);
    }

    pub fn write_id_vec(&mut self, ids: &[Id]) {
        self.write_varint(ids.len() as u64);
        for id in ids {
            self.write_id(id);
        }
    }
}

// =============================================================================
// ZIGZAG ENCODING
// =============================================================================

/// Maps signed integers to unsigned: 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, ...
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zigzag_values() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MIN)), i64::MIN);
    }

    #[test]
    fn test_varint_too_long() {
        let data = [0xFFu8; 11];
        let mut reader = Reader::new(&data);
        assert!(matches!(
            reader.read_varint("test"),
            Err(DecodeError::VarintTooLong) | Err(DecodeError::VarintOverflow)
        ));
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert!(matches!(
            reader.read_id("id"),
            Err(DecodeError::UnexpectedEof { context: "id" })
        ));
    }

    #[test]
    fn test_u32_out_of_range() {
        let mut writer = Writer::new();
        writer.write_varint(u64::from(u32::MAX) + 1);
        let mut reader = Reader::new(writer.as_bytes());
        assert!(matches!(
            reader.read_u32("version"),
            Err(DecodeError::ValueOutOfRange { field: "version", .. })
        ));
    }

    #[test]
    fn test_string_limit() {
        let mut writer = Writer::new();
        writer.write_string("hello world");
        let mut reader = Reader::new(writer.as_bytes());
        assert!(matches!(
            reader.read_string(4, "name"),
            Err(DecodeError::LengthExceedsLimit { field: "name", len: 11, max: 4 })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut writer = Writer::new();
        writer.write_bytes_prefixed(&[0xC3, 0x28]);
        let mut reader = Reader::new(writer.as_bytes());
        assert!(matches!(
            reader.read_string(16, "name"),
            Err(DecodeError::InvalidUtf8 { field: "name" })
        ));
    }

    proptest! {
        #[test]
        fn prop_varint_roundtrip(v in any::<u64>()) {
            let mut writer = Writer::new();
            writer.write_varint(v);
            let mut reader = Reader::new(writer.as_bytes());
            prop_assert_eq!(reader.read_varint("v").unwrap(), v);
            prop_assert!(reader.is_empty());
        }

        #[test]
        fn prop_reader_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut reader = Reader::new(&data);
            let _ = reader.read_string(32, "s");
            let _ = reader.read_varint("v");
            let _ = reader.read_quaternion("q");
        }
    }
}
