//! Binary codec: fixed-layout encoding of the values found in resource
//! payloads and durable references.
//!
//! Layout rules:
//!   - bool: 1 byte, `0` false, anything else true on decode
//!   - i32 / i64: big-endian two's complement, 4 / 8 bytes
//!   - f64: IEEE-754 bit pattern, big-endian, 8 bytes (NaN round-trips bit-for-bit)
//!   - text: i32 length prefix + UTF-8 bytes; prefix `-1` means "no value"
//!   - timestamp: seven i32 (year, month, day, hour, minute, second, nanosecond)
//!   - reference: text(origin path), then i64 id **only if the path is present**
//!
//! The free functions decode a whole buffer and reject any length mismatch.
//! [`ByteReader`] and [`ByteWriter`] handle records made of several fields.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::StoreError;
use crate::identity::ResourceReference;

pub const BOOL_BYTES: usize = 1;
pub const I32_BYTES: usize = 4;
pub const I64_BYTES: usize = 8;
pub const F64_BYTES: usize = 8;
/// Length of an encoded timestamp.
pub const TIMESTAMP_BYTES: usize = I32_BYTES * 7;
/// Length prefix marking an absent text or reference.
pub const ABSENT_LENGTH: i32 = -1;

const BOOL_FALSE: u8 = 0;
const BOOL_TRUE: u8 = 1;

// ---------------------------------------------------------------------------
// Fixed-width primitives
// ---------------------------------------------------------------------------

pub fn encode_bool(value: bool) -> [u8; BOOL_BYTES] {
    [if value { BOOL_TRUE } else { BOOL_FALSE }]
}

pub fn decode_bool(bytes: &[u8]) -> Result<bool, StoreError> {
    let [byte] = fixed::<BOOL_BYTES>(bytes, "bool")?;
    Ok(byte != BOOL_FALSE)
}

pub fn encode_i32(value: i32) -> [u8; I32_BYTES] {
    value.to_be_bytes()
}

pub fn decode_i32(bytes: &[u8]) -> Result<i32, StoreError> {
    Ok(i32::from_be_bytes(fixed(bytes, "i32")?))
}

pub fn encode_i64(value: i64) -> [u8; I64_BYTES] {
    value.to_be_bytes()
}

pub fn decode_i64(bytes: &[u8]) -> Result<i64, StoreError> {
    Ok(i64::from_be_bytes(fixed(bytes, "i64")?))
}

pub fn encode_f64(value: f64) -> [u8; F64_BYTES] {
    value.to_bits().to_be_bytes()
}

pub fn decode_f64(bytes: &[u8]) -> Result<f64, StoreError> {
    Ok(f64::from_bits(u64::from_be_bytes(fixed(bytes, "f64")?)))
}

/// Check that `bytes` holds exactly one `N`-byte field.
fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], StoreError> {
    if bytes.is_empty() {
        return Err(StoreError::MissingInput(format!(
            "no bytes supplied for {what}"
        )));
    }
    bytes.try_into().map_err(|_| {
        StoreError::InvalidEncoding(format!(
            "{N} bytes are needed for {what}, but {} are supplied",
            bytes.len()
        ))
    })
}

// ---------------------------------------------------------------------------
// Variable-width values (whole-buffer)
// ---------------------------------------------------------------------------

pub fn encode_text(value: Option<&str>) -> Result<Vec<u8>, StoreError> {
    let mut writer = ByteWriter::new();
    writer.put_text(value)?;
    Ok(writer.into_vec())
}

pub fn decode_text(bytes: &[u8]) -> Result<Option<String>, StoreError> {
    decode_whole(bytes, "text", ByteReader::read_text)
}

pub fn encode_timestamp(value: &NaiveDateTime) -> [u8; TIMESTAMP_BYTES] {
    let mut out = [0u8; TIMESTAMP_BYTES];
    let mut slot = &mut out[..];
    for field in timestamp_fields(value) {
        slot.put_i32(field);
    }
    out
}

pub fn decode_timestamp(bytes: &[u8]) -> Result<NaiveDateTime, StoreError> {
    decode_whole(bytes, "timestamp", ByteReader::read_timestamp)
}

pub fn encode_reference(reference: Option<&ResourceReference>) -> Result<Vec<u8>, StoreError> {
    let mut writer = ByteWriter::new();
    writer.put_reference(reference)?;
    Ok(writer.into_vec())
}

pub fn decode_reference(bytes: &[u8]) -> Result<Option<ResourceReference>, StoreError> {
    decode_whole(bytes, "reference", ByteReader::read_reference)
}

fn decode_whole<'a, T>(
    bytes: &'a [u8],
    what: &str,
    read: impl FnOnce(&mut ByteReader<'a>) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    if bytes.is_empty() {
        return Err(StoreError::MissingInput(format!(
            "no bytes supplied for {what}"
        )));
    }
    let mut reader = ByteReader::new(bytes);
    let value = read(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

fn timestamp_fields(value: &NaiveDateTime) -> [i32; 7] {
    // month/day/hour/minute/second are bounded well below i32::MAX and
    // chrono caps nanoseconds (leap second included) at 1_999_999_999.
    [
        value.year(),
        value.month() as i32,
        value.day() as i32,
        value.hour() as i32,
        value.minute() as i32,
        value.second() as i32,
        value.nanosecond() as i32,
    ]
}

fn timestamp_from_fields(fields: [i32; 7]) -> Result<NaiveDateTime, StoreError> {
    let [year, month, day, hour, minute, second, nano] = fields;
    let unsigned = |v: i32| u32::try_from(v).ok();
    let date = unsigned(month)
        .zip(unsigned(day))
        .and_then(|(m, d)| NaiveDate::from_ymd_opt(year, m, d));
    let time = date.and_then(|date| {
        date.and_hms_nano_opt(
            unsigned(hour)?,
            unsigned(minute)?,
            unsigned(second)?,
            unsigned(nano)?,
        )
    });
    time.ok_or_else(|| {
        StoreError::InvalidEncoding(format!("{fields:?} is not a valid date-time"))
    })
}

// ---------------------------------------------------------------------------
// Sequential reader
// ---------------------------------------------------------------------------

/// Cursor over a byte buffer that decodes one field at a time.
///
/// Running out of bytes mid-field is an `InvalidEncoding` error; nothing is
/// consumed by a failed read.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.total - self.remaining()
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<(), StoreError> {
        if self.remaining() < needed {
            return Err(StoreError::InvalidEncoding(format!(
                "truncated {what} at offset {}: {needed} bytes needed, {} remain",
                self.position(),
                self.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, StoreError> {
        self.ensure(1, "byte")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, StoreError> {
        self.ensure(BOOL_BYTES, "bool")?;
        Ok(self.buf.get_u8() != BOOL_FALSE)
    }

    pub fn read_i32(&mut self) -> Result<i32, StoreError> {
        self.ensure(I32_BYTES, "i32")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64, StoreError> {
        self.ensure(I64_BYTES, "i64")?;
        Ok(self.buf.get_i64())
    }

    pub fn read_f64(&mut self) -> Result<f64, StoreError> {
        self.ensure(F64_BYTES, "f64")?;
        Ok(self.buf.get_f64())
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], StoreError> {
        self.ensure(len, "byte run")?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_text(&mut self) -> Result<Option<String>, StoreError> {
        let start = self.clone();
        let result = self.read_text_inner();
        if result.is_err() {
            *self = start;
        }
        result
    }

    fn read_text_inner(&mut self) -> Result<Option<String>, StoreError> {
        let len = self.read_i32()?;
        if len == ABSENT_LENGTH {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| {
            StoreError::InvalidEncoding(format!("negative text length {len}"))
        })?;
        let raw = self.read_bytes(len)?;
        let text = std::str::from_utf8(raw)
            .map_err(|e| StoreError::InvalidEncoding(format!("text is not UTF-8: {e}")))?;
        Ok(Some(text.to_string()))
    }

    pub fn read_timestamp(&mut self) -> Result<NaiveDateTime, StoreError> {
        self.ensure(TIMESTAMP_BYTES, "timestamp")?;
        let mut peek = self.buf;
        let mut fields = [0i32; 7];
        for field in &mut fields {
            *field = peek.get_i32();
        }
        let value = timestamp_from_fields(fields)?;
        self.buf = peek;
        Ok(value)
    }

    pub fn read_reference(&mut self) -> Result<Option<ResourceReference>, StoreError> {
        let start = self.clone();
        let result = self.read_reference_inner();
        if result.is_err() {
            *self = start;
        }
        result
    }

    fn read_reference_inner(&mut self) -> Result<Option<ResourceReference>, StoreError> {
        let Some(origin) = self.read_text()? else {
            return Ok(None);
        };
        let id = self.read_i64()?;
        ResourceReference::new(origin, id)
            .map(Some)
            .map_err(|_| StoreError::InvalidEncoding("reference with an empty origin path".into()))
    }

    /// Fail if unread bytes are left over.
    pub fn finish(self) -> Result<(), StoreError> {
        if self.has_remaining() {
            return Err(StoreError::InvalidEncoding(format!(
                "{} trailing bytes after offset {}",
                self.remaining(),
                self.position()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sequential writer
// ---------------------------------------------------------------------------

/// Growable buffer that appends fields in codec layout.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_slice(&encode_bool(value));
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64(value);
        self
    }

    pub fn put_f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64(value);
        self
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Append a length-prefixed text, or the absent marker for `None`.
    pub fn put_text(&mut self, value: Option<&str>) -> Result<&mut Self, StoreError> {
        match value {
            Some(text) => {
                let len = i32::try_from(text.len()).map_err(|_| {
                    StoreError::InvalidEncoding(format!(
                        "text of {} bytes exceeds the i32 length prefix",
                        text.len()
                    ))
                })?;
                self.buf.put_i32(len);
                self.buf.put_slice(text.as_bytes());
            }
            None => self.buf.put_i32(ABSENT_LENGTH),
        }
        Ok(self)
    }

    pub fn put_timestamp(&mut self, value: &NaiveDateTime) -> &mut Self {
        self.buf.put_slice(&encode_timestamp(value));
        self
    }

    /// Append a durable reference; the id is written only for `Some`.
    pub fn put_reference(
        &mut self,
        reference: Option<&ResourceReference>,
    ) -> Result<&mut Self, StoreError> {
        match reference {
            Some(reference) => {
                self.put_text(Some(reference.origin()))?;
                self.buf.put_i64(reference.id());
            }
            None => {
                self.put_text(None)?;
            }
        }
        Ok(self)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
