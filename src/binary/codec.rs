//! Binary value codec
//!
//! Encoding and decoding of values and complex objects.
//!
//! ## Value Format
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Type (1) │   Payload (type specific)   │
//! └──────────┴─────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Strings and byte arrays are prefixed with
//! an `i32` length.
//!
//! ### Complex Object Payload
//! ```text
//! ┌────────┬──────────┬───────────┬─────────────┬───────────┬──────────┬────────┐
//! │ Ver(1) │ Flags(2) │ TypeId(4) │ SchemaId(4) │ Fields(4) │ BodyLen(4)│  Body  │
//! └────────┴──────────┴───────────┴─────────────┴───────────┴──────────┴────────┘
//! ```
//!
//! Body entries:
//! ```text
//! ┌────────────┬──────────┬─────────┬─────────────────┐
//! │ FieldId(4) │ Type (1) │ Len (4) │  Value payload  │
//! └────────────┴──────────┴─────────┴─────────────────┘
//! ```
//!
//! Every field is length-prefixed, so a reader can skip over type codes it
//! does not know, and bytes left in the body after the declared fields are
//! ignored.

use std::collections::HashSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::object::{BinaryField, BinaryObject};
use super::types::TypeCode;
use super::value::Value;
use crate::error::{ClientError, Result};

/// Complex object layout version
pub const OBJECT_VERSION: u8 = 1;

/// Object header size after the type code
pub const OBJECT_HEADER_SIZE: usize = 1 + 2 + 4 + 4 + 4 + 4;

/// Field entry header size: id + type code + length
pub const FIELD_HEADER_SIZE: usize = 4 + 1 + 4;

/// Deepest allowed nesting of complex objects
pub const MAX_DEPTH: usize = 64;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value with its type code
pub fn encode_value(value: &Value, buf: &mut BytesMut) -> Result<()> {
    buf.put_u8(value.type_code());
    encode_payload(value, buf, 0)
}

/// Encode a value into a fresh buffer
pub fn to_bytes(value: &Value) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    encode_value(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Write an `i32` length prefix
pub fn put_len(buf: &mut BytesMut, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| ClientError::Encode(format!("length {} exceeds i32::MAX", len)))?;
    buf.put_i32_le(len);
    Ok(())
}

/// Write a length-prefixed UTF-8 string
pub fn put_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    put_len(buf, s.len())?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn encode_payload(value: &Value, buf: &mut BytesMut, depth: usize) -> Result<()> {
    match value {
        Value::Null => {}
        Value::Byte(v) => buf.put_i8(*v),
        Value::Short(v) => buf.put_i16_le(*v),
        Value::Int(v) => buf.put_i32_le(*v),
        Value::Long(v) => buf.put_i64_le(*v),
        Value::Float(v) => buf.put_f32_le(*v),
        Value::Double(v) => buf.put_f64_le(*v),
        Value::Char(c) => {
            let code = u32::from(*c);
            if code > 0xFFFF {
                return Err(ClientError::Encode(format!(
                    "char U+{:X} is outside the Basic Multilingual Plane",
                    code
                )));
            }
            buf.put_u16_le(code as u16);
        }
        Value::Bool(v) => buf.put_u8(u8::from(*v)),
        Value::String(s) => put_string(buf, s)?,
        Value::ByteArray(bytes) => {
            put_len(buf, bytes.len())?;
            buf.put_slice(bytes);
        }
        Value::Object(object) => encode_object(object, buf, depth)?,
        Value::Raw { bytes, .. } => buf.put_slice(bytes),
    }
    Ok(())
}

fn encode_object(object: &BinaryObject, buf: &mut BytesMut, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(ClientError::Encode(format!(
            "objects nested deeper than {} levels",
            MAX_DEPTH
        )));
    }

    let mut body = BytesMut::new();
    let mut schema = crc32fast::Hasher::new();

    for field in object.fields() {
        body.put_i32_le(field.id());
        schema.update(&field.id().to_le_bytes());
        body.put_u8(field.value().type_code());

        // Length is patched in once the payload size is known
        let len_pos = body.len();
        body.put_i32_le(0);
        let start = body.len();
        encode_payload(field.value(), &mut body, depth + 1)?;
        let len = i32::try_from(body.len() - start)
            .map_err(|_| ClientError::Encode("field value too large".to_string()))?;
        body[len_pos..len_pos + 4].copy_from_slice(&len.to_le_bytes());
    }

    buf.put_u8(OBJECT_VERSION);
    buf.put_u16_le(0);
    buf.put_i32_le(object.type_id());
    buf.put_i32_le(schema.finalize() as i32);
    put_len(buf, object.field_count())?;
    put_len(buf, body.len())?;
    buf.put_slice(&body);
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a single value that must span the whole input
pub fn from_bytes(bytes: &[u8]) -> Result<Value> {
    let mut reader = WireReader::new(bytes);
    let value = reader.value()?;
    if !reader.is_empty() {
        return Err(ClientError::Decode(format!(
            "{} trailing bytes after value",
            reader.remaining()
        )));
    }
    Ok(value)
}

/// Bounds-checked little-endian reader over a byte slice
///
/// Every read fails with `ClientError::Decode` instead of panicking when
/// the input is short.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Unread bytes
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn ensure(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.len() < n {
            return Err(ClientError::Decode(format!(
                "truncated {}: need {} bytes, have {}",
                what,
                n,
                self.buf.len()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        self.ensure(1, what)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self, what: &str) -> Result<u16> {
        self.ensure(2, what)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn i16(&mut self, what: &str) -> Result<i16> {
        self.ensure(2, what)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn i32(&mut self, what: &str) -> Result<i32> {
        self.ensure(4, what)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn i64(&mut self, what: &str) -> Result<i64> {
        self.ensure(8, what)?;
        Ok(self.buf.get_i64_le())
    }

    /// Read a non-negative `i32` length
    pub fn length(&mut self, what: &str) -> Result<usize> {
        let len = self.i32(what)?;
        usize::try_from(len)
            .map_err(|_| ClientError::Decode(format!("negative {} length: {}", what, len)))
    }

    /// Split off the next `n` bytes
    pub fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        self.ensure(n, what)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn string(&mut self, what: &str) -> Result<String> {
        let len = self.length(what)?;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ClientError::Decode(format!("invalid UTF-8 in {}: {}", what, e)))
    }

    /// Read a type code and its payload
    pub fn value(&mut self) -> Result<Value> {
        let code = self.u8("type code")?;
        let type_code = TypeCode::from_u8(code)
            .ok_or_else(|| ClientError::Decode(format!("unknown type code {}", code)))?;
        self.payload(type_code, 0)
    }

    fn payload(&mut self, type_code: TypeCode, depth: usize) -> Result<Value> {
        let value = match type_code {
            TypeCode::Null => Value::Null,
            TypeCode::Byte => {
                self.ensure(1, "byte")?;
                Value::Byte(self.buf.get_i8())
            }
            TypeCode::Short => Value::Short(self.i16("short")?),
            TypeCode::Int => Value::Int(self.i32("int")?),
            TypeCode::Long => Value::Long(self.i64("long")?),
            TypeCode::Float => {
                self.ensure(4, "float")?;
                Value::Float(self.buf.get_f32_le())
            }
            TypeCode::Double => {
                self.ensure(8, "double")?;
                Value::Double(self.buf.get_f64_le())
            }
            TypeCode::Char => {
                let unit = self.u16("char")?;
                let c = char::from_u32(u32::from(unit)).ok_or_else(|| {
                    ClientError::Decode(format!("char 0x{:04x} is a lone surrogate", unit))
                })?;
                Value::Char(c)
            }
            TypeCode::Bool => match self.u8("bool")? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(ClientError::Decode(format!("invalid bool byte 0x{:02x}", other)))
                }
            },
            TypeCode::String => Value::String(self.string("string")?),
            TypeCode::ByteArray => {
                let len = self.length("byte array")?;
                Value::ByteArray(self.take(len, "byte array")?.to_vec())
            }
            TypeCode::Complex => Value::Object(self.object(depth)?),
        };
        Ok(value)
    }

    fn object(&mut self, depth: usize) -> Result<BinaryObject> {
        if depth >= MAX_DEPTH {
            return Err(ClientError::Decode(format!(
                "objects nested deeper than {} levels",
                MAX_DEPTH
            )));
        }

        self.ensure(OBJECT_HEADER_SIZE, "object header")?;
        let version = self.u8("object version")?;
        if version != OBJECT_VERSION {
            return Err(ClientError::Decode(format!(
                "unsupported object version {}",
                version
            )));
        }
        let _flags = self.u16("object flags")?;
        let type_id = self.i32("type id")?;
        let _schema_id = self.i32("schema id")?;
        let field_count = self.length("field count")?;
        let body_len = self.length("object body")?;

        let mut body = WireReader::new(self.take(body_len, "object body")?);
        let capacity = field_count.min(body_len / FIELD_HEADER_SIZE);
        let mut fields: Vec<BinaryField> = Vec::with_capacity(capacity);
        let mut seen: HashSet<i32> = HashSet::with_capacity(capacity);

        for _ in 0..field_count {
            let id = body.i32("field id")?;
            let code = body.u8("field type")?;
            let len = body.length("field")?;
            let raw = body.take(len, "field value")?;

            if !seen.insert(id) {
                return Err(ClientError::Decode(format!("duplicate field id {}", id)));
            }

            let value = match TypeCode::from_u8(code) {
                Some(type_code) => {
                    let mut field = WireReader::new(raw);
                    let value = field.payload(type_code, depth + 1)?;
                    if !field.is_empty() {
                        return Err(ClientError::Decode(format!(
                            "field {} declares {} bytes but its {} value used {}",
                            id,
                            len,
                            type_code,
                            len - field.remaining()
                        )));
                    }
                    value
                }
                None => Value::Raw {
                    type_code: code,
                    bytes: Bytes::copy_from_slice(raw),
                },
            };

            fields.push(BinaryField::new(id, None, value));
        }

        if !body.is_empty() {
            tracing::trace!(type_id, trailing = body.remaining(), "skipping trailing object bytes");
        }

        Ok(BinaryObject::from_parts(type_id, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_layout_is_little_endian() {
        let bytes = to_bytes(&Value::Int(1)).unwrap();
        assert_eq!(&bytes[..], &[TypeCode::Int as u8, 1, 0, 0, 0]);
    }

    #[test]
    fn test_string_layout() {
        let bytes = to_bytes(&Value::from("hi")).unwrap();
        assert_eq!(&bytes[..], &[TypeCode::String as u8, 2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_reader_rejects_negative_length() {
        let mut reader = WireReader::new(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(reader.length("string"), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_from_bytes_rejects_trailing_bytes() {
        let mut bytes = to_bytes(&Value::Bool(true)).unwrap().to_vec();
        bytes.push(0);
        assert!(matches!(from_bytes(&bytes), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_non_bmp_char_is_encode_error() {
        assert!(matches!(
            to_bytes(&Value::Char('\u{1F600}')),
            Err(ClientError::Encode(_))
        ));
    }
}
