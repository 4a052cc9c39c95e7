//! Request definitions
//!
//! Operation codes and the typed payloads carried by requests.

use bytes::{BufMut, Bytes, BytesMut};

use crate::binary::codec::{put_len, put_string};
use crate::binary::{encode_value, BinaryType, Value, WireReader};
use crate::error::{ClientError, Result};

/// Operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum OpCode {
    CacheGet = 1000,
    CachePut = 1001,
    CachePutAll = 1004,
    CacheCreateWithName = 1051,
    CacheGetOrCreateWithName = 1052,
    CacheDestroy = 1056,
    GetBinaryType = 3002,
    PutBinaryType = 3003,
}

impl OpCode {
    pub fn from_i16(code: i16) -> Option<Self> {
        let op = match code {
            1000 => OpCode::CacheGet,
            1001 => OpCode::CachePut,
            1004 => OpCode::CachePutAll,
            1051 => OpCode::CacheCreateWithName,
            1052 => OpCode::CacheGetOrCreateWithName,
            1056 => OpCode::CacheDestroy,
            3002 => OpCode::GetBinaryType,
            3003 => OpCode::PutBinaryType,
            _ => return None,
        };
        Some(op)
    }
}

/// A framed request: operation code, request id and raw payload
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: i64,
    pub op_code: OpCode,
    pub payload: Bytes,
}

/// Flags byte sent with every cache operation (no flags defined yet)
const CACHE_FLAGS: u8 = 0;

/// A decoded operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CacheGet { cache_id: i32, key: Value },
    CachePut { cache_id: i32, key: Value, value: Value },
    CachePutAll { cache_id: i32, entries: Vec<(Value, Value)> },
    CacheCreate { name: String },
    CacheGetOrCreate { name: String },
    CacheDestroy { cache_id: i32 },
    GetBinaryType { type_id: i32 },
    PutBinaryType { binary_type: BinaryType },
}

impl Operation {
    pub fn op_code(&self) -> OpCode {
        match self {
            Operation::CacheGet { .. } => OpCode::CacheGet,
            Operation::CachePut { .. } => OpCode::CachePut,
            Operation::CachePutAll { .. } => OpCode::CachePutAll,
            Operation::CacheCreate { .. } => OpCode::CacheCreateWithName,
            Operation::CacheGetOrCreate { .. } => OpCode::CacheGetOrCreateWithName,
            Operation::CacheDestroy { .. } => OpCode::CacheDestroy,
            Operation::GetBinaryType { .. } => OpCode::GetBinaryType,
            Operation::PutBinaryType { .. } => OpCode::PutBinaryType,
        }
    }

    /// Encode the payload for this operation
    ///
    /// Cache operations: `cache_id (4) + flags (1) + values`.
    pub fn encode_payload(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Operation::CacheGet { cache_id, key } => {
                buf.put_i32_le(*cache_id);
                buf.put_u8(CACHE_FLAGS);
                encode_value(key, &mut buf)?;
            }
            Operation::CachePut {
                cache_id,
                key,
                value,
            } => {
                buf.put_i32_le(*cache_id);
                buf.put_u8(CACHE_FLAGS);
                encode_value(key, &mut buf)?;
                encode_value(value, &mut buf)?;
            }
            Operation::CachePutAll { cache_id, entries } => {
                buf.put_i32_le(*cache_id);
                buf.put_u8(CACHE_FLAGS);
                put_len(&mut buf, entries.len())?;
                for (key, value) in entries {
                    encode_value(key, &mut buf)?;
                    encode_value(value, &mut buf)?;
                }
            }
            Operation::CacheCreate { name } | Operation::CacheGetOrCreate { name } => {
                put_string(&mut buf, name)?;
            }
            Operation::CacheDestroy { cache_id } => buf.put_i32_le(*cache_id),
            Operation::GetBinaryType { type_id } => buf.put_i32_le(*type_id),
            Operation::PutBinaryType { binary_type } => {
                let bytes = binary_type.to_bytes()?;
                put_len(&mut buf, bytes.len())?;
                buf.put_slice(&bytes);
            }
        }
        Ok(buf.freeze())
    }

    /// Build a request frame body for this operation
    pub fn to_request(&self, request_id: i64) -> Result<Request> {
        Ok(Request {
            request_id,
            op_code: self.op_code(),
            payload: self.encode_payload()?,
        })
    }

    /// Decode an operation payload
    pub fn decode(op_code: OpCode, payload: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(payload);

        let operation = match op_code {
            OpCode::CacheGet => {
                let cache_id = read_cache_header(&mut reader)?;
                Operation::CacheGet {
                    cache_id,
                    key: reader.value()?,
                }
            }
            OpCode::CachePut => {
                let cache_id = read_cache_header(&mut reader)?;
                let key = reader.value()?;
                let value = reader.value()?;
                Operation::CachePut {
                    cache_id,
                    key,
                    value,
                }
            }
            OpCode::CachePutAll => {
                let cache_id = read_cache_header(&mut reader)?;
                let count = reader.length("entry count")?;
                // Each entry is at least two type codes
                let mut entries = Vec::with_capacity(count.min(reader.remaining() / 2));
                for _ in 0..count {
                    let key = reader.value()?;
                    let value = reader.value()?;
                    entries.push((key, value));
                }
                Operation::CachePutAll { cache_id, entries }
            }
            OpCode::CacheCreateWithName => Operation::CacheCreate {
                name: reader.string("cache name")?,
            },
            OpCode::CacheGetOrCreateWithName => Operation::CacheGetOrCreate {
                name: reader.string("cache name")?,
            },
            OpCode::CacheDestroy => Operation::CacheDestroy {
                cache_id: reader.i32("cache id")?,
            },
            OpCode::GetBinaryType => Operation::GetBinaryType {
                type_id: reader.i32("type id")?,
            },
            OpCode::PutBinaryType => {
                let len = reader.length("binary type")?;
                let bytes = reader.take(len, "binary type")?;
                Operation::PutBinaryType {
                    binary_type: BinaryType::from_bytes(bytes)?,
                }
            }
        };

        if !reader.is_empty() {
            return Err(ClientError::Decode(format!(
                "{:?} payload has {} unexpected trailing bytes",
                op_code,
                reader.remaining()
            )));
        }

        Ok(operation)
    }
}

fn read_cache_header(reader: &mut WireReader<'_>) -> Result<i32> {
    let cache_id = reader.i32("cache id")?;
    let _flags = reader.u8("cache flags")?;
    Ok(cache_id)
}
