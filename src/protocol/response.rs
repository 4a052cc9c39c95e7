//! Response definitions
//!
//! Represents responses to clients.

use bytes::{BufMut, Bytes, BytesMut};

use crate::binary::codec::put_len;
use crate::binary::{BinaryType, WireReader};
use crate::error::{ClientError, Result};

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failed,
    KeyNotFound,
    CacheNotFound,
    CacheExists,
    SchemaConflict,

    /// A code this client does not know
    Other(i32),
}

impl Status {
    pub fn code(&self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Failed => 1,
            Status::KeyNotFound => 2,
            Status::CacheNotFound => 1000,
            Status::CacheExists => 1001,
            Status::SchemaConflict => 2000,
            Status::Other(code) => *code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Success,
            1 => Status::Failed,
            2 => Status::KeyNotFound,
            1000 => Status::CacheNotFound,
            1001 => Status::CacheExists,
            2000 => Status::SchemaConflict,
            other => Status::Other(other),
        }
    }

    /// Status reported for a failed operation
    pub fn for_error(err: &ClientError) -> Self {
        match err {
            ClientError::NotFound(_) => Status::KeyNotFound,
            ClientError::CacheNotFound(_) => Status::CacheNotFound,
            ClientError::CacheExists(_) => Status::CacheExists,
            ClientError::SchemaMismatch(_) => Status::SchemaConflict,
            _ => Status::Failed,
        }
    }
}

/// A response to a request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request this answers
    pub request_id: i64,

    pub status: Status,

    /// Error message, present for every non-success status
    pub error: Option<String>,

    pub payload: Bytes,
}

impl Response {
    /// Create a success response with a payload
    pub fn ok(request_id: i64, payload: Bytes) -> Self {
        Self {
            request_id,
            status: Status::Success,
            error: None,
            payload,
        }
    }

    /// Create an error response
    pub fn error(request_id: i64, status: Status, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status,
            error: Some(message.into()),
            payload: Bytes::new(),
        }
    }

    /// Create an error response from a server-side failure
    pub fn from_error(request_id: i64, err: &ClientError) -> Self {
        let message = match err {
            ClientError::NotFound(m)
            | ClientError::CacheNotFound(m)
            | ClientError::CacheExists(m)
            | ClientError::SchemaMismatch(m) => m.clone(),
            other => other.to_string(),
        };
        Self::error(request_id, Status::for_error(err), message)
    }

    /// Payload of a successful response, or the matching client error
    pub fn into_payload(self) -> Result<Bytes> {
        let message = self.error.unwrap_or_default();
        match self.status {
            Status::Success => Ok(self.payload),
            Status::KeyNotFound => Err(ClientError::NotFound(message)),
            Status::CacheNotFound => Err(ClientError::CacheNotFound(message)),
            Status::CacheExists => Err(ClientError::CacheExists(message)),
            Status::SchemaConflict => Err(ClientError::SchemaMismatch(message)),
            status => Err(ClientError::Server {
                status: status.code(),
                message,
            }),
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Payload of a `GetBinaryType` response
///
/// ```text
/// Found (1) | [Len (4) | bincode(BinaryType)]
/// ```
pub fn encode_binary_type_payload(binary_type: Option<&BinaryType>) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    match binary_type {
        Some(binary_type) => {
            let bytes = binary_type.to_bytes()?;
            buf.put_u8(1);
            put_len(&mut buf, bytes.len())?;
            buf.put_slice(&bytes);
        }
        None => buf.put_u8(0),
    }
    Ok(buf.freeze())
}

pub fn decode_binary_type_payload(payload: &[u8]) -> Result<Option<BinaryType>> {
    let mut reader = WireReader::new(payload);
    match reader.u8("binary type flag")? {
        0 => Ok(None),
        1 => {
            let len = reader.length("binary type")?;
            let binary_type = BinaryType::from_bytes(reader.take(len, "binary type")?)?;
            Ok(Some(binary_type))
        }
        other => Err(ClientError::Decode(format!(
            "invalid binary type flag {}",
            other
        ))),
    }
}
