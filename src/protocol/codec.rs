//! Protocol codec
//!
//! Framing for handshakes, requests and responses.
//!
//! ## Wire Format
//!
//! Every frame starts with an `i32` little-endian length of the bytes that
//! follow it.
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬───────────────┬─────────────────┐
//! │ Len (4)  │  Op (2)  │ RequestId (8) │     Payload     │
//! └──────────┴──────────┴───────────────┴─────────────────┘
//! ```
//!
//! ### Response Format
//! ```text
//! ┌──────────┬───────────────┬────────────┬───────────────────┬───────────┐
//! │ Len (4)  │ RequestId (8) │ Status (4) │ Error (if != 0)   │  Payload  │
//! └──────────┴───────────────┴────────────┴───────────────────┴───────────┘
//! ```

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::{OpCode, Request, Response, Status};
use crate::binary::codec::put_string;
use crate::binary::WireReader;
use crate::error::{ClientError, Result};

/// Length prefix size
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Request header size after the length prefix: op code (2) + request id (8)
pub const REQUEST_HEADER_SIZE: usize = 2 + 8;

/// Response header size after the length prefix: request id (8) + status (4)
pub const RESPONSE_HEADER_SIZE: usize = 8 + 4;

/// Prefix a frame body with its length
pub(crate) fn frame(body: &[u8]) -> Result<Bytes> {
    let len = i32::try_from(body.len())
        .map_err(|_| ClientError::Encode(format!("frame of {} bytes is too large", body.len())))?;
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.put_i32_le(len);
    buf.put_slice(body);
    Ok(buf.freeze())
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request into a length-prefixed frame
pub fn encode_request(request: &Request) -> Result<Bytes> {
    let mut body = BytesMut::with_capacity(REQUEST_HEADER_SIZE + request.payload.len());
    body.put_i16_le(request.op_code as i16);
    body.put_i64_le(request.request_id);
    body.put_slice(&request.payload);
    frame(&body)
}

/// Decode a request from a frame body (length prefix already stripped)
pub fn decode_request(frame: &[u8]) -> Result<Request> {
    let mut reader = WireReader::new(frame);
    let code = reader.i16("op code")?;
    let request_id = reader.i64("request id")?;
    let op_code = OpCode::from_i16(code)
        .ok_or_else(|| ClientError::Decode(format!("unknown op code {}", code)))?;

    Ok(Request {
        request_id,
        op_code,
        payload: Bytes::copy_from_slice(reader.rest()),
    })
}

/// Request id of a request frame, if the header is intact
pub fn peek_request_id(frame: &[u8]) -> Option<i64> {
    let mut reader = WireReader::new(frame);
    reader.i16("op code").ok()?;
    reader.i64("request id").ok()
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response into a length-prefixed frame
pub fn encode_response(response: &Response) -> Result<Bytes> {
    let mut body = BytesMut::with_capacity(RESPONSE_HEADER_SIZE + response.payload.len());
    body.put_i64_le(response.request_id);
    body.put_i32_le(response.status.code());
    if response.status != Status::Success {
        put_string(&mut body, response.error.as_deref().unwrap_or(""))?;
    }
    body.put_slice(&response.payload);
    frame(&body)
}

/// Decode a response from a frame body (length prefix already stripped)
pub fn decode_response(frame: &[u8]) -> Result<Response> {
    let mut reader = WireReader::new(frame);
    let request_id = reader.i64("request id")?;
    let status = Status::from_code(reader.i32("status")?);
    let error = if status == Status::Success {
        None
    } else {
        Some(reader.string("error message")?)
    };

    Ok(Response {
        request_id,
        status,
        error,
        payload: Bytes::copy_from_slice(reader.rest()),
    })
}

/// Request id of a response frame, if the header is intact
pub fn peek_response_id(frame: &[u8]) -> Option<i64> {
    WireReader::new(frame).i64("request id").ok()
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one frame body from a stream
///
/// Blocks until the whole frame has arrived or an error occurs.
pub fn read_frame<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Bytes> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix)?;

    let len = i32::from_le_bytes(prefix);
    if len < 0 {
        return Err(ClientError::Decode(format!("negative frame length {}", len)));
    }
    let len = len as usize;
    if len > max_frame_size {
        return Err(ClientError::Decode(format!(
            "frame too large: {} bytes (max {})",
            len, max_frame_size
        )));
    }

    let mut body = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut body)?;
    }
    Ok(Bytes::from(body))
}

/// Write an already-framed message to a stream and flush it
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    Ok(())
}

/// Read and decode a request from a stream
pub fn read_request<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Request> {
    let frame = read_frame(reader, max_frame_size)?;
    decode_request(&frame)
}

/// Encode and write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    write_frame(writer, &encode_response(response)?)
}
