//! Handshake messages
//!
//! ```text
//! Request:  Len (4) | Code (1) | Major (2) | Minor (2) | Patch (2) | Client (1)
//! Accepted: Len (4) | 1 (1)
//! Rejected: Len (4) | 0 (1) | Major (2) | Minor (2) | Patch (2) | Error
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::codec::frame;
use crate::binary::codec::put_string;
use crate::binary::WireReader;
use crate::error::{ClientError, Result};

/// First byte of every handshake request
pub const HANDSHAKE_CODE: u8 = 1;

/// Client type code for this thin client
pub const CLIENT_CODE: u8 = 2;

/// Protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: i16,
    pub minor: i16,
    pub patch: i16,
}

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

    pub const fn new(major: i16, minor: i16, patch: i16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_i16_le(self.major);
        buf.put_i16_le(self.minor);
        buf.put_i16_le(self.patch);
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            major: reader.i16("version major")?,
            minor: reader.i16("version minor")?,
            patch: reader.i16("version patch")?,
        })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Handshake sent by a client right after connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub version: ProtocolVersion,
    pub client_code: u8,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::CURRENT,
            client_code: CLIENT_CODE,
        }
    }
}

/// Server answer to a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResponse {
    Accepted,
    Rejected {
        server_version: ProtocolVersion,
        message: String,
    },
}

pub fn encode_handshake(handshake: &Handshake) -> Result<Bytes> {
    let mut body = BytesMut::with_capacity(8);
    body.put_u8(HANDSHAKE_CODE);
    handshake.version.write(&mut body);
    body.put_u8(handshake.client_code);
    frame(&body)
}

/// Decode a handshake from a frame body
pub fn decode_handshake(frame: &[u8]) -> Result<Handshake> {
    let mut reader = WireReader::new(frame);
    let code = reader.u8("handshake code")?;
    if code != HANDSHAKE_CODE {
        return Err(ClientError::Decode(format!(
            "expected handshake code {}, got {}",
            HANDSHAKE_CODE, code
        )));
    }
    let version = ProtocolVersion::read(&mut reader)?;
    let client_code = reader.u8("client code")?;
    Ok(Handshake {
        version,
        client_code,
    })
}

pub fn encode_handshake_response(response: &HandshakeResponse) -> Result<Bytes> {
    let mut body = BytesMut::new();
    match response {
        HandshakeResponse::Accepted => body.put_u8(1),
        HandshakeResponse::Rejected {
            server_version,
            message,
        } => {
            body.put_u8(0);
            server_version.write(&mut body);
            put_string(&mut body, message)?;
        }
    }
    frame(&body)
}

/// Decode a handshake response from a frame body
pub fn decode_handshake_response(frame: &[u8]) -> Result<HandshakeResponse> {
    let mut reader = WireReader::new(frame);
    match reader.u8("handshake status")? {
        1 => Ok(HandshakeResponse::Accepted),
        0 => {
            let server_version = ProtocolVersion::read(&mut reader)?;
            let message = reader.string("handshake error")?;
            Ok(HandshakeResponse::Rejected {
                server_version,
                message,
            })
        }
        other => Err(ClientError::Decode(format!(
            "invalid handshake status {}",
            other
        ))),
    }
}
