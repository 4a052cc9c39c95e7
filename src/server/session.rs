//! Session Handler
//!
//! Serves one client connection: handshake first, then a request loop.

use std::io::{self, BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::protocol::{
    decode_handshake, decode_request, encode_handshake_response, peek_request_id, read_frame,
    write_frame, write_response, HandshakeResponse, Operation, ProtocolVersion, Request, Response,
    Status,
};

use super::engine::Engine;

/// Handles a single client session
pub struct Session {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    engine: Arc<Engine>,

    max_frame_size: usize,

    /// Peer address for logging
    peer_addr: String,
}

impl Session {
    /// Create a new session handler
    ///
    /// Sets up buffered I/O and configures the read timeout
    pub fn new(
        stream: TcpStream,
        engine: Arc<Engine>,
        max_frame_size: usize,
        read_timeout_ms: u64,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;
        if read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(read_timeout_ms)))?;
        }

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            engine,
            max_frame_size,
            peer_addr,
        })
    }

    /// Serve the session (blocking until closed)
    ///
    /// Returns when the client disconnects, fails the handshake or an I/O
    /// error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!(peer = %self.peer_addr, "session started");

        match self.handshake() {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) if is_disconnect(&e) => return Ok(()),
            Err(e) => return Err(e),
        }

        loop {
            let frame = match read_frame(&mut self.reader, self.max_frame_size) {
                Ok(frame) => frame,
                Err(e) if is_disconnect(&e) => {
                    tracing::debug!(peer = %self.peer_addr, "client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    // Framing is lost; nothing more can be read reliably
                    tracing::warn!(peer = %self.peer_addr, error = %e, "closing session");
                    return Err(e);
                }
            };

            let response = match decode_request(&frame) {
                Ok(request) => self.execute(request),
                Err(e) => match peek_request_id(&frame) {
                    Some(request_id) => {
                        tracing::warn!(peer = %self.peer_addr, request_id, error = %e, "bad request");
                        Response::error(request_id, Status::Failed, e.to_string())
                    }
                    None => {
                        tracing::warn!(peer = %self.peer_addr, error = %e, "dropping malformed request");
                        continue;
                    }
                },
            };

            if let Err(e) = write_response(&mut self.writer, &response) {
                if is_disconnect(&e) {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        "client disconnected before response could be sent"
                    );
                    return Ok(());
                }
                tracing::warn!(peer = %self.peer_addr, error = %e, "write failed");
                return Err(e);
            }
        }
    }

    /// Read the handshake and answer it
    ///
    /// Returns `false` when the client was rejected.
    fn handshake(&mut self) -> Result<bool> {
        let frame = read_frame(&mut self.reader, self.max_frame_size)?;

        let rejection = match decode_handshake(&frame) {
            Ok(handshake) if handshake.version.major == ProtocolVersion::CURRENT.major => None,
            Ok(handshake) => Some(format!(
                "unsupported protocol version {}",
                handshake.version
            )),
            Err(e) => Some(e.to_string()),
        };

        let response = match &rejection {
            None => HandshakeResponse::Accepted,
            Some(message) => HandshakeResponse::Rejected {
                server_version: ProtocolVersion::CURRENT,
                message: message.clone(),
            },
        };
        write_frame(&mut self.writer, &encode_handshake_response(&response)?)?;

        match rejection {
            None => {
                tracing::debug!(peer = %self.peer_addr, "handshake accepted");
                Ok(true)
            }
            Some(message) => {
                tracing::warn!(peer = %self.peer_addr, %message, "handshake rejected");
                Ok(false)
            }
        }
    }

    /// Execute a request and build its response
    fn execute(&self, request: Request) -> Response {
        let request_id = request.request_id;
        tracing::trace!(peer = %self.peer_addr, request_id, op = ?request.op_code, "request");

        let result = Operation::decode(request.op_code, &request.payload)
            .and_then(|operation| self.engine.execute(operation));

        match result {
            Ok(payload) => Response::ok(request_id, payload),
            Err(e) => Response::from_error(request_id, &e),
        }
    }
}

/// The peer went away or stayed idle past the read timeout
fn is_disconnect(err: &ClientError) -> bool {
    match err {
        ClientError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut
        ),
        _ => false,
    }
}
