//! Client Connection
//!
//! One TCP connection to a server, shared by every cache handle of a client.
//!
//! ## Threads
//! - Callers write request frames under a writer lock and then block on a
//!   per-request channel
//! - A reader thread decodes response frames and routes each one to its
//!   waiter by request id, so responses may arrive in any order
//!
//! When the transport fails every waiting request is completed with
//! `ConnectionClosed` and the state moves to `Disconnected` with a reason.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::state::{ConnectionState, StateNotifier};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{
    decode_handshake_response, decode_response, encode_handshake, encode_request,
    peek_response_id, read_frame, write_frame, Handshake, HandshakeResponse, Operation, Response,
    LENGTH_PREFIX_SIZE,
};

// =============================================================================
// Pending Requests
// =============================================================================

type Completion = Result<Response>;

#[derive(Default)]
struct PendingInner {
    closed: bool,
    waiters: HashMap<i64, Sender<Completion>>,
}

/// Requests written to the wire and still waiting for a response
#[derive(Default)]
struct PendingRequests {
    inner: Mutex<PendingInner>,
}

impl PendingRequests {
    fn register(&self, request_id: i64) -> Result<Receiver<Completion>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ClientError::ConnectionClosed);
        }
        let (tx, rx) = bounded(1);
        inner.waiters.insert(request_id, tx);
        Ok(rx)
    }

    fn complete(&self, request_id: i64, completion: Completion) {
        let waiter = self.inner.lock().waiters.remove(&request_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(completion);
            }
            None => tracing::debug!(request_id, "dropping response for unknown request"),
        }
    }

    fn remove(&self, request_id: i64) {
        self.inner.lock().waiters.remove(&request_id);
    }

    /// Refuse new requests and release every waiter
    ///
    /// Dropping the senders wakes the waiters with a disconnected channel.
    /// Returns the number of cancelled requests, or `None` if already closed.
    fn close_all(&self) -> Option<usize> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.closed = true;
        let cancelled = inner.waiters.len();
        inner.waiters.clear();
        Some(cancelled)
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A live connection with a background response reader
pub struct Connection {
    endpoint: String,

    /// Kept for shutting the socket down from any thread
    stream: TcpStream,

    writer: Mutex<BufWriter<TcpStream>>,

    pending: Arc<PendingRequests>,

    next_request_id: AtomicI64,

    request_timeout: Option<Duration>,

    /// Largest request body sent; bigger requests fail without touching the socket
    max_frame_size: usize,

    /// Set once the application asked to close
    closing: Arc<AtomicBool>,

    reader: Mutex<Option<JoinHandle<()>>>,

    notifier: Arc<StateNotifier>,
}

impl Connection {
    /// Connect, handshake and start the reader thread
    ///
    /// Moves the state through `Connecting` to `Connected`. Fails with
    /// `InvalidState` when the notifier is not `Disconnected`.
    pub fn open(config: &ClientConfig, notifier: Arc<StateNotifier>) -> Result<Self> {
        if !notifier.transition(
            &[ConnectionState::Disconnected],
            ConnectionState::Connecting,
            None,
        ) {
            return Err(ClientError::InvalidState(format!(
                "cannot connect while {}",
                notifier.state()
            )));
        }

        let established = Self::establish(config).and_then(|stream| {
            let read_stream = stream.try_clone()?;
            let write_stream = stream.try_clone()?;
            Ok((stream, read_stream, write_stream))
        });

        match established {
            Ok(streams) => Self::start(config, streams, notifier),
            Err(err) => {
                notifier.transition(
                    &[ConnectionState::Connecting],
                    ConnectionState::Disconnected,
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// TCP connect plus handshake
    fn establish(config: &ClientConfig) -> Result<TcpStream> {
        let timeout = config.connect_timeout();
        let mut stream = connect_any(&config.endpoint, timeout)?;
        stream.set_nodelay(config.tcp_nodelay)?;

        let handshake_timeout = if timeout.is_zero() { None } else { Some(timeout) };
        stream.set_read_timeout(handshake_timeout)?;
        stream.set_write_timeout(handshake_timeout)?;

        write_frame(&mut stream, &encode_handshake(&Handshake::default())?)?;
        let reply = read_frame(&mut stream, config.max_frame_size).map_err(|err| {
            ClientError::Connection(format!("no handshake reply from {}: {}", config.endpoint, err))
        })?;

        match decode_handshake_response(&reply)? {
            HandshakeResponse::Accepted => {}
            HandshakeResponse::Rejected {
                server_version,
                message,
            } => {
                return Err(ClientError::Connection(format!(
                    "handshake rejected by {} (server version {}): {}",
                    config.endpoint, server_version, message
                )))
            }
        }

        stream.set_read_timeout(None)?;
        stream.set_write_timeout(None)?;
        tracing::debug!(endpoint = %config.endpoint, "handshake accepted");
        Ok(stream)
    }

    fn start(
        config: &ClientConfig,
        (stream, read_stream, write_stream): (TcpStream, TcpStream, TcpStream),
        notifier: Arc<StateNotifier>,
    ) -> Result<Self> {
        let pending = Arc::new(PendingRequests::default());
        let closing = Arc::new(AtomicBool::new(false));

        if !notifier.transition(
            &[ConnectionState::Connecting],
            ConnectionState::Connected,
            None,
        ) {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(ClientError::InvalidState(
                "connection state changed during connect".to_string(),
            ));
        }

        let reader = {
            let loop_ctx = ReadLoop {
                reader: BufReader::new(read_stream),
                max_frame_size: config.max_frame_size,
                pending: Arc::clone(&pending),
                closing: Arc::clone(&closing),
                notifier: Arc::clone(&notifier),
            };
            thread::Builder::new()
                .name("cachewire-reader".to_string())
                .spawn(move || loop_ctx.run())
        };

        let reader = match reader {
            Ok(handle) => handle,
            Err(err) => {
                let _ = stream.shutdown(Shutdown::Both);
                pending.close_all();
                notifier.transition(
                    &[ConnectionState::Connected],
                    ConnectionState::Disconnected,
                    Some(format!("failed to start reader: {}", err)),
                );
                return Err(err.into());
            }
        };

        Ok(Self {
            endpoint: config.endpoint.clone(),
            stream,
            writer: Mutex::new(BufWriter::new(write_stream)),
            pending,
            next_request_id: AtomicI64::new(1),
            request_timeout: config.request_timeout(),
            max_frame_size: config.max_frame_size,
            closing,
            reader: Mutex::new(Some(reader)),
            notifier,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        !self.pending.is_closed()
    }

    /// Send an operation and wait for its response payload
    pub fn request(&self, operation: &Operation) -> Result<Bytes> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_request(&operation.to_request(request_id)?)?;
        let body_len = frame.len() - LENGTH_PREFIX_SIZE;
        if body_len > self.max_frame_size {
            return Err(ClientError::Encode(format!(
                "{:?} request of {} bytes exceeds max frame size {}",
                operation.op_code(),
                body_len,
                self.max_frame_size
            )));
        }

        // Registered before writing so a fast response always finds its waiter
        let rx = self.pending.register(request_id)?;

        let written = {
            let mut writer = self.writer.lock();
            write_frame(&mut *writer, &frame)
        };
        if let Err(err) = written {
            self.pending.remove(request_id);
            self.fail(format!("write failed: {}", err));
            return Err(err);
        }

        tracing::trace!(request_id, op = ?operation.op_code(), "request sent");

        let completion = match self.request_timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(completion) => completion,
                Err(RecvTimeoutError::Timeout) => {
                    self.pending.remove(request_id);
                    return Err(ClientError::Timeout(format!(
                        "no response to {:?} request {} within {:?}",
                        operation.op_code(),
                        request_id,
                        timeout
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ClientError::ConnectionClosed),
            },
            None => rx.recv().map_err(|_| ClientError::ConnectionClosed)?,
        };

        completion?.into_payload()
    }

    /// Close at the application's request
    ///
    /// Pending requests fail with `ConnectionClosed`; the state event carries
    /// no reason.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.stream.shutdown(Shutdown::Both);

        // Already closed by a transport failure, which reports its own reason
        if let Some(cancelled) = self.pending.close_all() {
            if cancelled > 0 {
                tracing::debug!(cancelled, "cancelled pending requests on close");
            }
            self.notifier.transition(
                &[ConnectionState::Connected],
                ConnectionState::Disconnected,
                None,
            );
        }

        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
    }

    /// Tear down after a transport error seen by a caller
    fn fail(&self, reason: String) {
        tracing::warn!(endpoint = %self.endpoint, %reason, "connection failed");
        self.pending.close_all();
        self.notifier.transition(
            &[ConnectionState::Connected],
            ConnectionState::Disconnected,
            Some(reason),
        );
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Try every resolved address in turn
fn connect_any(endpoint: &str, timeout: Duration) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = endpoint
        .to_socket_addrs()
        .map_err(|err| ClientError::Connection(format!("cannot resolve {}: {}", endpoint, err)))?
        .collect();

    let mut last_error: Option<io::Error> = None;
    for addr in addrs {
        let attempt = if timeout.is_zero() {
            TcpStream::connect(addr)
        } else {
            TcpStream::connect_timeout(&addr, timeout)
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                tracing::debug!(%addr, error = %err, "connect attempt failed");
                last_error = Some(err);
            }
        }
    }

    Err(ClientError::Connection(match last_error {
        Some(err) => format!("cannot connect to {}: {}", endpoint, err),
        None => format!("{} resolved to no addresses", endpoint),
    }))
}

// =============================================================================
// Reader Thread
// =============================================================================

struct ReadLoop {
    reader: BufReader<TcpStream>,
    max_frame_size: usize,
    pending: Arc<PendingRequests>,
    closing: Arc<AtomicBool>,
    notifier: Arc<StateNotifier>,
}

impl ReadLoop {
    fn run(mut self) {
        let reason = loop {
            let frame = match read_frame(&mut self.reader, self.max_frame_size) {
                Ok(frame) => frame,
                Err(err) => break describe_read_error(&err),
            };

            match decode_response(&frame) {
                Ok(response) => {
                    tracing::trace!(request_id = response.request_id, "response received");
                    self.pending.complete(response.request_id, Ok(response));
                }
                Err(err) => match peek_response_id(&frame) {
                    Some(request_id) => self.pending.complete(request_id, Err(err)),
                    None => tracing::warn!(error = %err, "dropping malformed response frame"),
                },
            }
        };

        let reason = if self.closing.load(Ordering::SeqCst) {
            None
        } else {
            tracing::warn!(%reason, "connection lost");
            Some(reason)
        };

        self.pending.close_all();
        self.notifier.transition(
            &[ConnectionState::Connected],
            ConnectionState::Disconnected,
            reason,
        );
    }
}

fn describe_read_error(err: &ClientError) -> String {
    match err {
        ClientError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            "server closed the connection".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_complete_routes_by_id() {
        let pending = PendingRequests::default();
        let first = pending.register(1).unwrap();
        let second = pending.register(2).unwrap();

        pending.complete(2, Ok(Response::ok(2, Bytes::from_static(b"two"))));
        pending.complete(1, Ok(Response::ok(1, Bytes::from_static(b"one"))));

        assert_eq!(first.recv().unwrap().unwrap().payload, Bytes::from_static(b"one"));
        assert_eq!(second.recv().unwrap().unwrap().payload, Bytes::from_static(b"two"));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_close_all_releases_waiters_and_refuses_new() {
        let pending = PendingRequests::default();
        let waiter = pending.register(5).unwrap();

        assert_eq!(pending.close_all(), Some(1));
        assert_eq!(pending.close_all(), None);
        assert!(waiter.recv().is_err());
        assert!(matches!(
            pending.register(6),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_unknown_response_is_ignored() {
        let pending = PendingRequests::default();
        pending.complete(42, Ok(Response::ok(42, Bytes::new())));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_connect_to_closed_port_reports_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = Arc::new(StateNotifier::new().unwrap());
        let events = notifier.subscribe();
        let config = ClientConfig::new(addr.to_string());

        let result = Connection::open(&config, Arc::clone(&notifier));
        assert!(matches!(result, Err(ClientError::Connection(_))));
        assert_eq!(notifier.state(), ConnectionState::Disconnected);

        let timeout = Duration::from_secs(5);
        assert_eq!(
            events.recv_timeout(timeout).unwrap().state,
            ConnectionState::Connecting
        );
        let failed = events.recv_timeout(timeout).unwrap();
        assert_eq!(failed.state, ConnectionState::Disconnected);
        assert!(failed.reason.is_some());
    }
}
