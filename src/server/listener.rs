//! TCP Server
//!
//! Accepts connections and runs each session on its own thread.

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::error::{ClientError, Result};

use super::engine::Engine;
use super::session::Session;

/// How long the accept loop sleeps when no connection is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Open sessions by id, kept so shutdown can close them
type SessionTable = Arc<Mutex<HashMap<u64, TcpStream>>>;

/// TCP server for the in-memory cache engine
pub struct Server {
    config: ServerConfig,
    engine: Arc<Engine>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    sessions: SessionTable,
}

impl Server {
    /// Bind the listen address with a fresh engine
    pub fn bind(config: ServerConfig) -> Result<Self> {
        Self::with_engine(config, Arc::new(Engine::new()))
    }

    pub fn with_engine(config: ServerConfig, engine: Arc<Engine>) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(ClientError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }

        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            engine,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Signal the accept loop to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Accept connections until shutdown (blocking)
    ///
    /// Open sessions are closed on the way out.
    pub fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "server listening");
        let mut next_session_id: u64 = 0;

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    next_session_id += 1;
                    if let Err(e) = self.admit(next_session_id, stream, peer) {
                        tracing::warn!(%peer, error = %e, "failed to start session");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        let sessions = self.sessions.lock();
        for stream in sessions.values() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        tracing::info!(closed = sessions.len(), "server stopped");
        Ok(())
    }

    /// Run the accept loop on a background thread
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let engine = Arc::clone(&self.engine);
        let shutdown = Arc::clone(&self.shutdown);

        let thread = thread::Builder::new()
            .name("cachewire-acceptor".to_string())
            .spawn(move || self.run())?;

        Ok(ServerHandle {
            addr,
            engine,
            shutdown,
            thread: Some(thread),
        })
    }

    fn admit(&self, id: u64, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        // Accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;

        let mut sessions = self.sessions.lock();
        if sessions.len() >= self.config.max_connections {
            tracing::warn!(
                %peer,
                max_connections = self.config.max_connections,
                "rejecting connection"
            );
            let _ = stream.shutdown(Shutdown::Both);
            return Ok(());
        }
        sessions.insert(id, stream.try_clone()?);
        drop(sessions);

        let engine = Arc::clone(&self.engine);
        let table = Arc::clone(&self.sessions);
        let max_frame_size = self.config.max_frame_size;
        let read_timeout_ms = self.config.read_timeout_ms;

        let spawned = thread::Builder::new()
            .name(format!("cachewire-session-{}", id))
            .spawn(move || {
                let result = Session::new(stream, engine, max_frame_size, read_timeout_ms)
                    .and_then(|mut session| session.handle());
                if let Err(e) = result {
                    tracing::warn!(%peer, error = %e, "session ended with error");
                }
                table.lock().remove(&id);
            });

        if let Err(e) = spawned {
            self.sessions.lock().remove(&id);
            return Err(e.into());
        }
        Ok(())
    }
}

/// A server running on a background thread; stops when dropped
pub struct ServerHandle {
    addr: SocketAddr,
    engine: Arc<Engine>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Stop accepting, close open sessions and wait for the acceptor
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ClientError::Connection("server thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "server shutdown failed");
        }
    }
}
