//! Configuration for cachewire
//!
//! Client and server configuration with sensible defaults.

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Default server port
pub const DEFAULT_PORT: u16 = 10800;

/// Default maximum frame size (16 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for a client connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Endpoint
    // -------------------------------------------------------------------------
    /// Server endpoint as `host:port`
    pub endpoint: String,

    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------
    /// TCP connect + handshake timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Per-request response timeout (milliseconds, 0 = wait forever)
    pub request_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------
    /// Disable Nagle's algorithm
    pub tcp_nodelay: bool,

    /// Largest frame accepted from the server (bytes)
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: format!("127.0.0.1:{}", DEFAULT_PORT),
            connect_timeout_ms: 5000,
            request_timeout_ms: 30_000,
            tcp_nodelay: true,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given `host:port` endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Check the endpoint and limits before connecting
    pub fn validate(&self) -> Result<()> {
        let (host, port) = self.endpoint.rsplit_once(':').ok_or_else(|| {
            ClientError::Config(format!(
                "endpoint '{}' must be in host:port form",
                self.endpoint
            ))
        })?;

        if host.is_empty() {
            return Err(ClientError::Config(format!(
                "endpoint '{}' has an empty host",
                self.endpoint
            )));
        }

        match port.parse::<u16>() {
            Ok(p) if p != 0 => {}
            _ => {
                return Err(ClientError::Config(format!(
                    "endpoint '{}' has an invalid port",
                    self.endpoint
                )))
            }
        }

        if self.max_frame_size == 0 {
            return Err(ClientError::Config(
                "max_frame_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` when requests may wait forever
    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.request_timeout_ms))
        }
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server endpoint (`host:port`)
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the request timeout (in milliseconds, 0 disables it)
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.config.tcp_nodelay = enabled;
        self
    }

    /// Set the largest accepted frame (in bytes)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the in-memory reference server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Largest frame accepted from a client (bytes)
    pub max_frame_size: usize,

    /// Session read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            max_connections: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout_ms: 0,
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the session read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
