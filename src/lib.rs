//! # cachewire
//!
//! A thin binary client for a distributed key-value cache:
//! - One TCP session per client with pipelined, id-correlated requests
//! - Self-describing binary objects with schema descriptors and typed records
//! - Connection state changes delivered to listeners and subscribers
//! - An in-memory reference server speaking the same protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Client  /  CacheClient                       │
//! │             (TypedCache<K, V> on top)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Value / BinaryObject
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │        Binary Codec + Binary Type Registry                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Operation
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Connection                                │
//! │     (writer lock, reader thread, pending by request id)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ TCP frames
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Server    │          │  Notifier   │
//!   │  (remote)   │          │  (events)   │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod binary;
pub mod cache;
pub mod client;
pub mod network;
pub mod protocol;
pub mod server;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use binary::{
    BinaryObject, CacheKey, ComplexObjectType, ObjectType, TypeCode, TypedRecord, Value,
};
pub use cache::{CacheClient, TypedCache};
pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use error::{ClientError, Result};
pub use network::{ConnectionState, StateEvent};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cachewire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
