//! Network Module
//!
//! Client-side transport.
//!
//! ## Architecture
//! - One TCP connection per client, shared by all cache handles
//! - Background reader thread matching responses to requests by id
//! - Notifier thread delivering state changes to listeners and subscribers

mod connection;
mod state;

pub use connection::Connection;
pub use state::{ConnectionState, StateEvent, StateListener, StateNotifier};
