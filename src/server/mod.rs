//! Server Module
//!
//! In-memory reference server speaking the client protocol.
//!
//! ## Architecture
//! - Single acceptor thread polling a shutdown flag
//! - One thread per session, bounded by `max_connections`
//! - Operations routed through the shared Engine

mod engine;
mod listener;
mod session;

pub use engine::Engine;
pub use listener::{Server, ServerHandle};
pub use session::Session;
