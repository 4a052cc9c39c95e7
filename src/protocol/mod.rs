//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Session
//! 1. Client connects and sends a handshake (protocol version + client code)
//! 2. Server accepts or rejects it
//! 3. Client sends requests; each carries a request id that the matching
//!    response echoes back. Responses may arrive in any order.
//!
//! ### Operations
//! - 1000: CACHE_GET          - cache_id + flags + key
//! - 1001: CACHE_PUT          - cache_id + flags + key + value
//! - 1004: CACHE_PUT_ALL      - cache_id + flags + count + (key, value)*
//! - 1051: CACHE_CREATE       - name
//! - 1052: CACHE_GET_OR_CREATE - name
//! - 1056: CACHE_DESTROY      - cache_id
//! - 3002: GET_BINARY_TYPE    - type_id
//! - 3003: PUT_BINARY_TYPE    - bincode(BinaryType)
//!
//! ### Status Codes
//! - 0: SUCCESS
//! - 1: FAILED
//! - 2: KEY_NOT_FOUND
//! - 1000: CACHE_NOT_FOUND
//! - 1001: CACHE_EXISTS
//! - 2000: SCHEMA_CONFLICT

mod codec;
mod handshake;
mod request;
mod response;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, peek_request_id,
    peek_response_id, read_frame, read_request, write_frame, write_response, LENGTH_PREFIX_SIZE,
    REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
pub use handshake::{
    decode_handshake, decode_handshake_response, encode_handshake, encode_handshake_response,
    Handshake, HandshakeResponse, ProtocolVersion, CLIENT_CODE, HANDSHAKE_CODE,
};
pub use request::{OpCode, Operation, Request};
pub use response::{
    decode_binary_type_payload, encode_binary_type_payload, Response, Status,
};
