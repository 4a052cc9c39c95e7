//! Shared helpers for integration tests

#![allow(dead_code)]

use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use cachewire::binary::{BinaryObject, ComplexObjectType, TypeCode, TypedRecord, Value};
use cachewire::protocol::{
    decode_handshake, encode_handshake_response, read_frame, read_request, write_frame,
    write_response, HandshakeResponse, Operation, Request, Response,
};
use cachewire::server::{Server, ServerHandle};
use cachewire::{Client, ClientConfig, ServerConfig, StateEvent};

pub const MAX_FRAME: usize = 1024 * 1024;

/// Generous upper bound for anything that waits on another thread
pub const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Wire Bytes
// =============================================================================

/// Hand-built complex object: header, field entries, then `trailing` body bytes
pub fn object_bytes(type_id: i32, fields: &[(i32, u8, &[u8])], trailing: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, code, payload) in fields {
        body.extend_from_slice(&id.to_le_bytes());
        body.push(*code);
        body.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        body.extend_from_slice(payload);
    }
    body.extend_from_slice(trailing);

    let mut out = vec![TypeCode::Complex as u8, 1, 0, 0];
    out.extend_from_slice(&type_id.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&(fields.len() as i32).to_le_bytes());
    out.extend_from_slice(&(body.len() as i32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

// =============================================================================
// Reference Server
// =============================================================================

/// Start an in-memory server on an ephemeral port
pub fn start_server() -> ServerHandle {
    let config = ServerConfig::builder().listen_addr("127.0.0.1:0").build();
    Server::bind(config).unwrap().spawn().unwrap()
}

pub fn client_config(server: &ServerHandle) -> ClientConfig {
    ClientConfig::builder()
        .endpoint(server.local_addr().to_string())
        .request_timeout_ms(5_000)
        .build()
}

/// A client connected to `server`
pub fn connect(server: &ServerHandle) -> Client {
    let client = Client::new().unwrap();
    client.connect(client_config(server)).unwrap();
    client
}

/// Next state event, failing the test if none arrives in time
pub fn next_event(events: &crossbeam::channel::Receiver<StateEvent>) -> StateEvent {
    events.recv_timeout(WAIT).expect("no state event")
}

// =============================================================================
// Scripted Fake Server
// =============================================================================

/// Listener for a fake server plus the endpoint to connect to
pub fn fake_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    (listener, endpoint)
}

/// Accept one client and answer its handshake with `reply`
pub fn accept_with(listener: &TcpListener, reply: HandshakeResponse) -> TcpStream {
    let (mut stream, _) = listener.accept().unwrap();
    let frame = read_frame(&mut stream, MAX_FRAME).unwrap();
    decode_handshake(&frame).unwrap();
    write_frame(&mut stream, &encode_handshake_response(&reply).unwrap()).unwrap();
    stream
}

pub fn accept(listener: &TcpListener) -> TcpStream {
    accept_with(listener, HandshakeResponse::Accepted)
}

/// Read one request and decode its operation
pub fn next_request(stream: &mut TcpStream) -> (Request, Operation) {
    let request = read_request(stream, MAX_FRAME).unwrap();
    let operation = Operation::decode(request.op_code, &request.payload).unwrap();
    (request, operation)
}

pub fn respond(stream: &mut TcpStream, response: &Response) {
    write_response(stream, response).unwrap();
}

/// Key of a `CacheGet` operation
pub fn get_key(operation: &Operation) -> Value {
    match operation {
        Operation::CacheGet { key, .. } => key.clone(),
        other => panic!("expected CacheGet, got {:?}", other),
    }
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub salary: Option<f64>,
}

impl Person {
    pub fn new(id: i32, name: &str, salary: Option<f64>) -> Self {
        Self {
            id,
            name: name.to_string(),
            salary,
        }
    }
}

impl TypedRecord for Person {
    fn complex_type() -> ComplexObjectType {
        ComplexObjectType::new("Person")
            .field("id", TypeCode::Int)
            .field("name", TypeCode::String)
            .optional_field("salary", TypeCode::Double)
    }

    fn to_fields(&self) -> Vec<(String, Value)> {
        vec![
            ("id".to_string(), self.id.into()),
            ("name".to_string(), self.name.clone().into()),
            ("salary".to_string(), self.salary.into()),
        ]
    }

    fn from_object(object: &BinaryObject) -> cachewire::Result<Self> {
        Ok(Person {
            id: object.get("id")?,
            name: object.get("name")?,
            salary: object.get_opt("salary")?,
        })
    }
}
