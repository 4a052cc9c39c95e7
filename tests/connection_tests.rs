//! Connection Tests
//!
//! Pipelining, cancellation and failure handling against a scripted server.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cachewire::binary::{name_hash, to_bytes, BinaryFieldMeta, BinaryType, TypeCode};
use cachewire::protocol::{
    encode_binary_type_payload, encode_handshake_response, read_frame, write_frame,
    HandshakeResponse, OpCode, ProtocolVersion, Response, Status,
};
use cachewire::{Client, ClientConfig, ClientError, ConnectionState, Value};
use crossbeam::channel::bounded;

use common::{
    accept, accept_with, fake_listener, get_key, next_event, next_request, object_bytes, respond,
    MAX_FRAME, WAIT,
};

// =============================================================================
// Helpers
// =============================================================================

fn config(endpoint: &str) -> ClientConfig {
    ClientConfig::builder()
        .endpoint(endpoint)
        .request_timeout_ms(5_000)
        .build()
}

/// Payload echoing a key back as `value-<key>`
fn echo_payload(key: &Value) -> Bytes {
    let key: i32 = key.clone().try_into().unwrap();
    to_bytes(&Value::from(format!("value-{}", key))).unwrap()
}

// =============================================================================
// Pipelining Tests
// =============================================================================

#[test]
fn test_out_of_order_responses_reach_their_callers() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);
        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(next_request(&mut stream));
        }
        // Answer newest first
        for (request, operation) in held.into_iter().rev() {
            let payload = echo_payload(&get_key(&operation));
            respond(&mut stream, &Response::ok(request.request_id, payload));
        }
        stream
    });

    let client = Client::new().unwrap();
    client.connect(config(&endpoint)).unwrap();
    let cache = client.get_cache("pipelined");

    thread::scope(|scope| {
        let callers: Vec<_> = (1..=3)
            .map(|key| {
                let cache = cache.clone();
                scope.spawn(move || (key, cache.get(key)))
            })
            .collect();

        for caller in callers {
            let (key, result) = caller.join().unwrap();
            assert_eq!(result.unwrap(), Value::from(format!("value-{}", key)));
        }
    });

    let _stream = server.join().unwrap();
}

#[test]
fn test_response_for_unknown_request_is_ignored() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);
        let (request, operation) = next_request(&mut stream);
        respond(&mut stream, &Response::ok(request.request_id + 1000, Bytes::new()));
        respond(
            &mut stream,
            &Response::ok(request.request_id, echo_payload(&get_key(&operation))),
        );
        stream
    });

    let client = Client::new().unwrap();
    client.connect(config(&endpoint)).unwrap();
    assert_eq!(
        client.get_cache("c").get(7).unwrap(),
        Value::from("value-7")
    );
    assert_eq!(client.state(), ConnectionState::Connected);

    let _stream = server.join().unwrap();
}

#[test]
fn test_malformed_response_fails_only_its_request() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);

        // Failed status whose error string claims more bytes than it has
        let (first, _) = next_request(&mut stream);
        let mut body = Vec::new();
        body.extend_from_slice(&first.request_id.to_le_bytes());
        body.extend_from_slice(&1i32.to_le_bytes());
        body.extend_from_slice(&100i32.to_le_bytes());
        let mut frame = (body.len() as i32).to_le_bytes().to_vec();
        frame.extend_from_slice(&body);
        write_frame(&mut stream, &frame).unwrap();

        let (second, operation) = next_request(&mut stream);
        respond(
            &mut stream,
            &Response::ok(second.request_id, echo_payload(&get_key(&operation))),
        );
        stream
    });

    let client = Client::new().unwrap();
    client.connect(config(&endpoint)).unwrap();
    let cache = client.get_cache("c");

    assert!(matches!(cache.get(1), Err(ClientError::Decode(_))));
    assert_eq!(cache.get(2).unwrap(), Value::from("value-2"));

    let _stream = server.join().unwrap();
}

#[test]
fn test_error_status_maps_to_error_kind() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);
        let (request, _) = next_request(&mut stream);
        respond(
            &mut stream,
            &Response::error(request.request_id, Status::Other(9000), "disk on fire"),
        );
        stream
    });

    let client = Client::new().unwrap();
    client.connect(config(&endpoint)).unwrap();
    let err = client.get_cache("c").get(1).unwrap_err();
    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, 9000);
            assert_eq!(message, "disk on fire");
        }
        other => panic!("expected server error, got {:?}", other),
    }

    let _stream = server.join().unwrap();
}

#[test]
fn test_partly_named_type_is_fetched_once() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);
        let sensor = object_bytes(
            name_hash("Sensor"),
            &[
                (name_hash("v"), TypeCode::Int as u8, &5i32.to_le_bytes()),
                (77, 200, &[1, 2]),
            ],
            &[],
        );
        // Knows "v" but not field 77
        let metadata = BinaryType {
            type_id: name_hash("Sensor"),
            type_name: "Sensor".to_string(),
            fields: vec![BinaryFieldMeta {
                name: "v".to_string(),
                field_id: name_hash("v"),
                type_code: TypeCode::Int as u8,
            }],
        };

        let mut seen = Vec::new();
        for _ in 0..4 {
            let (request, operation) = next_request(&mut stream);
            seen.push(request.op_code);
            let payload = match request.op_code {
                OpCode::GetBinaryType => encode_binary_type_payload(Some(&metadata)).unwrap(),
                OpCode::CacheGet if get_key(&operation) == Value::Int(1) => {
                    Bytes::from(sensor.clone())
                }
                _ => to_bytes(&Value::Int(2)).unwrap(),
            };
            respond(&mut stream, &Response::ok(request.request_id, payload));
        }
        (seen, stream)
    });

    let client = Client::new().unwrap();
    client.connect(config(&endpoint)).unwrap();
    let cache = client.get_cache("sensors");

    let first = cache.get(1).unwrap();
    let second = cache.get(1).unwrap();
    let third = cache.get(2);

    let (seen, _stream) = server.join().unwrap();
    assert_eq!(
        seen,
        vec![
            OpCode::CacheGet,
            OpCode::GetBinaryType,
            OpCode::CacheGet,
            OpCode::CacheGet
        ]
    );
    assert_eq!(first, second);
    match first {
        Value::Object(object) => {
            assert_eq!(object.type_name(), Some("Sensor"));
            assert_eq!(object.get::<i32>("v").unwrap(), 5);
        }
        other => panic!("expected object, got {:?}", other),
    }
    assert_eq!(third.unwrap(), Value::Int(2));
}

// =============================================================================
// Cancellation Tests
// =============================================================================

#[test]
fn test_disconnect_cancels_pending_requests() {
    let (listener, endpoint) = fake_listener();
    let (received_tx, received_rx) = bounded(1);

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);
        next_request(&mut stream);
        received_tx.send(()).unwrap();
        // Never answer; hold the socket until the client goes away
        stream
    });

    let client = Client::new().unwrap();
    client.connect(config(&endpoint)).unwrap();
    let events = client.subscribe();
    let cache = client.get_cache("slow");

    thread::scope(|scope| {
        let caller = scope.spawn(|| cache.get(1));
        received_rx.recv_timeout(WAIT).unwrap();

        client.disconnect();
        assert!(matches!(
            caller.join().unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
    });

    let event = next_event(&events);
    assert_eq!(event.state, ConnectionState::Disconnected);
    assert_eq!(event.reason, None);

    // Issued after close
    assert!(matches!(cache.get(2), Err(ClientError::InvalidState(_))));

    let _stream = server.join().unwrap();
}

#[test]
fn test_transport_error_fails_pending_and_reports_reason() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);
        next_request(&mut stream);
        drop(stream);
    });

    let client = Client::new().unwrap();
    client.connect(config(&endpoint)).unwrap();
    let events = client.subscribe();

    assert!(matches!(
        client.get_cache("c").get(1),
        Err(ClientError::ConnectionClosed)
    ));

    let event = next_event(&events);
    assert_eq!(event.state, ConnectionState::Disconnected);
    assert_eq!(event.reason.as_deref(), Some("server closed the connection"));
    assert!(matches!(
        client.get_cache("c").get(2),
        Err(ClientError::ConnectionClosed)
    ));

    server.join().unwrap();
}

#[test]
fn test_request_timeout() {
    let (listener, endpoint) = fake_listener();
    let (done_tx, done_rx) = bounded::<()>(1);

    let server = thread::spawn(move || {
        let mut stream = accept(&listener);
        next_request(&mut stream);
        let _ = done_rx.recv_timeout(WAIT);
        stream
    });

    let client = Client::new().unwrap();
    let config = ClientConfig::builder()
        .endpoint(endpoint)
        .request_timeout_ms(100)
        .build();
    client.connect(config).unwrap();

    assert!(matches!(
        client.get_cache("c").get(1),
        Err(ClientError::Timeout(_))
    ));
    // A timeout is not a transport failure
    assert_eq!(client.state(), ConnectionState::Connected);

    done_tx.send(()).unwrap();
    let _stream = server.join().unwrap();
}

// =============================================================================
// Handshake Tests
// =============================================================================

#[test]
fn test_rejected_handshake_is_connection_error() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        accept_with(
            &listener,
            HandshakeResponse::Rejected {
                server_version: ProtocolVersion::new(2, 0, 0),
                message: "too old".to_string(),
            },
        )
    });

    let client = Client::new().unwrap();
    let events = client.subscribe();
    let err = client.connect(config(&endpoint)).unwrap_err();
    match err {
        ClientError::Connection(message) => assert!(message.contains("too old"), "{}", message),
        other => panic!("expected connection error, got {:?}", other),
    }

    assert_eq!(next_event(&events).state, ConnectionState::Connecting);
    let failed = next_event(&events);
    assert_eq!(failed.state, ConnectionState::Disconnected);
    assert!(failed.reason.unwrap().contains("too old"));

    let _stream = server.join().unwrap();
}

#[test]
fn test_silent_server_times_out_handshake() {
    let (listener, endpoint) = fake_listener();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_millis(500));
        stream
    });

    let client = Client::new().unwrap();
    let config = ClientConfig::builder()
        .endpoint(endpoint)
        .connect_timeout_ms(100)
        .build();
    assert!(matches!(
        client.connect(config),
        Err(ClientError::Connection(_))
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let _stream = server.join().unwrap();
}

#[test]
fn test_slow_handshake_does_not_block_other_calls() {
    let (listener, endpoint) = fake_listener();
    let (greeted_tx, greeted_rx) = bounded(1);
    let (reply_tx, reply_rx) = bounded::<()>(1);

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_frame(&mut stream, MAX_FRAME).unwrap();
        greeted_tx.send(()).unwrap();
        reply_rx.recv_timeout(WAIT).unwrap();
        let reply = encode_handshake_response(&HandshakeResponse::Accepted).unwrap();
        write_frame(&mut stream, &reply).unwrap();
        stream
    });

    let client = Client::new().unwrap();
    let config = ClientConfig::builder()
        .endpoint(endpoint)
        .connect_timeout_ms(5_000)
        .build();

    thread::scope(|scope| {
        let connecting = scope.spawn(|| client.connect(config));
        greeted_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);

        let started = Instant::now();
        assert!(matches!(
            client.get_cache("c").get(1),
            Err(ClientError::InvalidState(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(1));

        reply_tx.send(()).unwrap();
        connecting.join().unwrap().unwrap();
    });

    assert_eq!(client.state(), ConnectionState::Connected);
    let _stream = server.join().unwrap();
}
