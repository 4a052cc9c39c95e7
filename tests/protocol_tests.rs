//! Protocol Tests
//!
//! Tests for handshake, request and response framing and operation payloads.

use std::io::Cursor;

use bytes::Bytes;
use cachewire::binary::{BinaryFieldMeta, BinaryObject, BinaryType, Value};
use cachewire::protocol::{
    decode_handshake, decode_handshake_response, decode_request, decode_response,
    encode_handshake, encode_handshake_response, encode_request, read_frame, read_request,
    write_frame, write_response, Handshake, HandshakeResponse, OpCode, Operation,
    ProtocolVersion, Request, Response, Status, LENGTH_PREFIX_SIZE,
};
use cachewire::ClientError;

const MAX_FRAME: usize = 64 * 1024;

// =============================================================================
// Helpers
// =============================================================================

/// Encode an operation as a request and decode it back
fn through_the_wire(operation: &Operation) -> Operation {
    let frame = encode_request(&operation.to_request(11).unwrap()).unwrap();
    let request = decode_request(&frame[LENGTH_PREFIX_SIZE..]).unwrap();
    assert_eq!(request.request_id, 11);
    assert_eq!(request.op_code, operation.op_code());
    Operation::decode(request.op_code, &request.payload).unwrap()
}

// =============================================================================
// Handshake Tests
// =============================================================================

#[test]
fn test_handshake_layout() {
    let frame = encode_handshake(&Handshake::default()).unwrap();
    assert_eq!(&frame[..], &[8, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 2]);

    let decoded = decode_handshake(&frame[LENGTH_PREFIX_SIZE..]).unwrap();
    assert_eq!(decoded.version, ProtocolVersion::CURRENT);
    assert_eq!(decoded.client_code, 2);
}

#[test]
fn test_handshake_rejection_carries_version_and_message() {
    let rejected = HandshakeResponse::Rejected {
        server_version: ProtocolVersion::new(2, 1, 0),
        message: "unsupported protocol version 1.0.0".to_string(),
    };
    let frame = encode_handshake_response(&rejected).unwrap();
    assert_eq!(
        decode_handshake_response(&frame[LENGTH_PREFIX_SIZE..]).unwrap(),
        rejected
    );

    let accepted = encode_handshake_response(&HandshakeResponse::Accepted).unwrap();
    assert_eq!(&accepted[..], &[1, 0, 0, 0, 1]);
}

#[test]
fn test_handshake_with_wrong_code_is_rejected() {
    assert!(matches!(
        decode_handshake(&[7, 1, 0, 0, 0, 0, 0, 2]),
        Err(ClientError::Decode(_))
    ));
    assert!(matches!(
        decode_handshake_response(&[5]),
        Err(ClientError::Decode(_))
    ));
}

// =============================================================================
// Operation Payload Tests
// =============================================================================

#[test]
fn test_cache_operations_round_trip() {
    let mut object = BinaryObject::new("Person");
    object.set_field("name", "John").unwrap();

    let operations = vec![
        Operation::CacheGet {
            cache_id: -5,
            key: Value::Int(1),
        },
        Operation::CachePut {
            cache_id: 9,
            key: Value::from("k"),
            value: Value::Object(object),
        },
        Operation::CachePutAll {
            cache_id: 9,
            entries: vec![
                (Value::Long(1), Value::Null),
                (Value::Long(2), Value::from(vec![1u8, 2, 3])),
            ],
        },
        Operation::CacheCreate {
            name: "people".to_string(),
        },
        Operation::CacheGetOrCreate {
            name: "people".to_string(),
        },
        Operation::CacheDestroy { cache_id: 77 },
        Operation::GetBinaryType { type_id: 3 },
    ];

    for operation in operations {
        assert_eq!(through_the_wire(&operation), operation);
    }
}

#[test]
fn test_put_binary_type_round_trip() {
    let operation = Operation::PutBinaryType {
        binary_type: BinaryType {
            type_id: 12,
            type_name: "Person".to_string(),
            fields: vec![BinaryFieldMeta {
                name: "id".to_string(),
                field_id: 99,
                type_code: 3,
            }],
        },
    };
    assert_eq!(through_the_wire(&operation), operation);
}

#[test]
fn test_cache_payload_prefix() {
    let payload = Operation::CacheGet {
        cache_id: 0x0102_0304,
        key: Value::Bool(true),
    }
    .encode_payload()
    .unwrap();
    assert_eq!(&payload[..], &[4, 3, 2, 1, 0, 8, 1]);
}

#[test]
fn test_trailing_payload_bytes_are_rejected() {
    let mut payload = Operation::CacheDestroy { cache_id: 1 }
        .encode_payload()
        .unwrap()
        .to_vec();
    payload.push(0);
    assert!(matches!(
        Operation::decode(OpCode::CacheDestroy, &payload),
        Err(ClientError::Decode(_))
    ));
}

#[test]
fn test_unknown_op_code_is_rejected() {
    let mut body = Vec::new();
    body.extend_from_slice(&4242i16.to_le_bytes());
    body.extend_from_slice(&1i64.to_le_bytes());
    assert!(matches!(decode_request(&body), Err(ClientError::Decode(_))));
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_response_round_trip() {
    let responses = vec![
        Response::ok(1, Bytes::from_static(&[3, 7, 0, 0, 0])),
        Response::error(2, Status::KeyNotFound, "missing"),
        Response::error(3, Status::Other(555), "custom"),
    ];

    let mut buf = Vec::new();
    for response in &responses {
        write_response(&mut buf, response).unwrap();
    }

    let mut cursor = Cursor::new(buf);
    for expected in responses {
        let frame = read_frame(&mut cursor, MAX_FRAME).unwrap();
        assert_eq!(decode_response(&frame).unwrap(), expected);
    }
}

#[test]
fn test_requests_stream_in_order() {
    let mut buf = Vec::new();
    for id in 1..=3 {
        let request = Request {
            request_id: id,
            op_code: OpCode::CacheDestroy,
            payload: Bytes::from(vec![id as u8, 0, 0, 0]),
        };
        write_frame(&mut buf, &encode_request(&request).unwrap()).unwrap();
    }

    let mut cursor = Cursor::new(buf);
    for id in 1..=3 {
        let request = read_request(&mut cursor, MAX_FRAME).unwrap();
        assert_eq!(request.request_id, id);
        assert_eq!(
            Operation::decode(request.op_code, &request.payload).unwrap(),
            Operation::CacheDestroy { cache_id: id as i32 }
        );
    }
}

// =============================================================================
// Framing Tests
// =============================================================================

#[test]
fn test_oversized_frame_is_rejected() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&((MAX_FRAME + 1) as i32).to_le_bytes());
    let result = read_frame(&mut Cursor::new(buf), MAX_FRAME);
    assert!(matches!(result, Err(ClientError::Decode(_))));
}

#[test]
fn test_negative_frame_length_is_rejected() {
    let buf = (-1i32).to_le_bytes().to_vec();
    let result = read_frame(&mut Cursor::new(buf), MAX_FRAME);
    assert!(matches!(result, Err(ClientError::Decode(_))));
}

#[test]
fn test_short_frame_is_io_error() {
    let mut buf = 10i32.to_le_bytes().to_vec();
    buf.extend_from_slice(&[1, 2, 3]);
    let result = read_frame(&mut Cursor::new(buf), MAX_FRAME);
    assert!(matches!(result, Err(ClientError::Io(_))));
}

#[test]
fn test_truncated_error_string_is_decode_error() {
    let mut body = Vec::new();
    body.extend_from_slice(&8i64.to_le_bytes());
    body.extend_from_slice(&1i32.to_le_bytes());
    body.extend_from_slice(&100i32.to_le_bytes());
    assert!(matches!(decode_response(&body), Err(ClientError::Decode(_))));
}
