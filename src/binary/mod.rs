//! Binary Object Module
//!
//! The wire codec and the runtime object model shared by client and server.
//!
//! ## Responsibilities
//! - Tagged little-endian encoding of primitives, strings and byte arrays
//! - Self-describing complex objects keyed by hashed field ids
//! - Schemaless `BinaryObject` access and mutation
//! - Schema descriptors and the `TypedRecord` bridge
//! - Binary type metadata for resolving field names

pub mod codec;
mod metadata;
mod object;
mod record;
mod types;
mod value;

pub use codec::{encode_value, from_bytes, to_bytes, WireReader};
pub use metadata::{BinaryField as BinaryFieldMeta, BinaryType, BinaryTypeRegistry};
pub use object::{BinaryField, BinaryObject};
pub use record::{CacheKey, TypedRecord};
pub use types::{name_hash, ComplexObjectType, FieldDescriptor, ObjectType, TypeCode};
pub use value::Value;
