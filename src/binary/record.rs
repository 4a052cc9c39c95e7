//! Typed records
//!
//! Bridges application structs and binary objects through an explicit
//! schema descriptor.

use super::object::BinaryObject;
use super::types::{ComplexObjectType, ObjectType, TypeCode};
use super::value::Value;
use crate::error::Result;

/// An application struct stored as a complex object
///
/// ```
/// use cachewire::binary::{BinaryObject, ComplexObjectType, TypeCode, TypedRecord, Value};
///
/// struct Person {
///     id: i32,
///     name: String,
/// }
///
/// impl TypedRecord for Person {
///     fn complex_type() -> ComplexObjectType {
///         ComplexObjectType::new("Person")
///             .field("id", TypeCode::Int)
///             .field("name", TypeCode::String)
///     }
///
///     fn to_fields(&self) -> Vec<(String, Value)> {
///         vec![
///             ("id".to_string(), self.id.into()),
///             ("name".to_string(), self.name.clone().into()),
///         ]
///     }
///
///     fn from_object(object: &BinaryObject) -> cachewire::Result<Self> {
///         Ok(Person {
///             id: object.get("id")?,
///             name: object.get("name")?,
///         })
///     }
/// }
///
/// let object = BinaryObject::from_record(&Person { id: 1, name: "John Doe".into() }).unwrap();
/// let person: Person = object.to_record().unwrap();
/// assert_eq!(person.name, "John Doe");
/// ```
pub trait TypedRecord: Sized {
    /// Schema descriptor, built once per type
    fn complex_type() -> ComplexObjectType;

    /// Field values in write order
    fn to_fields(&self) -> Vec<(String, Value)>;

    /// Read the record back; the object has already been checked against
    /// `complex_type()`
    fn from_object(object: &BinaryObject) -> Result<Self>;

    fn object_type() -> ObjectType {
        ObjectType::Complex(Self::complex_type())
    }
}

/// Types usable as statically typed cache keys
pub trait CacheKey: Clone + Into<Value> + TryFrom<Value, Error = crate::error::ClientError> {
    fn object_type() -> ObjectType;
}

macro_rules! cache_keys {
    ($($ty:ty => $code:ident),* $(,)?) => {
        $(
            impl CacheKey for $ty {
                fn object_type() -> ObjectType {
                    ObjectType::Primitive(TypeCode::$code)
                }
            }
        )*
    };
}

cache_keys! {
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    char => Char,
    bool => Bool,
    String => String,
    Vec<u8> => ByteArray,
}
