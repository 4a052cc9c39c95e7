//! Runtime values
//!
//! `Value` is the decoded form of anything that travels on the wire: cache
//! keys, cache values and binary object fields.

use bytes::Bytes;

use super::object::BinaryObject;
use super::types::TypeCode;
use crate::error::{ClientError, Result};

/// A typed value
///
/// Floats compare by bit pattern, so NaN equals itself and `0.0 != -0.0`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Basic Multilingual Plane only (encoded as one UTF-16 unit)
    Char(char),
    Bool(bool),
    String(String),
    ByteArray(Vec<u8>),
    Object(BinaryObject),

    /// A field whose type code this client does not understand, kept verbatim
    Raw { type_code: u8, bytes: Bytes },
}

impl Value {
    /// Wire type code of this value
    pub fn type_code(&self) -> u8 {
        match self {
            Value::Null => TypeCode::Null as u8,
            Value::Byte(_) => TypeCode::Byte as u8,
            Value::Short(_) => TypeCode::Short as u8,
            Value::Int(_) => TypeCode::Int as u8,
            Value::Long(_) => TypeCode::Long as u8,
            Value::Float(_) => TypeCode::Float as u8,
            Value::Double(_) => TypeCode::Double as u8,
            Value::Char(_) => TypeCode::Char as u8,
            Value::Bool(_) => TypeCode::Bool as u8,
            Value::String(_) => TypeCode::String as u8,
            Value::ByteArray(_) => TypeCode::ByteArray as u8,
            Value::Object(_) => TypeCode::Complex as u8,
            Value::Raw { type_code, .. } => *type_code,
        }
    }

    /// Human-readable type name, used in error messages
    pub fn type_name(&self) -> String {
        match TypeCode::from_u8(self.type_code()) {
            Some(TypeCode::Complex) => match self {
                Value::Object(object) => match object.type_name() {
                    Some(name) => format!("COMPLEX_OBJECT({})", name),
                    None => format!("COMPLEX_OBJECT(#{})", object.type_id()),
                },
                _ => TypeCode::Complex.name().to_string(),
            },
            Some(code) => code.name().to_string(),
            None => format!("UNKNOWN({})", self.type_code()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert to another type code
    ///
    /// Numeric conversions are range checked. Null stays null. Anything
    /// else must already have the target type.
    pub fn cast(self, target: TypeCode) -> Result<Value> {
        if self.type_code() == target as u8 || self.is_null() {
            return Ok(self);
        }

        let mismatch = |value: &Value| ClientError::type_mismatch(target, value.type_name());

        let integer = match &self {
            Value::Byte(v) => Some(*v as i64),
            Value::Short(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        };

        let cast = match (target, integer, &self) {
            (TypeCode::Byte, Some(v), _) => i8::try_from(v).ok().map(Value::Byte),
            (TypeCode::Short, Some(v), _) => i16::try_from(v).ok().map(Value::Short),
            (TypeCode::Int, Some(v), _) => i32::try_from(v).ok().map(Value::Int),
            (TypeCode::Long, Some(v), _) => Some(Value::Long(v)),
            (TypeCode::Double, Some(v), _) => Some(Value::Double(v as f64)),
            (TypeCode::Float, Some(v), _) => Some(Value::Float(v as f32)),
            (TypeCode::Double, None, Value::Float(v)) => Some(Value::Double(*v as f64)),
            (TypeCode::Float, None, Value::Double(v)) => Some(Value::Float(*v as f32)),
            (TypeCode::String, None, Value::Char(c)) => Some(Value::String(c.to_string())),
            (TypeCode::Char, None, Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Value::Char(c)),
                    _ => None,
                }
            }
            _ => None,
        };

        cast.ok_or_else(|| mismatch(&self))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (
                Value::Raw {
                    type_code: a,
                    bytes: a_bytes,
                },
                Value::Raw {
                    type_code: b,
                    bytes: b_bytes,
                },
            ) => a == b && a_bytes == b_bytes,
            _ => false,
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = ClientError;

                fn try_from(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(ClientError::type_mismatch(
                            stringify!($variant),
                            other.type_name(),
                        )),
                    }
                }
            }
        )*
    };
}

value_conversions! {
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    bool => Bool,
    String => String,
    Vec<u8> => ByteArray,
    BinaryObject => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::ByteArray(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
