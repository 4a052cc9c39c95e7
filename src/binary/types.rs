//! Type codes and schema descriptors
//!
//! `TypeCode` tags every value on the wire. `ObjectType` is what a cache
//! handle declares for its keys and values, and `ComplexObjectType` is the
//! schema descriptor of a complex record.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Stable 32-bit id for a type, field or cache name
///
/// CRC32 of the lowercased name, reinterpreted as `i32`.
pub fn name_hash(name: &str) -> i32 {
    crc32fast::hash(name.to_lowercase().as_bytes()) as i32
}

// =============================================================================
// Type Codes
// =============================================================================

/// Wire type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeCode {
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    Char = 7,
    Bool = 8,
    String = 9,
    ByteArray = 12,
    Null = 101,
    Complex = 103,
}

impl TypeCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        let code = match code {
            1 => TypeCode::Byte,
            2 => TypeCode::Short,
            3 => TypeCode::Int,
            4 => TypeCode::Long,
            5 => TypeCode::Float,
            6 => TypeCode::Double,
            7 => TypeCode::Char,
            8 => TypeCode::Bool,
            9 => TypeCode::String,
            12 => TypeCode::ByteArray,
            101 => TypeCode::Null,
            103 => TypeCode::Complex,
            _ => return None,
        };
        Some(code)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeCode::Byte => "BYTE",
            TypeCode::Short => "SHORT",
            TypeCode::Int => "INTEGER",
            TypeCode::Long => "LONG",
            TypeCode::Float => "FLOAT",
            TypeCode::Double => "DOUBLE",
            TypeCode::Char => "CHAR",
            TypeCode::Bool => "BOOLEAN",
            TypeCode::String => "STRING",
            TypeCode::ByteArray => "BYTE_ARRAY",
            TypeCode::Null => "NULL",
            TypeCode::Complex => "COMPLEX_OBJECT",
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Object Types
// =============================================================================

/// Declared type of a cache key or value
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectType {
    /// Any non-complex type code
    Primitive(TypeCode),

    /// A complex record with a schema descriptor
    Complex(ComplexObjectType),
}

impl ObjectType {
    pub fn type_code(&self) -> TypeCode {
        match self {
            ObjectType::Primitive(code) => *code,
            ObjectType::Complex(_) => TypeCode::Complex,
        }
    }

    /// Whether a value may be stored under this declared type
    ///
    /// Null is accepted by every type. Complex values must carry the
    /// descriptor's type id.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ObjectType::Complex(complex), Value::Object(object)) => {
                object.type_id() == complex.type_id()
            }
            (ObjectType::Complex(_), _) => false,
            (ObjectType::Primitive(code), value) => value.type_code() == *code as u8,
        }
    }
}

impl From<TypeCode> for ObjectType {
    fn from(code: TypeCode) -> Self {
        ObjectType::Primitive(code)
    }
}

impl From<ComplexObjectType> for ObjectType {
    fn from(complex: ComplexObjectType) -> Self {
        ObjectType::Complex(complex)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Primitive(code) => write!(f, "{}", code),
            ObjectType::Complex(complex) => write!(f, "{}({})", TypeCode::Complex, complex.type_name()),
        }
    }
}

// =============================================================================
// Complex Object Types
// =============================================================================

/// One field of a complex type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,

    /// `None` means the type is taken from the value when written
    pub object_type: Option<ObjectType>,

    pub required: bool,
}

/// Schema descriptor for a complex record
///
/// ```
/// use cachewire::binary::{ComplexObjectType, TypeCode};
///
/// let person = ComplexObjectType::new("Person")
///     .field("id", TypeCode::Int)
///     .field("name", TypeCode::String)
///     .optional_field("salary", TypeCode::Double);
/// assert_eq!(person.fields().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexObjectType {
    type_name: String,
    fields: Vec<FieldDescriptor>,
}

impl ComplexObjectType {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field of the given type
    pub fn field(self, name: impl Into<String>, object_type: impl Into<ObjectType>) -> Self {
        self.push(name.into(), Some(object_type.into()), true)
    }

    /// Add a field that may be absent or null
    pub fn optional_field(self, name: impl Into<String>, object_type: impl Into<ObjectType>) -> Self {
        self.push(name.into(), Some(object_type.into()), false)
    }

    /// Add a required field whose type follows the written value
    pub fn untyped_field(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, true)
    }

    fn push(mut self, name: String, object_type: Option<ObjectType>, required: bool) -> Self {
        // Redeclaring a field replaces it
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldDescriptor {
            name,
            object_type,
            required,
        });
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn type_id(&self) -> i32 {
        name_hash(&self.type_name)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn descriptor(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
