//! Binary objects
//!
//! A `BinaryObject` is the schemaless runtime form of a complex record: a
//! type id plus an ordered list of fields. Fields are keyed by the hash of
//! their name, so lookups work even when the name itself has not been
//! resolved from binary type metadata yet.
//!
//! Fields this client cannot name or decode are carried along untouched, so
//! an object read from a cache can be modified and written back without
//! losing data written by newer clients.

use super::metadata::{BinaryField as BinaryFieldMeta, BinaryType};
use super::record::TypedRecord;
use super::types::{name_hash, ComplexObjectType, ObjectType, TypeCode};
use super::value::Value;
use crate::error::{ClientError, Result};

/// One field of a binary object
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryField {
    id: i32,
    name: Option<String>,
    value: Value,
}

impl BinaryField {
    pub(crate) fn new(id: i32, name: Option<String>, value: Value) -> Self {
        Self { id, name, value }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// `None` when the field is not described by known metadata
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Schemaless complex record
#[derive(Debug, Clone)]
pub struct BinaryObject {
    type_id: i32,
    type_name: Option<String>,
    fields: Vec<BinaryField>,
}

impl BinaryObject {
    /// Create an empty object of the named type
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            type_id: name_hash(&type_name),
            type_name: Some(type_name),
            fields: Vec::new(),
        }
    }

    /// Rebuild an object from decoded wire parts (names not yet resolved)
    pub(crate) fn from_parts(type_id: i32, fields: Vec<BinaryField>) -> Self {
        Self {
            type_id,
            type_name: None,
            fields,
        }
    }

    /// Build an object from a typed record, casting to declared field types
    pub fn from_record<R: TypedRecord>(record: &R) -> Result<Self> {
        let complex = R::complex_type();
        let mut object = BinaryObject::new(complex.type_name());

        for (name, value) in record.to_fields() {
            let declared = complex
                .descriptor(&name)
                .and_then(|d| d.object_type.as_ref());

            let value = match declared {
                Some(ObjectType::Primitive(code)) => value.cast(*code).map_err(|e| {
                    ClientError::SchemaMismatch(format!(
                        "field '{}' of {}: {}",
                        name,
                        complex.type_name(),
                        e
                    ))
                })?,
                _ => value,
            };

            object.set_field(name, value)?;
        }

        object.conform(&complex)?;
        Ok(object)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Resolved type name, `None` until metadata for the type is known
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    // =========================================================================
    // Field Access
    // =========================================================================

    /// Names of all fields with known names, in field order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().filter_map(|f| f.name()).collect()
    }

    /// Total number of fields, including unnamed ones
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &BinaryField> {
        self.fields.iter()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|i| &self.fields[i].value)
    }

    /// Read a field as a concrete Rust type
    ///
    /// A missing field is a `SchemaMismatch`; a present field of another
    /// type is a `TypeMismatch`.
    pub fn get<T>(&self, name: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = ClientError>,
    {
        match self.get_field(name) {
            Some(value) => T::try_from(value.clone()),
            None => Err(ClientError::SchemaMismatch(format!(
                "field '{}' is not present in {}",
                name,
                self.display_type()
            ))),
        }
    }

    /// Like `get`, but absent and null fields read as `None`
    pub fn get_opt<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: TryFrom<Value, Error = ClientError>,
    {
        match self.get_field(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::try_from(value.clone()).map(Some),
        }
    }

    /// Set a field, adding it if absent
    ///
    /// The field keeps its position when it already exists.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<&mut Self> {
        let name = name.into();
        let id = name_hash(&name);
        let value = value.into();

        match self.fields.iter_mut().find(|f| f.id == id) {
            Some(field) => {
                if let Some(existing) = field.name.as_deref() {
                    if !existing.eq_ignore_ascii_case(&name) {
                        return Err(ClientError::SchemaMismatch(format!(
                            "field '{}' collides with field '{}' in {}",
                            name,
                            existing,
                            self.type_name.as_deref().unwrap_or("binary object")
                        )));
                    }
                }
                field.name = Some(name);
                field.value = value;
            }
            None => self.fields.push(BinaryField::new(id, Some(name), value)),
        }

        Ok(self)
    }

    /// Set a field, converting the value to the given type first
    pub fn set_field_as(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        type_code: TypeCode,
    ) -> Result<&mut Self> {
        let value = value.into().cast(type_code)?;
        self.set_field(name, value)
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        let index = self.position(name)?;
        Some(self.fields.remove(index).value)
    }

    fn position(&self, name: &str) -> Option<usize> {
        let id = name_hash(name);
        self.fields.iter().position(|f| f.id == id)
    }

    fn display_type(&self) -> String {
        match &self.type_name {
            Some(name) => name.clone(),
            None => format!("type #{}", self.type_id),
        }
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Check this object against a schema descriptor
    pub fn conform(&self, complex: &ComplexObjectType) -> Result<()> {
        if self.type_id != complex.type_id() {
            return Err(ClientError::SchemaMismatch(format!(
                "{} is not of type {}",
                self.display_type(),
                complex.type_name()
            )));
        }

        for descriptor in complex.fields() {
            match self.get_field(&descriptor.name) {
                None | Some(Value::Null) => {
                    if descriptor.required {
                        return Err(ClientError::SchemaMismatch(format!(
                            "required field '{}' of {} is missing",
                            descriptor.name,
                            complex.type_name()
                        )));
                    }
                }
                Some(value) => {
                    if let Some(expected) = &descriptor.object_type {
                        if !expected.accepts(value) {
                            return Err(ClientError::SchemaMismatch(format!(
                                "field '{}' of {} should be {}, found {}",
                                descriptor.name,
                                complex.type_name(),
                                expected,
                                value.type_name()
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Materialize a typed record
    pub fn to_record<R: TypedRecord>(&self) -> Result<R> {
        self.conform(&R::complex_type())?;
        R::from_object(self)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Binary type metadata describing the named fields of this object
    ///
    /// Fails with `InvalidState` when the type name is unknown, since the
    /// metadata cannot be registered without it.
    pub fn binary_type(&self) -> Result<BinaryType> {
        let type_name = self.type_name.as_deref().ok_or_else(|| {
            ClientError::InvalidState(format!(
                "binary object of type #{} has no known type name; declare a complex value type",
                self.type_id
            ))
        })?;

        let fields = self
            .fields
            .iter()
            .filter_map(|f| {
                f.name.as_ref().map(|name| BinaryFieldMeta {
                    name: name.clone(),
                    field_id: f.id,
                    type_code: f.value.type_code(),
                })
            })
            .collect();

        Ok(BinaryType {
            type_id: self.type_id,
            type_name: type_name.to_string(),
            fields,
        })
    }

    /// Fill in type and field names from metadata
    pub(crate) fn apply_binary_type(&mut self, binary_type: &BinaryType) {
        if binary_type.type_id != self.type_id {
            return;
        }
        if self.type_name.is_none() {
            self.type_name = Some(binary_type.type_name.clone());
        }
        for field in self.fields.iter_mut().filter(|f| f.name.is_none()) {
            if let Some(meta) = binary_type.field_by_id(field.id) {
                field.name = Some(meta.name.clone());
            }
        }
    }

    /// Adopt the name of a declared complex type with the same id
    pub(crate) fn apply_complex_type(&mut self, complex: &ComplexObjectType) {
        if complex.type_id() != self.type_id {
            return;
        }
        if self.type_name.is_none() {
            self.type_name = Some(complex.type_name().to_string());
        }
        for descriptor in complex.fields() {
            let id = name_hash(&descriptor.name);
            if let Some(field) = self.fields.iter_mut().find(|f| f.id == id && f.name.is_none()) {
                field.name = Some(descriptor.name.clone());
            }
        }
    }

    pub(crate) fn fields_mut(&mut self) -> impl Iterator<Item = &mut BinaryField> {
        self.fields.iter_mut()
    }
}

impl BinaryField {
    pub(crate) fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }
}

/// Equal when the type id matches and every field id maps to an equal value
impl PartialEq for BinaryObject {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.fields.len() == other.fields.len()
            && self.fields.iter().all(|field| {
                other
                    .fields
                    .iter()
                    .find(|f| f.id == field.id)
                    .map(|f| f.value == field.value)
                    .unwrap_or(false)
            })
    }
}
