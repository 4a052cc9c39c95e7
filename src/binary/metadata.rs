//! Binary type metadata
//!
//! Objects on the wire carry only hashed field ids. The names behind those
//! ids live in `BinaryType` records, which the client registers with the
//! server the first time it writes a type and fetches the first time it
//! reads an unknown type id.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

use super::types::TypeCode;

/// Metadata for one field of a binary type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryField {
    pub name: String,
    pub field_id: i32,
    pub type_code: u8,
}

/// Metadata for a binary type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryType {
    pub type_id: i32,
    pub type_name: String,
    pub fields: Vec<BinaryField>,
}

impl BinaryType {
    pub fn field_by_id(&self, field_id: i32) -> Option<&BinaryField> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    /// Fold another description of the same type into this one
    ///
    /// Returns `true` if anything was added. A field whose type changes, or
    /// two names hashing to the same id, is a `SchemaMismatch`. A field
    /// first seen as null takes the first concrete type written to it.
    pub fn merge(&mut self, other: &BinaryType) -> Result<bool> {
        if other.type_id != self.type_id {
            return Err(ClientError::SchemaMismatch(format!(
                "cannot merge type '{}' into '{}'",
                other.type_name, self.type_name
            )));
        }

        let null = TypeCode::Null as u8;
        let mut changed = false;

        for incoming in &other.fields {
            match self.fields.iter_mut().find(|f| f.field_id == incoming.field_id) {
                Some(existing) => {
                    if !existing.name.eq_ignore_ascii_case(&incoming.name) {
                        return Err(ClientError::SchemaMismatch(format!(
                            "fields '{}' and '{}' of '{}' have the same id {}",
                            existing.name, incoming.name, self.type_name, incoming.field_id
                        )));
                    }
                    if existing.type_code == incoming.type_code || incoming.type_code == null {
                        continue;
                    }
                    if existing.type_code == null {
                        existing.type_code = incoming.type_code;
                        changed = true;
                        continue;
                    }
                    return Err(ClientError::SchemaMismatch(format!(
                        "field '{}' of '{}' was registered as {}, cannot write {}",
                        existing.name,
                        self.type_name,
                        type_label(existing.type_code),
                        type_label(incoming.type_code)
                    )));
                }
                None => {
                    self.fields.push(incoming.clone());
                    changed = true;
                }
            }
        }

        Ok(changed)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ClientError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn type_label(code: u8) -> String {
    match TypeCode::from_u8(code) {
        Some(code) => code.name().to_string(),
        None => format!("UNKNOWN({})", code),
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe store of binary type metadata keyed by type id
#[derive(Debug, Default)]
pub struct BinaryTypeRegistry {
    types: RwLock<HashMap<i32, BinaryType>>,
}

impl BinaryTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_id: i32) -> Option<BinaryType> {
        self.types.read().get(&type_id).cloned()
    }

    /// Merge metadata into the registry
    ///
    /// Returns `true` when the stored metadata changed (including first
    /// registration). On error the registry is left untouched.
    pub fn register(&self, binary_type: &BinaryType) -> Result<bool> {
        let mut types = self.types.write();
        match types.get(&binary_type.type_id) {
            Some(existing) => {
                let mut merged = existing.clone();
                let changed = merged.merge(binary_type)?;
                if changed {
                    types.insert(merged.type_id, merged);
                }
                Ok(changed)
            }
            None => {
                types.insert(binary_type.type_id, binary_type.clone());
                Ok(true)
            }
        }
    }

    /// Would registering this metadata change the registry?
    ///
    /// Conflicts are reported the same way `register` would report them.
    pub fn is_new(&self, binary_type: &BinaryType) -> Result<bool> {
        match self.types.read().get(&binary_type.type_id) {
            Some(existing) => existing.clone().merge(binary_type),
            None => Ok(true),
        }
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
