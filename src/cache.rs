//! Cache Handles
//!
//! `CacheClient` reads and writes dynamic `Value`s, optionally checked
//! against declared key and value types. `TypedCache` fixes both types at
//! compile time on top of it.
//!
//! ## Type checks
//! - Keys and values are checked against the declared types before anything
//!   is sent, and values again after they are read (`TypeMismatch`)
//! - Binary objects read under a declared complex type must conform to its
//!   descriptor (`SchemaMismatch`)
//! - Record access requires the value type to be declared as the record's
//!   complex type (`InvalidState`)

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::binary::{
    from_bytes, name_hash, BinaryObject, CacheKey, ComplexObjectType, ObjectType, TypedRecord,
    Value,
};
use crate::client::ClientShared;
use crate::error::{ClientError, Result};
use crate::protocol::Operation;

// =============================================================================
// Dynamic Cache Handle
// =============================================================================

/// Handle to one named cache
#[derive(Clone)]
pub struct CacheClient {
    name: String,
    cache_id: i32,
    key_type: Option<ObjectType>,
    value_type: Option<ObjectType>,
    shared: Arc<ClientShared>,
}

impl CacheClient {
    pub(crate) fn new(name: String, shared: Arc<ClientShared>) -> Self {
        Self {
            cache_id: name_hash(&name),
            name,
            key_type: None,
            value_type: None,
            shared,
        }
    }

    /// Declare the type every key must have
    pub fn set_key_type(mut self, key_type: impl Into<ObjectType>) -> Self {
        self.key_type = Some(key_type.into());
        self
    }

    /// Declare the type every value must have
    ///
    /// A complex type also names the binary objects read from this cache and
    /// enables `get_record`/`put_record`.
    pub fn set_value_type(mut self, value_type: impl Into<ObjectType>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_id(&self) -> i32 {
        self.cache_id
    }

    pub fn key_type(&self) -> Option<&ObjectType> {
        self.key_type.as_ref()
    }

    pub fn value_type(&self) -> Option<&ObjectType> {
        self.value_type.as_ref()
    }

    /// Fix the key and value types at compile time
    pub fn typed<K: CacheKey, V: TypedRecord>(self) -> TypedCache<K, V> {
        TypedCache::new(self)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Value stored under `key`; `NotFound` when there is none
    pub fn get(&self, key: impl Into<Value>) -> Result<Value> {
        let key = self.check_key(key.into())?;
        self.shared.register_types(&key)?;
        let payload = self.shared.request(&Operation::CacheGet {
            cache_id: self.cache_id,
            key,
        })?;

        let mut value = from_bytes(&payload)?;
        if let (Some(ObjectType::Complex(complex)), Value::Object(object)) =
            (&self.value_type, &mut value)
        {
            object.apply_complex_type(complex);
        }
        self.shared.resolve_names(&mut value)?;
        self.check_read(&value)?;
        Ok(value)
    }

    pub fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let key = self.check_key(key.into())?;
        let value = conform_to(&self.value_type, value.into())?;
        self.shared.register_types(&key)?;
        self.shared.register_types(&value)?;
        tracing::trace!(cache = %self.name, "put");
        self.shared.request(&Operation::CachePut {
            cache_id: self.cache_id,
            key,
            value,
        })?;
        Ok(())
    }

    /// Store several entries in one request
    ///
    /// Every entry is checked before anything is sent.
    pub fn put_all<K, V, I>(&self, entries: I) -> Result<()>
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| {
                let key = self.check_key(key.into())?;
                let value = conform_to(&self.value_type, value.into())?;
                Ok((key, value))
            })
            .collect::<Result<Vec<_>>>()?;

        if entries.is_empty() {
            return Ok(());
        }
        for (key, value) in &entries {
            self.shared.register_types(key)?;
            self.shared.register_types(value)?;
        }

        tracing::trace!(cache = %self.name, count = entries.len(), "put_all");
        self.shared.request(&Operation::CachePutAll {
            cache_id: self.cache_id,
            entries,
        })?;
        Ok(())
    }

    /// Read a value as a typed record
    pub fn get_record<R: TypedRecord>(&self, key: impl Into<Value>) -> Result<R> {
        let complex = self.record_type::<R>()?;
        match self.get(key)? {
            Value::Object(object) => object.to_record(),
            other => Err(ClientError::type_mismatch(
                complex.type_name(),
                other.type_name(),
            )),
        }
    }

    /// Store a typed record as a binary object
    pub fn put_record<R: TypedRecord>(&self, key: impl Into<Value>, record: &R) -> Result<()> {
        self.record_type::<R>()?;
        let object = BinaryObject::from_record(record)?;
        self.put(key, object)
    }

    // =========================================================================
    // Checks
    // =========================================================================

    /// The declared complex value type, which must be `R`'s
    fn record_type<R: TypedRecord>(&self) -> Result<&ComplexObjectType> {
        let wanted = R::complex_type();
        match &self.value_type {
            Some(ObjectType::Complex(complex)) if complex.type_id() == wanted.type_id() => {
                Ok(complex)
            }
            Some(declared) => Err(ClientError::InvalidState(format!(
                "cache '{}' holds {}, not {}",
                self.name,
                declared,
                wanted.type_name()
            ))),
            None => Err(ClientError::InvalidState(format!(
                "cache '{}' has no value type; declare {} with set_value_type",
                self.name,
                wanted.type_name()
            ))),
        }
    }

    fn check_key(&self, key: Value) -> Result<Value> {
        if key.is_null() {
            return Err(ClientError::InvalidState(format!(
                "cache '{}' does not accept null keys",
                self.name
            )));
        }
        conform_to(&self.key_type, key)
    }

    fn check_read(&self, value: &Value) -> Result<()> {
        match &self.value_type {
            None => Ok(()),
            Some(declared) if !declared.accepts(value) => Err(ClientError::type_mismatch(
                declared,
                value.type_name(),
            )),
            Some(ObjectType::Complex(complex)) => match value {
                Value::Object(object) => object.conform(complex),
                _ => Ok(()),
            },
            Some(ObjectType::Primitive(_)) => Ok(()),
        }
    }
}

/// Check a value against a declared type before writing it
///
/// Objects of a declared complex type pick up its type and field names, so
/// objects read without metadata can be written back.
fn conform_to(declared: &Option<ObjectType>, value: Value) -> Result<Value> {
    let declared = match declared {
        Some(declared) => declared,
        None => return Ok(value),
    };

    if !declared.accepts(&value) {
        return Err(ClientError::type_mismatch(declared, value.type_name()));
    }

    match (declared, value) {
        (ObjectType::Complex(complex), Value::Object(mut object)) => {
            object.apply_complex_type(complex);
            object.conform(complex)?;
            Ok(Value::Object(object))
        }
        (_, value) => Ok(value),
    }
}

impl fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("name", &self.name)
            .field("cache_id", &self.cache_id)
            .field("key_type", &self.key_type)
            .field("value_type", &self.value_type)
            .finish()
    }
}

// =============================================================================
// Typed Cache Handle
// =============================================================================

/// Cache handle with compile-time key and record types
pub struct TypedCache<K, V> {
    inner: CacheClient,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K: CacheKey, V: TypedRecord> TypedCache<K, V> {
    pub fn new(cache: CacheClient) -> Self {
        Self {
            inner: cache
                .set_key_type(K::object_type())
                .set_value_type(V::object_type()),
            _types: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn get(&self, key: &K) -> Result<V> {
        self.inner.get_record(key.clone())
    }

    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        self.inner.put_record(key.clone(), value)
    }

    pub fn put_all<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a K, &'a V)>,
        K: 'a,
        V: 'a,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| Ok((key.clone(), BinaryObject::from_record(value)?)))
            .collect::<Result<Vec<_>>>()?;
        self.inner.put_all(entries)
    }

    /// The underlying dynamic handle, with the key and value types declared
    pub fn untyped(&self) -> &CacheClient {
        &self.inner
    }
}

impl<K, V> Clone for TypedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _types: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for TypedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedCache").field(&self.inner).finish()
    }
}
