//! Engine Module
//!
//! In-memory cache store behind the reference server.
//!
//! ## Responsibilities
//! - Own the named caches and their entries
//! - Own the server-side binary type registry
//! - Execute decoded operations and produce response payloads
//!
//! Entries are stored as encoded bytes: keys compare by their wire
//! encoding and values go back to clients exactly as they were written.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::binary::{name_hash, to_bytes, BinaryTypeRegistry, Value};
use crate::error::{ClientError, Result};
use crate::protocol::{encode_binary_type_payload, Operation};

/// One named cache
#[derive(Debug)]
struct CacheStore {
    name: String,

    /// Encoded key -> encoded value
    entries: RwLock<HashMap<Bytes, Bytes>>,
}

impl CacheStore {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

/// Shared state for every server session
///
/// ## Concurrency Model
///
/// - The cache map sits behind one `RwLock`; only create and destroy take
///   it for writing
/// - Each cache has its own entry lock, so puts to different caches do not
///   contend
#[derive(Debug, Default)]
pub struct Engine {
    caches: RwLock<HashMap<i32, CacheStore>>,
    registry: BinaryTypeRegistry,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute an operation
    ///
    /// Returns the success payload; errors map onto response statuses.
    pub fn execute(&self, operation: Operation) -> Result<Bytes> {
        match operation {
            Operation::CacheGet { cache_id, key } => self.get(cache_id, &key),
            Operation::CachePut {
                cache_id,
                key,
                value,
            } => {
                self.put_all(cache_id, vec![(key, value)])?;
                Ok(Bytes::new())
            }
            Operation::CachePutAll { cache_id, entries } => {
                self.put_all(cache_id, entries)?;
                Ok(Bytes::new())
            }
            Operation::CacheCreate { name } => {
                self.create_cache(name, false)?;
                Ok(Bytes::new())
            }
            Operation::CacheGetOrCreate { name } => {
                self.create_cache(name, true)?;
                Ok(Bytes::new())
            }
            Operation::CacheDestroy { cache_id } => {
                self.destroy_cache(cache_id)?;
                Ok(Bytes::new())
            }
            Operation::GetBinaryType { type_id } => {
                encode_binary_type_payload(self.registry.get(type_id).as_ref())
            }
            Operation::PutBinaryType { binary_type } => {
                if self.registry.register(&binary_type)? {
                    tracing::debug!(
                        type_name = %binary_type.type_name,
                        type_id = binary_type.type_id,
                        "binary type registered"
                    );
                }
                Ok(Bytes::new())
            }
        }
    }

    // =========================================================================
    // Caches
    // =========================================================================

    fn create_cache(&self, name: String, allow_existing: bool) -> Result<()> {
        let cache_id = name_hash(&name);
        let mut caches = self.caches.write();

        if let Some(existing) = caches.get(&cache_id) {
            if allow_existing {
                return Ok(());
            }
            return Err(ClientError::CacheExists(existing.name.clone()));
        }

        tracing::info!(cache = %name, cache_id, "cache created");
        caches.insert(cache_id, CacheStore::new(name));
        Ok(())
    }

    fn destroy_cache(&self, cache_id: i32) -> Result<()> {
        match self.caches.write().remove(&cache_id) {
            Some(cache) => {
                tracing::info!(cache = %cache.name, cache_id, "cache destroyed");
                Ok(())
            }
            None => Err(unknown_cache(cache_id)),
        }
    }

    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    /// Number of entries in a cache, `None` if it does not exist
    pub fn cache_size(&self, name: &str) -> Option<usize> {
        self.caches
            .read()
            .get(&name_hash(name))
            .map(|cache| cache.entries.read().len())
    }

    // =========================================================================
    // Entries
    // =========================================================================

    fn get(&self, cache_id: i32, key: &Value) -> Result<Bytes> {
        let caches = self.caches.read();
        let cache = caches.get(&cache_id).ok_or_else(|| unknown_cache(cache_id))?;

        let encoded = to_bytes(key)?;
        let entries = cache.entries.read();
        entries.get(&encoded).cloned().ok_or_else(|| {
            ClientError::NotFound(format!("no entry for {} in cache '{}'", key.type_name(), cache.name))
        })
    }

    fn put_all(&self, cache_id: i32, entries: Vec<(Value, Value)>) -> Result<()> {
        let caches = self.caches.read();
        let cache = caches.get(&cache_id).ok_or_else(|| unknown_cache(cache_id))?;

        // Encode everything first so a bad entry writes nothing
        let encoded = entries
            .iter()
            .map(|(key, value)| Ok((to_bytes(key)?, to_bytes(value)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut stored = cache.entries.write();
        for (key, value) in encoded {
            stored.insert(key, value);
        }
        Ok(())
    }
}

fn unknown_cache(cache_id: i32) -> ClientError {
    ClientError::CacheNotFound(format!("no cache with id {}", cache_id))
}
