//! Client Facade
//!
//! Entry point for applications: owns the connection, the binary type
//! registry and the state notifier, and hands out cache handles.
//!
//! ## Binary type metadata
//! - Before a write, every binary object in the key and value is described
//!   as a `BinaryType`; types the registry has not seen (or that gained
//!   fields) are sent to the server with `PutBinaryType`
//! - After a read, objects whose type or field names are unknown are
//!   resolved from the registry, fetching missing types with
//!   `GetBinaryType`. A type whose fetched metadata still leaves names
//!   unresolved is not fetched again until this client registers it

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::Receiver;
use parking_lot::{Mutex, RwLock};

use crate::binary::{name_hash, BinaryObject, BinaryType, BinaryTypeRegistry, Value};
use crate::cache::CacheClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::network::{Connection, ConnectionState, StateEvent, StateNotifier};
use crate::protocol::{decode_binary_type_payload, Operation};

// =============================================================================
// Shared State
// =============================================================================

/// State shared by a client and all of its cache handles
pub(crate) struct ClientShared {
    connection: RwLock<Option<Arc<Connection>>>,
    registry: BinaryTypeRegistry,
    /// Type ids the server could not fully name
    unresolved: Mutex<HashSet<i32>>,
    notifier: Arc<StateNotifier>,
}

impl ClientShared {
    /// The live connection
    ///
    /// `InvalidState` before the first connect or after `disconnect`,
    /// `ConnectionClosed` once the transport has failed.
    fn connection(&self) -> Result<Arc<Connection>> {
        let guard = self.connection.read();
        match guard.as_ref() {
            Some(connection) if connection.is_open() => Ok(Arc::clone(connection)),
            Some(_) => Err(ClientError::ConnectionClosed),
            None => Err(ClientError::InvalidState(
                "client is not connected".to_string(),
            )),
        }
    }

    pub(crate) fn request(&self, operation: &Operation) -> Result<Bytes> {
        self.connection()?.request(operation)
    }

    /// Register metadata for every binary object inside `value`
    ///
    /// Nested objects are registered before the objects that contain them.
    pub(crate) fn register_types(&self, value: &Value) -> Result<()> {
        let object = match value {
            Value::Object(object) => object,
            _ => return Ok(()),
        };

        for field in object.fields() {
            self.register_types(field.value())?;
        }

        let binary_type = object.binary_type()?;
        if !self.registry.is_new(&binary_type)? {
            return Ok(());
        }

        tracing::debug!(
            type_name = %binary_type.type_name,
            type_id = binary_type.type_id,
            fields = binary_type.fields.len(),
            "registering binary type"
        );
        self.request(&Operation::PutBinaryType {
            binary_type: binary_type.clone(),
        })?;
        self.registry.register(&binary_type)?;
        self.unresolved.lock().remove(&binary_type.type_id);
        Ok(())
    }

    /// Fill in type and field names of every binary object inside `value`
    pub(crate) fn resolve_names(&self, value: &mut Value) -> Result<()> {
        let object = match value {
            Value::Object(object) => object,
            _ => return Ok(()),
        };

        if let Some(binary_type) = self.registry.get(object.type_id()) {
            object.apply_binary_type(&binary_type);
        }
        let type_id = object.type_id();
        if !is_resolved(object) && !self.unresolved.lock().contains(&type_id) {
            if let Some(binary_type) = self.fetch_binary_type(type_id)? {
                object.apply_binary_type(&binary_type);
            }
            if !is_resolved(object) {
                tracing::debug!(type_id, "binary type stays partly unnamed");
                self.unresolved.lock().insert(type_id);
            }
        }

        for field in object.fields_mut() {
            self.resolve_names(field.value_mut())?;
        }
        Ok(())
    }

    fn fetch_binary_type(&self, type_id: i32) -> Result<Option<BinaryType>> {
        let payload = self.request(&Operation::GetBinaryType { type_id })?;
        let binary_type = match decode_binary_type_payload(&payload)? {
            Some(binary_type) => binary_type,
            None => {
                tracing::debug!(type_id, "server has no metadata for binary type");
                return Ok(None);
            }
        };

        if let Err(err) = self.registry.register(&binary_type) {
            tracing::warn!(type_id, error = %err, "ignoring conflicting binary type metadata");
        }
        Ok(Some(binary_type))
    }
}

fn is_resolved(object: &BinaryObject) -> bool {
    object.type_name().is_some() && object.fields().all(|f| f.name().is_some())
}

// =============================================================================
// Client
// =============================================================================

/// A thin client for one server endpoint
///
/// ```no_run
/// use cachewire::{Client, ClientConfig, Value};
///
/// let client = Client::new()?;
/// client.connect(ClientConfig::new("127.0.0.1:10800"))?;
///
/// let cache = client.get_or_create_cache("greetings")?;
/// cache.put(1, "hello")?;
/// assert_eq!(cache.get(1)?, Value::from("hello"));
///
/// client.disconnect();
/// # Ok::<(), cachewire::ClientError>(())
/// ```
pub struct Client {
    shared: Arc<ClientShared>,
}

impl Client {
    /// Create a disconnected client
    pub fn new() -> Result<Self> {
        Ok(Self {
            shared: Arc::new(ClientShared {
                connection: RwLock::new(None),
                registry: BinaryTypeRegistry::new(),
                unresolved: Mutex::new(HashSet::new()),
                notifier: Arc::new(StateNotifier::new()?),
            }),
        })
    }

    /// Create a client with a state change listener already attached
    pub fn with_listener<F>(listener: F) -> Result<Self>
    where
        F: Fn(&StateEvent) + Send + 'static,
    {
        let client = Self::new()?;
        client.add_state_listener(listener);
        Ok(client)
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Attach a listener run on the notifier thread for every transition
    pub fn add_state_listener<F>(&self, listener: F)
    where
        F: Fn(&StateEvent) + Send + 'static,
    {
        self.shared.notifier.add_listener(Box::new(listener));
    }

    /// Channel receiving every transition made after this call
    pub fn subscribe(&self) -> Receiver<StateEvent> {
        self.shared.notifier.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.notifier.state()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to the configured endpoint
    ///
    /// Fails with `InvalidState` while connecting or connected, `Config` for
    /// a malformed endpoint and `Connection` when the server cannot be
    /// reached or rejects the handshake.
    pub fn connect(&self, config: ClientConfig) -> Result<()> {
        config.validate()?;

        let stale = {
            let mut slot = self.shared.connection.write();
            if let Some(existing) = slot.as_ref() {
                if existing.is_open() {
                    return Err(ClientError::InvalidState(format!(
                        "already connected to {}",
                        existing.endpoint()
                    )));
                }
            }
            slot.take()
        };
        // A connection that failed on its own is finished with
        if let Some(stale) = stale {
            stale.close();
        }

        // The slot stays unlocked during connect and handshake; a concurrent
        // connect loses the Disconnected -> Connecting transition instead
        tracing::debug!(endpoint = %config.endpoint, "connecting");
        let connection = Arc::new(Connection::open(
            &config,
            Arc::clone(&self.shared.notifier),
        )?);
        *self.shared.connection.write() = Some(connection);
        Ok(())
    }

    /// Close the connection
    ///
    /// Requests still in flight fail with `ConnectionClosed`. Does nothing
    /// when not connected.
    pub fn disconnect(&self) {
        let connection = self.shared.connection.write().take();
        if let Some(connection) = connection {
            tracing::debug!(endpoint = %connection.endpoint(), "disconnecting");
            connection.close();
        }
    }

    // =========================================================================
    // Caches
    // =========================================================================

    /// Handle to a cache that is assumed to exist; no round trip
    pub fn get_cache(&self, name: impl Into<String>) -> CacheClient {
        CacheClient::new(name.into(), Arc::clone(&self.shared))
    }

    /// Create a cache, failing with `CacheExists` if it is already there
    pub fn create_cache(&self, name: impl Into<String>) -> Result<CacheClient> {
        let name = name.into();
        self.shared.request(&Operation::CacheCreate { name: name.clone() })?;
        Ok(self.get_cache(name))
    }

    pub fn get_or_create_cache(&self, name: impl Into<String>) -> Result<CacheClient> {
        let name = name.into();
        self.shared
            .request(&Operation::CacheGetOrCreate { name: name.clone() })?;
        Ok(self.get_cache(name))
    }

    /// Destroy a cache and its entries, failing with `CacheNotFound`
    pub fn destroy_cache(&self, name: &str) -> Result<()> {
        self.shared.request(&Operation::CacheDestroy {
            cache_id: name_hash(name),
        })?;
        Ok(())
    }

    /// Metadata the client knows for a binary type, if any
    pub fn binary_type(&self, type_name: &str) -> Option<BinaryType> {
        self.shared.registry.get(name_hash(type_name))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
