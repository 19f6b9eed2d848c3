//! The IndexedDB facade.
//!
//! Every method is one boundary call: the descriptor plus the method's typed
//! arguments are serialized to JSON, sent through the [`InvocationChannel`], and
//! the JSON response is decoded into the requested type. Storage semantics
//! (ordering, transactions, key generation) belong to the engine.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{calls, InvocationChannel, OPEN_FAILED};
use crate::descriptor::{DatabaseDescriptor, DbHandle};
use crate::error::{IndexedDbError, Result};
use crate::extent::{decode_extent, Extent};
use crate::options::IndexedDbOptions;
use crate::query::IndexQuery;
use crate::tracing::prefix::DB;

/// Typed facade over the engine's interop functions.
///
/// Holds one database descriptor for its whole lifetime. The descriptor is
/// stamped with a fresh correlation id at construction and with the engine
/// handle once [`open_indexed_db`](Self::open_indexed_db) succeeds.
///
/// No ordering or locking is imposed between calls; concurrent calls are as
/// ordered as the engine makes them.
pub struct IndexedDbInterop<C> {
    channel: C,
    options: IndexedDbOptions,
    descriptor: RwLock<DatabaseDescriptor>,
}

impl<C> std::fmt::Debug for IndexedDbInterop<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedDbInterop")
            .field("namespace", &self.options.namespace())
            .field("descriptor", &*self.descriptor.read())
            .finish_non_exhaustive()
    }
}

impl<C: InvocationChannel> IndexedDbInterop<C> {
    /// Create the facade.
    ///
    /// Fails with [`IndexedDbError::NotConfigured`] when `options` carries no
    /// descriptor, and with [`IndexedDbError::InvalidDescriptor`] when the
    /// descriptor does not validate. No boundary call is made here.
    pub fn new(channel: C, mut options: IndexedDbOptions) -> Result<Self> {
        let mut descriptor = options
            .take_database()
            .ok_or(IndexedDbError::NotConfigured)?;
        descriptor.validate()?;
        descriptor.db_model_guid = Some(Uuid::new_v4().to_string());

        debug!(
            "{} interop ready for {} v{} ({})",
            DB,
            descriptor.name,
            descriptor.version,
            descriptor.db_model_guid.as_deref().unwrap_or_default()
        );

        Ok(Self {
            channel,
            options,
            descriptor: RwLock::new(descriptor),
        })
    }

    /// Snapshot of the descriptor as it will be sent on the next call.
    pub fn descriptor(&self) -> DatabaseDescriptor {
        self.descriptor.read().clone()
    }

    /// Engine handle, set once the database has been opened.
    pub fn handle(&self) -> Option<DbHandle> {
        self.descriptor.read().db_model_id
    }

    pub fn correlation_id(&self) -> String {
        self.descriptor
            .read()
            .db_model_guid
            .clone()
            .unwrap_or_default()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    // ========================================================================
    // Database lifecycle
    // ========================================================================

    /// Create, open or upgrade the database.
    ///
    /// Returns `None` when the engine answers with its failure sentinel; the
    /// stored handle is left untouched in that case.
    pub async fn open_indexed_db(&self) -> Result<Option<DbHandle>> {
        let handle: i64 = self.invoke(calls::OPEN_DB, Vec::new()).await?;

        if handle == OPEN_FAILED {
            warn!("{} engine could not open {}", DB, self.descriptor.read().name);
            return Ok(None);
        }

        let mut descriptor = self.descriptor.write();
        descriptor.db_model_id = Some(handle);
        info!(
            "{} opened {} v{} as handle {}",
            DB, descriptor.name, descriptor.version, handle
        );
        Ok(Some(handle))
    }

    /// Delete the database. Returns the engine's status text.
    pub async fn delete_indexed_db(&self) -> Result<String> {
        let status: String = self.invoke(calls::DELETE_DB, Vec::new()).await?;
        info!("{} deleted {}: {}", DB, self.descriptor.read().name, status);
        Ok(status)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Add records to a store.
    pub async fn add_items<T: Serialize>(&self, store: &str, items: &[T]) -> Result<String> {
        let args = vec![Value::from(store), serde_json::to_value(items)?];
        self.invoke(calls::ADD_ITEMS, args).await
    }

    /// Insert or replace records in a store.
    pub async fn update_items<T: Serialize>(&self, store: &str, items: &[T]) -> Result<String> {
        let args = vec![Value::from(store), serde_json::to_value(items)?];
        self.invoke(calls::UPDATE_ITEMS, args).await
    }

    /// Insert or replace records at explicit keys. `items[i]` is written at
    /// `keys[i]`, so both slices must have the same length.
    pub async fn update_items_by_key<T: Serialize>(
        &self,
        store: &str,
        items: &[T],
        keys: &[i64],
    ) -> Result<String> {
        if items.len() != keys.len() {
            return Err(IndexedDbError::InvalidArgument(format!(
                "{} items but {} keys for store {}",
                items.len(),
                keys.len(),
                store
            )));
        }
        let args = vec![
            Value::from(store),
            serde_json::to_value(items)?,
            serde_json::to_value(keys)?,
        ];
        self.invoke(calls::UPDATE_ITEMS_BY_KEY, args).await
    }

    /// Delete the record at `key`.
    pub async fn delete_by_key<K>(&self, store: &str, key: &K) -> Result<String>
    where
        K: Serialize + ?Sized,
    {
        let args = vec![Value::from(store), serde_json::to_value(key)?];
        self.invoke(calls::DELETE_BY_KEY, args).await
    }

    /// Remove every record from a store.
    pub async fn delete_all(&self, store: &str) -> Result<String> {
        self.invoke(calls::DELETE_ALL, vec![Value::from(store)]).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch the record at `key`, `None` if the engine has none.
    pub async fn get_by_key<K, T>(&self, store: &str, key: &K) -> Result<Option<T>>
    where
        K: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let args = vec![Value::from(store), serde_json::to_value(key)?];
        self.invoke(calls::GET_BY_KEY, args).await
    }

    pub async fn get_all<T: DeserializeOwned>(&self, store: &str) -> Result<Vec<T>> {
        self.invoke(calls::GET_ALL, vec![Value::from(store)]).await
    }

    /// Records whose primary key lies between `lower` and `upper`. Bound
    /// inclusivity is whatever the engine implements.
    pub async fn get_range<K, T>(&self, store: &str, lower: &K, upper: &K) -> Result<Vec<T>>
    where
        K: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let args = vec![
            Value::from(store),
            serde_json::to_value(lower)?,
            serde_json::to_value(upper)?,
        ];
        self.invoke(calls::GET_RANGE, args).await
    }

    /// Records matched through a secondary index.
    pub async fn get_by_index<K, T>(
        &self,
        store: &str,
        index: &str,
        query: &IndexQuery<K>,
    ) -> Result<Vec<T>>
    where
        K: Serialize,
        T: DeserializeOwned,
    {
        let (lower, upper) = query.bounds();
        let args = vec![
            Value::from(store),
            serde_json::to_value(lower)?,
            serde_json::to_value(upper)?,
            Value::from(index),
            Value::Bool(query.is_range()),
        ];
        self.invoke(calls::GET_BY_INDEX, args).await
    }

    pub async fn get_by_index_exact<K, T>(
        &self,
        store: &str,
        index: &str,
        value: K,
    ) -> Result<Vec<T>>
    where
        K: Serialize,
        T: DeserializeOwned,
    {
        self.get_by_index(store, index, &IndexQuery::Exact(value)).await
    }

    pub async fn get_by_index_range<K, T>(
        &self,
        store: &str,
        index: &str,
        lower: K,
        upper: K,
    ) -> Result<Vec<T>>
    where
        K: Serialize,
        T: DeserializeOwned,
    {
        self.get_by_index(store, index, &IndexQuery::Range { lower, upper }).await
    }

    // ========================================================================
    // Extents
    // ========================================================================

    pub async fn get_max_key<K: DeserializeOwned + Default>(&self, store: &str) -> Result<K> {
        self.get_extent(store, None, Extent::Max).await
    }

    pub async fn get_min_key<K: DeserializeOwned + Default>(&self, store: &str) -> Result<K> {
        self.get_extent(store, None, Extent::Min).await
    }

    pub async fn get_max_index<I: DeserializeOwned + Default>(
        &self,
        store: &str,
        index: &str,
    ) -> Result<I> {
        self.get_extent(store, Some(index), Extent::Max).await
    }

    pub async fn get_min_index<I: DeserializeOwned + Default>(
        &self,
        store: &str,
        index: &str,
    ) -> Result<I> {
        self.get_extent(store, Some(index), Extent::Min).await
    }

    /// Max or min of the primary key (`index = None`) or of an index.
    /// An empty store yields `T::default()`.
    pub async fn get_extent<T: DeserializeOwned + Default>(
        &self,
        store: &str,
        index: Option<&str>,
        extent: Extent,
    ) -> Result<T> {
        let identifier = self.options.qualify(calls::GET_EXTENT);
        let args = vec![
            Value::from(store),
            index.map(Value::from).unwrap_or(Value::Null),
            Value::from(extent.as_str()),
        ];
        let raw = self.invoke_raw(&identifier, args).await?;
        decode_extent(&identifier, &raw.to_string())
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Call `function` and decode its response into `T`.
    async fn invoke<T: DeserializeOwned>(&self, function: &str, args: Vec<Value>) -> Result<T> {
        let identifier = self.options.qualify(function);
        let raw = self.invoke_raw(&identifier, args).await?;
        serde_json::from_value(raw).map_err(|e| IndexedDbError::decode(&identifier, e))
    }

    /// Prepend the descriptor and send the call through the channel.
    async fn invoke_raw(&self, identifier: &str, args: Vec<Value>) -> Result<Value> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(self.descriptor_value()?);
        full.extend(args);

        debug!(
            "{} {} {}",
            DB,
            identifier,
            full.get(1).and_then(|v| v.as_str()).unwrap_or_default()
        );

        self.channel
            .invoke(identifier, full)
            .await
            .map_err(|e| IndexedDbError::channel(identifier, e))
    }

    fn descriptor_value(&self) -> Result<Value> {
        let descriptor = self.descriptor.read();
        Ok(serde_json::to_value(&*descriptor)?)
    }
}
