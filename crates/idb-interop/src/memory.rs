//! In-process storage engine speaking the interop boundary protocol.
//!
//! `MemoryEngine` implements [`InvocationChannel`] directly: it answers the same
//! twelve boundary calls the browser-side interop script does, with
//! IndexedDB-like semantics. Useful for:
//! - Unit and integration testing of code written against the facade
//! - Native hosts that want the facade without a browser
//!
//! Not persistent. Semantics follow IndexedDB where it matters to callers:
//! - keys order numbers < strings < arrays
//! - `addItems` rejects existing keys, `updateItems` replaces
//! - key generators for auto-increment stores, bumped by explicit numeric keys
//! - unique and multi-entry indexes
//! - range bounds are inclusive
//! - a write batch is all-or-nothing
//! - opening with a lower version than the stored one fails with `-1`

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::channel::{calls, InvocationChannel, OPEN_FAILED};
use crate::descriptor::{DatabaseDescriptor, DbHandle, IndexSpec, StoreSchema};
use crate::error::ChannelError;
use crate::tracing::prefix::DB;

type EngineResult<T> = std::result::Result<T, ChannelError>;

/// Largest key a generator hands out (2^53). Past it the generator is exhausted.
const MAX_GENERATED_KEY: i64 = 1 << 53;

/// In-memory engine. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
}

#[derive(Debug, Default)]
struct EngineState {
    last_handle: DbHandle,
    databases: HashMap<String, MemoryDatabase>,
}

#[derive(Debug)]
struct MemoryDatabase {
    version: u32,
    handles: HashSet<DbHandle>,
    stores: HashMap<String, MemoryStore>,
}

#[derive(Debug)]
struct MemoryStore {
    schema: StoreSchema,
    next_key: i64,
    records: BTreeMap<IdbKey, Value>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored version of a database, `None` if it does not exist.
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.state.lock().databases.get(name).map(|db| db.version)
    }

    /// Number of records in a store, `None` if the database or store does not exist.
    pub fn record_count(&self, database: &str, store: &str) -> Option<usize> {
        let state = self.state.lock();
        state
            .databases
            .get(database)
            .and_then(|db| db.stores.get(store))
            .map(|s| s.records.len())
    }

    fn dispatch(&self, function: &str, args: &[Value]) -> EngineResult<Value> {
        if !calls::ALL.contains(&function) {
            return Err(ChannelError::NotFound(function.to_string()));
        }

        let descriptor: DatabaseDescriptor =
            serde_json::from_value(arg(args, 0, "descriptor")?.clone())
                .map_err(|e| ChannelError::Transport(format!("descriptor: {}", e)))?;

        let mut state = self.state.lock();
        match function {
            calls::OPEN_DB => return Ok(Value::from(state.open(&descriptor))),
            calls::DELETE_DB => return Ok(Value::from(state.delete(&descriptor.name))),
            _ => {}
        }

        let db = state.database_mut(&descriptor)?;
        let store_name = str_arg(args, 1, "storeName")?;
        let store = db.stores.get_mut(store_name).ok_or_else(|| {
            engine_error(
                "NotFoundError",
                format!("store {} does not exist in {}", store_name, descriptor.name),
            )
        })?;

        match function {
            calls::ADD_ITEMS => {
                let items = array_arg(args, 2, "items")?;
                let entries = items.iter().cloned().map(|v| (None, v)).collect();
                let n = store.write(entries, false)?;
                Ok(Value::from(format!("{} items added to {}", n, store_name)))
            }
            calls::UPDATE_ITEMS => {
                let items = array_arg(args, 2, "items")?;
                let entries = items.iter().cloned().map(|v| (None, v)).collect();
                let n = store.write(entries, true)?;
                Ok(Value::from(format!("{} items updated in {}", n, store_name)))
            }
            calls::UPDATE_ITEMS_BY_KEY => {
                let items = array_arg(args, 2, "items")?;
                let keys = array_arg(args, 3, "keys")?;
                if items.len() != keys.len() {
                    return Err(engine_error(
                        "DataError",
                        format!("{} items but {} keys", items.len(), keys.len()),
                    ));
                }
                let mut entries = Vec::with_capacity(items.len());
                for (item, key) in items.iter().zip(keys) {
                    entries.push((Some(key_from(key)?), item.clone()));
                }
                let n = store.write(entries, true)?;
                Ok(Value::from(format!("{} items updated in {}", n, store_name)))
            }
            calls::GET_BY_KEY => {
                let key = key_from(arg(args, 2, "key")?)?;
                Ok(store.records.get(&key).cloned().unwrap_or(Value::Null))
            }
            calls::DELETE_BY_KEY => {
                let key = key_from(arg(args, 2, "key")?)?;
                store.records.remove(&key);
                Ok(Value::from(format!("item deleted from {}", store_name)))
            }
            calls::DELETE_ALL => {
                store.records.clear();
                Ok(Value::from(format!("all items deleted from {}", store_name)))
            }
            calls::GET_ALL => Ok(Value::Array(store.records.values().cloned().collect())),
            calls::GET_RANGE => {
                let lower = key_from(arg(args, 2, "lowerBound")?)?;
                let upper = key_from(arg(args, 3, "upperBound")?)?;
                check_bounds(&lower, &upper)?;
                Ok(Value::Array(
                    store
                        .records
                        .range(lower..=upper)
                        .map(|(_, v)| v.clone())
                        .collect(),
                ))
            }
            calls::GET_BY_INDEX => {
                let lower = key_from(arg(args, 2, "lowerBound")?)?;
                let index = str_arg(args, 4, "dbIndex")?;
                let is_range = arg(args, 5, "isRange")?.as_bool().unwrap_or(false);
                let upper = if is_range {
                    let upper = key_from(arg(args, 3, "upperBound")?)?;
                    check_bounds(&lower, &upper)?;
                    upper
                } else {
                    lower.clone()
                };
                store.get_by_index(index, &lower, &upper)
            }
            calls::GET_EXTENT => {
                let index = arg(args, 2, "dbIndex")?.as_str();
                let max = match str_arg(args, 3, "extentType")? {
                    "Max" => true,
                    "Min" => false,
                    other => {
                        return Err(engine_error(
                            "TypeError",
                            format!("unknown extent type {}", other),
                        ))
                    }
                };
                store.extent(index, max)
            }
            _ => Err(ChannelError::NotFound(function.to_string())),
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl InvocationChannel for MemoryEngine {
    async fn invoke(&self, identifier: &str, args: Vec<Value>) -> Result<Value, ChannelError> {
        self.dispatch(calls::function_name(identifier), &args)
    }
}

// ============================================================================
// Databases
// ============================================================================

impl EngineState {
    fn open(&mut self, descriptor: &DatabaseDescriptor) -> DbHandle {
        if descriptor.version == 0 {
            return OPEN_FAILED;
        }

        match self.databases.get_mut(&descriptor.name) {
            Some(db) if descriptor.version < db.version => {
                debug!(
                    "{} refusing to open {} v{}: stored version is {}",
                    DB, descriptor.name, descriptor.version, db.version
                );
                return OPEN_FAILED;
            }
            Some(db) => {
                if descriptor.version > db.version {
                    debug!(
                        "{} upgrading {} v{} -> v{}",
                        DB, descriptor.name, db.version, descriptor.version
                    );
                    db.upgrade(descriptor);
                }
            }
            None => {
                debug!("{} creating {} v{}", DB, descriptor.name, descriptor.version);
                let mut db = MemoryDatabase {
                    version: 0,
                    handles: HashSet::new(),
                    stores: HashMap::new(),
                };
                db.upgrade(descriptor);
                self.databases.insert(descriptor.name.clone(), db);
            }
        }

        self.last_handle += 1;
        let handle = self.last_handle;
        if let Some(db) = self.databases.get_mut(&descriptor.name) {
            db.handles.insert(handle);
        }
        handle
    }

    fn delete(&mut self, name: &str) -> String {
        match self.databases.remove(name) {
            Some(_) => format!("database {} deleted", name),
            None => format!("database {} did not exist", name),
        }
    }

    fn database_mut(
        &mut self,
        descriptor: &DatabaseDescriptor,
    ) -> EngineResult<&mut MemoryDatabase> {
        let db = self.databases.get_mut(&descriptor.name).ok_or_else(|| {
            engine_error(
                "InvalidStateError",
                format!("database {} is not open", descriptor.name),
            )
        })?;
        match descriptor.db_model_id {
            Some(handle) if db.handles.contains(&handle) => Ok(db),
            Some(handle) => Err(engine_error(
                "InvalidStateError",
                format!("unknown handle {} for {}", handle, descriptor.name),
            )),
            None => Err(engine_error(
                "InvalidStateError",
                format!("database {} is not open", descriptor.name),
            )),
        }
    }
}

impl MemoryDatabase {
    /// Create missing stores and refresh index definitions. Existing records
    /// and key definitions are kept.
    fn upgrade(&mut self, descriptor: &DatabaseDescriptor) {
        for schema in &descriptor.stores {
            match self.stores.get_mut(&schema.name) {
                Some(store) => store.schema.indexes = schema.indexes.clone(),
                None => {
                    self.stores
                        .insert(schema.name.clone(), MemoryStore::new(schema.clone()));
                }
            }
        }
        self.version = descriptor.version;
    }
}

// ============================================================================
// Stores
// ============================================================================

impl MemoryStore {
    fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            next_key: 1,
            records: BTreeMap::new(),
        }
    }

    /// Write a batch. `overwrite = false` is add semantics (existing keys are a
    /// ConstraintError). Nothing is written if any entry fails.
    fn write(
        &mut self,
        entries: Vec<(Option<IdbKey>, Value)>,
        overwrite: bool,
    ) -> EngineResult<usize> {
        let generator = self.next_key;
        match self.stage(entries, overwrite) {
            Ok(staged) => {
                let n = staged.len();
                for (key, value) in staged {
                    self.records.insert(key, value);
                }
                Ok(n)
            }
            Err(e) => {
                self.next_key = generator;
                Err(e)
            }
        }
    }

    fn stage(
        &mut self,
        entries: Vec<(Option<IdbKey>, Value)>,
        overwrite: bool,
    ) -> EngineResult<Vec<(IdbKey, Value)>> {
        let mut staged: Vec<(IdbKey, Value)> = Vec::with_capacity(entries.len());

        for (explicit, mut value) in entries {
            let key = match explicit {
                Some(key) => {
                    if self.schema.key.key_path.is_some() {
                        return Err(engine_error(
                            "DataError",
                            format!(
                                "store {} uses in-line keys; explicit keys are not allowed",
                                self.schema.name
                            ),
                        ));
                    }
                    self.bump_generator(&key);
                    key
                }
                None => self.key_for(&mut value)?,
            };

            let exists = self.records.contains_key(&key) || staged.iter().any(|(k, _)| *k == key);
            if !overwrite && exists {
                return Err(engine_error(
                    "ConstraintError",
                    format!("key {} already exists in {}", key.to_value(), self.schema.name),
                ));
            }
            staged.retain(|(k, _)| *k != key);
            staged.push((key, value));
        }

        self.check_unique(&staged)?;
        Ok(staged)
    }

    /// Primary key of an in-line record, generating one if the store allows it.
    fn key_for(&mut self, record: &mut Value) -> EngineResult<IdbKey> {
        let path = self.schema.key.key_path.clone();
        let auto = self.schema.key.auto_increment;

        let Some(path) = path else {
            if auto {
                return self.generate();
            }
            return Err(engine_error(
                "DataError",
                format!(
                    "store {} uses out-of-line keys without a generator; supply keys explicitly",
                    self.schema.name
                ),
            ));
        };

        let existing = lookup(record, &path)
            .filter(|v| !v.is_null())
            .map(|v| {
                IdbKey::from_value(v).ok_or_else(|| {
                    engine_error("DataError", format!("value at {} is not a valid key", path))
                })
            })
            .transpose()?;

        match existing {
            Some(key) => {
                self.bump_generator(&key);
                Ok(key)
            }
            None if auto => {
                let key = self.generate()?;
                assign(record, &path, key.to_value())?;
                Ok(key)
            }
            None => Err(engine_error(
                "DataError",
                format!("record has no key at {}", path),
            )),
        }
    }

    fn generate(&mut self) -> EngineResult<IdbKey> {
        if self.next_key > MAX_GENERATED_KEY {
            return Err(engine_error(
                "ConstraintError",
                format!("key generator for {} is exhausted", self.schema.name),
            ));
        }
        let key = IdbKey::Number(self.next_key as f64);
        self.next_key += 1;
        Ok(key)
    }

    /// Move the generator past an explicit numeric key. Keys at or above 2^53
    /// exhaust it.
    fn bump_generator(&mut self, key: &IdbKey) {
        if !self.schema.key.auto_increment {
            return;
        }
        if let IdbKey::Number(n) = key {
            if *n < self.next_key as f64 {
                return;
            }
            self.next_key = if *n >= MAX_GENERATED_KEY as f64 {
                MAX_GENERATED_KEY + 1
            } else {
                (n.floor() as i64)
                    .checked_add(1)
                    .unwrap_or(MAX_GENERATED_KEY + 1)
            };
        }
    }

    fn check_unique(&self, staged: &[(IdbKey, Value)]) -> EngineResult<()> {
        for index in self.schema.indexes.iter().filter(|i| i.definition.unique) {
            let mut owners: BTreeMap<IdbKey, &IdbKey> = BTreeMap::new();
            for (pk, record) in &self.records {
                if staged.iter().any(|(k, _)| k == pk) {
                    continue;
                }
                for ik in index_keys(record, index) {
                    owners.insert(ik, pk);
                }
            }
            for (pk, record) in staged {
                for ik in index_keys(record, index) {
                    if let Some(owner) = owners.insert(ik.clone(), pk) {
                        if owner != pk {
                            return Err(engine_error(
                                "ConstraintError",
                                format!(
                                    "unique index {} already has {}",
                                    index.name,
                                    ik.to_value()
                                ),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn index(&self, name: &str) -> EngineResult<&IndexSpec> {
        self.schema.find_index(name).ok_or_else(|| {
            engine_error(
                "NotFoundError",
                format!("index {} does not exist on {}", name, self.schema.name),
            )
        })
    }

    /// Records with an index key in `lower..=upper`, ordered by index key then
    /// primary key. A multi-entry record appears once per matching element.
    fn get_by_index(&self, name: &str, lower: &IdbKey, upper: &IdbKey) -> EngineResult<Value> {
        let index = self.index(name)?;
        let mut hits: Vec<(IdbKey, &IdbKey, &Value)> = Vec::new();
        for (pk, record) in &self.records {
            for ik in index_keys(record, index) {
                if ik >= *lower && ik <= *upper {
                    hits.push((ik, pk, record));
                }
            }
        }
        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        Ok(Value::Array(hits.into_iter().map(|(_, _, v)| v.clone()).collect()))
    }

    fn extent(&self, index: Option<&str>, max: bool) -> EngineResult<Value> {
        let found = match index {
            None => {
                let mut keys = self.records.keys();
                if max {
                    keys.next_back().cloned()
                } else {
                    keys.next().cloned()
                }
            }
            Some(name) => {
                let index = self.index(name)?;
                let keys = self.records.values().flat_map(|r| index_keys(r, index));
                if max {
                    keys.max()
                } else {
                    keys.min()
                }
            }
        };
        Ok(found.map(|k| k.to_value()).unwrap_or(Value::Null))
    }
}

// ============================================================================
// Keys
// ============================================================================

/// A valid engine key. Ordering: numbers < strings < arrays; arrays compare
/// element-wise.
#[derive(Debug, Clone)]
pub enum IdbKey {
    Number(f64),
    String(String),
    Array(Vec<IdbKey>),
}

impl IdbKey {
    /// `None` for values that are not valid keys (booleans, null, objects).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(IdbKey::Number),
            Value::String(s) => Some(IdbKey::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(IdbKey::from_value)
                .collect::<Option<Vec<_>>>()
                .map(IdbKey::Array),
            _ => None,
        }
    }

    /// Integral numbers come back as JSON integers.
    pub fn to_value(&self) -> Value {
        match self {
            IdbKey::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                Value::from(*n as i64)
            }
            IdbKey::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            IdbKey::String(s) => Value::from(s.as_str()),
            IdbKey::Array(items) => Value::Array(items.iter().map(IdbKey::to_value).collect()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IdbKey::Number(_) => 0,
            IdbKey::String(_) => 1,
            IdbKey::Array(_) => 2,
        }
    }
}

impl Ord for IdbKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IdbKey::Number(a), IdbKey::Number(b)) => a.total_cmp(b),
            (IdbKey::String(a), IdbKey::String(b)) => a.cmp(b),
            (IdbKey::Array(a), IdbKey::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for IdbKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IdbKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IdbKey {}

// ============================================================================
// Helpers
// ============================================================================

fn engine_error(name: &str, message: impl std::fmt::Display) -> ChannelError {
    ChannelError::Engine(format!("{}: {}", name, message))
}

fn arg<'a>(args: &'a [Value], position: usize, name: &str) -> EngineResult<&'a Value> {
    args.get(position).ok_or_else(|| {
        ChannelError::Transport(format!("missing argument {} ({})", position, name))
    })
}

fn str_arg<'a>(args: &'a [Value], position: usize, name: &str) -> EngineResult<&'a str> {
    arg(args, position, name)?
        .as_str()
        .ok_or_else(|| {
            ChannelError::Transport(format!("argument {} ({}) is not a string", position, name))
        })
}

fn array_arg<'a>(args: &'a [Value], position: usize, name: &str) -> EngineResult<&'a Vec<Value>> {
    arg(args, position, name)?
        .as_array()
        .ok_or_else(|| {
            ChannelError::Transport(format!("argument {} ({}) is not an array", position, name))
        })
}

fn key_from(value: &Value) -> EngineResult<IdbKey> {
    IdbKey::from_value(value)
        .ok_or_else(|| engine_error("DataError", format!("{} is not a valid key", value)))
}

fn check_bounds(lower: &IdbKey, upper: &IdbKey) -> EngineResult<()> {
    if lower > upper {
        return Err(engine_error(
            "DataError",
            format!("lower bound {} is above upper bound {}", lower.to_value(), upper.to_value()),
        ));
    }
    Ok(())
}

/// Follow a dotted key path into a record.
fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |current, segment| current.as_object()?.get(segment))
}

/// Write `value` at a dotted key path, creating intermediate objects.
fn assign(record: &mut Value, path: &str, value: Value) -> EngineResult<()> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or(path);

    let mut current = record;
    for segment in segments {
        let object = current
            .as_object_mut()
            .ok_or_else(|| engine_error("DataError", format!("cannot inject key at {}", path)))?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    current
        .as_object_mut()
        .ok_or_else(|| engine_error("DataError", format!("cannot inject key at {}", path)))?
        .insert(last.to_string(), value);
    Ok(())
}

/// Index keys a record contributes to `index`. Records without a valid value
/// at the key path are not indexed.
fn index_keys(record: &Value, index: &IndexSpec) -> Vec<IdbKey> {
    match lookup(record, &index.key_path) {
        Some(Value::Array(items)) if index.definition.multi_entry => {
            let mut keys: Vec<IdbKey> = items.iter().filter_map(IdbKey::from_value).collect();
            keys.sort();
            keys.dedup();
            keys
        }
        Some(value) => IdbKey::from_value(value).into_iter().collect(),
        None => Vec::new(),
    }
}
