//! Database descriptor: the logical schema handed to the storage engine.
//!
//! The descriptor travels as the first argument of every boundary call. Its JSON
//! shape (camelCase) is what the engine-side interop script reads:
//!
//! ```json
//! {
//!   "name": "app", "version": 1, "dbModelGuid": "…", "dbModelId": 3,
//!   "stores": [{
//!     "name": "Users",
//!     "key": { "keyPath": "id", "autoIncrement": false },
//!     "indexes": [{ "name": "by_name", "keyPath": "name",
//!                   "definition": { "unique": false, "multiEntry": false } }]
//!   }]
//! }
//! ```
//!
//! Only two fields are written by this crate: the correlation identifier
//! (assigned when a facade is constructed) and the engine handle (assigned when
//! the database is opened).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{IndexedDbError, Result};

/// Engine-assigned handle for an opened database.
pub type DbHandle = i64;

/// Logical database description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDescriptor {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub stores: Vec<StoreSchema>,
    /// Correlation identifier, unique per facade instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_model_guid: Option<String>,
    /// Handle returned by the engine's openDb
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_model_id: Option<DbHandle>,
}

/// Object store definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSchema {
    pub name: String,
    pub key: KeySpec,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

/// Primary key definition of an object store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySpec {
    /// Dotted path to the key inside a record. `None` means out-of-line keys.
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub auto_increment: bool,
}

/// Secondary index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub name: String,
    pub key_path: String,
    #[serde(default)]
    pub definition: IndexDefinition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub multi_entry: bool,
}

impl DatabaseDescriptor {
    /// Start building a descriptor.
    pub fn builder(name: impl Into<String>, version: u32) -> DescriptorBuilder {
        DescriptorBuilder::new(name, version)
    }

    /// Parse and validate a descriptor from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: DatabaseDescriptor = serde_json::from_str(json)
            .map_err(|e| IndexedDbError::InvalidDescriptor(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Look up a store definition by name.
    pub fn store(&self, name: &str) -> Option<&StoreSchema> {
        self.stores.iter().find(|s| s.name == name)
    }

    /// Check the structural rules the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(IndexedDbError::InvalidDescriptor(
                "database name is empty".into(),
            ));
        }
        if self.version == 0 {
            return Err(IndexedDbError::InvalidDescriptor(format!(
                "database {} has version 0; versions start at 1",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(IndexedDbError::InvalidDescriptor(format!(
                    "database {} has a store with an empty name",
                    self.name
                )));
            }
            if !seen.insert(store.name.as_str()) {
                return Err(IndexedDbError::InvalidDescriptor(format!(
                    "duplicate store name: {}",
                    store.name
                )));
            }
            let mut index_names = HashSet::new();
            for index in &store.indexes {
                if !index_names.insert(index.name.as_str()) {
                    return Err(IndexedDbError::InvalidDescriptor(format!(
                        "duplicate index {} on store {}",
                        index.name, store.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl StoreSchema {
    /// Store whose records carry their key at `key_path`.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeySpec {
                key_path: Some(key_path.into()),
                auto_increment: false,
            },
            indexes: Vec::new(),
        }
    }

    /// Store with out-of-line keys supplied on each write.
    pub fn out_of_line(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeySpec::default(),
            indexes: Vec::new(),
        }
    }

    pub fn auto_increment(mut self) -> Self {
        self.key.auto_increment = true;
        self
    }

    pub fn index(mut self, name: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.indexes.push(IndexSpec {
            name: name.into(),
            key_path: key_path.into(),
            definition: IndexDefinition::default(),
        });
        self
    }

    pub fn unique_index(mut self, name: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.indexes.push(IndexSpec {
            name: name.into(),
            key_path: key_path.into(),
            definition: IndexDefinition {
                unique: true,
                multi_entry: false,
            },
        });
        self
    }

    /// Index over an array field; each element is indexed separately.
    pub fn multi_entry_index(
        mut self,
        name: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        self.indexes.push(IndexSpec {
            name: name.into(),
            key_path: key_path.into(),
            definition: IndexDefinition {
                unique: false,
                multi_entry: true,
            },
        });
        self
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// Builder for [`DatabaseDescriptor`]
#[derive(Debug)]
pub struct DescriptorBuilder {
    descriptor: DatabaseDescriptor,
}

impl DescriptorBuilder {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            descriptor: DatabaseDescriptor {
                name: name.into(),
                version,
                stores: Vec::new(),
                db_model_guid: None,
                db_model_id: None,
            },
        }
    }

    pub fn store(mut self, store: StoreSchema) -> Self {
        self.descriptor.stores.push(store);
        self
    }

    pub fn stores(mut self, stores: impl IntoIterator<Item = StoreSchema>) -> Self {
        self.descriptor.stores.extend(stores);
        self
    }

    pub fn build(self) -> Result<DatabaseDescriptor> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn users_db() -> DatabaseDescriptor {
        DatabaseDescriptor::builder("app", 1)
            .store(StoreSchema::new("Users", "id").index("by_name", "name"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_descriptor_wire_shape() {
        let value = serde_json::to_value(users_db()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "app",
                "version": 1,
                "stores": [{
                    "name": "Users",
                    "key": { "keyPath": "id", "autoIncrement": false },
                    "indexes": [{
                        "name": "by_name",
                        "keyPath": "name",
                        "definition": { "unique": false, "multiEntry": false }
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_assigned_fields_serialize() {
        let mut db = users_db();
        db.db_model_guid = Some("guid-1".into());
        db.db_model_id = Some(7);
        let value = serde_json::to_value(&db).unwrap();
        assert_eq!(value["dbModelGuid"], "guid-1");
        assert_eq!(value["dbModelId"], 7);
    }

    #[test]
    fn test_from_json() {
        let db = DatabaseDescriptor::from_json(
            r#"{"name":"app","version":2,"stores":[{"name":"Log","key":{"autoIncrement":true}}]}"#,
        )
        .unwrap();
        assert_eq!(db.version, 2);
        let log = db.store("Log").unwrap();
        assert!(log.key.auto_increment);
        assert!(log.key.key_path.is_none());
        assert!(log.indexes.is_empty());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = DatabaseDescriptor::from_json("{\"name\":").unwrap_err();
        assert!(matches!(err, IndexedDbError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_validation() {
        assert!(DatabaseDescriptor::builder("", 1).build().is_err());
        assert!(DatabaseDescriptor::builder("app", 0).build().is_err());

        let dup = DatabaseDescriptor::builder("app", 1)
            .store(StoreSchema::new("Users", "id"))
            .store(StoreSchema::new("Users", "id"))
            .build();
        assert!(
            matches!(dup, Err(IndexedDbError::InvalidDescriptor(msg)) if msg.contains("Users"))
        );

        let dup_index = DatabaseDescriptor::builder("app", 1)
            .store(
                StoreSchema::new("Users", "id")
                    .index("by_name", "name")
                    .unique_index("by_name", "email"),
            )
            .build();
        assert!(dup_index.is_err());
    }
}
