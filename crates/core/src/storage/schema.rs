//! Schema configuration types and key path handling.
//!
//! Pure data: a [`DatabaseConfig`] describes the tables a database should
//! contain, and a [`KeyPath`] knows how to read and write primary keys inside
//! a record.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Key, Record, Result, StorageError};

/// Location of the primary key inside a record.
///
/// A single path may use dots to reach nested fields (`"meta.id"`). A compound
/// path produces an array key with one component per path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    Single(String),
    Compound(Vec<String>),
}

impl KeyPath {
    /// Reads the key out of a record.
    ///
    /// Returns `None` when any component is missing or is not a valid key.
    pub fn extract(&self, record: &Record) -> Option<Key> {
        match self {
            KeyPath::Single(path) => lookup(record, path).and_then(Key::from_value),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|path| lookup(record, path).and_then(Key::from_value))
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
        }
    }

    /// Writes `key` into the record at this key path.
    pub fn inject(&self, record: &mut Record, key: &Key) -> Result<()> {
        match (self, key) {
            (KeyPath::Single(path), key) => assign(record, path, key.to_value()),
            (KeyPath::Compound(paths), Key::Array(parts)) if parts.len() == paths.len() => {
                for (path, part) in paths.iter().zip(parts) {
                    assign(record, path, part.to_value())?;
                }
                Ok(())
            }
            (KeyPath::Compound(_), _) => Err(StorageError::InvalidRecord(format!(
                "key {key} does not match compound key path {self}"
            ))),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            KeyPath::Single(path) => valid_path(path),
            KeyPath::Compound(paths) => !paths.is_empty() && paths.iter().all(|p| valid_path(p)),
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "{path}"),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(value: &str) -> Self {
        KeyPath::Single(value.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(value: String) -> Self {
        KeyPath::Single(value)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(value: Vec<&str>) -> Self {
        KeyPath::Compound(value.into_iter().map(str::to_string).collect())
    }
}

fn valid_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.is_empty())
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |value, segment| value.as_object()?.get(segment))
}

fn assign(record: &mut Value, path: &str, value: Value) -> Result<()> {
    let not_an_object =
        || StorageError::InvalidRecord(format!("cannot write key path {path} into a non-object"));

    let mut segments = path.split('.').peekable();
    let mut current = record;
    while let Some(segment) = segments.next() {
        let object = current.as_object_mut().ok_or_else(not_an_object)?;
        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return Ok(());
        }
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

/// Definition of one table (object store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub key_path: KeyPath,
    #[serde(default)]
    pub auto_increment: bool,
    /// Field names to index. Indexes are always non-unique.
    #[serde(default)]
    pub indexes: BTreeSet<String>,
}

impl TableSchema {
    /// Creates a table keyed by `key_path` with no indexes.
    pub fn new(key_path: impl Into<KeyPath>) -> Self {
        Self {
            key_path: key_path.into(),
            auto_increment: false,
            indexes: BTreeSet::new(),
        }
    }

    /// Lets the engine generate numeric keys.
    pub fn with_auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Adds a non-unique secondary index on `field`.
    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.insert(field.into());
        self
    }
}

/// Full schema configuration for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub tables: BTreeMap<String, TableSchema>,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            tables: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) a table definition.
    pub fn with_table(mut self, name: impl Into<String>, schema: TableSchema) -> Self {
        self.tables.insert(name.into(), schema);
        self
    }

    /// Parses a config from JSON, validating it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants every config must satisfy before it can be opened.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidConfig(
                "database name cannot be empty".to_string(),
            ));
        }
        if self.version == 0 {
            return Err(StorageError::InvalidConfig(
                "database version must be a positive integer".to_string(),
            ));
        }
        for (table, schema) in &self.tables {
            if table.is_empty() {
                return Err(StorageError::InvalidConfig(
                    "table name cannot be empty".to_string(),
                ));
            }
            if !schema.key_path.is_valid() {
                return Err(StorageError::InvalidConfig(format!(
                    "table {table} has an invalid key path"
                )));
            }
            if schema.auto_increment && matches!(schema.key_path, KeyPath::Compound(_)) {
                return Err(StorageError::InvalidConfig(format!(
                    "table {table} cannot auto-increment a compound key path"
                )));
            }
            if schema.indexes.iter().any(|index| index.is_empty()) {
                return Err(StorageError::InvalidConfig(format!(
                    "table {table} declares an empty index name"
                )));
            }
        }
        Ok(())
    }
}
