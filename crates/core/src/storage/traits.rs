//! Storage engine boundary.
//!
//! These traits describe the native key-indexed storage engine the
//! controllers drive. Every data operation returns a one-shot
//! [`StorageRequest`]; nothing above the request bridge touches the
//! callback-style API directly.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::{
    ChangeEvent, Key, KeyPath, Record, Result, StorageRequest, TableSchema, TableState,
    TransactionMode,
};

/// Catalog handle available while a database is being upgraded.
pub trait SchemaUpgrade {
    /// Stored version before the upgrade (0 for a new database).
    fn old_version(&self) -> u32;

    /// Version being opened.
    fn new_version(&self) -> u32;

    /// Returns the current state of a table, or `None` if it does not exist.
    fn table_state(&self, name: &str) -> Option<TableState>;

    /// Creates a table. Fails if it already exists.
    fn create_table(&mut self, name: &str, schema: &TableSchema) -> Result<()>;

    /// Creates a secondary index on the field of the same name. Fails if it
    /// already exists.
    fn create_index(&mut self, table: &str, index: &str, unique: bool) -> Result<()>;
}

/// Callback run by the engine when the requested version is newer than the
/// stored one.
pub type UpgradeCallback = Box<dyn FnOnce(&mut dyn SchemaUpgrade) -> Result<()> + Send>;

/// Entry point of a storage engine.
pub trait StorageEngine: Send + Sync {
    /// Opens the named, versioned database, running `on_upgrade` first when
    /// the requested version exceeds the stored one.
    fn open(
        &self,
        name: &str,
        version: u32,
        on_upgrade: UpgradeCallback,
    ) -> StorageRequest<Arc<dyn EngineConnection>>;
}

/// An open connection to one database.
pub trait EngineConnection: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    /// Names of every table in the database, sorted.
    fn table_names(&self) -> Vec<String>;

    /// Names of the secondary indexes on `table`, sorted. Empty if the table
    /// does not exist.
    fn index_names(&self, table: &str) -> Vec<String>;

    /// Starts a transaction over `tables`. The request settles once the
    /// transaction is active.
    fn transaction(
        &self,
        tables: &[String],
        mode: TransactionMode,
    ) -> StorageRequest<Arc<dyn EngineTransaction>>;

    /// Subscribes to committed changes of this database.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// An active transaction.
///
/// A request that fails aborts the whole transaction: its writes are rolled
/// back and every later request fails.
pub trait EngineTransaction: Send + Sync {
    fn mode(&self) -> TransactionMode;

    /// Tables this transaction may touch.
    fn tables(&self) -> Vec<String>;

    /// Key path of a table in scope.
    fn key_path(&self, table: &str) -> Result<KeyPath>;

    /// Stores a new record. Fails if the key already exists.
    fn add(&self, table: &str, record: Record) -> StorageRequest<Key>;

    /// Stores a record, replacing any existing record with the same key.
    fn put(&self, table: &str, record: Record) -> StorageRequest<Key>;

    fn get(&self, table: &str, key: &Key) -> StorageRequest<Option<Record>>;

    /// Counts records matching `key` (0 or 1) without reading the value.
    fn count_key(&self, table: &str, key: &Key) -> StorageRequest<u64>;

    fn delete(&self, table: &str, key: &Key) -> StorageRequest<()>;

    fn clear(&self, table: &str) -> StorageRequest<()>;

    fn count(&self, table: &str) -> StorageRequest<u64>;

    /// Opens a cursor at the first record in key order, `None` if the table
    /// is empty.
    fn open_cursor(&self, table: &str) -> StorageRequest<Option<Box<dyn EngineCursor>>>;

    /// Commits. Fails with the original error if a request already failed.
    fn commit(&self) -> StorageRequest<()>;

    /// Rolls back every write made by this transaction.
    fn abort(&self);
}

/// Position of a cursor scan.
pub trait EngineCursor: Send {
    fn key(&self) -> &Key;

    fn value(&self) -> &Record;

    /// Moves to the next record in key order, `None` once exhausted.
    fn advance(self: Box<Self>) -> StorageRequest<Option<Box<dyn EngineCursor>>>;
}
