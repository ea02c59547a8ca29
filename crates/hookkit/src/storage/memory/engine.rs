use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hookkit_core::storage::{
    ChangeEvent, EngineConnection, EngineTransaction, Result, SchemaUpgrade, StorageEngine,
    StorageError, StorageRequest, TableSchema, TableState, TransactionMode, UpgradeCallback,
};
use tokio::sync::{broadcast, RwLock};

use super::store::ObjectStore;
use super::transaction::{MemoryTransaction, StoreGuard};

/// Default capacity of each database's change channel.
pub const CHANGE_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
struct TableEntry {
    /// Index name to uniqueness.
    indexes: BTreeMap<String, bool>,
    store: Arc<RwLock<ObjectStore>>,
}

struct Catalog {
    version: u32,
    tables: BTreeMap<String, TableEntry>,
}

struct MemoryDatabase {
    name: String,
    catalog: Mutex<Catalog>,
    changes_tx: broadcast::Sender<ChangeEvent>,
}

impl MemoryDatabase {
    fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A process-local storage engine keeping every database in memory.
///
/// Databases live as long as the engine. Each table sits behind its own
/// async read/write lock, so read-only transactions share tables and
/// read-write transactions get them exclusively.
pub struct MemoryEngine {
    databases: Mutex<HashMap<String, Arc<MemoryDatabase>>>,
    opens: AtomicU64,
    change_capacity: usize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_change_capacity(CHANGE_CHANNEL_CAPACITY)
    }

    /// Creates an engine whose change channels buffer `capacity` events per
    /// database.
    pub fn with_change_capacity(capacity: usize) -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
            opens: AtomicU64::new(0),
            change_capacity: capacity.max(1),
        }
    }

    /// Number of open requests received so far.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Stored version of a database, `None` if it was never opened.
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.lock()
            .get(name)
            .map(|database| database.catalog().version)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<MemoryDatabase>>> {
        self.databases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn database(&self, name: &str) -> Arc<MemoryDatabase> {
        let mut databases = self.lock();
        let database = databases.entry(name.to_string()).or_insert_with(|| {
            let (changes_tx, _) = broadcast::channel(self.change_capacity);
            Arc::new(MemoryDatabase {
                name: name.to_string(),
                catalog: Mutex::new(Catalog {
                    version: 0,
                    tables: BTreeMap::new(),
                }),
                changes_tx,
            })
        });
        Arc::clone(database)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    fn open(
        &self,
        name: &str,
        version: u32,
        on_upgrade: UpgradeCallback,
    ) -> StorageRequest<Arc<dyn EngineConnection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let database = self.database(name);

        {
            let mut catalog = database.catalog();
            if version < catalog.version {
                return StorageRequest::failed(StorageError::VersionError {
                    name: name.to_string(),
                    requested: version,
                    stored: catalog.version,
                });
            }

            if version > catalog.version {
                // Changes are staged and only kept if the whole upgrade succeeds.
                let mut upgrade = CatalogUpgrade {
                    database: name,
                    old_version: catalog.version,
                    new_version: version,
                    tables: catalog.tables.clone(),
                };
                if let Err(error) = on_upgrade(&mut upgrade) {
                    tracing::warn!(database = %name, version, error = %error, "Upgrade failed");
                    return StorageRequest::failed(StorageError::OpenFailed {
                        name: name.to_string(),
                        version,
                        reason: error.to_string(),
                    });
                }
                tracing::info!(
                    database = %name,
                    from = catalog.version,
                    to = version,
                    "Database upgraded"
                );
                catalog.tables = upgrade.tables;
                catalog.version = version;
            }
        }

        StorageRequest::succeeded(Arc::new(MemoryConnection { database, version })
            as Arc<dyn EngineConnection>)
    }
}

/// Staged catalog handed to the upgrade callback.
struct CatalogUpgrade<'a> {
    database: &'a str,
    old_version: u32,
    new_version: u32,
    tables: BTreeMap<String, TableEntry>,
}

impl SchemaUpgrade for CatalogUpgrade<'_> {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn new_version(&self) -> u32 {
        self.new_version
    }

    fn table_state(&self, name: &str) -> Option<TableState> {
        self.tables.get(name).map(|entry| TableState {
            indexes: entry.indexes.keys().cloned().collect(),
        })
    }

    fn create_table(&mut self, name: &str, schema: &TableSchema) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(StorageError::ConstraintError(format!(
                "table {name} already exists in {}",
                self.database
            )));
        }
        self.tables.insert(
            name.to_string(),
            TableEntry {
                indexes: BTreeMap::new(),
                store: Arc::new(RwLock::new(ObjectStore::new(name, schema))),
            },
        );
        Ok(())
    }

    fn create_index(&mut self, table: &str, index: &str, unique: bool) -> Result<()> {
        let entry = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        if entry.indexes.contains_key(index) {
            return Err(StorageError::ConstraintError(format!(
                "index {index} already exists on {table}"
            )));
        }
        entry.indexes.insert(index.to_string(), unique);
        Ok(())
    }
}

/// Connection to one in-memory database.
pub struct MemoryConnection {
    database: Arc<MemoryDatabase>,
    version: u32,
}

impl EngineConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.database.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn table_names(&self) -> Vec<String> {
        self.database.catalog().tables.keys().cloned().collect()
    }

    fn index_names(&self, table: &str) -> Vec<String> {
        self.database
            .catalog()
            .tables
            .get(table)
            .map(|entry| entry.indexes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn transaction(
        &self,
        tables: &[String],
        mode: TransactionMode,
    ) -> StorageRequest<Arc<dyn EngineTransaction>> {
        if tables.is_empty() {
            return StorageRequest::failed(StorageError::InvalidConfig(
                "a transaction needs at least one table".to_string(),
            ));
        }

        // Sorted scope so concurrent transactions always lock in the same order.
        let mut scope = BTreeMap::new();
        {
            let catalog = self.database.catalog();
            for table in tables {
                match catalog.tables.get(table) {
                    Some(entry) => {
                        scope.insert(table.clone(), Arc::clone(&entry.store));
                    }
                    None => return StorageRequest::failed(StorageError::TableNotFound(table.clone())),
                }
            }
        }

        let database = self.database.name.clone();
        let changes_tx = self.database.changes_tx.clone();

        if let Some(stores) = try_lock_all(&scope, mode) {
            return StorageRequest::succeeded(Arc::new(MemoryTransaction::new(
                database, mode, stores, changes_tx,
            )) as Arc<dyn EngineTransaction>);
        }

        tracing::debug!(database = %database, %mode, "Waiting for table locks");
        let (request, signal) = StorageRequest::pending();
        tokio::spawn(async move {
            let mut stores = BTreeMap::new();
            for (table, store) in scope {
                let guard = match mode {
                    TransactionMode::ReadOnly => StoreGuard::Read(store.read_owned().await),
                    TransactionMode::ReadWrite => StoreGuard::Write(store.write_owned().await),
                };
                stores.insert(table, guard);
            }
            signal.succeed(Arc::new(MemoryTransaction::new(
                database, mode, stores, changes_tx,
            )) as Arc<dyn EngineTransaction>);
        });
        request
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.database.changes_tx.subscribe()
    }
}

/// Takes every lock without waiting, or none at all.
fn try_lock_all(
    scope: &BTreeMap<String, Arc<RwLock<ObjectStore>>>,
    mode: TransactionMode,
) -> Option<BTreeMap<String, StoreGuard>> {
    let mut stores = BTreeMap::new();
    for (table, store) in scope {
        let store = Arc::clone(store);
        let guard = match mode {
            TransactionMode::ReadOnly => StoreGuard::Read(store.try_read_owned().ok()?),
            TransactionMode::ReadWrite => StoreGuard::Write(store.try_write_owned().ok()?),
        };
        stores.insert(table.clone(), guard);
    }
    Some(stores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookkit_core::storage::{ChangeKind, Key, RequestOutcome};
    use serde_json::json;
    use std::sync::mpsc;

    fn outcome<T: Send + 'static>(request: StorageRequest<T>) -> RequestOutcome<T> {
        let (tx, rx) = mpsc::channel();
        request.on_complete(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.recv().unwrap()
    }

    fn users_upgrade() -> UpgradeCallback {
        Box::new(|upgrade: &mut dyn SchemaUpgrade| {
            upgrade.create_table("users", &TableSchema::new("id"))?;
            upgrade.create_index("users", "email", false)
        })
    }

    fn open_users(engine: &MemoryEngine) -> Arc<dyn EngineConnection> {
        outcome(engine.open("app", 1, users_upgrade())).unwrap()
    }

    fn begin(connection: &Arc<dyn EngineConnection>, mode: TransactionMode) -> Arc<dyn EngineTransaction> {
        outcome(connection.transaction(&["users".to_string()], mode)).unwrap()
    }

    #[test]
    fn test_open_runs_upgrade_once() {
        let engine = MemoryEngine::new();
        let first = open_users(&engine);
        assert_eq!(first.table_names(), vec!["users".to_string()]);
        assert_eq!(first.index_names("users"), vec!["email".to_string()]);

        // Same version again: the callback must not run.
        let second = outcome(engine.open(
            "app",
            1,
            Box::new(|_: &mut dyn SchemaUpgrade| Err(StorageError::Unknown)),
        ))
        .unwrap();
        assert_eq!(second.version(), 1);
        assert_eq!(engine.open_count(), 2);
    }

    #[test]
    fn test_open_lower_version_fails() {
        let engine = MemoryEngine::new();
        outcome(engine.open("app", 3, Box::new(|_: &mut dyn SchemaUpgrade| Ok(())))).unwrap();

        let result = outcome(engine.open("app", 2, Box::new(|_: &mut dyn SchemaUpgrade| Ok(()))));
        assert!(matches!(
            result,
            Err(Some(StorageError::VersionError {
                requested: 2,
                stored: 3,
                ..
            }))
        ));
    }

    #[test]
    fn test_failed_upgrade_leaves_catalog_untouched() {
        let engine = MemoryEngine::new();
        open_users(&engine);

        let result = outcome(engine.open(
            "app",
            2,
            Box::new(|upgrade: &mut dyn SchemaUpgrade| {
                upgrade.create_table("posts", &TableSchema::new("id"))?;
                upgrade.create_table("users", &TableSchema::new("id"))
            }),
        ));
        assert!(matches!(result, Err(Some(StorageError::OpenFailed { .. }))));
        assert_eq!(engine.database_version("app"), Some(1));

        let connection = open_users(&engine);
        assert_eq!(connection.table_names(), vec!["users".to_string()]);
    }

    #[test]
    fn test_duplicate_index_is_constraint_error() {
        let engine = MemoryEngine::new();
        open_users(&engine);
        let result = outcome(engine.open(
            "app",
            2,
            Box::new(|upgrade: &mut dyn SchemaUpgrade| upgrade.create_index("users", "email", false)),
        ));
        assert!(matches!(
            result,
            Err(Some(StorageError::OpenFailed { ref reason, .. })) if reason.contains("Constraint error")
        ));
    }

    #[test]
    fn test_failed_request_rolls_back_transaction() {
        let engine = MemoryEngine::new();
        let connection = open_users(&engine);
        let txn = begin(&connection, TransactionMode::ReadWrite);

        outcome(txn.add("users", json!({"id": 1}))).unwrap();
        let duplicate = outcome(txn.add("users", json!({"id": 1})));
        assert!(matches!(duplicate, Err(Some(StorageError::DuplicateKey { .. }))));

        let later = outcome(txn.add("users", json!({"id": 2})));
        assert!(matches!(later, Err(Some(StorageError::TransactionAborted(_)))));
        assert!(matches!(
            outcome(txn.commit()),
            Err(Some(StorageError::DuplicateKey { .. }))
        ));

        let check = begin(&connection, TransactionMode::ReadOnly);
        assert_eq!(outcome(check.count("users")), Ok(0));
    }

    #[test]
    fn test_read_only_transaction_rejects_writes() {
        let engine = MemoryEngine::new();
        let connection = open_users(&engine);
        let txn = begin(&connection, TransactionMode::ReadOnly);
        assert!(matches!(
            outcome(txn.put("users", json!({"id": 1}))),
            Err(Some(StorageError::ReadOnly { .. }))
        ));
    }

    #[test]
    fn test_unknown_table_in_scope_fails() {
        let engine = MemoryEngine::new();
        let connection = open_users(&engine);
        let result = outcome(connection.transaction(&["ghosts".to_string()], TransactionMode::ReadOnly));
        assert!(matches!(result, Err(Some(StorageError::TableNotFound(_)))));
    }

    #[test]
    fn test_dropping_uncommitted_transaction_rolls_back() {
        let engine = MemoryEngine::new();
        let connection = open_users(&engine);
        {
            let txn = begin(&connection, TransactionMode::ReadWrite);
            outcome(txn.put("users", json!({"id": 1}))).unwrap();
        }
        let check = begin(&connection, TransactionMode::ReadOnly);
        assert_eq!(outcome(check.count("users")), Ok(0));
    }

    #[test]
    fn test_cursor_walks_records_in_key_order() {
        let engine = MemoryEngine::new();
        let connection = open_users(&engine);
        let txn = begin(&connection, TransactionMode::ReadWrite);
        for id in [2, 3, 1] {
            outcome(txn.add("users", json!({"id": id}))).unwrap();
        }

        let mut keys = Vec::new();
        let mut cursor = outcome(txn.open_cursor("users")).unwrap();
        while let Some(current) = cursor {
            keys.push(current.key().clone());
            cursor = outcome(current.advance()).unwrap();
        }
        assert_eq!(keys, vec![Key::from(1), Key::from(2), Key::from(3)]);
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let engine = MemoryEngine::new();
        let connection = open_users(&engine);
        let mut changes = connection.subscribe();

        let txn = begin(&connection, TransactionMode::ReadWrite);
        outcome(txn.add("users", json!({"id": 1}))).unwrap();
        outcome(txn.delete("users", &Key::from(1))).unwrap();
        assert!(changes.try_recv().is_err());

        outcome(txn.commit()).unwrap();
        let added = changes.recv().await.unwrap();
        let deleted = changes.recv().await.unwrap();
        assert_eq!(added.kind, ChangeKind::Added);
        assert_eq!(deleted.kind, ChangeKind::Deleted);
        assert_eq!(deleted.key, Some(Key::from(1)));
    }

    #[tokio::test]
    async fn test_writer_waits_for_reader() {
        let engine = MemoryEngine::new();
        let connection = open_users(&engine);
        let reader = begin(&connection, TransactionMode::ReadOnly);

        let pending = connection.transaction(&["users".to_string()], TransactionMode::ReadWrite);
        assert!(!pending.is_settled());

        outcome(reader.commit()).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        pending.on_complete(move |outcome| {
            let _ = tx.send(outcome.is_ok());
        });
        assert!(rx.await.unwrap());
    }
}
