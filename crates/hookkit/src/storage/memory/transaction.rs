use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hookkit_core::storage::{
    ChangeEvent, EngineCursor, EngineTransaction, Key, KeyPath, Record, Result, StorageError,
    StorageRequest, TransactionMode,
};
use tokio::sync::{broadcast, OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

use super::store::{Change, ObjectStore, Undo};

/// Lock held on one table for the lifetime of a transaction.
pub(super) enum StoreGuard {
    Read(OwnedRwLockReadGuard<ObjectStore>),
    Write(OwnedRwLockWriteGuard<ObjectStore>),
}

impl StoreGuard {
    fn store(&self) -> &ObjectStore {
        match self {
            StoreGuard::Read(guard) => &**guard,
            StoreGuard::Write(guard) => &**guard,
        }
    }

    fn store_mut(&mut self) -> Option<&mut ObjectStore> {
        match self {
            StoreGuard::Read(_) => None,
            StoreGuard::Write(guard) => Some(&mut **guard),
        }
    }
}

#[derive(Debug)]
enum Status {
    Active,
    Failed(StorageError),
    Committed,
    Aborted,
}

struct TransactionState {
    status: Status,
    stores: BTreeMap<String, StoreGuard>,
    undo: Vec<(String, Undo)>,
    changes: Vec<ChangeEvent>,
}

impl TransactionState {
    fn ensure_active(&self) -> Result<()> {
        match &self.status {
            Status::Active => Ok(()),
            Status::Failed(error) => Err(StorageError::TransactionAborted(error.to_string())),
            Status::Committed | Status::Aborted => Err(StorageError::TransactionInactive),
        }
    }

    fn read<T>(&self, table: &str, op: impl FnOnce(&ObjectStore) -> T) -> Result<T> {
        self.ensure_active()?;
        let guard = self
            .stores
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(op(guard.store()))
    }

    fn write<T>(
        &mut self,
        database: &str,
        table: &str,
        op: impl FnOnce(&mut ObjectStore, &mut Vec<Undo>) -> Result<(T, Option<Change>)>,
    ) -> Result<T> {
        self.ensure_active()?;
        let guard = self
            .stores
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        let store = guard.store_mut().ok_or_else(|| StorageError::ReadOnly {
            table: table.to_string(),
        })?;

        let mut undo = Vec::new();
        let outcome = op(store, &mut undo);
        // Partial effects of a failed write still need reverting.
        self.undo
            .extend(undo.into_iter().map(|entry| (table.to_string(), entry)));

        let (value, change) = outcome?;
        if let Some((kind, key)) = change {
            self.changes
                .push(ChangeEvent::new(database, table, kind, key));
        }
        Ok(value)
    }

    fn rollback(&mut self) {
        for (table, entry) in self.undo.drain(..).rev() {
            if let Some(store) = self.stores.get_mut(&table).and_then(StoreGuard::store_mut) {
                store.rollback(entry);
            }
        }
        self.changes.clear();
    }

    /// Rolls back and releases every lock.
    fn fail(&mut self, error: StorageError) {
        self.rollback();
        self.stores.clear();
        self.status = Status::Failed(error);
    }
}

pub(super) struct TransactionInner {
    database: String,
    mode: TransactionMode,
    tables: Vec<String>,
    changes_tx: broadcast::Sender<ChangeEvent>,
    state: Mutex<TransactionState>,
}

impl TransactionInner {
    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turns an operation result into a settled request. The first failure
    /// aborts the transaction.
    fn respond<T: Send + 'static>(
        state: &mut TransactionState,
        result: Result<T>,
    ) -> StorageRequest<T> {
        match result {
            Ok(value) => StorageRequest::succeeded(value),
            Err(error) => {
                if matches!(state.status, Status::Active) {
                    tracing::debug!(error = %error, "Request failed, rolling back transaction");
                    state.fail(error.clone());
                }
                StorageRequest::failed(error)
            }
        }
    }

    fn read<T, F>(&self, table: &str, op: F) -> StorageRequest<T>
    where
        T: Send + 'static,
        F: FnOnce(&ObjectStore) -> T,
    {
        let mut state = self.lock();
        let result = state.read(table, op);
        Self::respond(&mut state, result)
    }

    fn write<T, F>(&self, table: &str, op: F) -> StorageRequest<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ObjectStore, &mut Vec<Undo>) -> Result<(T, Option<Change>)>,
    {
        let mut state = self.lock();
        let result = state.write(&self.database, table, op);
        Self::respond(&mut state, result)
    }

    fn cursor(
        self: &Arc<Self>,
        table: &str,
        after: Option<&Key>,
    ) -> StorageRequest<Option<Box<dyn EngineCursor>>> {
        let mut state = self.lock();
        let result = state.read(table, |store| store.next_entry(after)).map(|entry| {
            entry.map(|(key, value)| {
                Box::new(MemoryCursor {
                    transaction: Arc::clone(self),
                    table: table.to_string(),
                    key,
                    value,
                }) as Box<dyn EngineCursor>
            })
        });
        Self::respond(&mut state, result)
    }
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.status, Status::Active) {
            tracing::debug!(database = %self.database, "Transaction dropped without commit, rolling back");
            state.rollback();
            state.status = Status::Aborted;
        }
    }
}

/// A transaction over the in-memory engine.
///
/// Requests run synchronously against the locked tables and settle before
/// they are returned. Writes are kept in an undo log until commit.
#[derive(Clone)]
pub struct MemoryTransaction {
    inner: Arc<TransactionInner>,
}

impl MemoryTransaction {
    pub(super) fn new(
        database: String,
        mode: TransactionMode,
        stores: BTreeMap<String, StoreGuard>,
        changes_tx: broadcast::Sender<ChangeEvent>,
    ) -> Self {
        let tables = stores.keys().cloned().collect();
        Self {
            inner: Arc::new(TransactionInner {
                database,
                mode,
                tables,
                changes_tx,
                state: Mutex::new(TransactionState {
                    status: Status::Active,
                    stores,
                    undo: Vec::new(),
                    changes: Vec::new(),
                }),
            }),
        }
    }
}

impl EngineTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    fn tables(&self) -> Vec<String> {
        self.inner.tables.clone()
    }

    fn key_path(&self, table: &str) -> Result<KeyPath> {
        self.inner
            .lock()
            .read(table, |store| store.key_path().clone())
    }

    fn add(&self, table: &str, record: Record) -> StorageRequest<Key> {
        self.inner.write(table, |store, undo| {
            store
                .add(record, undo)
                .map(|(key, change)| (key, Some(change)))
        })
    }

    fn put(&self, table: &str, record: Record) -> StorageRequest<Key> {
        self.inner.write(table, |store, undo| {
            store
                .put(record, undo)
                .map(|(key, change)| (key, Some(change)))
        })
    }

    fn get(&self, table: &str, key: &Key) -> StorageRequest<Option<Record>> {
        self.inner.read(table, |store| store.get(key))
    }

    fn count_key(&self, table: &str, key: &Key) -> StorageRequest<u64> {
        self.inner
            .read(table, |store| u64::from(store.contains(key)))
    }

    fn delete(&self, table: &str, key: &Key) -> StorageRequest<()> {
        self.inner
            .write(table, |store, undo| Ok(((), store.delete(key, undo))))
    }

    fn clear(&self, table: &str) -> StorageRequest<()> {
        self.inner
            .write(table, |store, undo| Ok(((), Some(store.clear(undo)))))
    }

    fn count(&self, table: &str) -> StorageRequest<u64> {
        self.inner.read(table, ObjectStore::len)
    }

    fn open_cursor(&self, table: &str) -> StorageRequest<Option<Box<dyn EngineCursor>>> {
        self.inner.cursor(table, None)
    }

    fn commit(&self) -> StorageRequest<()> {
        let mut state = self.inner.lock();
        match &state.status {
            Status::Active => {}
            Status::Failed(error) => return StorageRequest::failed(error.clone()),
            Status::Committed | Status::Aborted => {
                return StorageRequest::failed(StorageError::TransactionInactive)
            }
        }

        state.status = Status::Committed;
        state.undo.clear();
        state.stores.clear();
        let changes = std::mem::take(&mut state.changes);
        drop(state);

        tracing::debug!(
            database = %self.inner.database,
            changes = changes.len(),
            "Transaction committed"
        );
        for change in changes {
            // No subscribers is fine.
            let _ = self.inner.changes_tx.send(change);
        }
        StorageRequest::succeeded(())
    }

    fn abort(&self) {
        let mut state = self.inner.lock();
        if matches!(state.status, Status::Active) {
            state.rollback();
            state.status = Status::Aborted;
        }
        state.stores.clear();
    }
}

/// Cursor over one table of a [`MemoryTransaction`].
pub struct MemoryCursor {
    transaction: Arc<TransactionInner>,
    table: String,
    key: Key,
    value: Record,
}

impl EngineCursor for MemoryCursor {
    fn key(&self) -> &Key {
        &self.key
    }

    fn value(&self) -> &Record {
        &self.value
    }

    fn advance(self: Box<Self>) -> StorageRequest<Option<Box<dyn EngineCursor>>> {
        self.transaction.cursor(&self.table, Some(&self.key))
    }
}
