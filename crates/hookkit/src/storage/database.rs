use std::fmt;
use std::future::Future;
use std::sync::Arc;

use hookkit_core::storage::{
    ChangeEvent, EngineConnection, EngineTransaction, Result, StorageError, TransactionMode,
};
use tokio::sync::broadcast;

use super::{bridge, Table};

/// A table lock taken by a transaction: database, table and mode.
type HeldLock = (String, String, TransactionMode);

tokio::task_local! {
    /// Locks held by the transactions whose callbacks run on the current task.
    static HELD_LOCKS: Vec<HeldLock>;
}

/// Returns the first of `tables` that a transaction running on the current
/// task holds in a mode that would block a new `mode` transaction.
pub(super) fn lock_conflict(
    database: &str,
    tables: &[String],
    mode: TransactionMode,
) -> Option<String> {
    HELD_LOCKS
        .try_with(|held| {
            tables
                .iter()
                .find(|table| {
                    held.iter().any(|(held_db, held_table, held_mode)| {
                        held_db == database
                            && held_table == *table
                            && (mode == TransactionMode::ReadWrite
                                || *held_mode == TransactionMode::ReadWrite)
                    })
                })
                .cloned()
        })
        .ok()
        .flatten()
}

/// Handle to an open database.
///
/// Cheap to clone; every clone shares the same engine connection.
#[derive(Clone)]
pub struct DatabaseController {
    connection: Arc<dyn EngineConnection>,
}

impl DatabaseController {
    pub fn new(connection: Arc<dyn EngineConnection>) -> Self {
        Self { connection }
    }

    pub fn name(&self) -> &str {
        self.connection.name()
    }

    pub fn version(&self) -> u32 {
        self.connection.version()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.connection.table_names()
    }

    pub fn index_names(&self, table: &str) -> Vec<String> {
        self.connection.index_names(table)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table_names().iter().any(|table| table == name)
    }

    /// Returns a controller for `name`. Each operation on it runs in its own
    /// transaction.
    pub fn table(&self, name: impl Into<String>) -> Table {
        Table::standalone(Arc::clone(&self.connection), name.into())
    }

    /// Returns true if both controllers wrap the same engine connection.
    pub fn same_connection(&self, other: &DatabaseController) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.connection) as *const (),
            Arc::as_ptr(&other.connection) as *const (),
        )
    }

    /// Subscribes to changes committed through any connection to this
    /// database.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.connection.subscribe()
    }

    /// Runs `callback` inside one transaction over `tables`.
    ///
    /// The transaction commits when the callback returns `Ok` and aborts when
    /// it returns `Err`. Table controllers taken from the context never commit
    /// on their own.
    ///
    /// Inside the callback, use the context's tables. A standalone
    /// [`Table`] or a nested transaction on a table this one locks would wait
    /// for a lock that is only released after the callback returns, so on the
    /// same task it fails with [`StorageError::LockConflict`]. Work spawned
    /// onto other tasks is not checked and waits until this transaction ends.
    pub async fn transaction<T, F, Fut>(
        &self,
        tables: &[&str],
        mode: TransactionMode,
        callback: F,
    ) -> Result<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let scope: Vec<String> = tables.iter().map(|table| table.to_string()).collect();
        if let Some(table) = lock_conflict(self.name(), &scope, mode) {
            tracing::warn!(database = %self.name(), table = %table, "Nested transaction on a locked table");
            return Err(StorageError::LockConflict(table));
        }
        let transaction = bridge::settle(self.connection.transaction(&scope, mode)).await?;
        tracing::debug!(database = %self.name(), tables = ?scope, %mode, "Transaction started");

        let context = TransactionContext {
            transaction: Arc::clone(&transaction),
        };
        let mut held = HELD_LOCKS.try_with(Clone::clone).unwrap_or_default();
        held.extend(
            scope
                .iter()
                .map(|table| (self.name().to_string(), table.clone(), mode)),
        );

        match HELD_LOCKS.scope(held, callback(context)).await {
            Ok(value) => {
                bridge::settle(transaction.commit()).await?;
                Ok(value)
            }
            Err(error) => {
                tracing::debug!(database = %self.name(), error = %error, "Transaction callback failed, aborting");
                transaction.abort();
                Err(error)
            }
        }
    }
}

impl fmt::Debug for DatabaseController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseController")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

/// Handle passed to a transaction callback.
#[derive(Clone)]
pub struct TransactionContext {
    transaction: Arc<dyn EngineTransaction>,
}

impl TransactionContext {
    /// Returns a controller for `name` scoped to this transaction.
    pub fn table(&self, name: impl Into<String>) -> Table {
        Table::scoped(Arc::clone(&self.transaction), name.into())
    }

    pub fn mode(&self) -> TransactionMode {
        self.transaction.mode()
    }

    pub fn tables(&self) -> Vec<String> {
        self.transaction.tables()
    }
}
