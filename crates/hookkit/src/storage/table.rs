use std::future::Future;
use std::sync::Arc;

use futures_util::future::try_join_all;
use hookkit_core::storage::{
    shallow_merge, EngineConnection, EngineTransaction, Key, Record, Result, StorageError,
    TransactionMode,
};

use super::bridge::settle;
use super::database::lock_conflict;

#[derive(Clone)]
enum Scope {
    /// Every operation opens and commits its own transaction.
    Standalone(Arc<dyn EngineConnection>),
    /// Operations join an outer transaction and never commit it.
    Transaction(Arc<dyn EngineTransaction>),
}

/// Operations on one table.
#[derive(Clone)]
pub struct Table {
    name: String,
    scope: Scope,
}

impl Table {
    pub(crate) fn standalone(connection: Arc<dyn EngineConnection>, name: String) -> Self {
        Self {
            name,
            scope: Scope::Standalone(connection),
        }
    }

    pub(crate) fn scoped(transaction: Arc<dyn EngineTransaction>, name: String) -> Self {
        Self {
            name,
            scope: Scope::Transaction(transaction),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores a new record and returns its key. Fails with
    /// [`StorageError::DuplicateKey`] if the key is taken.
    pub async fn insert(&self, record: Record) -> Result<Key> {
        let name = self.name.as_str();
        self.run(TransactionMode::ReadWrite, move |txn| async move {
            settle(txn.add(name, record)).await
        })
        .await
    }

    /// Shallow-merges `patch` into the record stored under `key`.
    ///
    /// The stored key always wins over any key field in the patch. Fails with
    /// [`StorageError::NotFound`] if nothing is stored under `key`.
    pub async fn update(&self, key: impl Into<Key>, patch: Record) -> Result<()> {
        let key = key.into();
        let name = self.name.as_str();
        self.run(TransactionMode::ReadWrite, move |txn| async move {
            let existing = settle(txn.get(name, &key))
                .await?
                .ok_or_else(|| StorageError::NotFound {
                    table: name.to_string(),
                    key: key.to_string(),
                })?;
            let mut merged = shallow_merge(&existing, &patch)?;
            txn.key_path(name)?.inject(&mut merged, &key)?;
            settle(txn.put(name, merged)).await?;
            Ok(())
        })
        .await
    }

    /// Deletes the record under `key`. Deleting a missing key succeeds.
    pub async fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let name = self.name.as_str();
        self.run(TransactionMode::ReadWrite, move |txn| async move {
            settle(txn.delete(name, &key)).await
        })
        .await
    }

    /// Returns true if a record is stored under `key`.
    pub async fn exists(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        let name = self.name.as_str();
        self.run(TransactionMode::ReadOnly, move |txn| async move {
            Ok(settle(txn.count_key(name, &key)).await? > 0)
        })
        .await
    }

    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Record>> {
        let key = key.into();
        let name = self.name.as_str();
        self.run(TransactionMode::ReadOnly, move |txn| async move {
            settle(txn.get(name, &key)).await
        })
        .await
    }

    /// Scans the whole table in key order and returns the records matching
    /// `predicate`.
    pub async fn query<P>(&self, predicate: P) -> Result<Vec<Record>>
    where
        P: Fn(&Record) -> bool + Send,
    {
        let name = self.name.as_str();
        self.run(TransactionMode::ReadOnly, move |txn| async move {
            let mut matches = Vec::new();
            let mut cursor = settle(txn.open_cursor(name)).await?;
            while let Some(current) = cursor {
                if predicate(current.value()) {
                    matches.push(current.value().clone());
                }
                cursor = settle(current.advance()).await?;
            }
            Ok(matches)
        })
        .await
    }

    /// Inserts or replaces a record.
    pub async fn upsert(&self, record: Record) -> Result<Key> {
        let name = self.name.as_str();
        self.run(TransactionMode::ReadWrite, move |txn| async move {
            settle(txn.put(name, record)).await
        })
        .await
    }

    /// Inserts every record in one transaction and returns their keys in
    /// input order. Any failure leaves the table unchanged.
    pub async fn bulk_insert(&self, records: Vec<Record>) -> Result<Vec<Key>> {
        let name = self.name.as_str();
        self.run(TransactionMode::ReadWrite, move |txn| async move {
            let requests: Vec<_> = records
                .into_iter()
                .map(|record| txn.add(name, record))
                .collect();
            try_join_all(requests.into_iter().map(settle)).await
        })
        .await
    }

    /// Removes every record.
    pub async fn clear(&self) -> Result<()> {
        let name = self.name.as_str();
        self.run(TransactionMode::ReadWrite, move |txn| async move {
            settle(txn.clear(name)).await
        })
        .await
    }

    pub async fn count(&self) -> Result<u64> {
        let name = self.name.as_str();
        self.run(TransactionMode::ReadOnly, move |txn| async move {
            settle(txn.count(name)).await
        })
        .await
    }

    async fn run<T, F, Fut>(&self, mode: TransactionMode, op: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn EngineTransaction>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let connection = match &self.scope {
            Scope::Transaction(txn) => return op(Arc::clone(txn)).await,
            Scope::Standalone(connection) => connection,
        };

        let scope = [self.name.clone()];
        if let Some(table) = lock_conflict(connection.name(), &scope, mode) {
            return Err(StorageError::LockConflict(table));
        }

        let txn = settle(connection.transaction(&scope, mode)).await?;
        match op(Arc::clone(&txn)).await {
            Ok(value) => {
                settle(txn.commit()).await?;
                Ok(value)
            }
            Err(error) => {
                txn.abort();
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{memory::MemoryEngine, ConnectionRegistry, DatabaseController};
    use hookkit_core::storage::{DatabaseConfig, TableSchema};
    use serde_json::json;

    async fn open() -> DatabaseController {
        let registry = ConnectionRegistry::new(Arc::new(MemoryEngine::new()));
        let config = DatabaseConfig::new("app", 1)
            .with_table("users", TableSchema::new("id").with_index("email"))
            .with_table("logs", TableSchema::new("seq").with_auto_increment());
        registry.open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_duplicate_key_fails() {
        let users = open().await.table("users");
        assert_eq!(users.insert(json!({"id": 1, "name": "A"})).await, Ok(Key::from(1)));

        let result = users.insert(json!({"id": 1, "name": "B"})).await;
        assert!(matches!(result, Err(StorageError::DuplicateKey { .. })));
        assert_eq!(users.get(1).await, Ok(Some(json!({"id": 1, "name": "A"}))));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let users = open().await.table("users");
        users
            .insert(json!({"id": "u1", "name": "A", "email": "a@x"}))
            .await
            .unwrap();

        users.update("u1", json!({"name": "B", "id": "other"})).await.unwrap();

        assert_eq!(
            users.get("u1").await,
            Ok(Some(json!({"id": "u1", "name": "B", "email": "a@x"})))
        );
        assert_eq!(users.exists("other").await, Ok(false));
    }

    #[tokio::test]
    async fn test_update_missing_key_fails() {
        let users = open().await.table("users");
        let result = users.update("ghost", json!({"name": "x"})).await;

        assert!(matches!(result, Err(StorageError::NotFound { .. })));
        assert_eq!(users.count().await, Ok(0));
    }

    #[tokio::test]
    async fn test_query_filters_in_key_order() {
        let users = open().await.table("users");
        for (id, active) in [(3, true), (1, true), (2, false)] {
            users.insert(json!({"id": id, "active": active})).await.unwrap();
        }

        let active = users.query(|record| record["active"] == json!(true)).await.unwrap();
        let ids: Vec<_> = active.iter().map(|record| record["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(3)]);
    }

    #[tokio::test]
    async fn test_query_empty_table() {
        let users = open().await.table("users");
        assert_eq!(users.query(|_| true).await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let users = open().await.table("users");
        users.upsert(json!({"id": 5, "v": 1})).await.unwrap();
        users.upsert(json!({"id": 5, "v": 2})).await.unwrap();

        assert_eq!(users.count().await, Ok(1));
        assert_eq!(users.get(5).await, Ok(Some(json!({"id": 5, "v": 2}))));
    }

    #[tokio::test]
    async fn test_bulk_insert_returns_keys_in_order() {
        let logs = open().await.table("logs");
        let keys = logs
            .bulk_insert(vec![json!({"m": "a"}), json!({"m": "b"}), json!({"m": "c"})])
            .await
            .unwrap();

        assert_eq!(keys, vec![Key::from(1), Key::from(2), Key::from(3)]);
        assert_eq!(logs.count().await, Ok(3));
    }

    #[tokio::test]
    async fn test_bulk_insert_is_all_or_nothing() {
        let users = open().await.table("users");
        users.insert(json!({"id": 2})).await.unwrap();

        let result = users
            .bulk_insert(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})])
            .await;

        assert!(matches!(result, Err(StorageError::DuplicateKey { .. })));
        assert_eq!(users.count().await, Ok(1));
        assert_eq!(users.exists(1).await, Ok(false));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let users = open().await.table("users");
        users
            .bulk_insert(vec![json!({"id": 1}), json!({"id": 2})])
            .await
            .unwrap();

        users.delete(1).await.unwrap();
        users.delete(99).await.unwrap();
        assert_eq!(users.exists(1).await, Ok(false));
        assert_eq!(users.count().await, Ok(1));

        users.clear().await.unwrap();
        assert_eq!(users.count().await, Ok(0));
    }

    #[tokio::test]
    async fn test_unknown_table_fails() {
        let ghosts = open().await.table("ghosts");
        let result = ghosts.count().await;
        assert_eq!(result, Err(StorageError::TableNotFound("ghosts".to_string())));
    }

    #[tokio::test]
    async fn test_missing_key_without_auto_increment() {
        let users = open().await.table("users");
        let result = users.insert(json!({"name": "no id"})).await;
        assert!(matches!(result, Err(StorageError::MissingKey { .. })));
    }
}
