//! Process-wide cache of database connections.
//!
//! Every (name, version) pair is opened at most once. Concurrent openers share
//! the same pending future, and a failed open stays cached: later callers get
//! the same error without a new attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use hookkit_core::storage::{
    format_upgrade_plan, plan_upgrade, DatabaseConfig, Result, SchemaUpgrade, StorageEngine,
    UpgradeCallback, UpgradePlan,
};

use super::{bridge, DatabaseController};

/// A pending or settled open, cloneable by every caller.
pub type OpenFuture = Shared<BoxFuture<'static, Result<DatabaseController>>>;

/// Identity of a cached connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub name: String,
    pub version: u32,
}

impl ConnectionKey {
    pub fn of(config: &DatabaseConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version,
        }
    }
}

/// Connection cache over one storage engine.
#[derive(Clone)]
pub struct ConnectionRegistry {
    engine: Arc<dyn StorageEngine>,
    connections: Arc<Mutex<HashMap<ConnectionKey, OpenFuture>>>,
}

impl ConnectionRegistry {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Opens the database described by `config`, or joins the open already
    /// started for the same name and version.
    ///
    /// The engine call happens before this returns, so two callers in the same
    /// tick still produce a single engine open. Configs that fail validation
    /// are rejected without being cached.
    pub fn open(&self, config: &DatabaseConfig) -> OpenFuture {
        if let Err(error) = config.validate() {
            tracing::warn!(database = %config.name, error = %error, "Rejected database config");
            return future::ready(Err(error)).boxed().shared();
        }

        let key = ConnectionKey::of(config);
        let mut connections = self.lock();
        if let Some(existing) = connections.get(&key) {
            tracing::debug!(database = %key.name, version = key.version, "Reusing connection");
            return existing.clone();
        }

        tracing::info!(
            database = %key.name,
            version = key.version,
            tables = config.tables.len(),
            "Opening database"
        );
        let request = self
            .engine
            .open(&config.name, config.version, upgrade_callback(config.clone()));
        let name = key.name.clone();
        let version = key.version;
        let open = async move {
            match bridge::settle(request).await {
                Ok(connection) => Ok(DatabaseController::new(connection)),
                Err(error) => {
                    tracing::warn!(database = %name, version, error = %error, "Failed to open database");
                    Err(error)
                }
            }
        }
        .boxed()
        .shared();

        connections.insert(key, open.clone());
        open
    }

    /// Number of cached entries, pending and settled.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, name: &str, version: u32) -> bool {
        self.lock().contains_key(&ConnectionKey {
            name: name.to_string(),
            version,
        })
    }

    /// Drops a cached entry so the next open goes back to the engine.
    pub fn evict(&self, name: &str, version: u32) -> bool {
        let removed = self
            .lock()
            .remove(&ConnectionKey {
                name: name.to_string(),
                version,
            })
            .is_some();
        if removed {
            tracing::debug!(database = %name, version, "Evicted cached connection");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionKey, OpenFuture>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn upgrade_callback(config: DatabaseConfig) -> UpgradeCallback {
    Box::new(move |upgrade: &mut dyn SchemaUpgrade| apply_schema(upgrade, &config))
}

/// Brings the catalog in line with `config`: missing tables are created with
/// their indexes, and existing tables only get the indexes they lack.
pub(crate) fn apply_schema(upgrade: &mut dyn SchemaUpgrade, config: &DatabaseConfig) -> Result<()> {
    let plans = plan_upgrade(config, |name| upgrade.table_state(name));
    tracing::info!(
        database = %config.name,
        from = upgrade.old_version(),
        to = upgrade.new_version(),
        changes = plans.iter().filter(|plan| plan.has_changes()).count(),
        "Applying schema"
    );

    for plan in plans {
        if plan.has_changes() {
            for line in format_upgrade_plan(&plan) {
                tracing::debug!(database = %config.name, "{line}");
            }
        }
        match plan {
            UpgradePlan::CreateTable { name, schema } => {
                upgrade.create_table(&name, &schema)?;
                for index in &schema.indexes {
                    upgrade.create_index(&name, index, false)?;
                }
            }
            UpgradePlan::AddIndexes { name, indexes } => {
                for index in &indexes {
                    upgrade.create_index(&name, index, false)?;
                }
            }
            UpgradePlan::NoChanges { .. } => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryEngine;
    use hookkit_core::storage::{StorageError, TableSchema};

    fn setup() -> (Arc<MemoryEngine>, ConnectionRegistry) {
        let engine = Arc::new(MemoryEngine::new());
        let registry = ConnectionRegistry::new(engine.clone());
        (engine, registry)
    }

    fn app_v1() -> DatabaseConfig {
        DatabaseConfig::new("app", 1).with_table("users", TableSchema::new("id").with_index("email"))
    }

    #[tokio::test]
    async fn test_concurrent_opens_share_one_connection() {
        let (engine, registry) = setup();

        let first = registry.open(&app_v1());
        let second = registry.open(&app_v1());
        let (a, b) = tokio::join!(first, second);
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.same_connection(&b));
        assert_eq!(engine.open_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_after_settle_reuses_connection() {
        let (engine, registry) = setup();
        let first = registry.open(&app_v1()).await.unwrap();
        let second = registry.open(&app_v1()).await.unwrap();

        assert!(first.same_connection(&second));
        assert_eq!(engine.open_count(), 1);
    }

    #[tokio::test]
    async fn test_version_bump_keeps_existing_tables() {
        let (_engine, registry) = setup();
        registry.open(&app_v1()).await.unwrap();

        let v2 = DatabaseConfig::new("app", 2)
            .with_table("users", TableSchema::new("id").with_index("email").with_index("name"))
            .with_table("posts", TableSchema::new("id"));
        let db = registry.open(&v2).await.unwrap();

        assert_eq!(db.version(), 2);
        assert_eq!(db.table_names(), vec!["posts".to_string(), "users".to_string()]);
        assert_eq!(
            db.index_names("users"),
            vec!["email".to_string(), "name".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_open_is_cached() {
        let (engine, registry) = setup();
        registry
            .open(&DatabaseConfig::new("app", 3))
            .await
            .unwrap();

        let stale = DatabaseConfig::new("app", 2);
        let first = registry.open(&stale).await;
        let second = registry.open(&stale).await;

        assert!(matches!(first, Err(StorageError::VersionError { .. })));
        assert_eq!(first.unwrap_err(), second.unwrap_err());
        assert_eq!(engine.open_count(), 2);
    }

    #[tokio::test]
    async fn test_evict_allows_retry() {
        let (engine, registry) = setup();
        registry.open(&app_v1()).await.unwrap();

        assert!(registry.evict("app", 1));
        assert!(!registry.contains("app", 1));
        registry.open(&app_v1()).await.unwrap();
        assert_eq!(engine.open_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_config_is_not_cached() {
        let (engine, registry) = setup();
        let result = registry.open(&DatabaseConfig::new("", 1)).await;

        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
        assert!(registry.is_empty());
        assert_eq!(engine.open_count(), 0);
    }
}
