mod error;
mod keys;
mod merge;
mod request;
mod schema;
mod traits;
mod types;
mod upgrade;

pub use error::{Result, StorageError};
pub use keys::{Key, Record};
pub use merge::shallow_merge;
pub use request::{RequestOutcome, RequestSignal, StorageRequest};
pub use schema::{DatabaseConfig, KeyPath, TableSchema};
pub use traits::{
    EngineConnection, EngineCursor, EngineTransaction, SchemaUpgrade, StorageEngine,
    UpgradeCallback,
};
pub use types::{ChangeEvent, ChangeKind, TransactionMode};
pub use upgrade::{format_upgrade_plan, plan_table_upgrade, plan_upgrade, TableState, UpgradePlan};
