use thiserror::Error;

/// Errors surfaced by the storage layer.
///
/// Every variant is `Clone` so a single failure can be handed to all callers
/// sharing one pending open or one transaction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Invalid database config: {0}")]
    InvalidConfig(String),
    #[error("Failed to open database {name} (version {version}): {reason}")]
    OpenFailed {
        name: String,
        version: u32,
        reason: String,
    },
    #[error("Requested version {requested} of {name} is lower than stored version {stored}")]
    VersionError {
        name: String,
        requested: u32,
        stored: u32,
    },
    #[error("Constraint error: {0}")]
    ConstraintError(String),
    #[error("Key already exists in {table}: {key}")]
    DuplicateKey { table: String, key: String },
    #[error("Key not found in {table}: {key}")]
    NotFound { table: String, key: String },
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Record for {table} is missing key path {key_path}")]
    MissingKey { table: String, key_path: String },
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Table {table} is not writable in a read-only transaction")]
    ReadOnly { table: String },
    #[error("Transaction is no longer active")]
    TransactionInactive,
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("Transaction callback failed: {0}")]
    Callback(String),
    #[error("Table {0} is already locked by a transaction running on this task")]
    LockConflict(String),
    #[error("Storage binding is not configured")]
    NotConfigured,
    #[error("Unknown storage error")]
    Unknown,
}

impl StorageError {
    /// Wraps an arbitrary error raised from a transaction callback.
    pub fn callback(error: impl std::fmt::Display) -> Self {
        StorageError::Callback(error.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
