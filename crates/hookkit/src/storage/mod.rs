//! Storage controllers over a pluggable engine.
//!
//! [`ConnectionRegistry`] opens databases once per (name, version),
//! [`DatabaseController`] and [`Table`] turn engine requests into async
//! operations, and [`StorageBinding`] ties one connection to an owner's
//! lifecycle.

pub mod bridge;
pub mod memory;

mod binding;
mod callbacks;
mod database;
mod registry;
mod table;

pub use binding::{StorageBinding, StorageState};
pub use callbacks::{Callbacks, ObserveExt, Observed};
pub use database::{DatabaseController, TransactionContext};
pub use registry::{ConnectionKey, ConnectionRegistry, OpenFuture};
pub use table::Table;

pub use hookkit_core::storage::{
    ChangeEvent, ChangeKind, DatabaseConfig, Key, KeyPath, Record, Result, StorageError,
    TableSchema, TransactionMode,
};
