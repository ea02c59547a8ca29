//! hookkit - async building blocks for client-side state.
//!
//! - [`storage`]: connection registry, table and transaction controllers, and
//!   a lifecycle binding over a pluggable key-indexed storage engine.
//! - [`queue`]: a priority task queue with sequential or bounded-parallel
//!   execution.
//!
//! Pure types (schemas, keys, upgrade planning, queue ordering) live in
//! `hookkit_core`.

pub mod config;
pub mod queue;
pub mod storage;

pub use config::Settings;
pub use queue::{QueueBinding, TaskHandle, TaskQueue};
pub use storage::{ConnectionRegistry, DatabaseController, StorageBinding, Table};
