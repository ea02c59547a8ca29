//! Pure building blocks for hookkit - no spawning, no I/O.
//!
//! This crate provides:
//! - Schema configuration, keys and key paths
//! - The storage engine boundary (traits and one-shot requests)
//! - Upgrade planning and shallow merge
//! - Pending-task ordering and queue configuration
//! - The storage binding lifecycle state machine
//!
//! # Example
//!
//! ```
//! use hookkit_core::storage::{DatabaseConfig, Key, TableSchema};
//! use serde_json::json;
//!
//! let config = DatabaseConfig::new("app", 1)
//!     .with_table("users", TableSchema::new("id").with_index("email"));
//! config.validate().unwrap();
//!
//! let key_path = &config.tables["users"].key_path;
//! assert_eq!(key_path.extract(&json!({"id": 7})), Some(Key::from(7)));
//! ```

pub mod lifecycle;
pub mod queue;
pub mod storage;
