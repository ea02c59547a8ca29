//! In-memory storage engine.
//!
//! Implements the engine traits from `hookkit_core` on top of ordered maps.
//! Used by the demo binary and by tests; a persistent engine plugs into the
//! same traits.

mod engine;
mod store;
mod transaction;

pub use engine::{MemoryConnection, MemoryEngine, CHANGE_CHANNEL_CAPACITY};
pub use transaction::{MemoryCursor, MemoryTransaction};
