mod config;
mod error;
mod pending;
mod snapshot;

pub use config::{ExecutionMode, QueueConfig, RunOptions, DEFAULT_CONCURRENCY};
pub use error::{QueueConfigError, TaskError};
pub use pending::{PendingQueue, Priority};
pub use snapshot::QueueSnapshot;
