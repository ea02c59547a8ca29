//! Priority task queue with bounded concurrency.

mod binding;
mod scheduler;

pub use binding::QueueBinding;
pub use scheduler::{TaskHandle, TaskQueue};

pub use hookkit_core::queue::{
    ExecutionMode, Priority, QueueConfig, QueueConfigError, QueueSnapshot, RunOptions, TaskError,
};
