//! Configuration types for the task queue with validation.

use std::str::FromStr;

use super::{Priority, QueueConfigError};

/// Default number of tasks running at once in parallel mode.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How many tasks may run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Strictly one task at a time.
    Sequential,
    /// Up to `concurrency` tasks at a time.
    Parallel { concurrency: usize },
}

impl ExecutionMode {
    /// Create and validate a parallel mode.
    pub fn parallel(concurrency: usize) -> Result<Self, QueueConfigError> {
        if concurrency == 0 {
            return Err(QueueConfigError::InvalidConcurrency);
        }
        Ok(ExecutionMode::Parallel { concurrency })
    }

    /// Maximum number of running tasks.
    pub fn concurrency_limit(&self) -> usize {
        match self {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel { concurrency } => *concurrency,
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = QueueConfigError;

    /// Parses `sequential` or `parallel` (with the default concurrency).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel {
                concurrency: DEFAULT_CONCURRENCY,
            }),
            other => Err(QueueConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// Configuration for a task queue (validated).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub mode: ExecutionMode,
}

impl QueueConfig {
    pub fn sequential() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
        }
    }

    /// Create and validate a parallel config.
    pub fn parallel(concurrency: usize) -> Result<Self, QueueConfigError> {
        Ok(Self {
            mode: ExecutionMode::parallel(concurrency)?,
        })
    }

    pub fn concurrency_limit(&self) -> usize {
        self.mode.concurrency_limit()
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::sequential()
    }
}

/// Per-task options for `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Lower runs sooner. Defaults to 0, the most urgent value.
    pub priority: Priority,
}

impl RunOptions {
    pub fn with_priority(priority: Priority) -> Self {
        Self { priority }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_limit_is_one() {
        assert_eq!(QueueConfig::sequential().concurrency_limit(), 1);
    }

    #[test]
    fn test_parallel_limit() {
        let config = QueueConfig::parallel(8).unwrap();
        assert_eq!(config.concurrency_limit(), 8);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        assert_eq!(
            QueueConfig::parallel(0),
            Err(QueueConfigError::InvalidConcurrency)
        );
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "Sequential".parse::<ExecutionMode>(),
            Ok(ExecutionMode::Sequential)
        );
        assert_eq!(
            "parallel".parse::<ExecutionMode>(),
            Ok(ExecutionMode::Parallel {
                concurrency: DEFAULT_CONCURRENCY
            })
        );
        assert!("fast".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_default_priority_is_most_urgent() {
        assert_eq!(RunOptions::default().priority, Priority::MIN);
    }
}
