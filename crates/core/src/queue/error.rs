use thiserror::Error;

/// Why a queued task did not produce a value.
///
/// `Cleared` and `Terminated` are lifecycle cancellations, distinct from a
/// genuine failure of the work function.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError<E> {
    #[error("Task failed: {0}")]
    Failed(E),
    #[error("Task was cleared from the queue before it started")]
    Cleared,
    #[error("Task queue has been terminated")]
    Terminated,
    #[error("Task panicked while running")]
    Panicked,
    #[error("Task was dropped before it settled")]
    Dropped,
}

/// Errors raised while building a queue configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueConfigError {
    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("Unknown execution mode: {0}")]
    InvalidMode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_display() {
        let error: TaskError<String> = TaskError::Failed("timeout".to_string());
        assert_eq!(error.to_string(), "Task failed: timeout");
    }

    #[test]
    fn test_lifecycle_errors_display() {
        assert_eq!(
            TaskError::<String>::Terminated.to_string(),
            "Task queue has been terminated"
        );
        assert_eq!(
            TaskError::<String>::Cleared.to_string(),
            "Task was cleared from the queue before it started"
        );
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            QueueConfigError::InvalidMode("turbo".to_string()).to_string(),
            "Unknown execution mode: turbo"
        );
    }
}
