//! Converts one-shot engine requests into futures.

use hookkit_core::storage::{Result, StorageError, StorageRequest};
use tokio::sync::oneshot;

/// Waits for a request to settle.
///
/// A failure the engine reports without a reason, or a request whose signal
/// disappears, becomes [`StorageError::Unknown`].
pub async fn settle<T: Send + 'static>(request: StorageRequest<T>) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    request.on_complete(move |outcome| {
        // The receiver only goes away if the caller stopped waiting.
        let _ = tx.send(outcome);
    });

    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Some(error))) => Err(error),
        Ok(Err(None)) | Err(_) => Err(StorageError::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settle_success() {
        assert_eq!(settle(StorageRequest::succeeded(3)).await, Ok(3));
    }

    #[tokio::test]
    async fn test_settle_failure_with_reason() {
        let request = StorageRequest::<()>::failed(StorageError::TableNotFound("x".into()));
        assert_eq!(
            settle(request).await,
            Err(StorageError::TableNotFound("x".into()))
        );
    }

    #[tokio::test]
    async fn test_settle_failure_without_reason_is_unknown() {
        let (request, signal) = StorageRequest::<u8>::pending();
        signal.fail(None);
        assert_eq!(settle(request).await, Err(StorageError::Unknown));
    }

    #[tokio::test]
    async fn test_settle_waits_for_late_signal() {
        let (request, signal) = StorageRequest::pending();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            signal.succeed("late");
        });
        assert_eq!(settle(request).await, Ok("late"));
    }
}
