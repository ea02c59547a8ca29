//! Optional success and error callbacks on top of storage futures.

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use hookkit_core::storage::{Result, StorageError};

type SuccessFn<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorFn = Box<dyn FnOnce(&StorageError) + Send>;

/// Callbacks fired once when an operation settles, before its result is
/// returned.
pub struct Callbacks<T> {
    on_success: Option<SuccessFn<T>>,
    on_error: Option<ErrorFn>,
}

impl<T> Callbacks<T> {
    pub fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }

    pub fn on_success(mut self, callback: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(&StorageError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    fn notify(self, result: &Result<T>) {
        match result {
            Ok(value) => {
                if let Some(callback) = self.on_success {
                    callback(value);
                }
            }
            Err(error) => {
                if let Some(callback) = self.on_error {
                    callback(error);
                }
            }
        }
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`ObserveExt::observe`].
pub struct Observed<F, T> {
    future: Pin<Box<F>>,
    callbacks: Option<Callbacks<T>>,
}

impl<F, T> Unpin for Observed<F, T> {}

impl<F, T> Future for Observed<F, T>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = ready!(this.future.as_mut().poll(cx));
        if let Some(callbacks) = this.callbacks.take() {
            callbacks.notify(&result);
        }
        Poll::Ready(result)
    }
}

/// Attaches [`Callbacks`] to any storage future.
///
/// ```ignore
/// users
///     .insert(record)
///     .observe(Callbacks::new().on_error(|e| tracing::warn!("insert failed: {e}")))
///     .await?;
/// ```
pub trait ObserveExt<T>: Future<Output = Result<T>> + Sized {
    fn observe(self, callbacks: Callbacks<T>) -> Observed<Self, T> {
        Observed {
            future: Box::pin(self),
            callbacks: Some(callbacks),
        }
    }
}

impl<T, F> ObserveExt<T> for F where F: Future<Output = Result<T>> {}
