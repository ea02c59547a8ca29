//! One-shot storage requests.
//!
//! Engines hand out a [`StorageRequest`] for every operation and keep the
//! matching [`RequestSignal`]. The engine fires the signal exactly once with a
//! success value or a failure reason; the consumer registers exactly one
//! completion listener. Whichever happens second delivers the outcome.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::StorageError;

/// Outcome of a request. A failure may come without a reason.
pub type RequestOutcome<T> = std::result::Result<T, Option<StorageError>>;

type Listener<T> = Box<dyn FnOnce(RequestOutcome<T>) + Send>;

enum Slot<T> {
    Waiting,
    Listening(Listener<T>),
    Completed(RequestOutcome<T>),
    Delivered,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Consumer side of a one-shot request.
#[must_use = "a request does nothing unless a completion listener is attached"]
pub struct StorageRequest<T> {
    shared: Arc<Shared<T>>,
}

/// Engine side of a one-shot request.
///
/// Dropping a signal without firing it fails the request with no reason.
pub struct RequestSignal<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T: Send + 'static> StorageRequest<T> {
    /// Creates an unsettled request and the signal that settles it.
    pub fn pending() -> (Self, RequestSignal<T>) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Waiting),
        });
        let request = Self {
            shared: Arc::clone(&shared),
        };
        (
            request,
            RequestSignal {
                shared: Some(shared),
            },
        )
    }

    /// A request that has already succeeded.
    pub fn succeeded(value: T) -> Self {
        let (request, signal) = Self::pending();
        signal.succeed(value);
        request
    }

    /// A request that has already failed.
    pub fn failed(error: StorageError) -> Self {
        let (request, signal) = Self::pending();
        signal.fail(Some(error));
        request
    }

    /// Returns true once the engine has fired the signal.
    pub fn is_settled(&self) -> bool {
        matches!(*self.shared.lock(), Slot::Completed(_))
    }

    /// Registers the completion listener.
    ///
    /// Runs immediately on the calling thread if the request already settled,
    /// otherwise on the thread that fires the signal.
    pub fn on_complete<F>(self, listener: F)
    where
        F: FnOnce(RequestOutcome<T>) + Send + 'static,
    {
        // The transition happens under one guard; the listener runs after it
        // is released.
        let outcome = {
            let mut slot = self.shared.lock();
            match std::mem::replace(&mut *slot, Slot::Delivered) {
                Slot::Completed(outcome) => outcome,
                Slot::Waiting => {
                    *slot = Slot::Listening(Box::new(listener));
                    return;
                }
                // A request has exactly one consumer, so no listener can be registered yet.
                other @ (Slot::Listening(_) | Slot::Delivered) => {
                    *slot = other;
                    return;
                }
            }
        };
        listener(outcome);
    }
}

impl<T> RequestSignal<T> {
    /// Settles the request with a value.
    pub fn succeed(mut self, value: T) {
        self.complete(Ok(value));
    }

    /// Settles the request with a failure, optionally carrying a reason.
    pub fn fail(mut self, reason: Option<StorageError>) {
        self.complete(Err(reason));
    }

    /// Settles the request from a `Result`.
    pub fn settle(self, result: super::Result<T>) {
        match result {
            Ok(value) => self.succeed(value),
            Err(error) => self.fail(Some(error)),
        }
    }

    fn complete(&mut self, outcome: RequestOutcome<T>) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        let listener = {
            let mut slot = shared.lock();
            match std::mem::replace(&mut *slot, Slot::Delivered) {
                Slot::Listening(listener) => listener,
                Slot::Waiting => {
                    *slot = Slot::Completed(outcome);
                    return;
                }
                other @ (Slot::Completed(_) | Slot::Delivered) => {
                    *slot = other;
                    return;
                }
            }
        };
        listener(outcome);
    }
}

impl<T> Drop for RequestSignal<T> {
    fn drop(&mut self) {
        self.complete(Err(None));
    }
}
