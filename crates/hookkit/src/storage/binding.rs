//! Lifecycle-bound access to one database.
//!
//! A [`StorageBinding`] is the owner-side view of a connection: configure it,
//! observe the phase through a watch channel, and tear it down when the owner
//! goes away. Results of an open that finishes after a teardown or a
//! reconfigure are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hookkit_core::lifecycle::{LifecycleEvent, LifecyclePhase};
use hookkit_core::storage::{DatabaseConfig, Result, StorageError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{ConnectionKey, ConnectionRegistry, DatabaseController};

/// Observable state of a [`StorageBinding`].
#[derive(Debug, Clone, Default)]
pub struct StorageState {
    pub phase: LifecyclePhase,
    pub database: Option<DatabaseController>,
    pub error: Option<StorageError>,
}

impl StorageState {
    pub fn is_ready(&self) -> bool {
        self.phase.is_ready()
    }
}

#[derive(Default)]
struct Attachment {
    current: Option<ConnectionKey>,
    task: Option<JoinHandle<()>>,
}

pub struct StorageBinding {
    registry: ConnectionRegistry,
    state_tx: Arc<watch::Sender<StorageState>>,
    generation: Arc<AtomicU64>,
    attachment: Mutex<Attachment>,
}

impl StorageBinding {
    pub fn new(registry: ConnectionRegistry) -> Self {
        let (state_tx, _) = watch::channel(StorageState::default());
        Self {
            registry,
            state_tx: Arc::new(state_tx),
            generation: Arc::new(AtomicU64::new(0)),
            attachment: Mutex::new(Attachment::default()),
        }
    }

    /// Starts opening `config`. Must be called inside a Tokio runtime.
    ///
    /// Calling it again with the same name and version while opening or ready
    /// does nothing. A different identity replaces the current one.
    pub fn configure(&self, config: &DatabaseConfig) {
        let key = ConnectionKey::of(config);
        let mut attachment = self.attachment();

        let phase = self.state_tx.borrow().phase;
        if attachment.current.as_ref() == Some(&key)
            && matches!(phase, LifecyclePhase::Opening | LifecyclePhase::Ready)
        {
            tracing::debug!(database = %key.name, version = key.version, "Already configured");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(task) = attachment.task.take() {
            task.abort();
        }
        attachment.current = Some(key);

        self.state_tx.send_modify(|state| {
            state.phase = state.phase.apply(LifecycleEvent::Configure);
            state.database = None;
            state.error = None;
        });

        let open = self.registry.open(config);
        let state_tx = Arc::clone(&self.state_tx);
        let current = Arc::clone(&self.generation);
        attachment.task = Some(tokio::spawn(async move {
            let outcome = open.await;
            state_tx.send_if_modified(|state| {
                // Superseded by a teardown or another configure.
                if current.load(Ordering::SeqCst) != generation {
                    return false;
                }
                match outcome {
                    Ok(database) => {
                        state.phase = state.phase.apply(LifecycleEvent::Opened);
                        state.database = Some(database);
                    }
                    Err(error) => {
                        state.phase = state.phase.apply(LifecycleEvent::Failed);
                        state.error = Some(error);
                    }
                }
                true
            });
        }));
    }

    /// Detaches from the current database and returns to idle.
    pub fn teardown(&self) {
        let mut attachment = self.attachment();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = attachment.task.take() {
            task.abort();
        }
        if attachment.current.take().is_some() {
            tracing::debug!("Storage binding torn down");
        }

        self.state_tx.send_modify(|state| {
            state.phase = state.phase.apply(LifecycleEvent::Teardown);
            state.database = None;
            state.error = None;
        });
    }

    /// Waits until the current open settles.
    ///
    /// Fails with [`StorageError::NotConfigured`] if the binding is idle or
    /// gets torn down while waiting.
    pub async fn ready(&self) -> Result<DatabaseController> {
        let mut state_rx = self.state_tx.subscribe();
        let state = state_rx
            .wait_for(|state| state.phase != LifecyclePhase::Opening)
            .await
            .map_err(|_| StorageError::NotConfigured)?;

        match (&state.database, &state.error) {
            (Some(database), _) => Ok(database.clone()),
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Err(StorageError::NotConfigured),
        }
    }

    pub fn state(&self) -> StorageState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StorageState> {
        self.state_tx.subscribe()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.state_tx.borrow().phase
    }

    pub fn database(&self) -> Option<DatabaseController> {
        self.state_tx.borrow().database.clone()
    }

    pub fn error(&self) -> Option<StorageError> {
        self.state_tx.borrow().error.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.phase().is_ready()
    }

    fn attachment(&self) -> MutexGuard<'_, Attachment> {
        self.attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StorageBinding {
    fn drop(&mut self) {
        self.teardown();
    }
}
