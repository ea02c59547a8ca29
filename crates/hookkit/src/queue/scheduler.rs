//! Priority task scheduler.
//!
//! Tasks wait in a [`PendingQueue`] ordered by priority then submission
//! order. A selection pass starts tasks while fewer than the configured limit
//! are running. It runs on a spawned task after a submission and inline after
//! each completion, so every task queued before the pass runs competes on
//! priority.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hookkit_core::queue::{PendingQueue, QueueConfig, QueueSnapshot, RunOptions, TaskError};
use tokio::sync::{oneshot, watch};

type WorkFn<P, R, E> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;
type TaskOutcome<R, E> = Result<R, TaskError<E>>;

struct QueuedTask<P, R, E> {
    payload: P,
    responder: oneshot::Sender<TaskOutcome<R, E>>,
}

struct SchedulerState<P, R, E> {
    pending: PendingQueue<QueuedTask<P, R, E>>,
    active: usize,
    terminated: bool,
    selection_scheduled: bool,
    last_result: Option<R>,
    last_error: Option<E>,
}

struct QueueInner<P, R, E> {
    config: QueueConfig,
    work: WorkFn<P, R, E>,
    state: Mutex<SchedulerState<P, R, E>>,
    snapshot_tx: watch::Sender<QueueSnapshot<R, E>>,
}

impl<P, R, E> QueueInner<P, R, E>
where
    P: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, SchedulerState<P, R, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SchedulerState<P, R, E>) {
        self.snapshot_tx.send_replace(QueueSnapshot::new(
            state.pending.len(),
            state.active,
            state.last_result.clone(),
            state.last_error.clone(),
            state.terminated,
        ));
    }

    /// Queues one task, or rejects it right away once terminated.
    fn enqueue(
        &self,
        state: &mut SchedulerState<P, R, E>,
        payload: P,
        options: RunOptions,
    ) -> TaskHandle<R, E> {
        let (responder, receiver) = oneshot::channel();
        if state.terminated {
            let _ = responder.send(Err(TaskError::Terminated));
        } else {
            let sequence = state
                .pending
                .push(options.priority, QueuedTask { payload, responder });
            tracing::debug!(task = sequence, priority = options.priority, "Task queued");
        }
        TaskHandle { receiver }
    }

    /// Publishes the new queue size and spawns a selection pass unless one is
    /// already waiting to run.
    fn schedule(self: &Arc<Self>, mut state: MutexGuard<'_, SchedulerState<P, R, E>>) {
        if state.terminated || state.pending.is_empty() {
            return;
        }
        self.publish(&state);
        let spawn = !state.selection_scheduled;
        state.selection_scheduled = true;
        drop(state);

        if spawn {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.select() });
        }
    }

    /// Starts pending tasks in priority order until the limit is reached.
    fn select(self: &Arc<Self>) {
        let limit = self.config.concurrency_limit();
        let mut started = Vec::new();
        {
            let mut state = self.lock();
            state.selection_scheduled = false;
            while !state.terminated && state.active < limit {
                let Some(next) = state.pending.pop() else {
                    break;
                };
                state.active += 1;
                started.push(next);
            }
            if !started.is_empty() {
                self.publish(&state);
            }
        }

        for (sequence, task) in started {
            tracing::debug!(task = sequence, "Starting task");
            tokio::spawn(Arc::clone(self).execute(sequence, task));
        }
    }

    async fn execute(self: Arc<Self>, sequence: u64, task: QueuedTask<P, R, E>) {
        let QueuedTask { payload, responder } = task;

        // The work function is called inside the guarded future so a panic
        // before it returns a future is caught too.
        let work = Arc::clone(&self.work);
        let outcome = AssertUnwindSafe(async move { work(payload).await })
            .catch_unwind()
            .await;

        let result = {
            let mut state = self.lock();
            state.active -= 1;
            let result = match outcome {
                Ok(Ok(value)) => {
                    state.last_result = Some(value.clone());
                    Ok(value)
                }
                Ok(Err(error)) => {
                    state.last_error = Some(error.clone());
                    Err(TaskError::Failed(error))
                }
                Err(_) => {
                    tracing::error!(task = sequence, "Task panicked");
                    Err(TaskError::Panicked)
                }
            };
            self.publish(&state);
            result
        };

        tracing::debug!(task = sequence, ok = result.is_ok(), "Task finished");
        // The caller may have dropped its handle.
        let _ = responder.send(result);
        self.select();
    }

    /// Removes every pending task and rejects it with `reason`.
    fn drain(&self, state: &mut SchedulerState<P, R, E>, reason: TaskError<E>) -> usize {
        let drained = state.pending.drain();
        let count = drained.len();
        for task in drained {
            let _ = task.responder.send(Err(reason.clone()));
        }
        count
    }
}

/// A queue running async work items under a concurrency limit.
///
/// `P` is the payload handed to the work function, `R` its success value
/// and `E` its error. Cloning shares the same queue.
pub struct TaskQueue<P, R, E> {
    inner: Arc<QueueInner<P, R, E>>,
}

impl<P, R, E> Clone for TaskQueue<P, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R, E> TaskQueue<P, R, E>
where
    P: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(config: QueueConfig, work: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let work: WorkFn<P, R, E> = Arc::new(move |payload| work(payload).boxed());
        let (snapshot_tx, _) = watch::channel(QueueSnapshot::default());
        tracing::debug!(limit = config.concurrency_limit(), "Task queue created");

        Self {
            inner: Arc::new(QueueInner {
                config,
                work,
                state: Mutex::new(SchedulerState {
                    pending: PendingQueue::new(),
                    active: 0,
                    terminated: false,
                    selection_scheduled: false,
                    last_result: None,
                    last_error: None,
                }),
                snapshot_tx,
            }),
        }
    }

    /// Submits `payload` and returns a handle resolving to the task's outcome.
    ///
    /// The task is queued immediately; selection happens on a spawned task,
    /// so this must be called inside a Tokio runtime. Tasks queued before that
    /// pass runs compete on priority. On a current-thread runtime this covers
    /// every task submitted before the caller next yields. On a multi-thread
    /// runtime the pass may start on another worker at once, so use
    /// [`run_all`](Self::run_all) for a group that must be ordered as a whole.
    ///
    /// After [`terminate`](Self::terminate) the handle resolves to
    /// [`TaskError::Terminated`] without queueing anything.
    pub fn run(&self, payload: P, options: RunOptions) -> TaskHandle<R, E> {
        let mut state = self.inner.lock();
        let handle = self.inner.enqueue(&mut state, payload, options);
        self.inner.schedule(state);
        handle
    }

    /// Submits a group of tasks atomically and returns their handles in input
    /// order.
    ///
    /// No task of the group starts before all of them are queued, so the
    /// group runs in priority order on any runtime.
    pub fn run_all<I>(&self, tasks: I) -> Vec<TaskHandle<R, E>>
    where
        I: IntoIterator<Item = (P, RunOptions)>,
    {
        let mut state = self.inner.lock();
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|(payload, options)| self.inner.enqueue(&mut state, payload, options))
            .collect();
        self.inner.schedule(state);
        handles
    }

    /// Rejects every task that has not started with [`TaskError::Cleared`].
    /// Running tasks finish normally. Returns how many tasks were removed.
    pub fn clear_queue(&self) -> usize {
        let mut state = self.inner.lock();
        let cleared = self.inner.drain(&mut state, TaskError::Cleared);
        self.inner.publish(&state);
        if cleared > 0 {
            tracing::debug!(cleared, "Cleared pending tasks");
        }
        cleared
    }

    /// Stops the queue: pending tasks are rejected with
    /// [`TaskError::Terminated`] and later submissions are refused. Running
    /// tasks finish normally.
    pub fn terminate(&self) {
        let mut state = self.inner.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        let rejected = self.inner.drain(&mut state, TaskError::Terminated);
        self.inner.publish(&state);
        tracing::debug!(rejected, running = state.active, "Task queue terminated");
    }

    pub fn snapshot(&self) -> QueueSnapshot<R, E> {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot<R, E>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Pending plus running tasks.
    pub fn queue_size(&self) -> usize {
        self.inner.snapshot_tx.borrow().queue_size
    }

    pub fn is_loading(&self) -> bool {
        self.inner.snapshot_tx.borrow().loading
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.lock().terminated
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }
}

/// Resolves to the outcome of one submitted task.
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<R, E> {
    receiver: oneshot::Receiver<TaskOutcome<R, E>>,
}

impl<R, E> Future for TaskHandle<R, E> {
    type Output = TaskOutcome<R, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Dropped)))
    }
}
