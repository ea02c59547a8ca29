use std::future::Future;

use hookkit_core::queue::{QueueConfig, QueueSnapshot, RunOptions};
use tokio::sync::watch;

use super::{TaskHandle, TaskQueue};

/// Owner-side view of a [`TaskQueue`].
///
/// Exposes the latest result, latest error and loading flag of the queue, and
/// terminates it when dropped so no task starts after the owner is gone.
pub struct QueueBinding<P, R, E>
where
    P: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    queue: TaskQueue<P, R, E>,
}

impl<P, R, E> QueueBinding<P, R, E>
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
        Self {
            queue: TaskQueue::new(config, work),
        }
    }

    /// Submits a task with the default priority.
    pub fn run(&self, payload: P) -> TaskHandle<R, E> {
        self.queue.run(payload, RunOptions::default())
    }

    pub fn run_with(&self, payload: P, options: RunOptions) -> TaskHandle<R, E> {
        self.queue.run(payload, options)
    }

    /// Submits a group of tasks that competes on priority as a whole.
    pub fn run_all<I>(&self, tasks: I) -> Vec<TaskHandle<R, E>>
    where
        I: IntoIterator<Item = (P, RunOptions)>,
    {
        self.queue.run_all(tasks)
    }

    /// True while any task is pending or running.
    pub fn loading(&self) -> bool {
        self.queue.is_loading()
    }

    /// Value of the most recently succeeded task.
    pub fn result(&self) -> Option<R> {
        self.queue.snapshot().last_result
    }

    /// Error of the most recently failed task.
    pub fn error(&self) -> Option<E> {
        self.queue.snapshot().last_error
    }

    pub fn queue_size(&self) -> usize {
        self.queue.queue_size()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot<R, E>> {
        self.queue.subscribe()
    }

    pub fn clear_queue(&self) -> usize {
        self.queue.clear_queue()
    }

    pub fn terminate(&self) {
        self.queue.terminate();
    }

    pub fn queue(&self) -> &TaskQueue<P, R, E> {
        &self.queue
    }
}

impl<P, R, E> Drop for QueueBinding<P, R, E>
where
    P: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.queue.terminate();
    }
}
