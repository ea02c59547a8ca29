/// Observable state of a task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot<R, E> {
    /// Tasks waiting to start.
    pub pending: usize,
    /// Tasks currently running.
    pub active: usize,
    /// `pending + active`.
    pub queue_size: usize,
    /// True while any task is pending or running.
    pub loading: bool,
    /// Value of the most recently succeeded task.
    pub last_result: Option<R>,
    /// Error of the most recently failed task.
    pub last_error: Option<E>,
    pub terminated: bool,
}

impl<R, E> QueueSnapshot<R, E> {
    /// Builds a snapshot, deriving `queue_size` and `loading`.
    pub fn new(
        pending: usize,
        active: usize,
        last_result: Option<R>,
        last_error: Option<E>,
        terminated: bool,
    ) -> Self {
        let queue_size = pending + active;
        Self {
            pending,
            active,
            queue_size,
            loading: queue_size > 0,
            last_result,
            last_error,
            terminated,
        }
    }
}

impl<R, E> Default for QueueSnapshot<R, E> {
    fn default() -> Self {
        Self::new(0, 0, None, None, false)
    }
}
