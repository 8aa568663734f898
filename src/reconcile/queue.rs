//! Thread-safe FIFO of pending reconciliation tasks.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::domain::Task;

/// FIFO queue fed by order submission and drained by the dispatcher.
///
/// Push and pop are mutually exclusive; FIFO order holds under
/// concurrent producers. The dispatcher uses [`TaskQueue::pop_wait`]
/// so it parks on an empty queue instead of spinning.
pub struct TaskQueue {
    inner: Mutex<VecDeque<Task>>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append a task to the tail. Never fails.
    pub fn push(&self, task: Task) {
        self.inner
            .lock()
            .expect("task queue lock poisoned")
            .push_back(task);
        self.notify.notify_one();
    }

    /// Remove and return the head, if any
    pub fn try_pop(&self) -> Option<Task> {
        self.inner
            .lock()
            .expect("task queue lock poisoned")
            .pop_front()
    }

    /// Remove and return the head, waiting for one to arrive
    pub async fn pop_wait(&self) -> Task {
        loop {
            // Register for notification before checking, so a push that
            // lands between the check and the await is not missed
            let notified = self.notify.notified();
            if let Some(task) = self.try_pop() {
                return task;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("task queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
