//! Mutex-guarded double-ended queue.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// FIFO queue that also accepts pushes at the head.
///
/// Every operation takes one short-held lock. Pushing at the tail and popping
/// at the head gives breadth-first order; pushing at the head gives
/// depth-first order.
#[derive(Debug)]
pub struct TaskQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends to the tail.
    pub fn push(&self, value: T) {
        self.lock().push_back(value);
    }

    /// Prepends to the head.
    pub fn push_front(&self, value: T) {
        self.lock().push_front(value);
    }

    /// Removes the head, or returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Snapshot emptiness check.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
