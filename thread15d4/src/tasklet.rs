//! Cooperative tasklet queue.
//!
//! A tasklet is a deferred unit of work identified by a value of type `T`.
//! Tasklets run in the order they were posted and a tasklet is queued at
//! most once.

use heapless::Deque;

use crate::{Error, Result};

/// A FIFO of pending tasklets.
pub struct TaskletScheduler<T: Copy + PartialEq, const N: usize> {
    queue: Deque<T, N>,
}

impl<T: Copy + PartialEq, const N: usize> Default for TaskletScheduler<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + PartialEq, const N: usize> TaskletScheduler<T, N> {
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
        }
    }

    /// Queue a tasklet.
    ///
    /// Returns `Ok(true)` when the queue went from empty to non-empty, in
    /// which case the host should schedule a driver step. Posting a tasklet
    /// that is already queued returns [`Error::Busy`].
    pub fn post(&mut self, tasklet: T) -> Result<bool> {
        if self.queue.iter().any(|t| *t == tasklet) {
            return Err(Error::Busy);
        }

        let was_empty = self.queue.is_empty();
        self.queue.push_back(tasklet).map_err(|_| Error::NoBufs)?;
        Ok(was_empty)
    }

    /// Take the next tasklet to run.
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Return `true` when at least one tasklet is queued.
    pub fn are_pending(&self) -> bool {
        !self.queue.is_empty()
    }
}
