// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ready queue.
//!
//! FIFO of runnable routine keys. Wakers may fire from any thread, so the
//! deque sits behind a mutex and the scheduler parks on a condvar when idle.
use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::routine::RoutineKey;

pub(crate) struct ReadyQueue {
    deque: Mutex<VecDeque<RoutineKey>>,
    available: Condvar,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            deque: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, key: RoutineKey) {
        self.deque.lock().push_back(key);
        self.available.notify_one();
    }

    pub fn pop(&self) -> Option<RoutineKey> {
        self.deque.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.deque.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deque.lock().is_empty()
    }

    /// Block the OS thread until something is queued or `deadline` passes.
    /// `None` waits indefinitely.
    pub fn park(&self, deadline: Option<Instant>) {
        let mut q = self.deque.lock();
        if !q.is_empty() {
            return;
        }
        match deadline {
            Some(deadline) => {
                while q.is_empty() {
                    if self.available.wait_until(&mut q, deadline).timed_out() {
                        return;
                    }
                }
            }
            None => {
                while q.is_empty() {
                    self.available.wait(&mut q);
                }
            }
        }
    }

    /// Drop every queued key (used at shutdown).
    pub fn clear(&self) {
        self.deque.lock().clear();
    }
}
