// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Routine representation and lifecycle.
//!
//! A routine is a boxed future (its execution context, see `fiber`) plus a
//! header shared with its waker and its handle. The header carries the
//! lifecycle state; the scheduler owns the context.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Wake, Waker};

use super::queue::ReadyQueue;
use crate::fiber::Fiber;

/// Routine lifecycle states.
///
/// Created → Runnable → Running → {Blocked ⇄ Runnable} → Done.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineState {
    /// Context allocated, not yet queued.
    Created = 0,
    /// Queued, waiting for its turn.
    Runnable = 1,
    /// Currently being resumed by the scheduler.
    Running = 2,
    /// Suspended on a channel, select, sleep or yield.
    Blocked = 3,
    /// Entry returned, context released.
    Done = 4,
}

impl RoutineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Runnable,
            2 => Self::Running,
            3 => Self::Blocked,
            _ => Self::Done,
        }
    }
}

/// Key of a routine in the scheduler's table.
pub(crate) type RoutineKey = usize;

/// Header shared between scheduler, waker and handle.
pub(crate) struct RoutineHeader {
    /// Unique for the lifetime of the process; table keys are reused.
    pub id: u64,
    pub key: RoutineKey,
    state: AtomicU8,
}

impl std::fmt::Debug for RoutineHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routine")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl RoutineHeader {
    pub fn new(id: u64, key: RoutineKey) -> Arc<Self> {
        Arc::new(Self {
            id,
            key,
            state: AtomicU8::new(RoutineState::Created as u8),
        })
    }

    pub fn state(&self) -> RoutineState {
        RoutineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: RoutineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Atomically move `from` → `to`. Returns false if the state was not `from`.
    pub fn transition(&self, from: RoutineState, to: RoutineState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One entry of the scheduler's routine table.
pub(crate) struct Routine {
    pub header: Arc<RoutineHeader>,
    /// Taken out while the routine is running so the scheduler's table is
    /// not borrowed across a resume.
    pub fiber: Option<Fiber>,
    pub waker: Waker,
}

/// Waker that makes a blocked routine runnable again.
struct RoutineWaker {
    header: Arc<RoutineHeader>,
    queue: Arc<ReadyQueue>,
}

impl Wake for RoutineWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        loop {
            match self.header.state() {
                RoutineState::Blocked => {
                    if self
                        .header
                        .transition(RoutineState::Blocked, RoutineState::Runnable)
                    {
                        self.queue.push(self.header.key);
                        return;
                    }
                }
                // Woken while running (e.g. yield): the scheduler re-queues
                // it once the resume returns.
                RoutineState::Running => {
                    if self
                        .header
                        .transition(RoutineState::Running, RoutineState::Runnable)
                    {
                        return;
                    }
                }
                // Already queued, not yet queued, or finished.
                RoutineState::Runnable | RoutineState::Created | RoutineState::Done => return,
            }
        }
    }
}

pub(crate) fn routine_waker(header: Arc<RoutineHeader>, queue: Arc<ReadyQueue>) -> Waker {
    Waker::from(Arc::new(RoutineWaker { header, queue }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waking_blocked_routine_queues_it_once() {
        let queue = Arc::new(ReadyQueue::new());
        let header = RoutineHeader::new(1, 7);
        header.set_state(RoutineState::Blocked);
        let waker = routine_waker(header.clone(), queue.clone());

        waker.wake_by_ref();
        waker.wake_by_ref();

        assert_eq!(header.state(), RoutineState::Runnable);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(7));
    }

    #[test]
    fn waking_running_routine_only_flags_it() {
        let queue = Arc::new(ReadyQueue::new());
        let header = RoutineHeader::new(1, 3);
        header.set_state(RoutineState::Running);
        routine_waker(header.clone(), queue.clone()).wake();

        assert_eq!(header.state(), RoutineState::Runnable);
        assert!(queue.is_empty());
    }

    #[test]
    fn waking_done_routine_is_ignored() {
        let queue = Arc::new(ReadyQueue::new());
        let header = RoutineHeader::new(1, 0);
        header.set_state(RoutineState::Done);
        routine_waker(header.clone(), queue.clone()).wake();

        assert_eq!(header.state(), RoutineState::Done);
        assert!(queue.is_empty());
    }
}
