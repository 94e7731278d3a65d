// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Monotonic clock and sleeping.
//!
//! `now()` never blocks. `sleep`/`sleep_until` suspend only the calling
//! routine: the deadline is registered in the runtime's timer heap and the
//! scheduler wakes the routine once the clock passes it.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::fiber::monotonic_time;
use crate::green::context;

/// Current monotonic time.
pub fn now() -> Instant {
    monotonic_time()
}

/// Suspend the calling routine for `duration`.
///
/// # Panics
/// Panics when awaited outside of `Runtime::block_on`.
pub fn sleep(duration: Duration) -> Sleep {
    sleep_until(now() + duration)
}

/// Suspend the calling routine until `deadline`. A deadline in the past
/// completes on first poll.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep {
        deadline,
        timer: None,
    }
}

/// Future returned by [`sleep`] and [`sleep_until`].
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
    timer: Option<TimerKey>,
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if now() >= self.deadline {
            if let Some(key) = self.timer.take() {
                context::cancel_timer(key);
            }
            return Poll::Ready(());
        }

        match self.timer {
            Some(key) => context::update_timer(key, cx.waker()),
            None => {
                let key = context::register_timer(self.deadline, cx.waker().clone())
                    .unwrap_or_else(|| panic!("sleep() called outside of a braid runtime"));
                self.timer = Some(key);
            }
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(key) = self.timer.take() {
            context::cancel_timer(key);
        }
    }
}

/// Handle to one registered deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerKey(u64);

/// Deadlines ordered by (deadline, registration sequence).
///
/// Cancelled entries stay in the heap and are skipped when they surface.
#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    wakers: HashMap<u64, Waker>,
    next_seq: u64,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, deadline: Instant, waker: Waker) -> TimerKey {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((deadline, seq)));
        self.wakers.insert(seq, waker);
        TimerKey(seq)
    }

    pub fn update(&mut self, key: TimerKey, waker: &Waker) {
        if let Some(w) = self.wakers.get_mut(&key.0) {
            if !w.will_wake(waker) {
                *w = waker.clone();
            }
        }
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.wakers.remove(&key.0).is_some()
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.wakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wakers.is_empty()
    }

    /// Remove every timer whose deadline is at or before `now`, returning
    /// their wakers in deadline order. Wakers are returned rather than
    /// invoked so the caller can release its borrow first.
    pub fn expire(&mut self, now: Instant) -> Vec<Waker> {
        let mut fired = Vec::new();
        while let Some(Reverse((deadline, seq))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            if let Some(w) = self.wakers.remove(&seq) {
                fired.push(w);
            }
        }
        fired
    }

    /// Earliest deadline still armed.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, seq))) = self.heap.peek().copied() {
            if self.wakers.contains_key(&seq) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.wakers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn expires_in_deadline_order() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        heap.register(base + Duration::from_millis(20), Waker::from(a.clone()));
        heap.register(base + Duration::from_millis(10), Waker::from(a.clone()));
        assert_eq!(heap.next_deadline(), Some(base + Duration::from_millis(10)));

        let fired = heap.expire(base + Duration::from_millis(15));
        assert_eq!(fired.len(), 1);
        fired.into_iter().for_each(Waker::wake);
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.next_deadline(), Some(base + Duration::from_millis(20)));
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let key = heap.register(base, Waker::noop().clone());
        assert!(heap.cancel(key));
        assert!(!heap.cancel(key));
        assert!(heap.expire(base + Duration::from_secs(1)).is_empty());
        assert_eq!(heap.next_deadline(), None);
        assert!(heap.is_empty());
    }

    #[test]
    fn now_is_monotonic() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }
}
