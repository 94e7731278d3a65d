// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Execution-context substrate.
//!
//! A routine's context is its pinned, boxed future. Switching to it is a
//! poll; releasing it drops whatever the future still owns (channel
//! registrations included). The substrate is the only place that enforces
//! the routine limit.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::error::Error;

/// One allocated execution context.
pub struct Fiber {
    entry: Pin<Box<dyn Future<Output = ()>>>,
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fiber(..)")
    }
}

/// Allocation bookkeeping for contexts.
#[derive(Debug)]
pub struct Substrate {
    live: usize,
    limit: Option<usize>,
}

impl Substrate {
    pub fn new(limit: Option<usize>) -> Self {
        Self { live: 0, limit }
    }

    /// Allocate a context that will run `entry` when first switched to.
    pub fn allocate_context<F>(&mut self, entry: F) -> Result<Fiber, Error>
    where
        F: Future<Output = ()> + 'static,
    {
        if let Some(limit) = self.limit {
            if self.live >= limit {
                return Err(Error::ResourceExhausted { limit });
            }
        }
        self.live += 1;
        Ok(Fiber {
            entry: Box::pin(entry),
        })
    }

    /// Resume `fiber` until it next suspends or finishes.
    ///
    /// Takes no `&mut self`: the resumed code may allocate further contexts.
    pub fn switch_to(fiber: &mut Fiber, cx: &mut Context<'_>) -> Poll<()> {
        fiber.entry.as_mut().poll(cx)
    }

    /// Give back the context's resources.
    pub fn release_context(&mut self, fiber: Fiber) {
        self.live = self.live.saturating_sub(1);
        drop(fiber);
    }

    /// Number of contexts currently allocated.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// Monotonic time source used by the clock and the timer heap.
pub fn monotonic_time() -> Instant {
    Instant::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::task::Waker;

    #[test]
    fn limit_is_enforced_and_released() {
        let mut s = Substrate::new(Some(2));
        let a = s.allocate_context(async {}).unwrap();
        let _b = s.allocate_context(async {}).unwrap();
        assert_eq!(
            s.allocate_context(async {}).unwrap_err(),
            Error::ResourceExhausted { limit: 2 }
        );
        s.release_context(a);
        assert_eq!(s.live(), 1);
        assert!(s.allocate_context(async {}).is_ok());
    }

    #[test]
    fn switch_runs_entry_to_completion() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let mut s = Substrate::new(None);
        let mut f = s
            .allocate_context(async move {
                flag.set(true);
            })
            .unwrap();
        let mut cx = Context::from_waker(Waker::noop());
        assert!(Substrate::switch_to(&mut f, &mut cx).is_ready());
        assert!(ran.get());
        s.release_context(f);
        assert_eq!(s.live(), 0);
    }

    #[test]
    fn releasing_unfinished_context_drops_its_state() {
        let guard = Rc::new(());
        let held = guard.clone();
        let mut s = Substrate::new(None);
        let f = s
            .allocate_context(async move {
                let _held = held;
                std::future::pending::<()>().await;
            })
            .unwrap();
        assert_eq!(Rc::strong_count(&guard), 2);
        s.release_context(f);
        assert_eq!(Rc::strong_count(&guard), 1);
    }
}
