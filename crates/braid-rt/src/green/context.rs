// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Thread-local "current runtime".
//!
//! Set for the duration of `Runtime::block_on`. Free functions (`spawn`,
//! `yield_now`, `sleep`, select's random choice) reach the scheduler
//! through it instead of taking an explicit handle.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use rand::Rng;

use super::handle::RoutineHandle;
use super::scheduler::Core;
use crate::clock::TimerKey;
use crate::error::Error;

thread_local! {
    static CURRENT: RefCell<Option<Rc<Core>>> = const { RefCell::new(None) };
}

/// Clears the current runtime when dropped.
pub(crate) struct EnterGuard {
    _not_send: std::marker::PhantomData<Rc<()>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let _ = CURRENT.try_with(|c| c.borrow_mut().take());
    }
}

/// Install `core` as this thread's runtime.
pub(crate) fn enter(core: Rc<Core>) -> Result<EnterGuard, Error> {
    CURRENT.with(|c| {
        let mut slot = c.borrow_mut();
        if slot.is_some() {
            return Err(Error::NestedRuntime);
        }
        *slot = Some(core);
        Ok(EnterGuard {
            _not_send: std::marker::PhantomData,
        })
    })
}

fn current() -> Option<Rc<Core>> {
    CURRENT.try_with(|c| c.borrow().clone()).ok().flatten()
}

/// True while called from inside `block_on`.
pub fn in_runtime() -> bool {
    current().is_some()
}

/// Spawn a routine on the current runtime.
///
/// The routine becomes runnable immediately; the caller keeps running.
/// Fails with `NoRuntime` outside `block_on` and with `ResourceExhausted`
/// when the routine limit is reached.
pub fn spawn<F>(entry: F) -> Result<RoutineHandle, Error>
where
    F: Future<Output = ()> + 'static,
{
    current().ok_or(Error::NoRuntime)?.spawn(entry)
}

/// Let every other runnable routine take a turn before resuming.
pub async fn yield_now() {
    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                return Poll::Ready(());
            }
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    YieldNow(false).await
}

pub(crate) fn register_timer(deadline: Instant, waker: Waker) -> Option<TimerKey> {
    current().map(|core| core.register_timer(deadline, waker))
}

pub(crate) fn update_timer(key: TimerKey, waker: &Waker) {
    if let Some(core) = current() {
        core.update_timer(key, waker);
    }
}

pub(crate) fn cancel_timer(key: TimerKey) {
    if let Some(core) = current() {
        core.cancel_timer(key);
    }
}

/// Uniform index in `0..n` from the runtime's RNG, or the thread RNG when no
/// runtime is running.
pub(crate) fn random_index(n: usize) -> usize {
    debug_assert!(n > 0);
    match current() {
        Some(core) => core.random_index(n),
        None => rand::thread_rng().gen_range(0..n),
    }
}
