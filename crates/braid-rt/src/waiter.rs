// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Wait registrations.
//!
//! A blocked `send`, `recv` or select session owns one [`Waiter`]. It
//! appears in channel queues as one [`Entry`] per clause; all entries of a
//! session share the waiter, so the first clause to complete claims it and
//! the others become stale. Queues skip stale entries and the session
//! retracts them before it resumes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::task::Waker;

#[derive(Default)]
pub(crate) struct Waiter {
    fired: Cell<Option<usize>>,
    waker: RefCell<Option<Waker>>,
}

impl Waiter {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn is_fired(&self) -> bool {
        self.fired.get().is_some()
    }

    /// Clause that completed, if any.
    pub fn fired(&self) -> Option<usize> {
        self.fired.get()
    }

    /// Claim the waiter for `clause` and wake its owner. Returns false if
    /// another clause already won.
    pub fn fire(&self, clause: usize) -> bool {
        if self.is_fired() {
            return false;
        }
        self.fired.set(Some(clause));
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
        true
    }

    pub fn set_waker(&self, waker: &Waker) {
        let mut slot = self.waker.borrow_mut();
        match slot.as_ref() {
            Some(w) if w.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }
}

/// Value exchange point between a blocked party and its counterpart.
///
/// Senders start as `Value` and are emptied by the receiver that takes the
/// value; a sender still holding `Value` after firing was failed by close.
/// Receivers start `Empty` and end as `Value` or `Closed`.
#[derive(Debug)]
pub(crate) enum Slot<T> {
    Empty,
    Value(T),
    Closed(Option<T>),
}

impl<T> Slot<T> {
    pub fn take(&mut self) -> Slot<T> {
        std::mem::replace(self, Slot::Empty)
    }
}

pub(crate) type SlotRef<T> = Rc<RefCell<Slot<T>>>;

/// One clause's presence in a channel queue.
pub(crate) struct Entry<T> {
    pub waiter: Rc<Waiter>,
    pub clause: usize,
    pub slot: SlotRef<T>,
}

impl<T> Entry<T> {
    pub fn new(waiter: Rc<Waiter>, clause: usize, slot: SlotRef<T>) -> Self {
        Self {
            waiter,
            clause,
            slot,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.waiter.is_fired()
    }

    /// Complete this entry's clause. False if the session already resolved.
    pub fn fire(&self) -> bool {
        self.waiter.fire(self.clause)
    }
}
