// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Select: wait for the first of several channel operations.
//!
//! ```ignore
//! let mut sel = Select::new();
//! let got = sel.recv(&results, 0);
//! sel.send(&jobs, job, 1).timeout(now() + Duration::from_millis(10), 2);
//! match sel.wait().await? {
//!     0 => handle(got.take()),
//!     1 => {}
//!     _ => timed_out(),
//! }
//! ```
//!
//! Exactly one clause completes per `wait()`. When several are ready one is
//! picked uniformly at random from the runtime's RNG. If none is ready the
//! `otherwise` clause wins immediately; without one the session registers on
//! every channel and blocks until one clause completes or the deadline
//! passes. All registrations are retracted before `wait()` returns.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::channel::{Message, RecvEnd, SendEnd, Shared};
use crate::clock::{now, sleep_until, Sleep};
use crate::error::{Error, TrySendError};
use crate::green::context::random_index;
use crate::waiter::{Entry, Slot, SlotRef, Waiter};

/// One channel operation of a session.
trait Clause {
    /// Caller-chosen index returned when this clause wins.
    fn index(&self) -> usize;
    fn ready(&self) -> bool;
    /// Perform the operation immediately. `Ok(false)` if it turned out not
    /// to be ready after all.
    fn complete_now(&mut self) -> Result<bool, Error>;
    fn register(&mut self, waiter: &Rc<Waiter>, clause: usize);
    fn retract(&self, waiter: &Rc<Waiter>);
    /// Settle a clause that a counterpart completed while we were blocked.
    fn complete_fired(&mut self) -> Result<(), Error>;
}

/// Destination of a receive clause, read after `wait()` resolves.
pub struct Received<T> {
    slot: SlotRef<T>,
}

impl<T> Received<T> {
    /// The received value, or the closing value if the channel was closed.
    /// `None` when this clause did not win or the channel closed without a
    /// closing value.
    pub fn take(&self) -> Option<T> {
        self.take_message().and_then(Message::into_option)
    }

    /// The raw outcome, `None` if this clause did not win.
    pub fn take_message(&self) -> Option<Message<T>> {
        match self.slot.borrow_mut().take() {
            Slot::Value(v) => Some(Message::Value(v)),
            Slot::Closed(v) => Some(Message::Closed(v)),
            Slot::Empty => None,
        }
    }

    /// True if the clause won because the channel is closed.
    pub fn is_closed(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Closed(_))
    }
}

impl<T> fmt::Debug for Received<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.slot.borrow() {
            Slot::Empty => "empty",
            Slot::Value(_) => "value",
            Slot::Closed(_) => "closed",
        };
        f.debug_tuple("Received").field(&state).finish()
    }
}

struct RecvClause<T> {
    shared: Rc<Shared<T>>,
    index: usize,
    slot: SlotRef<T>,
}

impl<T> Clause for RecvClause<T> {
    fn index(&self) -> usize {
        self.index
    }

    fn ready(&self) -> bool {
        self.shared.state.borrow().can_recv()
    }

    fn complete_now(&mut self) -> Result<bool, Error> {
        let msg = self.shared.state.borrow_mut().try_recv();
        *self.slot.borrow_mut() = match msg {
            Some(Message::Value(v)) => Slot::Value(v),
            Some(Message::Closed(v)) => Slot::Closed(v),
            None => return Ok(false),
        };
        Ok(true)
    }

    fn register(&mut self, waiter: &Rc<Waiter>, clause: usize) {
        self.shared
            .state
            .borrow_mut()
            .register_receiver(Entry::new(waiter.clone(), clause, self.slot.clone()));
    }

    fn retract(&self, waiter: &Rc<Waiter>) {
        if let Ok(mut st) = self.shared.state.try_borrow_mut() {
            st.retract(waiter);
        }
    }

    fn complete_fired(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

struct SendClause<T> {
    shared: Rc<Shared<T>>,
    index: usize,
    value: Option<T>,
    slot: Option<SlotRef<T>>,
}

impl<T> Clause for SendClause<T> {
    fn index(&self) -> usize {
        self.index
    }

    fn ready(&self) -> bool {
        self.shared.state.borrow().can_send()
    }

    fn complete_now(&mut self) -> Result<bool, Error> {
        let Some(value) = self.value.take() else {
            return Ok(false);
        };
        match self.shared.state.borrow_mut().try_send(value) {
            Ok(()) => Ok(true),
            Err(TrySendError::Closed(_)) => Err(Error::ChannelClosed),
            Err(TrySendError::Full(v)) => {
                self.value = Some(v);
                Ok(false)
            }
        }
    }

    fn register(&mut self, waiter: &Rc<Waiter>, clause: usize) {
        let Some(value) = self.value.take() else {
            return;
        };
        let slot = Rc::new(RefCell::new(Slot::Value(value)));
        self.shared
            .state
            .borrow_mut()
            .register_sender(Entry::new(waiter.clone(), clause, slot.clone()));
        self.slot = Some(slot);
    }

    fn retract(&self, waiter: &Rc<Waiter>) {
        if let Ok(mut st) = self.shared.state.try_borrow_mut() {
            st.retract(waiter);
        }
    }

    fn complete_fired(&mut self) -> Result<(), Error> {
        let Some(slot) = self.slot.take() else {
            return Ok(());
        };
        let left = slot.borrow_mut().take();
        match left {
            // Woken by close, the value was never taken.
            Slot::Value(_) => Err(Error::ChannelClosed),
            _ => Ok(()),
        }
    }
}

/// A select session under construction.
#[derive(Default)]
pub struct Select<'a> {
    clauses: Vec<Box<dyn Clause + 'a>>,
    otherwise: Option<usize>,
    deadline: Option<(Instant, usize)>,
}

impl<'a> Select<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a receive clause. Read the outcome from the returned slot.
    /// Accepts a [`Channel`](crate::Channel) or a [`Receiver`](crate::Receiver).
    pub fn recv<T: 'a>(&mut self, ch: &impl RecvEnd<T>, index: usize) -> Received<T> {
        let slot = Rc::new(RefCell::new(Slot::Empty));
        self.clauses.push(Box::new(RecvClause {
            shared: ch.channel().shared().clone(),
            index,
            slot: slot.clone(),
        }));
        Received { slot }
    }

    /// Add a send clause offering `value`. The value is dropped if another
    /// clause wins. Accepts a [`Channel`](crate::Channel) or a
    /// [`Sender`](crate::Sender).
    pub fn send<T: 'a>(&mut self, ch: &impl SendEnd<T>, value: T, index: usize) -> &mut Self {
        self.clauses.push(Box::new(SendClause {
            shared: ch.channel().shared().clone(),
            index,
            value: Some(value),
            slot: None,
        }));
        self
    }

    /// Clause taken when nothing else is ready. Makes `wait()` non-blocking.
    pub fn otherwise(&mut self, index: usize) -> &mut Self {
        self.otherwise = Some(index);
        self
    }

    /// Clause taken once `deadline` passes with nothing else completed.
    pub fn timeout(&mut self, deadline: Instant, index: usize) -> &mut Self {
        self.deadline = Some((deadline, index));
        self
    }

    /// Resolve the session, returning the winning clause's index.
    ///
    /// Fails with `ChannelClosed` when the winner is a send on a closed
    /// channel. A session with no clauses, no `otherwise` and no deadline
    /// never resolves.
    pub fn wait(self) -> SelectFuture<'a> {
        SelectFuture {
            clauses: self.clauses,
            otherwise: self.otherwise,
            deadline: self.deadline,
            waiting: None,
        }
    }
}

impl fmt::Debug for Select<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("clauses", &self.clauses.len())
            .field("otherwise", &self.otherwise)
            .field("deadline", &self.deadline)
            .finish()
    }
}

struct Waiting {
    waiter: Rc<Waiter>,
    sleep: Option<(Sleep, usize)>,
}

/// Future returned by [`Select::wait`].
#[must_use = "futures do nothing unless awaited"]
pub struct SelectFuture<'a> {
    clauses: Vec<Box<dyn Clause + 'a>>,
    otherwise: Option<usize>,
    deadline: Option<(Instant, usize)>,
    waiting: Option<Waiting>,
}

impl SelectFuture<'_> {
    /// Complete one ready clause, chosen at random. `None` if none was ready.
    fn try_ready(&mut self) -> Option<Result<usize, Error>> {
        let mut ready: Vec<usize> = (0..self.clauses.len())
            .filter(|&i| self.clauses[i].ready())
            .collect();
        while !ready.is_empty() {
            let pick = ready.swap_remove(random_index(ready.len()));
            let clause = &mut self.clauses[pick];
            match clause.complete_now() {
                Ok(true) => return Some(Ok(clause.index())),
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn retract_all(&self, waiter: &Rc<Waiter>) {
        for clause in &self.clauses {
            clause.retract(waiter);
        }
    }
}

impl Future for SelectFuture<'_> {
    type Output = Result<usize, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Some(mut waiting) = this.waiting.take() {
            if let Some(pos) = waiting.waiter.fired() {
                this.retract_all(&waiting.waiter);
                let clause = &mut this.clauses[pos];
                let index = clause.index();
                return Poll::Ready(clause.complete_fired().map(|()| index));
            }
            if let Some((sleep, index)) = &mut waiting.sleep {
                if Pin::new(sleep).poll(cx).is_ready() {
                    let index = *index;
                    this.retract_all(&waiting.waiter);
                    return Poll::Ready(Ok(index));
                }
            }
            waiting.waiter.set_waker(cx.waker());
            this.waiting = Some(waiting);
            return Poll::Pending;
        }

        if let Some(result) = this.try_ready() {
            return Poll::Ready(result);
        }
        if let Some(index) = this.otherwise {
            return Poll::Ready(Ok(index));
        }
        if let Some((deadline, index)) = this.deadline {
            if now() >= deadline {
                return Poll::Ready(Ok(index));
            }
        }

        let waiter = Waiter::new();
        waiter.set_waker(cx.waker());
        for (pos, clause) in this.clauses.iter_mut().enumerate() {
            clause.register(&waiter, pos);
        }
        let mut sleep = None;
        if let Some((deadline, index)) = this.deadline {
            let mut armed = sleep_until(deadline);
            // The deadline may pass while registering; an expired sleep arms no timer.
            if Pin::new(&mut armed).poll(cx).is_ready() {
                this.retract_all(&waiter);
                return Poll::Ready(Ok(index));
            }
            sleep = Some((armed, index));
        }
        this.waiting = Some(Waiting { waiter, sleep });
        Poll::Pending
    }
}

impl Drop for SelectFuture<'_> {
    fn drop(&mut self) {
        if let Some(waiting) = self.waiting.take() {
            self.retract_all(&waiting.waiter);
        }
    }
}
