// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Typed channels.
//!
//! Capacity 0 is a synchronous rendezvous: a send completes only once a
//! receiver has taken the value. Capacity `n` buffers up to `n` values.
//! Blocked senders and receivers queue in FIFO order.
//!
//! A channel is shared through handles: [`Channel::duplicate`] (or `Clone`)
//! adds one, [`Channel::release`] (or `Drop`) removes one. The contents go
//! away with the last handle.
//!
//! Closing is one-way. After close, sends fail with the value handed back,
//! buffered values stay receivable, and once drained every receive yields
//! the closing value (or `None` when closed without one).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{ready, Context, Poll};

use futures::stream::{FusedStream, Stream};

use crate::error::{Error, SendError, TryRecvError, TrySendError};
use crate::waiter::{Entry, Slot, SlotRef, Waiter};

/// Outcome of a receive that distinguishes values from the closed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    /// A value sent by some routine.
    Value(T),
    /// The channel is closed and drained. Carries the closing value, if any.
    Closed(Option<T>),
}

impl<T> Message<T> {
    /// The value or closing value, if any.
    pub fn into_option(self) -> Option<T> {
        match self {
            Message::Value(v) => Some(v),
            Message::Closed(v) => v,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Message::Closed(_))
    }
}

/// Closing value and the clone used to hand it out repeatedly.
struct Closing<T> {
    value: T,
    clone: fn(&T) -> T,
}

pub(crate) struct State<T> {
    capacity: usize,
    buffer: VecDeque<T>,
    senders: VecDeque<Entry<T>>,
    receivers: VecDeque<Entry<T>>,
    closed: bool,
    closing: Option<Closing<T>>,
}

/// Pop the oldest entry whose session has not resolved elsewhere.
fn pop_live<T>(queue: &mut VecDeque<Entry<T>>) -> Option<Entry<T>> {
    while let Some(entry) = queue.pop_front() {
        if entry.is_live() {
            return Some(entry);
        }
    }
    None
}

fn live_count<T>(queue: &VecDeque<Entry<T>>) -> usize {
    queue.iter().filter(|e| e.is_live()).count()
}

impl<T> State<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
            senders: VecDeque::new(),
            receivers: VecDeque::new(),
            closed: false,
            closing: None,
        }
    }

    fn closing_value(&self) -> Option<T> {
        self.closing.as_ref().map(|c| (c.clone)(&c.value))
    }

    /// True when a send would complete without blocking (a closed channel
    /// completes it with failure).
    pub(crate) fn can_send(&self) -> bool {
        self.closed
            || self.buffer.len() < self.capacity
            || self.receivers.iter().any(Entry::is_live)
    }

    /// True when a receive would complete without blocking.
    pub(crate) fn can_recv(&self) -> bool {
        self.closed || !self.buffer.is_empty() || self.senders.iter().any(Entry::is_live)
    }

    pub(crate) fn try_send(&mut self, value: T) -> Result<(), TrySendError<T>> {
        if self.closed {
            return Err(TrySendError::Closed(value));
        }
        if let Some(rx) = pop_live(&mut self.receivers) {
            *rx.slot.borrow_mut() = Slot::Value(value);
            rx.fire();
            return Ok(());
        }
        if self.buffer.len() < self.capacity {
            self.buffer.push_back(value);
            return Ok(());
        }
        Err(TrySendError::Full(value))
    }

    pub(crate) fn try_recv(&mut self) -> Option<Message<T>> {
        if let Some(value) = self.buffer.pop_front() {
            // The longest-waiting sender moves into the freed slot.
            if let Some(tx) = pop_live(&mut self.senders) {
                if let Slot::Value(v) = tx.slot.borrow_mut().take() {
                    self.buffer.push_back(v);
                }
                tx.fire();
            }
            return Some(Message::Value(value));
        }
        if let Some(tx) = pop_live(&mut self.senders) {
            let taken = tx.slot.borrow_mut().take();
            tx.fire();
            if let Slot::Value(v) = taken {
                return Some(Message::Value(v));
            }
        }
        if self.closed {
            return Some(Message::Closed(self.closing_value()));
        }
        None
    }

    /// Put back a value handed to a receive that went away before taking
    /// it: to the next waiting receiver, else the front of the buffer.
    /// Hands the value back if neither has room.
    fn restore(&mut self, value: T) -> Option<T> {
        if let Some(rx) = pop_live(&mut self.receivers) {
            *rx.slot.borrow_mut() = Slot::Value(value);
            rx.fire();
            return None;
        }
        if self.buffer.len() < self.capacity {
            self.buffer.push_front(value);
            return None;
        }
        Some(value)
    }

    pub(crate) fn register_sender(&mut self, entry: Entry<T>) {
        self.senders.push_back(entry);
    }

    pub(crate) fn register_receiver(&mut self, entry: Entry<T>) {
        self.receivers.push_back(entry);
    }

    /// Remove every entry owned by `waiter`.
    pub(crate) fn retract(&mut self, waiter: &Rc<Waiter>) {
        self.senders.retain(|e| !Rc::ptr_eq(&e.waiter, waiter));
        self.receivers.retain(|e| !Rc::ptr_eq(&e.waiter, waiter));
    }

    fn close(&mut self, closing: Option<Closing<T>>) -> Result<(), Error> {
        if self.closed {
            return Err(Error::DoubleClose);
        }
        self.closed = true;
        self.closing = closing;

        for rx in std::mem::take(&mut self.receivers) {
            if rx.is_live() {
                *rx.slot.borrow_mut() = Slot::Closed(self.closing_value());
                rx.fire();
            }
        }
        // Senders keep their value in the slot; the owner reads that as failure.
        for tx in std::mem::take(&mut self.senders) {
            tx.fire();
        }
        Ok(())
    }
}

/// Channel object shared by every handle.
pub(crate) struct Shared<T> {
    pub(crate) state: RefCell<State<T>>,
    handles: Cell<usize>,
}

impl<T> Shared<T> {
    fn release_handle(&self) -> Result<(), Error> {
        let remaining = self.handles.get().saturating_sub(1);
        self.handles.set(remaining);
        if remaining > 0 {
            return Ok(());
        }

        let mut st = self.state.borrow_mut();
        let senders = live_count(&st.senders);
        let receivers = live_count(&st.receivers);
        if senders > 0 || receivers > 0 {
            return Err(Error::PendingWaiters { senders, receivers });
        }
        st.buffer.clear();
        st.senders.clear();
        st.receivers.clear();
        st.closing = None;
        Ok(())
    }
}

/// Handle to a typed channel.
pub struct Channel<T> {
    shared: Rc<Shared<T>>,
    released: bool,
}

impl<T> Channel<T> {
    /// New channel with room for `capacity` buffered values.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(State::new(capacity)),
                handles: Cell::new(1),
            }),
            released: false,
        }
    }

    /// Synchronous channel: every send waits for its receiver.
    pub fn unbuffered() -> Self {
        Self::new(0)
    }

    pub fn buffered(capacity: usize) -> Self {
        Self::new(capacity)
    }

    /// Another handle to the same channel.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    pub(crate) fn shared(&self) -> &Rc<Shared<T>> {
        &self.shared
    }

    /// Send `value`, suspending until it is taken or buffered.
    ///
    /// Fails with the value handed back if the channel is closed, including
    /// when it is closed while this send is blocked.
    pub fn send(&self, value: T) -> SendFuture<T> {
        SendFuture {
            shared: self.shared.clone(),
            value: Some(value),
            wait: None,
        }
    }

    /// Receive the next value, suspending until one is available.
    ///
    /// On a closed and drained channel this yields the closing value
    /// (`None` when closed without one) without suspending.
    pub fn recv(&self) -> RecvFuture<T> {
        RecvFuture(self.recv_message())
    }

    /// Like [`recv`](Self::recv), but tells values and the closed state apart.
    pub fn recv_message(&self) -> MessageFuture<T> {
        MessageFuture {
            shared: self.shared.clone(),
            wait: None,
        }
    }

    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.shared.state.borrow_mut().try_send(value)
    }

    pub fn try_recv(&self) -> Result<Option<T>, TryRecvError> {
        self.shared
            .state
            .borrow_mut()
            .try_recv()
            .map(Message::into_option)
            .ok_or(TryRecvError::Empty)
    }

    /// Close without a closing value. Receivers then see `None`.
    pub fn close(&self) -> Result<(), Error> {
        self.shared.state.borrow_mut().close(None)
    }

    /// Close, handing `value` to every receive once the buffer is drained.
    pub fn close_with(&self, value: T) -> Result<(), Error>
    where
        T: Clone,
    {
        self.shared.state.borrow_mut().close(Some(Closing {
            value,
            clone: T::clone,
        }))
    }

    /// Give up this handle.
    ///
    /// Releasing the last handle while routines are still blocked on the
    /// channel reports `PendingWaiters`; those routines stay blocked.
    pub fn release(mut self) -> Result<(), Error> {
        self.released = true;
        self.shared.release_handle()
    }

    /// Values currently buffered.
    pub fn len(&self) -> usize {
        self.shared.state.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.state.borrow().capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.borrow().closed
    }

    /// Live handles to this channel.
    pub fn handle_count(&self) -> usize {
        self.shared.handles.get()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        self.shared.handles.set(self.shared.handles.get() + 1);
        Self {
            shared: self.shared.clone(),
            released: false,
        }
    }
}

impl<T> Drop for Channel<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.shared.release_handle() {
            tracing::error!("last channel handle dropped: {}", e);
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.borrow();
        f.debug_struct("Channel")
            .field("capacity", &st.capacity)
            .field("len", &st.buffer.len())
            .field("closed", &st.closed)
            .field("handles", &self.shared.handles.get())
            .finish()
    }
}

mod sealed {
    pub trait Endpoint<T> {
        fn channel(&self) -> &super::Channel<T>;
    }
}

/// Handles a select can receive from: [`Channel`] and [`Receiver`].
pub trait RecvEnd<T>: sealed::Endpoint<T> {}

/// Handles a select can send on: [`Channel`] and [`Sender`].
pub trait SendEnd<T>: sealed::Endpoint<T> {}

impl<T> sealed::Endpoint<T> for Channel<T> {
    fn channel(&self) -> &Channel<T> {
        self
    }
}

impl<T> RecvEnd<T> for Channel<T> {}
impl<T> SendEnd<T> for Channel<T> {}

impl<T> Channel<T> {
    /// A send-only handle to this channel.
    pub fn sender(&self) -> Sender<T> {
        Sender(self.duplicate())
    }

    /// A receive-only handle to this channel.
    pub fn receiver(&self) -> Receiver<T> {
        Receiver(self.duplicate())
    }

    /// Turn this handle into a send-only and a receive-only handle.
    pub fn split(self) -> (Sender<T>, Receiver<T>) {
        let rx = Receiver(self.duplicate());
        (Sender(self), rx)
    }

    /// Stream of received values, ending once the channel is closed and
    /// drained. A closing value is not yielded.
    pub fn stream(&self) -> RecvStream<T> {
        RecvStream::new(self.duplicate())
    }
}

/// Send-only handle. Counts as a channel handle.
#[derive(Debug)]
pub struct Sender<T>(Channel<T>);

impl<T> Sender<T> {
    pub fn send(&self, value: T) -> SendFuture<T> {
        self.0.send(value)
    }

    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.0.try_send(value)
    }

    pub fn close(&self) -> Result<(), Error> {
        self.0.close()
    }

    pub fn close_with(&self, value: T) -> Result<(), Error>
    where
        T: Clone,
    {
        self.0.close_with(value)
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    pub fn release(self) -> Result<(), Error> {
        self.0.release()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self(self.0.duplicate())
    }
}

impl<T> sealed::Endpoint<T> for Sender<T> {
    fn channel(&self) -> &Channel<T> {
        &self.0
    }
}

impl<T> SendEnd<T> for Sender<T> {}

/// Receive-only handle. Counts as a channel handle.
#[derive(Debug)]
pub struct Receiver<T>(Channel<T>);

impl<T> Receiver<T> {
    pub fn recv(&self) -> RecvFuture<T> {
        self.0.recv()
    }

    pub fn recv_message(&self) -> MessageFuture<T> {
        self.0.recv_message()
    }

    pub fn try_recv(&self) -> Result<Option<T>, TryRecvError> {
        self.0.try_recv()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    pub fn release(self) -> Result<(), Error> {
        self.0.release()
    }

    pub fn stream(&self) -> RecvStream<T> {
        self.0.stream()
    }

    /// Consume this handle into a stream of received values.
    pub fn into_stream(self) -> RecvStream<T> {
        RecvStream::new(self.0)
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self(self.0.duplicate())
    }
}

impl<T> sealed::Endpoint<T> for Receiver<T> {
    fn channel(&self) -> &Channel<T> {
        &self.0
    }
}

impl<T> RecvEnd<T> for Receiver<T> {}

/// Stream returned by [`Channel::stream`] and [`Receiver::into_stream`].
#[must_use = "streams do nothing unless polled"]
pub struct RecvStream<T> {
    // Dropped before the handle so its registration is retracted first.
    pending: Option<MessageFuture<T>>,
    channel: Channel<T>,
    done: bool,
}

impl<T> RecvStream<T> {
    fn new(channel: Channel<T>) -> Self {
        Self {
            pending: None,
            channel,
            done: false,
        }
    }
}

impl<T> Unpin for RecvStream<T> {}

impl<T> Stream for RecvStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }
        let channel = &this.channel;
        let fut = this.pending.get_or_insert_with(|| channel.recv_message());
        let msg = ready!(Pin::new(fut).poll(cx));
        this.pending = None;
        match msg {
            Message::Value(v) => Poll::Ready(Some(v)),
            Message::Closed(_) => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> FusedStream for RecvStream<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> fmt::Debug for RecvStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecvStream")
            .field("channel", &self.channel)
            .field("done", &self.done)
            .finish()
    }
}

/// Registration of a blocked send or receive.
struct Registration<T> {
    waiter: Rc<Waiter>,
    slot: SlotRef<T>,
}

/// Future returned by [`Channel::send`].
#[must_use = "futures do nothing unless awaited"]
pub struct SendFuture<T> {
    shared: Rc<Shared<T>>,
    value: Option<T>,
    wait: Option<Registration<T>>,
}

// The value is moved, never pinned.
impl<T> Unpin for SendFuture<T> {}

impl<T> Future for SendFuture<T> {
    type Output = Result<(), SendError<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Some(reg) = &this.wait {
            if !reg.waiter.is_fired() {
                reg.waiter.set_waker(cx.waker());
                return Poll::Pending;
            }
            let taken = reg.slot.borrow_mut().take();
            this.wait = None;
            return Poll::Ready(match taken {
                Slot::Value(v) => Err(SendError(v)),
                _ => Ok(()),
            });
        }

        let value = this
            .value
            .take()
            .expect("SendFuture polled after completion");
        let mut st = this.shared.state.borrow_mut();
        match st.try_send(value) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(TrySendError::Closed(v)) => Poll::Ready(Err(SendError(v))),
            Err(TrySendError::Full(v)) => {
                let waiter = Waiter::new();
                waiter.set_waker(cx.waker());
                let slot = Rc::new(RefCell::new(Slot::Value(v)));
                st.register_sender(Entry::new(waiter.clone(), 0, slot.clone()));
                this.wait = Some(Registration { waiter, slot });
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SendFuture<T> {
    fn drop(&mut self) {
        if let Some(reg) = self.wait.take() {
            if let Ok(mut st) = self.shared.state.try_borrow_mut() {
                st.retract(&reg.waiter);
            }
        }
    }
}

/// Future returned by [`Channel::recv_message`].
#[must_use = "futures do nothing unless awaited"]
pub struct MessageFuture<T> {
    shared: Rc<Shared<T>>,
    wait: Option<Registration<T>>,
}

impl<T> Unpin for MessageFuture<T> {}

impl<T> Future for MessageFuture<T> {
    type Output = Message<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Message<T>> {
        let this = &mut *self;

        if let Some(reg) = &this.wait {
            if !reg.waiter.is_fired() {
                reg.waiter.set_waker(cx.waker());
                return Poll::Pending;
            }
            let taken = reg.slot.borrow_mut().take();
            this.wait = None;
            return Poll::Ready(match taken {
                Slot::Value(v) => Message::Value(v),
                Slot::Closed(v) => Message::Closed(v),
                Slot::Empty => Message::Closed(None),
            });
        }

        let mut st = this.shared.state.borrow_mut();
        if let Some(msg) = st.try_recv() {
            return Poll::Ready(msg);
        }
        let waiter = Waiter::new();
        waiter.set_waker(cx.waker());
        let slot = Rc::new(RefCell::new(Slot::Empty));
        st.register_receiver(Entry::new(waiter.clone(), 0, slot.clone()));
        this.wait = Some(Registration { waiter, slot });
        Poll::Pending
    }
}

impl<T> Drop for MessageFuture<T> {
    fn drop(&mut self) {
        let Some(reg) = self.wait.take() else {
            return;
        };
        let Ok(mut st) = self.shared.state.try_borrow_mut() else {
            return;
        };
        if !reg.waiter.is_fired() {
            st.retract(&reg.waiter);
            return;
        }
        let handed = reg.slot.borrow_mut().take();
        if let Slot::Value(v) = handed {
            if st.restore(v).is_some() {
                tracing::debug!("receive dropped after a value was handed to it; value lost");
            }
        }
    }
}

/// Future returned by [`Channel::recv`].
#[must_use = "futures do nothing unless awaited"]
pub struct RecvFuture<T>(MessageFuture<T>);

impl<T> Future for RecvFuture<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.0).poll(cx).map(Message::into_option)
    }
}
