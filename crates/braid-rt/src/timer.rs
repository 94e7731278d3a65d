// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Channel-based timers.
//!
//! [`Timer`] delivers its fire instant once, [`Ticker`] delivers one every
//! period. Both are backed by a helper routine sleeping in a select on a
//! private stop channel, so stopping them frees the routine right away.
//! [`after`] and [`every`] run closures instead of delivering on a channel.

use std::cell::Cell;
use std::future::Future;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::channel::{Channel, RecvFuture};
use crate::clock::{now, sleep, sleep_until};
use crate::error::Error;
use crate::green::context::spawn;
use crate::green::handle::RoutineHandle;
use crate::select::Select;

const STOP: usize = 0;
const FIRE: usize = 1;

/// Wait until `deadline` or until `stop` closes. True if the deadline won.
async fn wait_or_stop(stop: &Channel<()>, deadline: Instant) -> bool {
    let mut sel = Select::new();
    sel.recv(stop, STOP);
    sel.timeout(deadline, FIRE);
    matches!(sel.wait().await, Ok(FIRE))
}

/// One-shot timer.
#[derive(Debug)]
pub struct Timer {
    channel: Channel<Instant>,
    stop: Channel<()>,
    fired: Rc<Cell<bool>>,
}

impl Timer {
    /// Start a timer firing at `deadline`. Needs a running runtime.
    pub fn new(deadline: Instant) -> Result<Self, Error> {
        let channel = Channel::buffered(1);
        let stop = Channel::unbuffered();
        let fired = Rc::new(Cell::new(false));

        let (out, stop_rx, flag) = (channel.duplicate(), stop.duplicate(), fired.clone());
        spawn(async move {
            if wait_or_stop(&stop_rx, deadline).await {
                flag.set(true);
                let _ = out.try_send(now());
            }
        })?;

        Ok(Self {
            channel,
            stop,
            fired,
        })
    }

    /// Timer firing `duration` from now.
    pub fn after(duration: Duration) -> Result<Self, Error> {
        Self::new(now() + duration)
    }

    /// Channel the fire instant is delivered on.
    pub fn channel(&self) -> &Channel<Instant> {
        &self.channel
    }

    /// Wait for the fire instant.
    pub fn recv(&self) -> RecvFuture<Instant> {
        self.channel.recv()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.get()
    }

    /// Prevent the timer from firing. False if it already fired or was
    /// already stopped.
    pub fn stop(&self) -> bool {
        if self.fired.get() || self.stop.is_closed() {
            return false;
        }
        self.stop.close().is_ok()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Periodic timer. Ticks are dropped while the consumer lags behind.
#[derive(Debug)]
pub struct Ticker {
    channel: Channel<Instant>,
    stop: Channel<()>,
    period: Duration,
}

impl Ticker {
    /// Start ticking every `period`. Needs a running runtime.
    ///
    /// # Panics
    /// Panics if `period` is zero.
    pub fn new(period: Duration) -> Result<Self, Error> {
        assert!(!period.is_zero(), "ticker period must be non-zero");
        let channel = Channel::buffered(1);
        let stop = Channel::unbuffered();

        let (out, stop_rx) = (channel.duplicate(), stop.duplicate());
        spawn(async move {
            let mut next = now() + period;
            while wait_or_stop(&stop_rx, next).await {
                let fired_at = now();
                let _ = out.try_send(fired_at);
                next += period;
                if next <= fired_at {
                    next = fired_at + period;
                }
            }
        })?;

        Ok(Self {
            channel,
            stop,
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn channel(&self) -> &Channel<Instant> {
        &self.channel
    }

    /// Wait for the next tick.
    pub fn recv(&self) -> RecvFuture<Instant> {
        self.channel.recv()
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&self) {
        if !self.stop.is_closed() {
            let _ = self.stop.close();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run `f` in a new routine after `duration`.
pub fn after<F, Fut>(duration: Duration, f: F) -> Result<RoutineHandle, Error>
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    spawn(async move {
        sleep(duration).await;
        f().await;
    })
}

/// Run `f` in a new routine every `period` until it returns `Break`.
///
/// # Panics
/// Panics if `period` is zero.
pub fn every<F, Fut>(period: Duration, mut f: F) -> Result<RoutineHandle, Error>
where
    F: FnMut() -> Fut + 'static,
    Fut: Future<Output = ControlFlow<()>> + 'static,
{
    assert!(!period.is_zero(), "period must be non-zero");
    spawn(async move {
        let mut next = now() + period;
        loop {
            sleep_until(next).await;
            if f().await.is_break() {
                break;
            }
            next += period;
        }
    })
}
