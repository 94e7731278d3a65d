// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! braid runtime library.
//!
//! Cooperative routines on one OS thread, communicating over typed channels
//! and multiplexing with select. A routine runs until it blocks on `send`,
//! `recv`, `Select::wait`, `sleep` or `yield_now`; the scheduler then resumes
//! the next runnable routine.
//!
//! Components:
//! - runtime: `Runtime`, `block_on`, `spawn`, `yield_now` (green scheduler)
//! - channels: unbuffered and buffered, close, duplicate, release,
//!   send-only and receive-only views, streams
//! - select: random-fair multiplexing with otherwise and timeout clauses
//! - choose: closure-based select
//! - clock/timers: `sleep`, `Timer`, `Ticker`, `after`, `every`
//! - pipeline: `fan_in`
//!
//! ```ignore
//! use braid_rt::{block_on, spawn, Channel};
//!
//! let answer = block_on(async {
//!     let ch = Channel::unbuffered();
//!     let tx = ch.duplicate();
//!     spawn(async move { tx.send(42).await.unwrap() }).unwrap();
//!     ch.recv().await
//! })?;
//! assert_eq!(answer, Some(42));
//! ```

pub mod channel;
pub mod choose;
pub mod clock;
pub mod config;
pub mod error;
pub mod fiber;
pub mod green;
pub mod pipeline;
pub mod select;
pub mod timer;
mod waiter;

pub use channel::{
    Channel, Message, MessageFuture, RecvEnd, RecvFuture, RecvStream, Receiver, SendEnd, SendFuture,
    Sender,
};
pub use choose::Choose;
pub use clock::{now, sleep, sleep_until, Sleep};
pub use config::{Builder, RuntimeConfig};
pub use error::{Error, SendError, TryRecvError, TrySendError};
pub use green::context::{in_runtime, spawn, yield_now};
pub use green::handle::RoutineHandle;
pub use green::routine::RoutineState;
pub use green::scheduler::{block_on, Runtime};
pub use pipeline::fan_in;
pub use select::{Received, Select, SelectFuture};
pub use timer::{after, every, Ticker, Timer};
