// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Green routines on a single-threaded cooperative scheduler.
//!
//! Components:
//! - `routine`: routine header, lifecycle state machine, waker
//! - `queue`: FIFO ready queue with idle parking
//! - `scheduler`: routine table, run loop, `Runtime`
//! - `context`: thread-local current runtime, `spawn`, `yield_now`
//! - `handle`: `RoutineHandle` returned by spawn

pub mod context;
pub mod handle;
pub(crate) mod queue;
pub mod routine;
pub mod scheduler;
