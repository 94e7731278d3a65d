// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-threaded cooperative scheduler.
//!
//! Exactly one routine runs at a time. A routine runs until it suspends on a
//! channel, select, sleep or yield; the next runnable routine is then
//! resumed in FIFO order. When nothing is runnable the scheduler fires
//! expired timers, or parks the OS thread until the next deadline.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::context;
use super::handle::RoutineHandle;
use super::queue::ReadyQueue;
use super::routine::{routine_waker, Routine, RoutineHeader, RoutineKey, RoutineState};
use crate::clock::{now, TimerHeap, TimerKey};
use crate::config::{Builder, RuntimeConfig};
use crate::error::Error;
use crate::fiber::{Fiber, Substrate};

/// Ready-queue key of the root routine passed to `block_on`.
const MAIN_KEY: RoutineKey = usize::MAX;

/// Routine table: slots addressed by key, vacated slots reused.
struct RoutineTable {
    slots: Vec<Option<Routine>>,
    free: Vec<RoutineKey>,
    len: usize,
}

impl RoutineTable {
    fn with_capacity(n: usize) -> Self {
        Self {
            slots: Vec::with_capacity(n),
            free: Vec::new(),
            len: 0,
        }
    }

    fn vacant_key(&self) -> RoutineKey {
        self.free.last().copied().unwrap_or(self.slots.len())
    }

    fn insert(&mut self, routine: Routine) {
        let key = routine.header.key;
        if self.free.last() == Some(&key) {
            self.free.pop();
            self.slots[key] = Some(routine);
        } else {
            debug_assert_eq!(key, self.slots.len());
            self.slots.push(Some(routine));
        }
        self.len += 1;
    }

    fn get_mut(&mut self, key: RoutineKey) -> Option<&mut Routine> {
        self.slots.get_mut(key).and_then(Option::as_mut)
    }

    fn remove(&mut self, key: RoutineKey) -> Option<Routine> {
        let routine = self.slots.get_mut(key)?.take()?;
        self.free.push(key);
        self.len -= 1;
        Some(routine)
    }

    fn drain(&mut self) -> Vec<Routine> {
        self.free.clear();
        self.len = 0;
        self.slots.drain(..).flatten().collect()
    }
}

/// Scheduler state shared with the thread-local context.
pub(crate) struct Core {
    routines: RefCell<RoutineTable>,
    ready: Arc<ReadyQueue>,
    timers: RefCell<TimerHeap>,
    substrate: RefCell<Substrate>,
    rng: RefCell<SmallRng>,
    next_id: Cell<u64>,
}

impl Core {
    fn new(config: &RuntimeConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            routines: RefCell::new(RoutineTable::with_capacity(config.preallocate)),
            ready: Arc::new(ReadyQueue::new()),
            timers: RefCell::new(TimerHeap::new()),
            substrate: RefCell::new(Substrate::new(config.max_routines)),
            rng: RefCell::new(rng),
            next_id: Cell::new(1),
        }
    }

    pub(crate) fn spawn<F>(&self, entry: F) -> Result<RoutineHandle, Error>
    where
        F: Future<Output = ()> + 'static,
    {
        let fiber = self
            .substrate
            .borrow_mut()
            .allocate_context(entry)
            .inspect_err(|e| tracing::debug!("spawn refused: {}", e))?;

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let header = {
            let mut table = self.routines.borrow_mut();
            let header = RoutineHeader::new(id, table.vacant_key());
            let waker = routine_waker(header.clone(), self.ready.clone());
            table.insert(Routine {
                header: header.clone(),
                fiber: Some(fiber),
                waker,
            });
            header
        };

        header.transition(RoutineState::Created, RoutineState::Runnable);
        self.ready.push(header.key);
        tracing::trace!(routine = id, "spawned");
        Ok(RoutineHandle::new(header))
    }

    /// Resume one routine until it suspends or finishes.
    fn run_routine(&self, key: RoutineKey) {
        let (mut fiber, header, waker) = {
            let mut table = self.routines.borrow_mut();
            let Some(routine) = table.get_mut(key) else {
                return;
            };
            let Some(fiber) = routine.fiber.take() else {
                return;
            };
            (fiber, routine.header.clone(), routine.waker.clone())
        };

        header.set_state(RoutineState::Running);
        tracing::trace!(routine = header.id, "switch");
        let mut cx = Context::from_waker(&waker);

        match Substrate::switch_to(&mut fiber, &mut cx) {
            Poll::Ready(()) => {
                header.set_state(RoutineState::Done);
                self.routines.borrow_mut().remove(key);
                self.release(fiber);
                tracing::trace!(routine = header.id, "finished");
            }
            Poll::Pending => {
                if let Some(routine) = self.routines.borrow_mut().get_mut(key) {
                    routine.fiber = Some(fiber);
                }
                park_or_requeue(&header, &self.ready);
            }
        }
    }

    fn release(&self, fiber: Fiber) {
        self.substrate.borrow_mut().release_context(fiber);
    }

    /// Wake every routine whose deadline has passed. Returns true if any fired.
    fn fire_expired(&self) -> bool {
        let wakers = {
            let mut timers = self.timers.borrow_mut();
            if timers.is_empty() {
                return false;
            }
            timers.expire(now())
        };
        let fired = !wakers.is_empty();
        wakers.into_iter().for_each(Waker::wake);
        fired
    }

    /// Drop every routine still in the table. Their futures retract any
    /// channel registrations as they are dropped.
    fn abandon_all(&self) {
        let routines = self.routines.borrow_mut().drain();
        if !routines.is_empty() {
            tracing::debug!(count = routines.len(), "abandoning routines at exit");
        }
        for mut routine in routines {
            routine.header.set_state(RoutineState::Done);
            if let Some(fiber) = routine.fiber.take() {
                self.release(fiber);
            }
        }
        self.ready.clear();
        self.timers.borrow_mut().clear();
    }

    pub(crate) fn register_timer(&self, deadline: Instant, waker: Waker) -> TimerKey {
        self.timers.borrow_mut().register(deadline, waker)
    }

    pub(crate) fn update_timer(&self, key: TimerKey, waker: &Waker) {
        self.timers.borrow_mut().update(key, waker);
    }

    pub(crate) fn cancel_timer(&self, key: TimerKey) {
        self.timers.borrow_mut().cancel(key);
    }

    pub(crate) fn random_index(&self, n: usize) -> usize {
        self.rng.borrow_mut().gen_range(0..n)
    }
}

/// After a `Pending` resume: block the routine, unless it was woken while
/// running, in which case it goes to the back of the ready queue.
fn park_or_requeue(header: &RoutineHeader, ready: &ReadyQueue) {
    if !header.transition(RoutineState::Running, RoutineState::Blocked) {
        ready.push(header.key);
    }
}

/// A cooperative runtime: one OS thread, many routines.
pub struct Runtime {
    core: Rc<Core>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Runtime with default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn with_config(config: RuntimeConfig) -> Self {
        Self {
            core: Rc::new(Core::new(&config)),
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Queue a routine. It first runs inside the next `block_on`.
    pub fn spawn<F>(&self, entry: F) -> Result<RoutineHandle, Error>
    where
        F: Future<Output = ()> + 'static,
    {
        self.core.spawn(entry)
    }

    /// Spawned routines not yet finished.
    pub fn live_routines(&self) -> usize {
        self.core.substrate.borrow().live()
    }

    /// Run `main` as the root routine until it completes.
    ///
    /// Spawned routines run whenever `main` is suspended. Once `main`
    /// returns, runnable routines keep running until none is left (unless
    /// `drain_on_exit` is off); routines still blocked are then dropped.
    ///
    /// Fails with `NestedRuntime` when called from inside a routine.
    pub fn block_on<F: Future>(&self, main: F) -> Result<F::Output, Error> {
        let _guard = context::enter(self.core.clone())?;
        tracing::debug!(
            max_routines = ?self.config.max_routines,
            seed = ?self.config.seed,
            "runtime started"
        );

        let core = &*self.core;
        let mut main = pin!(main);
        let main_header = RoutineHeader::new(0, MAIN_KEY);
        let main_waker = routine_waker(main_header.clone(), core.ready.clone());
        main_header.set_state(RoutineState::Runnable);
        core.ready.push(MAIN_KEY);

        let output = loop {
            core.fire_expired();

            if let Some(key) = core.ready.pop() {
                if key != MAIN_KEY {
                    core.run_routine(key);
                    continue;
                }
                main_header.set_state(RoutineState::Running);
                let mut cx = Context::from_waker(&main_waker);
                if let Poll::Ready(out) = main.as_mut().poll(&mut cx) {
                    main_header.set_state(RoutineState::Done);
                    break out;
                }
                park_or_requeue(&main_header, &core.ready);
                continue;
            }

            if core.fire_expired() {
                continue;
            }
            let next = core.timers.borrow_mut().next_deadline();
            core.ready.park(next);
        };

        if self.config.drain_on_exit {
            loop {
                core.fire_expired();
                match core.ready.pop() {
                    Some(MAIN_KEY) => {}
                    Some(key) => core.run_routine(key),
                    None => break,
                }
            }
        }
        core.abandon_all();

        tracing::debug!("runtime stopped");
        Ok(output)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `main` on a fresh default runtime.
pub fn block_on<F: Future>(main: F) -> Result<F::Output, Error> {
    Runtime::new().block_on(main)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::green::context::{spawn, yield_now};
    use std::cell::RefCell;

    #[test]
    fn block_on_returns_output() {
        assert_eq!(block_on(async { 7 }).unwrap(), 7);
    }

    #[test]
    fn spawned_routines_run_when_main_suspends() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        block_on(async move {
            let l2 = l.clone();
            spawn(async move { l2.borrow_mut().push("child") }).unwrap();
            l.borrow_mut().push("main-before");
            yield_now().await;
            l.borrow_mut().push("main-after");
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec!["main-before", "child", "main-after"]);
    }

    #[test]
    fn yield_gives_every_runnable_routine_a_turn() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        block_on(async move {
            for i in 0..3 {
                let l = l.clone();
                spawn(async move {
                    l.borrow_mut().push(i);
                    yield_now().await;
                    l.borrow_mut().push(10 + i);
                })
                .unwrap();
            }
            yield_now().await;
            l.borrow_mut().push(99);
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 99, 10, 11, 12]);
    }

    #[test]
    fn nested_block_on_is_rejected() {
        let inner = block_on(async { block_on(async { 1 }) }).unwrap();
        assert_eq!(inner, Err(Error::NestedRuntime));
    }

    #[test]
    fn routine_limit_is_enforced() {
        let rt = Runtime::builder().max_routines(2).build().unwrap();
        let res = rt
            .block_on(async {
                spawn(std::future::pending()).unwrap();
                spawn(std::future::pending()).unwrap();
                spawn(async {})
            })
            .unwrap();
        assert_eq!(res.unwrap_err(), Error::ResourceExhausted { limit: 2 });
        assert_eq!(rt.live_routines(), 0);
    }

    #[test]
    fn finished_routine_frees_its_slot() {
        let rt = Runtime::builder().max_routines(1).build().unwrap();
        rt.block_on(async {
            let h = spawn(async {}).unwrap();
            yield_now().await;
            assert!(h.is_done());
            spawn(async {}).unwrap();
        })
        .unwrap();
    }

    #[test]
    fn drain_off_drops_runnable_routines() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let rt = Runtime::builder().drain_on_exit(false).build().unwrap();
        rt.block_on(async move {
            spawn(async move { r.set(true) }).unwrap();
        })
        .unwrap();
        assert!(!ran.get());
    }

    #[test]
    fn drain_on_runs_leftovers() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        block_on(async move {
            spawn(async move { r.set(true) }).unwrap();
        })
        .unwrap();
        assert!(ran.get());
    }

    #[test]
    fn runtime_spawn_before_block_on() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let rt = Runtime::new();
        let h = rt.spawn(async move { r.set(true) }).unwrap();
        assert_eq!(h.state(), RoutineState::Runnable);
        rt.block_on(async {}).unwrap();
        assert!(ran.get());
        assert!(h.is_done());
    }
}
