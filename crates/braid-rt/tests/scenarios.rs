// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! End-to-end channel and select scenarios.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use braid_rt::{
    block_on, now, sleep, spawn, yield_now, Channel, Error, RoutineState, Runtime, Select,
    TrySendError,
};

#[test]
fn unbuffered_rendezvous_delivers_42() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let l = log.clone();
    let got = block_on(async move {
        let ch = Channel::unbuffered();
        let tx = ch.duplicate();
        let la = l.clone();
        let a = spawn(async move {
            la.borrow_mut().push("a: send");
            tx.send(42).await.unwrap();
            la.borrow_mut().push("a: sent");
        })
        .unwrap();

        yield_now().await;
        // A cannot finish before someone takes the value.
        assert_eq!(a.state(), RoutineState::Blocked);
        l.borrow_mut().push("b: recv");
        let v = ch.recv().await;
        yield_now().await;
        assert!(a.is_done());
        v
    })
    .unwrap();

    assert_eq!(got, Some(42));
    assert_eq!(*log.borrow(), vec!["a: send", "b: recv", "a: sent"]);
}

#[test]
fn capacity_two_third_send_blocks_until_receive() {
    block_on(async {
        let ch = Channel::buffered(2);
        ch.send(1).await.unwrap();
        ch.send(2).await.unwrap();
        assert_eq!(ch.len(), 2);

        let tx = ch.duplicate();
        let third = spawn(async move {
            tx.send(3).await.unwrap();
        })
        .unwrap();
        yield_now().await;
        assert!(!third.is_done());
        assert_eq!(ch.len(), 2);

        assert_eq!(ch.recv().await, Some(1));
        // The blocked sender moved into the freed slot.
        assert_eq!(ch.len(), 2);
        yield_now().await;
        assert!(third.is_done());

        assert_eq!(ch.try_recv(), Ok(Some(2)));
        assert_eq!(ch.try_recv(), Ok(Some(3)));
    })
    .unwrap();
}

#[test]
fn blocked_receivers_are_served_in_order() {
    block_on(async {
        let ch = Channel::unbuffered();
        let got = Rc::new(RefCell::new(Vec::new()));
        for name in ["r1", "r2"] {
            let rx = ch.duplicate();
            let got = got.clone();
            spawn(async move {
                let v = rx.recv().await.unwrap();
                got.borrow_mut().push((name, v));
            })
            .unwrap();
            // r1 blocks strictly before r2.
            yield_now().await;
        }

        ch.send("first").await.unwrap();
        ch.send("second").await.unwrap();
        yield_now().await;
        assert_eq!(*got.borrow(), vec![("r1", "first"), ("r2", "second")]);
    })
    .unwrap();
}

#[test]
fn closed_channel_drains_then_repeats_closing_value() {
    block_on(async {
        let ch = Channel::buffered(3);
        ch.send(1).await.unwrap();
        ch.send(2).await.unwrap();
        ch.close_with(0).unwrap();

        assert_eq!(ch.send(9).await.unwrap_err().into_inner(), 9);
        assert_eq!(ch.recv().await, Some(1));
        assert_eq!(ch.recv().await, Some(2));
        for _ in 0..5 {
            assert_eq!(ch.recv().await, Some(0));
        }
        assert_eq!(ch.close(), Err(Error::DoubleClose));
    })
    .unwrap();
}

#[test]
fn select_with_several_ready_clauses_completes_exactly_one() {
    block_on(async {
        let a = Channel::buffered(1);
        let b = Channel::buffered(1);
        let c = Channel::<u8>::buffered(1);
        a.try_send('a').unwrap();
        b.try_send('b').unwrap();

        let mut sel = Select::new();
        let from_a = sel.recv(&a, 0);
        let from_b = sel.recv(&b, 1);
        sel.send(&c, 7, 2);
        let winner = sel.wait().await.unwrap();

        match winner {
            0 => {
                assert_eq!(from_a.take(), Some('a'));
                assert_eq!((b.len(), c.len()), (1, 0));
            }
            1 => {
                assert_eq!(from_b.take(), Some('b'));
                assert_eq!((a.len(), c.len()), (1, 0));
            }
            2 => {
                assert_eq!((a.len(), b.len(), c.len()), (1, 1, 1));
            }
            other => panic!("unexpected clause {other}"),
        }
        assert_eq!(from_a.take().is_some() as u8 + from_b.take().is_some() as u8, 0);
    })
    .unwrap();
}

#[test]
fn select_is_fair_between_ready_clauses() {
    block_on(async {
        let a = Channel::buffered(1);
        let b = Channel::buffered(1);
        let mut hits = [0u32; 2];
        for _ in 0..1000 {
            let _ = a.try_send(());
            let _ = b.try_send(());
            let mut sel = Select::new();
            sel.recv(&a, 0);
            sel.recv(&b, 1);
            hits[sel.wait().await.unwrap()] += 1;
        }
        assert!(hits[0] > 0 && hits[1] > 0, "starved: {hits:?}");
    })
    .unwrap();
}

#[test]
fn select_otherwise_does_not_block() {
    block_on(async {
        let ch = Channel::<i32>::unbuffered();
        let mut sel = Select::new();
        sel.recv(&ch, 0);
        sel.otherwise(1);
        let start = now();
        assert_eq!(sel.wait().await, Ok(1));
        assert!(now() - start < Duration::from_millis(5));
        // Nothing left registered.
        assert_eq!(ch.try_send(1), Err(TrySendError::Full(1)));
    })
    .unwrap();
}

#[test]
fn select_times_out_after_ten_millis() {
    block_on(async {
        let ch = Channel::<i32>::unbuffered();
        let start = now();
        let mut sel = Select::new();
        sel.recv(&ch, 0);
        sel.timeout(start + Duration::from_millis(10), 1);
        assert_eq!(sel.wait().await, Ok(1));
        let waited = now() - start;
        assert!(waited >= Duration::from_millis(10));
        assert!(waited < Duration::from_secs(1));
    })
    .unwrap();
}

#[test]
fn other_routines_run_while_one_sleeps() {
    block_on(async {
        let ch = Channel::buffered(4);
        let tx = ch.duplicate();
        spawn(async move {
            for i in 0..3 {
                tx.send(i).await.unwrap();
            }
        })
        .unwrap();
        let start = now();
        sleep(Duration::from_millis(5)).await;
        assert!(now() - start >= Duration::from_millis(5));
        assert_eq!(ch.len(), 3);
    })
    .unwrap();
}

#[test]
fn spawn_limit_reports_resource_exhausted() {
    let rt = Runtime::builder().max_routines(3).build().unwrap();
    let results = rt
        .block_on(async {
            let gate = Channel::<()>::unbuffered();
            (0..4)
                .map(|_| {
                    let g = gate.duplicate();
                    spawn(async move {
                        g.recv().await;
                    })
                    .map(|_| ())
                })
                .collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(
        results,
        vec![
            Ok(()),
            Ok(()),
            Ok(()),
            Err(Error::ResourceExhausted { limit: 3 })
        ]
    );
}

#[test]
fn nested_block_on_is_an_error() {
    let rt = Runtime::new();
    let inner = rt.block_on(async { Runtime::new().block_on(async { 1 }) });
    assert_eq!(inner, Ok(Err(Error::NestedRuntime)));
}

#[test]
fn releasing_last_handle_with_blocked_sender_is_reported() {
    block_on(async {
        let ch = Channel::unbuffered();
        let pending = ch.send(1u8);
        spawn(async move {
            let _ = pending.await;
        })
        .unwrap();
        yield_now().await;
        assert_eq!(
            ch.release(),
            Err(Error::PendingWaiters {
                senders: 1,
                receivers: 0
            })
        );
    })
    .unwrap();
}
