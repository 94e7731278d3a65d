// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Property tests for channel buffering.

use std::collections::VecDeque;

use braid_rt::{block_on, spawn, yield_now, Channel, TrySendError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Send(u32),
    Recv,
    Close,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u32>().prop_map(Op::Send),
        3 => Just(Op::Recv),
        1 => Just(Op::Close),
    ]
}

proptest! {
    #[test]
    fn buffer_never_exceeds_capacity(cap in 0usize..6, ops in prop::collection::vec(arb_op(), 0..64)) {
        let ch = Channel::buffered(cap);
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut closed = false;

        for op in ops {
            match op {
                Op::Send(v) => match ch.try_send(v) {
                    Ok(()) => model.push_back(v),
                    Err(TrySendError::Full(_)) => prop_assert_eq!(model.len(), cap),
                    Err(TrySendError::Closed(_)) => prop_assert!(closed),
                },
                Op::Recv => match ch.try_recv() {
                    Ok(Some(v)) => prop_assert_eq!(Some(v), model.pop_front()),
                    Ok(None) => prop_assert!(closed && model.is_empty()),
                    Err(_) => prop_assert!(!closed && model.is_empty()),
                },
                Op::Close => {
                    prop_assert_eq!(ch.close().is_ok(), !closed);
                    closed = true;
                }
            }
            prop_assert!(ch.len() <= cap);
            prop_assert_eq!(ch.len(), model.len());
        }
    }

    #[test]
    fn blocked_senders_deliver_in_order(cap in 0usize..4, values in prop::collection::vec(any::<u16>(), 1..24)) {
        let expected = values.clone();
        let got = block_on(async move {
            let ch = Channel::buffered(cap);
            let tx = ch.duplicate();
            spawn(async move {
                for v in values {
                    tx.send(v).await.unwrap();
                }
                tx.close().unwrap();
            })
            .unwrap();

            let mut got = Vec::new();
            yield_now().await;
            while let Some(v) = ch.recv().await {
                assert!(ch.len() <= cap);
                got.push(v);
            }
            got
        })
        .unwrap();
        prop_assert_eq!(got, expected);
    }
}
