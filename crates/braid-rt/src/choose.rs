// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Closure-based select.
//!
//! Each arm carries the body to run if it wins; only the winner's body
//! runs and its result is returned.
//!
//! ```ignore
//! let out = Choose::new()
//!     .recv(&numbers, |n| format!("got {n:?}"))
//!     .send(&quit, (), || "quit sent".to_string())
//!     .timeout(now() + Duration::from_secs(1), || "timed out".to_string())
//!     .run()
//!     .await?;
//! ```

use std::time::Instant;

use crate::channel::{RecvEnd, SendEnd};
use crate::error::Error;
use crate::select::Select;

const OTHERWISE: usize = usize::MAX;
const TIMEOUT: usize = usize::MAX - 1;

type Arm<'a, R> = Box<dyn FnOnce() -> R + 'a>;

pub struct Choose<'a, R> {
    select: Select<'a>,
    arms: Vec<Arm<'a, R>>,
    otherwise: Option<Arm<'a, R>>,
    timeout: Option<Arm<'a, R>>,
}

impl<'a, R: 'a> Choose<'a, R> {
    pub fn new() -> Self {
        Self {
            select: Select::new(),
            arms: Vec::new(),
            otherwise: None,
            timeout: None,
        }
    }

    /// Receive arm. `body` gets the value, the closing value, or `None` if
    /// the channel closed without one.
    pub fn recv<T: 'a>(
        mut self,
        ch: &impl RecvEnd<T>,
        body: impl FnOnce(Option<T>) -> R + 'a,
    ) -> Self {
        let received = self.select.recv(ch, self.arms.len());
        self.arms.push(Box::new(move || body(received.take())));
        self
    }

    /// Send arm offering `value`.
    pub fn send<T: 'a>(
        mut self,
        ch: &impl SendEnd<T>,
        value: T,
        body: impl FnOnce() -> R + 'a,
    ) -> Self {
        self.select.send(ch, value, self.arms.len());
        self.arms.push(Box::new(body));
        self
    }

    pub fn otherwise(mut self, body: impl FnOnce() -> R + 'a) -> Self {
        self.select.otherwise(OTHERWISE);
        self.otherwise = Some(Box::new(body));
        self
    }

    pub fn timeout(mut self, deadline: Instant, body: impl FnOnce() -> R + 'a) -> Self {
        self.select.timeout(deadline, TIMEOUT);
        self.timeout = Some(Box::new(body));
        self
    }

    /// Wait for one arm and run its body.
    pub async fn run(self) -> Result<R, Error> {
        let Self {
            select,
            arms,
            otherwise,
            timeout,
        } = self;
        let winner = select.wait().await?;
        let body = match winner {
            OTHERWISE => otherwise,
            TIMEOUT => timeout,
            i => arms.into_iter().nth(i),
        };
        // The select only returns indices registered above.
        Ok(body.map(|f| f()).unwrap_or_else(|| unreachable!("unknown arm {winner}")))
    }
}

impl<'a, R: 'a> Default for Choose<'a, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::clock::now;
    use crate::green::scheduler::block_on;
    use std::time::Duration;

    #[test]
    fn runs_only_the_winning_body() {
        block_on(async {
            let a = Channel::buffered(1);
            let b = Channel::<i32>::buffered(1);
            a.try_send(2).unwrap();
            let out = Choose::new()
                .recv(&a, |v| v.map(|n| n * 10))
                .recv(&b, |_| panic!("b is empty"))
                .run()
                .await
                .unwrap();
            assert_eq!(out, Some(20));
        })
        .unwrap();
    }

    #[test]
    fn otherwise_body_runs() {
        block_on(async {
            let a = Channel::<u8>::unbuffered();
            let out = Choose::new()
                .recv(&a, |_| "recv")
                .otherwise(|| "idle")
                .run()
                .await;
            assert_eq!(out, Ok("idle"));
        })
        .unwrap();
    }

    #[test]
    fn timeout_body_runs() {
        block_on(async {
            let a = Channel::<u8>::unbuffered();
            let out = Choose::new()
                .recv(&a, |_| 0)
                .timeout(now() + Duration::from_millis(5), || 1)
                .run()
                .await;
            assert_eq!(out, Ok(1));
        })
        .unwrap();
    }

    #[test]
    fn send_to_closed_channel_is_an_error() {
        block_on(async {
            let a = Channel::<u8>::buffered(1);
            a.close().unwrap();
            let out = Choose::new().send(&a, 1, || ()).run().await;
            assert_eq!(out, Err(Error::ChannelClosed));
        })
        .unwrap();
    }
}
