// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime error types.
//!
//! Every variant is a contract violation by the caller, never a transient
//! condition. Nothing here is retried internally.

use thiserror::Error;

/// Errors surfaced by the runtime, channels and select sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The substrate refused to allocate another routine context.
    #[error("routine limit of {limit} reached")]
    ResourceExhausted { limit: usize },

    /// Send attempted on a closed channel.
    #[error("send on closed channel")]
    ChannelClosed,

    /// `close` called on a channel that was already closed.
    #[error("channel closed twice")]
    DoubleClose,

    /// Last handle of a channel released while routines still wait on it.
    #[error("channel released with {senders} blocked sender(s) and {receivers} blocked receiver(s)")]
    PendingWaiters { senders: usize, receivers: usize },

    /// A free function needing the scheduler was called outside `block_on`.
    #[error("called outside of a running runtime")]
    NoRuntime,

    /// `block_on` called from inside a routine.
    #[error("runtime is already running on this thread")]
    NestedRuntime,

    /// Configuration could not be read or parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

/// Returned by `send` when the channel is closed. Carries the value back.
#[derive(PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    /// Recover the value that could not be sent.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> std::fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "send on closed channel")
    }
}

impl<T> std::error::Error for SendError<T> {}

impl<T> From<SendError<T>> for Error {
    fn from(_: SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

/// Non-blocking send failure.
#[derive(Debug, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// Buffer full and no receiver waiting.
    Full(T),
    /// Channel closed.
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) | TrySendError::Closed(v) => v,
        }
    }
}

/// Non-blocking receive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing buffered, no sender waiting, channel open.
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_converts_to_channel_closed() {
        let err: Error = SendError(5).into();
        assert_eq!(err, Error::ChannelClosed);
    }

    #[test]
    fn pending_waiters_message_names_both_queues() {
        let msg = Error::PendingWaiters {
            senders: 2,
            receivers: 1,
        }
        .to_string();
        assert!(msg.contains("2 blocked sender"));
        assert!(msg.contains("1 blocked receiver"));
    }

    #[test]
    fn try_send_error_returns_value() {
        assert_eq!(TrySendError::Full(3).into_inner(), 3);
        assert_eq!(TrySendError::Closed("x").into_inner(), "x");
    }
}
