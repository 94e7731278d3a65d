// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Channel combinators.

use std::cell::Cell;
use std::rc::Rc;

use crate::channel::{Channel, Message};
use crate::error::Error;
use crate::green::context::spawn;

/// Merge `inputs` into one unbuffered channel.
///
/// One forwarding routine per input moves every value across in that
/// input's order; there is no ordering between inputs. The output closes
/// (without a closing value) once every input is closed and drained.
/// Closing values of the inputs are not forwarded.
pub fn fan_in<T: 'static>(inputs: Vec<Channel<T>>) -> Result<Channel<T>, Error> {
    let output = Channel::unbuffered();
    if inputs.is_empty() {
        output.close()?;
        return Ok(output);
    }

    let remaining = Rc::new(Cell::new(inputs.len()));
    for input in inputs {
        let (out, remaining) = (output.duplicate(), remaining.clone());
        let spawned = spawn(async move {
            while let Message::Value(v) = input.recv_message().await {
                if out.send(v).await.is_err() {
                    break;
                }
            }
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                let _ = out.close();
            }
        });
        if let Err(e) = spawned {
            // Forwarders already running stop on their next send.
            let _ = output.close();
            return Err(e);
        }
    }
    Ok(output)
}
