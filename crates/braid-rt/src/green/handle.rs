// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Handle returned by `spawn`.

use std::fmt;
use std::sync::Arc;

use super::routine::{RoutineHeader, RoutineState};

/// Observes one spawned routine. Dropping it does not affect the routine.
///
/// There is no join or cancel: routines hand results back over channels.
#[derive(Clone)]
pub struct RoutineHandle {
    header: Arc<RoutineHeader>,
}

impl RoutineHandle {
    pub(crate) fn new(header: Arc<RoutineHeader>) -> Self {
        Self { header }
    }

    /// Process-unique routine id.
    pub fn id(&self) -> u64 {
        self.header.id
    }

    pub fn state(&self) -> RoutineState {
        self.header.state()
    }

    pub fn is_done(&self) -> bool {
        self.state() == RoutineState::Done
    }
}

impl fmt::Debug for RoutineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutineHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
