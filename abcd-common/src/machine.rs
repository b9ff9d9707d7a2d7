// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The state-machine loop that drives every module.
//!
//! A module defines a mutable status value, a set of [`State`] descriptors
//! and an initial state. [`run_machine`] repeatedly invokes the current
//! state's action and takes the returned state as the next one, sleeping
//! for the base period in between. Actions run to completion; the only
//! point where time passes without work is the inter-tick sleep.
//!
//! # State id convention
//!
//! - `1xx` initialization (context, sockets, configuration)
//! - `2xx` normal operation (and `3xx` for modules with a second phase)
//! - `8xx` shutdown (close sockets, destroy context, stop)
//! - `9xx` errors; every error state publishes an error event and routes
//!   to a recovery or shutdown state

use std::fmt;
use std::thread;
use std::time::Duration;

/// Default period between two state transitions.
pub const DEFAULT_BASE_PERIOD: Duration = Duration::from_millis(10);

/// A named state bound to an action.
///
/// Two states are equal iff their `id` fields match; the description is
/// diagnostic only.
pub struct State<S> {
    pub id: u32,
    pub description: &'static str,
    pub action: fn(&mut S) -> State<S>,
}

impl<S> Clone for State<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for State<S> {}

impl<S> PartialEq for State<S> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<S> Eq for State<S> {}

impl<S> fmt::Debug for State<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

/// Drive a status value through its state table until the terminal state
/// is returned.
///
/// The terminal state's own action is never invoked; its id is returned to
/// the caller so a binary can derive its exit code from it.
pub fn run_machine<S>(
    status: &mut S,
    initial: State<S>,
    stop_id: u32,
    base_period: Duration,
) -> u32 {
    let mut current = initial;

    loop {
        let next = (current.action)(status);

        if next.id != current.id {
            tracing::debug!(
                from = current.description,
                to = next.description,
                "state transition"
            );
        }

        if next.id == stop_id {
            return next.id;
        }

        current = next;
        thread::sleep(base_period);
    }
}
