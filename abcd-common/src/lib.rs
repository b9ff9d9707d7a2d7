// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared runtime for ABCD modules.
//!
//! Every ABCD process is a single-threaded loop over a table of named
//! states. This crate holds the pieces all of them share: the state type
//! and the loop driver ([`machine`]), the signal-driven termination flag
//! ([`shutdown`]), wall-clock formatting and strict parsing ([`time`]),
//! the assembly of status/event/error JSON messages ([`message`]) and the
//! topic names of the bus ([`topics`]).

pub mod machine;
pub mod message;
pub mod shutdown;
pub mod time;
pub mod topics;

pub use machine::{run_machine, State, DEFAULT_BASE_PERIOD};
pub use shutdown::{install_signal_handlers, should_terminate};

/// Default interval between two status publications.
pub const DEFAULT_PUBLISH_PERIOD: std::time::Duration = std::time::Duration::from_secs(3);
