// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared digitizer session skeleton.
//!
//! Every digitizer-facing process is a thin configuration layer over this
//! crate: the vendor SDK is contracted behind the [`device::Digitizer`]
//! trait (open, configure, start, stop, poll, fetch, close) and the
//! session drives it through one state graph: initialization, a
//! publish-status/receive-commands idle loop, an acquisition inner loop
//! that buffers waveforms and publishes them in batches, and a restart
//! sub-graph that destroys and recreates the device after an acquisition
//! error without losing the transport context.

pub mod config;
pub mod device;
pub mod session;

pub use config::{ChannelConfig, SessionConfig};
pub use device::{Capture, Digitizer, DigitizerError};
pub use session::{SessionStatus, DigitizerFactory};
