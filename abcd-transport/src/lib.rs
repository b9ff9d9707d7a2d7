// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Message-bus framing for ABCD modules.
//!
//! Every message on the bus is a single frame shaped `<topic> <payload>`:
//! a topic string, one ASCII space, then opaque bytes. Topics end with a
//! byte-size suffix (`_s<N>`, data topics also carry a `_v0` version
//! token) so subscribers can pre-allocate. This layout is part of the
//! external contract and is preserved bit-for-bit.
//!
//! Receives never block: an empty queue yields `Ok(None)` (or a JSON
//! null), which is normal operation and not an error.

pub mod error;
pub mod framing;
pub mod socket;
pub mod topic;

pub use error::TransportError;
pub use framing::{receive_framed, receive_json, send_framed, send_json, Frame};
pub use topic::{data_topic, payload_size_of, sized_topic, versioned_topic};
