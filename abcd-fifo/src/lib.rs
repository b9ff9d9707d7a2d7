// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! FIFO query responder.
//!
//! Retains the recent event payloads in a timestamped FIFO and answers
//! `get_data{from, to}` requests over a request/reply socket with the
//! matching payloads, base64-encoded. Time strings are RFC 3339 with an
//! explicit offset (or `Z`); anything ambiguous is rejected with an error
//! reply.

pub mod config;
pub mod module;
pub mod responder;

pub use config::FifoConfig;
pub use responder::handle_request;
