// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream recorder (module name on the bus: `lmno`).
//!
//! Subscribes to the data stream and to the producer and analyzer status
//! streams, and writes up to three parallel files per run: an events file
//! (raw concatenation of PSD event payloads), a waveforms file (raw
//! concatenation of waveform payloads) and a raw file (every received
//! frame verbatim). Each file is independently enabled by the `start`
//! command; byte counters are accurate to the byte.

pub mod config;
pub mod module;
pub mod recorder;

pub use config::DasaConfig;
pub use recorder::{RecordingEnable, RecordingFiles};
