// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Waveform-to-JSON bridge (wadi).
//!
//! Subscribes to the waveform stream and republishes, per message, one
//! waveform per channel as JSON arrays, the form the displays consume.

pub mod bridge;
pub mod config;
pub mod module;

pub use bridge::select_waveforms;
pub use config::WadiConfig;
