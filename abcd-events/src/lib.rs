// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire-level data model of the ABCD bus.
//!
//! Two kinds of payloads flow through every module: point-like PSD events
//! (fixed 16 bytes, little-endian, no padding) and variable-length
//! waveforms (a 14-byte header followed by sample arrays). Receivers
//! slice event payloads by `size / 16`, so the fixed size is a
//! load-bearing invariant.

pub mod psd;
pub mod waveform;

pub use psd::{decode_psd_events, encode_psd_events, PsdEvent, PSD_EVENT_SIZE};
pub use waveform::{decode_waveforms, encode_waveforms, Waveform, WAVEFORM_HEADER_SIZE};
