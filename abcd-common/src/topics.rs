// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Topic prefixes of the message bus.
//!
//! Data topics get a `_v0_s<N>` suffix, status and event topics a `_s<N>`
//! suffix; both are appended by the transport layer at send time.

pub const DATA_ABCD_EVENTS: &str = "data_abcd_events";
pub const DATA_ABCD_WAVEFORMS: &str = "data_abcd_waveforms";
pub const STATUS_ABCD: &str = "status_abcd";
pub const EVENTS_ABCD: &str = "events_abcd";

pub const STATUS_SPEC: &str = "status_spec";
pub const DATA_SPEC_HISTOGRAMS: &str = "data_spec_histograms";
pub const EVENTS_SPEC: &str = "events_spec";

pub const STATUS_TOFCALC: &str = "status_tofcalc";
pub const DATA_TOFCALC_HISTOGRAMS: &str = "data_tofcalc_histograms";
pub const EVENTS_TOFCALC: &str = "events_tofcalc";

pub const STATUS_LMNO: &str = "status_lmno";
pub const EVENTS_LMNO: &str = "events_lmno";

pub const STATUS_FIFO: &str = "status_fifo";
pub const EVENTS_FIFO: &str = "events_fifo";

pub const STATUS_CALIFO: &str = "status_califo";
pub const EVENTS_CALIFO: &str = "events_califo";

pub const DATA_WADI_WAVEFORMS: &str = "data_wadi_waveforms";
