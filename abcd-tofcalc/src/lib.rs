// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time-of-flight builder.
//!
//! The core of the module is the [`matcher::CoincidenceMatcher`]: given a
//! batch of PSD events, a set of reference channels and per-active-channel
//! ToF windows, it populates four histograms per active channel:
//! `ToF(Δt)`, `E(qlong)`, `EvsToF(Δt, qlong)` and
//! `EvsE(qlong_ref, qlong)`. The [`module`] wires the matcher to the bus.

pub mod config;
pub mod matcher;
pub mod module;

pub use config::{TofCalcConfig, TofChannelConfig};
pub use matcher::{CoincidenceMatcher, TofChannel};
