// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spectrum builder.
//!
//! Subscribes to the PSD event stream and accumulates, per channel, a 1D
//! `qlong` spectrum and a 2D `(qlong, psd)` spectrum. Channels register
//! lazily: the first observed event on a channel creates its spectra.
//! After every periodic publication the spectra optionally shrink by
//! `exp(-Δpub / τ)`, turning them into a running exponential moving
//! average in units of counts.

pub mod config;
pub mod module;
pub mod spectra;

pub use config::{SpecConfig, TimeDecayConfig};
pub use spectra::{ChannelSpectra, Spectra};
