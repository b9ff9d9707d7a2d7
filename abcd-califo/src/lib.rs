// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Online calibration (califo).
//!
//! Maintains, per channel, an energy histogram fed from the event stream
//! and a FIFO of recent per-batch histogram snapshots. After a warm-up
//! accumulation phase it periodically sums the snapshots over the
//! accumulation window, optionally subtracts a peak-clipping background
//! estimate and fits a Gaussian-plus-exponential model. When the fitted
//! peak stays within tolerance of the last accepted one, the channel's
//! `scale_factor = μ_target / μ_fit` is updated. Every PSD event is
//! republished with its charges multiplied by the current scale factor
//! (plus a uniform [0,1) smear against integer banding).

pub mod background;
pub mod calibration;
pub mod config;
pub mod fit;
pub mod module;

pub use background::estimate_background;
pub use calibration::CalibratedChannel;
pub use config::{BackgroundConfig, CalifoChannelConfig, CalifoConfig, PeakConfig};
pub use fit::{fit_peak, peak_model, FitResult, FitStatus, PeakParameters};
