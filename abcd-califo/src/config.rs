// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration tree of the calibrator.

use serde::{Deserialize, Serialize};

use abcd_histogram::HistogramConfig;

use crate::fit::PeakParameters;

/// Background estimation section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enable: bool,
    /// Starting half-width of the clipping window, in bins.
    pub iterations: u32,
    /// Smoothing window (3, 5, 7, 9, 11, 13 or 15); absent disables the
    /// smoothing of the side points.
    pub smooth: Option<u32>,
    /// Filter order: 2, 4, 6 or 8.
    pub order: u32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        BackgroundConfig {
            enable: false,
            iterations: 20,
            smooth: None,
            order: 2,
        }
    }
}

/// The reference peak of one channel: where it should sit and the fit
/// starting point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Target position; the scale factor steers the fitted peak here.
    pub position: f64,
    /// Largest accepted distance between two consecutive fitted
    /// positions.
    pub tolerance: f64,
    pub amplitude: f64,
    pub sigma: f64,
    pub background: f64,
    pub alpha: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        PeakConfig {
            position: 0.0,
            tolerance: 100.0,
            amplitude: 100.0,
            sigma: 10.0,
            background: 10.0,
            alpha: 0.001,
        }
    }
}

impl PeakConfig {
    /// Fit starting point with the peak at its target position.
    pub fn initial_parameters(&self) -> PeakParameters {
        PeakParameters {
            amplitude: self.amplitude,
            mu: self.position,
            sigma: self.sigma,
            background: self.background,
            alpha: self.alpha,
        }
    }
}

/// One calibrated channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalifoChannelConfig {
    pub id: u8,
    pub enable: bool,
    pub energy: HistogramConfig,
    pub peak: PeakConfig,
    pub background_estimate: BackgroundConfig,
}

impl Default for CalifoChannelConfig {
    fn default() -> Self {
        CalifoChannelConfig {
            id: 0,
            enable: true,
            energy: HistogramConfig {
                bins: 1024,
                min: 0.0,
                max: 65536.0,
            },
            peak: PeakConfig::default(),
            background_estimate: BackgroundConfig::default(),
        }
    }
}

/// Module configuration; unknown fields are ignored, missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalifoConfig {
    pub status_address: String,
    pub data_address: String,
    pub commands_address: String,
    pub abcd_data_address: String,
    /// Warm-up length and snapshot summing window, in seconds.
    pub accumulation_time_secs: u64,
    pub publish_period_secs: u64,
    /// When set, every fit publishes an event with the summed data, the
    /// background and the evaluated fit curve.
    pub publish_fit_events: bool,
    pub channels: Vec<CalifoChannelConfig>,
}

impl Default for CalifoConfig {
    fn default() -> Self {
        CalifoConfig {
            status_address: "tcp://127.0.0.1:16197".to_string(),
            data_address: "tcp://127.0.0.1:16198".to_string(),
            commands_address: "tcp://127.0.0.1:16199".to_string(),
            abcd_data_address: "tcp://127.0.0.1:16181".to_string(),
            accumulation_time_secs: 60,
            publish_period_secs: 3,
            publish_fit_events: false,
            channels: Vec::new(),
        }
    }
}

impl CalifoConfig {
    /// Snapshot retention: a tenth longer than the summing window, so a
    /// slightly late fit still finds its data.
    pub fn expiration_time_secs(&self) -> u64 {
        self.accumulation_time_secs + self.accumulation_time_secs / 10
    }
}
