// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration tree of the time-of-flight builder.

use serde::{Deserialize, Serialize};

use abcd_histogram::{Histogram2DConfig, HistogramConfig};

/// Per-channel section: the ToF window in nanoseconds and the histogram
/// shapes of the four spectra.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TofChannelConfig {
    pub id: u8,
    pub enable: bool,
    /// ToF spectrum shape; its range is the channel's ToF window.
    pub tof: HistogramConfig,
    /// Energy spectrum shape over `qlong`.
    pub energy: HistogramConfig,
}

impl Default for TofChannelConfig {
    fn default() -> Self {
        TofChannelConfig {
            id: 0,
            enable: true,
            tof: HistogramConfig {
                bins: 2000,
                min: -100.0,
                max: 100.0,
            },
            energy: HistogramConfig {
                bins: 2048,
                min: 0.0,
                max: 65536.0,
            },
        }
    }
}

impl TofChannelConfig {
    /// Shape of the `EvsToF` bidimensional spectrum: ToF on x, energy on y.
    pub fn energy_vs_tof(&self) -> Histogram2DConfig {
        Histogram2DConfig {
            bins_x: self.tof.bins.min(512),
            min_x: self.tof.min,
            max_x: self.tof.max,
            bins_y: self.energy.bins.min(512),
            min_y: self.energy.min,
            max_y: self.energy.max,
        }
    }

    /// Shape of the `EvsE` bidimensional spectrum: reference energy on x,
    /// channel energy on y.
    pub fn energy_vs_energy(&self) -> Histogram2DConfig {
        Histogram2DConfig {
            bins_x: self.energy.bins.min(512),
            min_x: self.energy.min,
            max_x: self.energy.max,
            bins_y: self.energy.bins.min(512),
            min_y: self.energy.min,
            max_y: self.energy.max,
        }
    }
}

/// Module configuration; unknown fields are ignored, missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TofCalcConfig {
    pub status_address: String,
    pub data_address: String,
    pub commands_address: String,
    pub abcd_data_address: String,
    /// Conversion factor between digitizer sample units and nanoseconds.
    pub ns_per_sample: f64,
    pub reference_channels: Vec<u8>,
    pub channels: Vec<TofChannelConfig>,
    pub publish_period_secs: u64,
}

impl Default for TofCalcConfig {
    fn default() -> Self {
        TofCalcConfig {
            status_address: "tcp://127.0.0.1:16205".to_string(),
            data_address: "tcp://127.0.0.1:16206".to_string(),
            commands_address: "tcp://127.0.0.1:16207".to_string(),
            abcd_data_address: "tcp://127.0.0.1:16181".to_string(),
            ns_per_sample: 2.0,
            reference_channels: Vec::new(),
            channels: Vec::new(),
            publish_period_secs: 3,
        }
    }
}
