// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration tree of the spectrum builder.

use serde::{Deserialize, Serialize};

use abcd_histogram::{Histogram2DConfig, HistogramConfig};

/// Exponential time decay of the spectra.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeDecayConfig {
    pub enable: bool,
    /// Time constant, in seconds.
    pub tau: f64,
    /// Bins whose counts fall below this floor after a decay step are
    /// snapped to zero.
    pub counts_minimum: f64,
}

impl Default for TimeDecayConfig {
    fn default() -> Self {
        TimeDecayConfig {
            enable: false,
            tau: 600.0,
            counts_minimum: 0.1,
        }
    }
}

/// Module configuration; unknown fields are ignored, missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecConfig {
    pub status_address: String,
    pub data_address: String,
    pub commands_address: String,
    pub abcd_data_address: String,
    /// Shape of the per-channel `qlong` spectra.
    pub energy: HistogramConfig,
    /// Shape of the per-channel `(qlong, psd)` spectra.
    pub psd: Histogram2DConfig,
    pub time_decay: TimeDecayConfig,
    pub publish_period_secs: u64,
}

impl Default for SpecConfig {
    fn default() -> Self {
        SpecConfig {
            status_address: "tcp://127.0.0.1:16187".to_string(),
            data_address: "tcp://127.0.0.1:16188".to_string(),
            commands_address: "tcp://127.0.0.1:16189".to_string(),
            abcd_data_address: "tcp://127.0.0.1:16181".to_string(),
            energy: HistogramConfig {
                bins: 4096,
                min: 0.0,
                max: 65536.0,
            },
            psd: Histogram2DConfig {
                bins_x: 512,
                min_x: 0.0,
                max_x: 65536.0,
                bins_y: 512,
                min_y: 0.0,
                max_y: 1.0,
            },
            time_decay: TimeDecayConfig::default(),
            publish_period_secs: 3,
        }
    }
}
