// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Two-dimensional histogram with row-major storage.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::HistogramError;

/// Shape of a 2D histogram, one `{bins, min, max}` triple per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Histogram2DConfig {
    pub bins_x: u32,
    pub min_x: f64,
    pub max_x: f64,
    pub bins_y: u32,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for Histogram2DConfig {
    fn default() -> Self {
        Histogram2DConfig {
            bins_x: 1024,
            min_x: 0.0,
            max_x: 1024.0,
            bins_y: 1024,
            min_y: 0.0,
            max_y: 1024.0,
        }
    }
}

/// A 2D histogram; the counts array is row-major,
/// `counts[i_x + bins_x * i_y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    config: Histogram2DConfig,
    bin_width_x: f64,
    bin_width_y: f64,
    counts: Vec<f64>,
}

impl Histogram2D {
    pub fn from_config(config: &Histogram2DConfig) -> Result<Self, HistogramError> {
        if config.bins_x == 0 || config.bins_y == 0 {
            return Err(HistogramError::NoBins);
        }
        if !(config.max_x > config.min_x) {
            return Err(HistogramError::InvalidRange {
                min: config.min_x,
                max: config.max_x,
            });
        }
        if !(config.max_y > config.min_y) {
            return Err(HistogramError::InvalidRange {
                min: config.min_y,
                max: config.max_y,
            });
        }
        Ok(Histogram2D {
            config: *config,
            bin_width_x: (config.max_x - config.min_x) / config.bins_x as f64,
            bin_width_y: (config.max_y - config.min_y) / config.bins_y as f64,
            counts: vec![0.0; config.bins_x as usize * config.bins_y as usize],
        })
    }

    pub fn config(&self) -> Histogram2DConfig {
        self.config
    }

    pub fn min_x(&self) -> f64 {
        self.config.min_x
    }

    pub fn max_x(&self) -> f64 {
        self.config.max_x
    }

    pub fn min_y(&self) -> f64 {
        self.config.min_y
    }

    pub fn max_y(&self) -> f64 {
        self.config.max_y
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Zero every bin.
    pub fn reset(&mut self) {
        self.counts.fill(0.0);
    }

    /// Replace the shape, reallocating and zeroing the counts.
    pub fn reconfigure(&mut self, config: &Histogram2DConfig) -> Result<(), HistogramError> {
        *self = Self::from_config(config)?;
        Ok(())
    }

    /// Locate the bin of `(x, y)` and increment it; out-of-range samples
    /// are dropped silently.
    pub fn fill(&mut self, x: f64, y: f64) {
        let bin_x = ((x - self.config.min_x) / self.bin_width_x).floor();
        let bin_y = ((y - self.config.min_y) / self.bin_width_y).floor();
        if bin_x >= 0.0
            && bin_x < self.config.bins_x as f64
            && bin_y >= 0.0
            && bin_y < self.config.bins_y as f64
        {
            let index = bin_x as usize + self.config.bins_x as usize * bin_y as usize;
            self.counts[index] += 1.0;
        }
    }

    /// Multiply every bin by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for count in &mut self.counts {
            *count *= factor;
        }
    }

    /// Snap to zero every bin whose absolute value is strictly below
    /// `floor`.
    pub fn clear_minimum(&mut self, floor: f64) {
        for count in &mut self.counts {
            if count.abs() < floor {
                *count = 0.0;
            }
        }
    }

    /// JSON rendering: `{"config": {bins_x, …}, "data": [..]}` with the
    /// data in row-major order.
    pub fn to_json(&self) -> Value {
        json!({
            "config": self.config,
            "data": self.counts,
        })
    }
}
