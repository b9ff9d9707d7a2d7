// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-dimensional histogram.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::HistogramError;

/// Shape of a 1D histogram.
///
/// Unknown fields in a configuration tree are ignored; missing fields take
/// these defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub bins: u32,
    pub min: f64,
    pub max: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        HistogramConfig {
            bins: 1024,
            min: 0.0,
            max: 1024.0,
        }
    }
}

/// A 1D histogram over `bins` equal-width bins covering `[min, max)`.
///
/// Out-of-range fills are dropped silently; counts never go negative
/// except transiently through [`Histogram::subtract`], whose callers
/// follow up with [`Histogram::clear_minimum`].
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    config: HistogramConfig,
    bin_width: f64,
    counts: Vec<f64>,
}

impl Histogram {
    pub fn new(bins: u32, min: f64, max: f64) -> Result<Self, HistogramError> {
        Self::from_config(&HistogramConfig { bins, min, max })
    }

    pub fn from_config(config: &HistogramConfig) -> Result<Self, HistogramError> {
        if config.bins == 0 {
            return Err(HistogramError::NoBins);
        }
        if !(config.max > config.min) {
            return Err(HistogramError::InvalidRange {
                min: config.min,
                max: config.max,
            });
        }
        Ok(Histogram {
            config: *config,
            bin_width: (config.max - config.min) / config.bins as f64,
            counts: vec![0.0; config.bins as usize],
        })
    }

    pub fn config(&self) -> HistogramConfig {
        self.config
    }

    pub fn bins(&self) -> u32 {
        self.config.bins
    }

    pub fn min(&self) -> f64 {
        self.config.min
    }

    pub fn max(&self) -> f64 {
        self.config.max
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Lower edge of bin `index`.
    fn bin_edge(&self, index: usize) -> f64 {
        self.config.min + self.bin_width * index as f64
    }

    /// Zero every bin.
    pub fn reset(&mut self) {
        self.counts.fill(0.0);
    }

    /// Replace the shape, reallocating and zeroing the counts.
    pub fn reconfigure(&mut self, config: &HistogramConfig) -> Result<(), HistogramError> {
        *self = Self::from_config(config)?;
        Ok(())
    }

    /// Locate the bin of `value` and increment it; out-of-range values are
    /// dropped.
    pub fn fill(&mut self, value: f64) {
        let bin = ((value - self.config.min) / self.bin_width).floor();
        if bin >= 0.0 && bin < self.config.bins as f64 {
            self.counts[bin as usize] += 1.0;
        }
    }

    /// Add another histogram of identical shape, bin by bin.
    pub fn add(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        self.add_counts(&other.counts)
    }

    /// Add a raw counts array of matching length, bin by bin.
    ///
    /// This is how the fitter folds FIFO snapshots back into a histogram.
    pub fn add_counts(&mut self, counts: &[f64]) -> Result<(), HistogramError> {
        if counts.len() != self.counts.len() {
            return Err(HistogramError::ShapeMismatch {
                left: self.counts.len(),
                right: counts.len(),
            });
        }
        for (target, value) in self.counts.iter_mut().zip(counts) {
            *target += value;
        }
        Ok(())
    }

    /// Subtract another histogram of identical shape, bin by bin.
    pub fn subtract(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        self.subtract_counts(&other.counts)
    }

    /// Subtract a raw counts array of matching length, bin by bin.
    pub fn subtract_counts(&mut self, counts: &[f64]) -> Result<(), HistogramError> {
        if counts.len() != self.counts.len() {
            return Err(HistogramError::ShapeMismatch {
                left: self.counts.len(),
                right: counts.len(),
            });
        }
        for (target, value) in self.counts.iter_mut().zip(counts) {
            *target -= value;
        }
        Ok(())
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

    /// Count-weighted mean of the bin positions.
    pub fn mean(&self) -> f64 {
        let mut weighted = 0.0;
        let mut sum = 0.0;
        for (index, count) in self.counts.iter().enumerate() {
            weighted += self.bin_edge(index) * count;
            sum += count;
        }
        weighted / sum
    }

    /// Count-weighted variance of the bin positions.
    pub fn variance(&self) -> f64 {
        let mut weighted = 0.0;
        let mut weighted_sqr = 0.0;
        let mut sum = 0.0;
        for (index, count) in self.counts.iter().enumerate() {
            let x = self.bin_edge(index);
            weighted += x * count;
            weighted_sqr += x * x * count;
            sum += count;
        }
        let mean = weighted / sum;
        weighted_sqr / sum - mean * mean
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Sum of all counts times the bin width.
    pub fn integral(&self) -> f64 {
        self.counts.iter().sum::<f64>() * self.bin_width
    }

    /// Largest bin count.
    pub fn max_count(&self) -> f64 {
        self.counts.iter().fold(f64::MIN, |max, &count| max.max(count))
    }

    /// Count-weighted mean restricted to bins inside
    /// `[left_edge, right_edge)`.
    pub fn mean_interval(&self, left_edge: f64, right_edge: f64) -> f64 {
        let first = (((left_edge - self.config.min) / self.bin_width).floor()).max(0.0) as usize;
        let last = ((right_edge - self.config.min) / self.bin_width).floor();
        let last = if last < 0.0 {
            0
        } else {
            (last as usize).min(self.counts.len())
        };

        let mut weighted = 0.0;
        let mut sum = 0.0;
        for index in first..last {
            weighted += self.bin_edge(index) * self.counts[index];
            sum += self.counts[index];
        }
        weighted / sum
    }

    /// Box smoothing with an odd window of `width` bins.
    ///
    /// An even width is promoted to the next odd number. The window is
    /// centered on each bin; the edges are clamped by repeating the first
    /// and last bins. Built on a prefix sum so the cost is independent of
    /// the window width.
    pub fn box_smooth(&mut self, width: u32) -> Result<(), HistogramError> {
        if width == 0 {
            return Err(HistogramError::NullWidth);
        }

        let half = (width / 2) as usize;
        let full = 2 * half + 1;
        let bins = self.counts.len();

        // Prefix sums over the clamp-extended sequence
        // [first × half, counts, last × half].
        let mut prefix = Vec::with_capacity(bins + 2 * half + 1);
        prefix.push(0.0);
        let mut running = 0.0;
        for _ in 0..half {
            running += self.counts[0];
            prefix.push(running);
        }
        for &count in &self.counts {
            running += count;
            prefix.push(running);
        }
        for _ in 0..half {
            running += self.counts[bins - 1];
            prefix.push(running);
        }

        for index in 0..bins {
            self.counts[index] = (prefix[index + full] - prefix[index]) / full as f64;
        }

        Ok(())
    }

    /// JSON rendering: `{"config": {bins, min, max}, "data": [..]}`.
    pub fn to_json(&self) -> Value {
        json!({
            "config": self.config,
            "data": self.counts,
        })
    }
}
