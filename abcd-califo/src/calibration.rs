// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-channel calibration state: snapshots, window sums and the
//! accept/reject rule around the fit.

use std::time::{Duration, SystemTime};

use abcd_binary_fifo::BinaryFifo;
use abcd_events::PsdEvent;
use abcd_histogram::Histogram;

use crate::background::estimate_background;
use crate::config::CalifoChannelConfig;
use crate::fit::{fit_peak, peak_model, FitStatus, PeakParameters};

/// Outcome of one fit cycle on one channel.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub channel: u8,
    pub accepted: bool,
    pub fitted: PeakParameters,
    pub scale_factor: f64,
    /// Summed spectrum, background estimate and fit curve, kept for the
    /// optional fit-event publication.
    pub summed: Vec<f64>,
    pub background: Option<Vec<f64>>,
    pub fit_curve: Vec<f64>,
}

/// One channel under gain stabilization.
#[derive(Debug)]
pub struct CalibratedChannel {
    config: CalifoChannelConfig,
    /// Per-batch scratch histogram; its counts are snapshotted to the
    /// FIFO after every batch.
    scratch: Histogram,
    snapshots: BinaryFifo,
    last_fit: PeakParameters,
    scale_factor: f64,
}

impl CalibratedChannel {
    pub fn new(config: CalifoChannelConfig, expiration: Duration) -> Option<Self> {
        let scratch = Histogram::from_config(&config.energy).ok()?;
        let last_fit = config.peak.initial_parameters();
        Some(CalibratedChannel {
            config,
            scratch,
            snapshots: BinaryFifo::new(expiration),
            last_fit,
            scale_factor: 1.0,
        })
    }

    pub fn id(&self) -> u8 {
        self.config.id
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn last_fit(&self) -> PeakParameters {
        self.last_fit
    }

    pub fn config(&self) -> &CalifoChannelConfig {
        &self.config
    }

    /// Reset the scratch spectrum for a new batch.
    pub fn begin_batch(&mut self) {
        self.scratch.reset();
    }

    /// Accumulate one event of the current batch and return its rescaled
    /// copy for republication.
    ///
    /// `smear` is a uniform [0,1) draw; adding it before scaling avoids
    /// integer banding in the rescaled charges.
    pub fn accumulate(&mut self, event: &PsdEvent, smear: f64) -> PsdEvent {
        self.scratch.fill(event.qlong as f64);

        let qshort = (event.qshort as f64 + smear) * self.scale_factor;
        let qlong = (event.qlong as f64 + smear) * self.scale_factor;
        PsdEvent {
            timestamp: event.timestamp,
            qshort: qshort as u16,
            qlong: qlong as u16,
            baseline: event.baseline,
            channel: event.channel,
            pur: event.pur,
        }
    }

    /// Snapshot the batch spectrum into the FIFO as raw little-endian
    /// `f64` bins.
    pub fn push_snapshot(&mut self) {
        let bytes: Vec<u8> = self
            .scratch
            .counts()
            .iter()
            .flat_map(|count| count.to_le_bytes())
            .collect();
        self.snapshots.push(bytes);
    }

    /// Sum the snapshots of the accumulation window into one spectrum.
    pub fn summed_spectrum(&mut self, window: Duration) -> Histogram {
        self.snapshots.update();

        let mut summed = Histogram::from_config(&self.config.energy)
            .expect("shape was validated at construction");
        let to = SystemTime::now();
        let from = to - window;
        for snapshot in self.snapshots.get_data(from, to) {
            let counts: Vec<f64> = snapshot
                .chunks_exact(8)
                .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
                .collect();
            if summed.add_counts(&counts).is_err() {
                tracing::warn!(
                    channel = self.config.id,
                    "snapshot shape does not match the spectrum, skipping"
                );
            }
        }
        summed
    }

    /// One fit cycle: sum the window, subtract the background estimate,
    /// fit, and accept or reject against the tolerance.
    ///
    /// An accepted fit becomes the next warm start and updates
    /// `scale_factor = target / μ_fit`; a rejected one keeps both.
    pub fn fit_cycle(&mut self, window: Duration) -> FitOutcome {
        let mut summed = self.summed_spectrum(window);
        let raw = summed.counts().to_vec();

        // An empty window has nothing to fit.
        if raw.iter().sum::<f64>() == 0.0 {
            return FitOutcome {
                channel: self.config.id,
                accepted: false,
                fitted: self.last_fit,
                scale_factor: self.scale_factor,
                summed: raw,
                background: None,
                fit_curve: Vec::new(),
            };
        }

        let background = if self.config.background_estimate.enable {
            let estimate = estimate_background(
                summed.counts(),
                self.config.background_estimate.iterations,
                self.config.background_estimate.order,
                self.config.background_estimate.smooth,
            );
            let _ = summed.subtract_counts(&estimate);
            Some(estimate)
        } else {
            None
        };

        let result = fit_peak(&summed, &self.last_fit);
        let fitted = result.parameters;

        let distance = (fitted.mu - self.last_fit.mu).abs();
        let accepted = result.status != FitStatus::Degenerate
            && fitted.mu != 0.0
            && distance < self.config.peak.tolerance;

        if accepted {
            self.last_fit = fitted;
            self.scale_factor = self.config.peak.position / fitted.mu;
        }

        let min = summed.min();
        let width = summed.bin_width();
        let fit_curve = (0..raw.len())
            .map(|i| peak_model(&fitted, min + width * i as f64))
            .collect();

        FitOutcome {
            channel: self.config.id,
            accepted,
            fitted,
            scale_factor: self.scale_factor,
            summed: raw,
            background,
            fit_curve,
        }
    }
}
