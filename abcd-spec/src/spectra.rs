// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-channel spectra with lazy registration and time decay.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use abcd_events::PsdEvent;
use abcd_histogram::{Histogram, Histogram2D, Histogram2DConfig, HistogramConfig};

/// The spectra and counters of one registered channel.
#[derive(Debug, Clone)]
pub struct ChannelSpectra {
    pub energy: Histogram,
    pub psd: Histogram2D,
    pub counts_partial: u64,
    pub counts_total: u64,
}

/// All registered channels, plus the shapes new channels are created with.
///
/// Configuration entries for unseen channels do not trigger registration;
/// an observed event for an unregistered channel does.
#[derive(Debug)]
pub struct Spectra {
    energy_shape: HistogramConfig,
    psd_shape: Histogram2DConfig,
    channels: BTreeMap<u8, ChannelSpectra>,
}

impl Spectra {
    pub fn new(energy_shape: HistogramConfig, psd_shape: Histogram2DConfig) -> Self {
        Spectra {
            energy_shape,
            psd_shape,
            channels: BTreeMap::new(),
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = (u8, &ChannelSpectra)> {
        self.channels.iter().map(|(&id, channel)| (id, channel))
    }

    pub fn channel(&self, id: u8) -> Option<&ChannelSpectra> {
        self.channels.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Accumulate one event, auto-registering its channel on first sight.
    ///
    /// The discrimination parameter is `(qlong - qshort) / qlong`; for a
    /// null `qlong` it degrades to the smallest representable positive
    /// value instead of dividing by zero.
    pub fn fill(&mut self, event: &PsdEvent) {
        let energy_shape = self.energy_shape;
        let psd_shape = self.psd_shape;
        let channel = self
            .channels
            .entry(event.channel)
            .or_insert_with(|| ChannelSpectra {
                // The shapes were validated when the configuration was
                // applied, so construction cannot fail here.
                energy: Histogram::from_config(&energy_shape)
                    .unwrap_or_else(|_| Histogram::new(1, 0.0, 1.0).unwrap()),
                psd: Histogram2D::from_config(&psd_shape)
                    .unwrap_or_else(|_| {
                        Histogram2D::from_config(&Histogram2DConfig::default()).unwrap()
                    }),
                counts_partial: 0,
                counts_total: 0,
            });

        let qlong = event.qlong as f64;
        channel.energy.fill(qlong);

        let psd = if event.qlong != 0 {
            (event.qlong as f64 - event.qshort as f64) / event.qlong as f64
        } else {
            f64::MIN_POSITIVE
        };
        channel.psd.fill(qlong, psd);

        channel.counts_partial += 1;
        channel.counts_total += 1;
    }

    /// Accumulate a whole batch.
    pub fn fill_batch(&mut self, events: &[PsdEvent]) {
        for event in events {
            self.fill(event);
        }
    }

    /// Multiply every bin of every spectrum by `exp(-elapsed / tau)`, then
    /// snap bins below `counts_minimum` to zero.
    ///
    /// Called right after each publication so the counts between two
    /// publications are not decaying.
    pub fn apply_decay(&mut self, elapsed_secs: f64, tau: f64, counts_minimum: f64) {
        let factor = (-elapsed_secs / tau).exp();
        for channel in self.channels.values_mut() {
            channel.energy.scale(factor);
            channel.psd.scale(factor);
            channel.energy.clear_minimum(counts_minimum);
            channel.psd.clear_minimum(counts_minimum);
        }
    }

    /// Zero the partial counters, after a status publication.
    pub fn reset_partial_counts(&mut self) {
        for channel in self.channels.values_mut() {
            channel.counts_partial = 0;
        }
    }

    /// Zero one channel's spectra and counters, or every channel's.
    pub fn reset(&mut self, channel: Option<u8>) {
        let reset_one = |channel: &mut ChannelSpectra| {
            channel.energy.reset();
            channel.psd.reset();
            channel.counts_partial = 0;
            channel.counts_total = 0;
        };
        match channel {
            Some(id) => {
                if let Some(channel) = self.channels.get_mut(&id) {
                    reset_one(channel);
                }
            }
            None => {
                for channel in self.channels.values_mut() {
                    reset_one(channel);
                }
            }
        }
    }

    /// Apply new shapes: channels whose spectra already have the new
    /// shapes keep their counts, the others are reallocated and zeroed.
    pub fn reconfigure(&mut self, energy_shape: HistogramConfig, psd_shape: Histogram2DConfig) {
        for channel in self.channels.values_mut() {
            if channel.energy.config() != energy_shape {
                let _ = channel.energy.reconfigure(&energy_shape);
            }
            if channel.psd.config() != psd_shape {
                let _ = channel.psd.reconfigure(&psd_shape);
            }
        }
        self.energy_shape = energy_shape;
        self.psd_shape = psd_shape;
    }

    /// Per-channel `{id, enabled, rate, counts}` entries for the status
    /// message.
    pub fn statuses_json(&self, elapsed_secs: f64) -> Vec<Value> {
        self.channels()
            .map(|(id, channel)| {
                json!({
                    "id": id,
                    "enabled": true,
                    "rate": channel.counts_partial as f64 / elapsed_secs,
                    "counts": channel.counts_total,
                })
            })
            .collect()
    }

    /// Per-channel data entries, with the full histograms.
    pub fn data_json(&self, elapsed_secs: f64) -> Vec<Value> {
        self.channels()
            .map(|(id, channel)| {
                json!({
                    "id": id,
                    "enabled": true,
                    "rate": channel.counts_partial as f64 / elapsed_secs,
                    "counts": channel.counts_total,
                    "energy": channel.energy.to_json(),
                    "PSD": channel.psd.to_json(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes() -> (HistogramConfig, Histogram2DConfig) {
        (
            HistogramConfig {
                bins: 64,
                min: 0.0,
                max: 64.0,
            },
            Histogram2DConfig {
                bins_x: 8,
                min_x: 0.0,
                max_x: 64.0,
                bins_y: 8,
                min_y: 0.0,
                max_y: 1.0,
            },
        )
    }

    fn event(channel: u8, qshort: u16, qlong: u16) -> PsdEvent {
        PsdEvent {
            timestamp: 0,
            qshort,
            qlong,
            baseline: 0,
            channel,
            pur: 0,
        }
    }

    #[test]
    fn channels_register_lazily() {
        let (energy, psd) = shapes();
        let mut spectra = Spectra::new(energy, psd);
        assert!(spectra.is_empty());

        spectra.fill(&event(3, 10, 40));
        spectra.fill(&event(3, 20, 40));
        spectra.fill(&event(5, 0, 8));

        let ids: Vec<u8> = spectra.channels().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(spectra.channel(3).unwrap().counts_total, 2);
        assert_eq!(spectra.channel(5).unwrap().counts_total, 1);
    }

    #[test]
    fn psd_parameter_lands_in_the_right_bin() {
        let (energy, psd) = shapes();
        let mut spectra = Spectra::new(energy, psd);

        // psd = (40 - 10) / 40 = 0.75, qlong = 40: bin (5, 6).
        spectra.fill(&event(0, 10, 40));
        let channel = spectra.channel(0).unwrap();
        assert_eq!(channel.psd.counts()[5 + 8 * 6], 1.0);
        assert_eq!(channel.energy.counts()[40], 1.0);
    }

    #[test]
    fn null_qlong_does_not_divide_by_zero() {
        let (energy, psd) = shapes();
        let mut spectra = Spectra::new(energy, psd);
        spectra.fill(&event(0, 5, 0));
        // psd degenerates to the smallest positive value: bin (0, 0).
        let channel = spectra.channel(0).unwrap();
        assert_eq!(channel.psd.counts()[0], 1.0);
    }

    #[test]
    fn decay_shrinks_and_clears() {
        let (energy, psd) = shapes();
        let mut spectra = Spectra::new(energy, psd);
        for _ in 0..100 {
            spectra.fill(&event(0, 10, 40));
        }

        // One time constant: the 100 counts shrink to ~36.8.
        spectra.apply_decay(600.0, 600.0, 0.5);
        let counts: f64 = spectra.channel(0).unwrap().energy.counts().iter().sum();
        assert!((counts - 100.0 * (-1.0f64).exp()).abs() < 1e-9);

        // Many time constants: everything falls below the floor.
        spectra.apply_decay(60_000.0, 600.0, 0.5);
        let counts: f64 = spectra.channel(0).unwrap().energy.counts().iter().sum();
        assert_eq!(counts, 0.0);
    }

    #[test]
    fn partial_counters_reset_totals_do_not() {
        let (energy, psd) = shapes();
        let mut spectra = Spectra::new(energy, psd);
        spectra.fill(&event(0, 10, 40));
        spectra.reset_partial_counts();

        let channel = spectra.channel(0).unwrap();
        assert_eq!(channel.counts_partial, 0);
        assert_eq!(channel.counts_total, 1);

        spectra.reset(None);
        let channel = spectra.channel(0).unwrap();
        assert_eq!(channel.counts_total, 0);
    }

    #[test]
    fn reconfigure_preserves_matching_shapes() {
        let (energy, psd) = shapes();
        let mut spectra = Spectra::new(energy, psd);
        spectra.fill(&event(0, 10, 40));

        // Same shapes: counts survive.
        spectra.reconfigure(energy, psd);
        assert_eq!(spectra.channel(0).unwrap().counts_total, 1);
        let sum: f64 = spectra.channel(0).unwrap().energy.counts().iter().sum();
        assert_eq!(sum, 1.0);

        // A different energy shape: that histogram is reallocated, the
        // untouched PSD histogram keeps its counts.
        let wider = HistogramConfig {
            bins: 128,
            min: 0.0,
            max: 128.0,
        };
        spectra.reconfigure(wider, psd);
        let channel = spectra.channel(0).unwrap();
        assert_eq!(channel.energy.bins(), 128);
        assert_eq!(channel.energy.counts().iter().sum::<f64>(), 0.0);
        assert_eq!(channel.psd.counts().iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn json_entries_have_the_published_shape() {
        let (energy, psd) = shapes();
        let mut spectra = Spectra::new(energy, psd);
        spectra.fill(&event(2, 10, 40));

        let statuses = spectra.statuses_json(2.0);
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0]["id"], 2);
        assert_eq!(statuses[0]["rate"], 0.5);

        let data = spectra.data_json(2.0);
        assert_eq!(data[0]["energy"]["config"]["bins"], 64);
        assert_eq!(data[0]["PSD"]["config"]["bins_x"], 8);
    }
}
