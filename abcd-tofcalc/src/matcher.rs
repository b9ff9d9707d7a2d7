// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The time-windowed coincidence matcher.

use std::collections::{BTreeMap, BTreeSet};

use abcd_events::PsdEvent;
use abcd_histogram::{Histogram, Histogram2D, HistogramError};

use crate::config::TofChannelConfig;

/// The four spectra and the counters of one active channel.
#[derive(Debug, Clone)]
pub struct TofChannel {
    pub tof: Histogram,
    pub energy: Histogram,
    pub energy_vs_tof: Histogram2D,
    pub energy_vs_energy: Histogram2D,
    pub counts_partial: u64,
    pub counts_total: u64,
}

impl TofChannel {
    pub fn from_config(config: &TofChannelConfig) -> Result<Self, HistogramError> {
        Ok(TofChannel {
            tof: Histogram::from_config(&config.tof)?,
            energy: Histogram::from_config(&config.energy)?,
            energy_vs_tof: Histogram2D::from_config(&config.energy_vs_tof())?,
            energy_vs_energy: Histogram2D::from_config(&config.energy_vs_energy())?,
            counts_partial: 0,
            counts_total: 0,
        })
    }

    fn reset(&mut self) {
        self.tof.reset();
        self.energy.reset();
        self.energy_vs_tof.reset();
        self.energy_vs_energy.reset();
        self.counts_partial = 0;
        self.counts_total = 0;
    }
}

/// Matches `(reference, active)` pairs whose time of flight falls inside
/// the active channel's window.
///
/// The batch is sorted by timestamp, then for every reference event the
/// neighbors are scanned forward and backward; each scan stops the moment
/// the time of flight leaves the global envelope (the union of all active
/// channels' windows), which the sort makes safe.
#[derive(Debug)]
pub struct CoincidenceMatcher {
    ns_per_sample: f64,
    reference_channels: BTreeSet<u8>,
    channels: BTreeMap<u8, TofChannel>,
    envelope_min: f64,
    envelope_max: f64,
}

impl CoincidenceMatcher {
    pub fn new(ns_per_sample: f64, reference_channels: impl IntoIterator<Item = u8>) -> Self {
        CoincidenceMatcher {
            ns_per_sample,
            reference_channels: reference_channels.into_iter().collect(),
            channels: BTreeMap::new(),
            envelope_min: f64::INFINITY,
            envelope_max: f64::NEG_INFINITY,
        }
    }

    /// Register an active channel. Reference channels cannot also be
    /// active; such entries are dropped with a warning.
    pub fn add_channel(
        &mut self,
        config: &TofChannelConfig,
    ) -> Result<(), HistogramError> {
        if self.reference_channels.contains(&config.id) {
            tracing::warn!(
                channel = config.id,
                "channel is a reference channel, not registering it as active"
            );
            return Ok(());
        }
        let channel = TofChannel::from_config(config)?;
        self.envelope_min = self.envelope_min.min(config.tof.min);
        self.envelope_max = self.envelope_max.max(config.tof.max);
        self.channels.insert(config.id, channel);
        Ok(())
    }

    pub fn ns_per_sample(&self) -> f64 {
        self.ns_per_sample
    }

    pub fn reference_channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.reference_channels.iter().copied()
    }

    pub fn channels(&self) -> impl Iterator<Item = (u8, &TofChannel)> {
        self.channels.iter().map(|(&id, channel)| (id, channel))
    }

    pub fn channel(&self, id: u8) -> Option<&TofChannel> {
        self.channels.get(&id)
    }

    /// Zero one channel's spectra and counters, or every channel's.
    pub fn reset(&mut self, channel: Option<u8>) {
        match channel {
            Some(id) => {
                if let Some(channel) = self.channels.get_mut(&id) {
                    channel.reset();
                }
            }
            None => {
                for channel in self.channels.values_mut() {
                    channel.reset();
                }
            }
        }
    }

    /// Zero the partial counters, after a status publication.
    pub fn reset_partial_counts(&mut self) {
        for channel in self.channels.values_mut() {
            channel.counts_partial = 0;
        }
    }

    /// Match one batch of events and fill the spectra. Returns the number
    /// of coincidences found.
    ///
    /// The batch is sorted in place by timestamp; out-of-range samples are
    /// dropped, unknown channels are ignored.
    pub fn process(&mut self, events: &mut [PsdEvent]) -> usize {
        if self.channels.is_empty() || self.reference_channels.is_empty() {
            return 0;
        }

        events.sort_unstable_by_key(|event| event.timestamp);

        let mut found = 0;

        for index in 0..events.len() {
            let reference = events[index];
            if !self.reference_channels.contains(&reference.channel) {
                continue;
            }

            for neighbor in events.iter().skip(index + 1) {
                if !self.try_pair(&reference, neighbor, &mut found) {
                    break;
                }
            }

            for neighbor in events.iter().take(index).rev() {
                if !self.try_pair(&reference, neighbor, &mut found) {
                    break;
                }
            }
        }

        found
    }

    /// Evaluate one `(reference, neighbor)` pair. Returns false once the
    /// time of flight leaves the global envelope, ending the scan.
    fn try_pair(&mut self, reference: &PsdEvent, neighbor: &PsdEvent, found: &mut usize) -> bool {
        let time_of_flight = (neighbor.timestamp as i64 - reference.timestamp as i64) as f64
            * self.ns_per_sample;

        if !(self.envelope_min <= time_of_flight && time_of_flight < self.envelope_max) {
            return false;
        }

        if self.reference_channels.contains(&neighbor.channel) {
            return true;
        }

        // A user might not be interested in the ToF of this channel.
        let Some(channel) = self.channels.get_mut(&neighbor.channel) else {
            return true;
        };

        let energy = neighbor.qlong as f64;
        let inside = channel.energy_vs_tof.min_x() <= time_of_flight
            && time_of_flight < channel.energy_vs_tof.max_x()
            && channel.energy_vs_tof.min_y() <= energy
            && energy < channel.energy_vs_tof.max_y();
        if inside {
            channel.tof.fill(time_of_flight);
            channel.energy.fill(energy);
            channel.energy_vs_tof.fill(time_of_flight, energy);
            channel.energy_vs_energy.fill(reference.qlong as f64, energy);
            channel.counts_partial += 1;
            channel.counts_total += 1;
            *found += 1;
        }

        true
    }
}

#[cfg(test)]
mod tests;
