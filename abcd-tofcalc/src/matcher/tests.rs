// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use abcd_histogram::HistogramConfig;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn event(timestamp: u64, channel: u8, qlong: u16) -> PsdEvent {
    PsdEvent {
        timestamp,
        qshort: qlong / 2,
        qlong,
        baseline: 0,
        channel,
        pur: 0,
    }
}

fn channel_config(id: u8, min_tof: f64, max_tof: f64) -> TofChannelConfig {
    TofChannelConfig {
        id,
        enable: true,
        tof: HistogramConfig {
            bins: 200,
            min: min_tof,
            max: max_tof,
        },
        energy: HistogramConfig {
            bins: 128,
            min: 0.0,
            max: 65536.0,
        },
    }
}

fn matcher_with_window(min_tof: f64, max_tof: f64) -> CoincidenceMatcher {
    let mut matcher = CoincidenceMatcher::new(1.0, [0]);
    matcher.add_channel(&channel_config(1, min_tof, max_tof)).unwrap();
    matcher
}

#[test]
fn single_coincidence_inside_the_window() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    let mut events = vec![event(100, 0, 0), event(105, 1, 50), event(120, 1, 60)];

    let found = matcher.process(&mut events);
    assert_eq!(found, 1);

    let channel = matcher.channel(1).unwrap();
    assert_eq!(channel.counts_total, 1);

    // One count in ToF_1, in the bin containing +5 ns.
    let tof = &channel.tof;
    let bin = ((5.0 - tof.min()) / tof.bin_width()).floor() as usize;
    assert_eq!(tof.counts()[bin], 1.0);
    assert_eq!(tof.counts().iter().sum::<f64>(), 1.0);

    // One count in E_1, in the bin containing 50.
    let energy = &channel.energy;
    let bin = ((50.0 - energy.min()) / energy.bin_width()).floor() as usize;
    assert_eq!(energy.counts()[bin], 1.0);
    assert_eq!(energy.counts().iter().sum::<f64>(), 1.0);
}

#[test]
fn backward_coincidences_are_found() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    // The active event precedes the reference: Δt = -5 ns.
    let mut events = vec![event(100, 1, 40), event(105, 0, 0)];
    assert_eq!(matcher.process(&mut events), 1);

    let channel = matcher.channel(1).unwrap();
    let tof = &channel.tof;
    let bin = ((-5.0 - tof.min()) / tof.bin_width()).floor() as usize;
    assert_eq!(tof.counts()[bin], 1.0);
}

#[test]
fn window_is_half_open() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    // Δt = +10 ns sits exactly on the excluded upper edge, Δt = -10 ns on
    // the included lower edge.
    let mut events = vec![event(100, 0, 0), event(110, 1, 50), event(90, 1, 50)];
    assert_eq!(matcher.process(&mut events), 1);
}

#[test]
fn counts_are_independent_of_input_order() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut base = Vec::new();
    // A busy batch: interleaved reference and active events, some ties.
    for burst in 0..20u64 {
        base.push(event(1000 * burst, 0, 100));
        base.push(event(1000 * burst + 3, 1, 200));
        base.push(event(1000 * burst + 3, 1, 300)); // tie
        base.push(event(1000 * burst + 500, 1, 400)); // outside any window
    }

    let mut reference_counts = None;
    for _ in 0..5 {
        let mut events = base.clone();
        events.shuffle(&mut rng);

        let mut matcher = matcher_with_window(-10.0, 10.0);
        let found = matcher.process(&mut events);
        let totals = matcher.channel(1).unwrap().counts_total;
        assert_eq!(found as u64, totals);

        match reference_counts {
            None => reference_counts = Some(totals),
            Some(expected) => assert_eq!(totals, expected),
        }
    }
    assert_eq!(reference_counts, Some(40));
}

#[test]
fn tied_timestamps_are_counted_in_both_directions() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    // Two active events at exactly the reference time.
    let mut events = vec![event(100, 1, 50), event(100, 0, 0), event(100, 1, 60)];
    assert_eq!(matcher.process(&mut events), 2);
}

#[test]
fn reference_pairs_do_not_count() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    let mut events = vec![event(100, 0, 0), event(101, 0, 0)];
    assert_eq!(matcher.process(&mut events), 0);
}

#[test]
fn unknown_channels_are_ignored() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    let mut events = vec![event(100, 0, 0), event(101, 9, 50)];
    assert_eq!(matcher.process(&mut events), 0);
}

#[test]
fn out_of_range_energy_is_dropped_entirely() {
    let mut matcher = CoincidenceMatcher::new(1.0, [0]);
    let mut config = channel_config(1, -10.0, 10.0);
    config.energy.max = 100.0;
    matcher.add_channel(&config).unwrap();

    // In the ToF window but above the energy axis: no histogram is
    // touched, not even ToF.
    let mut events = vec![event(100, 0, 0), event(101, 1, 5000)];
    assert_eq!(matcher.process(&mut events), 0);
    let channel = matcher.channel(1).unwrap();
    assert_eq!(channel.tof.counts().iter().sum::<f64>(), 0.0);
    assert_eq!(channel.counts_total, 0);
}

#[test]
fn per_channel_windows_inside_the_global_envelope() {
    let mut matcher = CoincidenceMatcher::new(1.0, [0]);
    matcher.add_channel(&channel_config(1, -10.0, 10.0)).unwrap();
    matcher.add_channel(&channel_config(2, -100.0, 100.0)).unwrap();

    // Δt = +50 ns: inside channel 2's window, outside channel 1's.
    let mut events = vec![event(1000, 0, 10), event(1050, 1, 20), event(1050, 2, 30)];
    assert_eq!(matcher.process(&mut events), 1);
    assert_eq!(matcher.channel(1).unwrap().counts_total, 0);
    assert_eq!(matcher.channel(2).unwrap().counts_total, 1);
}

#[test]
fn ns_per_sample_scales_the_time_axis() {
    let mut matcher = CoincidenceMatcher::new(4.0, [0]);
    matcher.add_channel(&channel_config(1, -10.0, 10.0)).unwrap();

    // 3 samples × 4 ns/sample = 12 ns: outside the ±10 ns window.
    let mut events = vec![event(100, 0, 0), event(103, 1, 50)];
    assert_eq!(matcher.process(&mut events), 0);

    // 2 samples × 4 ns/sample = 8 ns: inside.
    let mut events = vec![event(100, 0, 0), event(102, 1, 50)];
    assert_eq!(matcher.process(&mut events), 1);
}

#[test]
fn energy_vs_energy_records_the_reference_charge() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    let mut events = vec![event(100, 0, 1000), event(101, 1, 2000)];
    matcher.process(&mut events);

    let channel = matcher.channel(1).unwrap();
    let evse = &channel.energy_vs_energy;
    let config = evse.config();
    let bin_x = ((1000.0 - config.min_x) / ((config.max_x - config.min_x) / config.bins_x as f64))
        .floor() as usize;
    let bin_y = ((2000.0 - config.min_y) / ((config.max_y - config.min_y) / config.bins_y as f64))
        .floor() as usize;
    assert_eq!(evse.counts()[bin_x + config.bins_x as usize * bin_y], 1.0);
}

#[test]
fn reset_clears_spectra_and_counters() {
    let mut matcher = matcher_with_window(-10.0, 10.0);
    let mut events = vec![event(100, 0, 0), event(101, 1, 50)];
    matcher.process(&mut events);
    assert_eq!(matcher.channel(1).unwrap().counts_total, 1);

    matcher.reset(Some(1));
    let channel = matcher.channel(1).unwrap();
    assert_eq!(channel.counts_total, 0);
    assert_eq!(channel.tof.counts().iter().sum::<f64>(), 0.0);
}

#[test]
fn reference_channels_are_not_registered_as_active() {
    let mut matcher = CoincidenceMatcher::new(1.0, [0]);
    matcher.add_channel(&channel_config(0, -10.0, 10.0)).unwrap();
    assert!(matcher.channel(0).is_none());
}

#[test]
fn malformed_batches_are_tolerated_upstream() {
    // A payload that is not a multiple of the event size decodes to the
    // whole events and drops the tail; the matcher simply sees fewer
    // events.
    let events = vec![event(100, 0, 0), event(105, 1, 50)];
    let mut payload = abcd_events::encode_psd_events(&events);
    payload.extend_from_slice(&[1, 2, 3]);

    let mut decoded = abcd_events::decode_psd_events(&payload);
    let mut matcher = matcher_with_window(-10.0, 10.0);
    assert_eq!(matcher.process(&mut decoded), 1);
}
