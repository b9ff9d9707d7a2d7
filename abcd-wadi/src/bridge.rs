// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Waveform selection and JSON conversion.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use abcd_events::decode_waveforms;

/// Convert one waveforms payload for the displays.
///
/// Only the first waveform of each channel is kept; a display needs one
/// trace per channel, not the full rate. Returns the `active_channels`
/// and `channels` sections of the outgoing message.
pub fn select_waveforms(payload: &[u8]) -> Value {
    let mut seen = BTreeSet::new();
    let mut channels = Vec::new();

    for waveform in decode_waveforms(payload) {
        if !seen.insert(waveform.channel) {
            continue;
        }
        channels.push(json!({
            "id": waveform.channel,
            "timestamp": waveform.timestamp,
            "samples": waveform.samples,
            "gates": waveform.gates,
        }));
    }

    json!({
        "active_channels": seen.iter().collect::<Vec<_>>(),
        "channels": channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use abcd_events::{encode_waveforms, Waveform};

    fn waveform(channel: u8, timestamp: u64, first_sample: u16) -> Waveform {
        let mut waveform = Waveform::new(timestamp, channel, 4, 1);
        waveform.samples[0] = first_sample;
        waveform.gates[0][1] = 1;
        waveform
    }

    #[test]
    fn keeps_the_first_waveform_per_channel() {
        let payload = encode_waveforms(&[
            waveform(0, 100, 11),
            waveform(1, 101, 22),
            waveform(0, 102, 33), // second trace on channel 0: dropped
        ]);

        let message = select_waveforms(&payload);
        assert_eq!(message["active_channels"], json!([0, 1]));

        let channels = message["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0]["id"], 0);
        assert_eq!(channels[0]["timestamp"], 100);
        assert_eq!(channels[0]["samples"][0], 11);
        assert_eq!(channels[0]["gates"][0][1], 1);
        assert_eq!(channels[1]["id"], 1);
    }

    #[test]
    fn empty_payload_yields_empty_sections() {
        let message = select_waveforms(&[]);
        assert_eq!(message["active_channels"], json!([]));
        assert_eq!(message["channels"], json!([]));
    }
}
