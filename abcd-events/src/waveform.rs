// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Variable-length waveform events.

/// Encoded size of the waveform header.
pub const WAVEFORM_HEADER_SIZE: usize = 14;

/// A time series of raw samples plus optional digital gates.
///
/// The samples and the gate arrays are owned by the waveform; copying a
/// waveform copies its arrays. Every gate has as many samples as the
/// primary array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform {
    pub timestamp: u64,
    pub channel: u8,
    pub samples: Vec<u16>,
    pub gates: Vec<Vec<u8>>,
}

impl Waveform {
    /// An all-zero waveform with `samples_number` samples and
    /// `additional_waveforms` gates.
    pub fn new(
        timestamp: u64,
        channel: u8,
        samples_number: u32,
        additional_waveforms: u8,
    ) -> Self {
        Waveform {
            timestamp,
            channel,
            samples: vec![0; samples_number as usize],
            gates: vec![vec![0; samples_number as usize]; additional_waveforms as usize],
        }
    }

    /// Total encoded size: `14 + 2·N + A·N` bytes.
    pub fn size(&self) -> usize {
        WAVEFORM_HEADER_SIZE + 2 * self.samples.len() + self.gates.len() * self.samples.len()
    }

    /// Append the wire encoding to `payload`: header fields in declaration
    /// order, then the primary samples, then each gate array.
    pub fn encode_into(&self, payload: &mut Vec<u8>) {
        payload.reserve(self.size());
        payload.extend_from_slice(&self.timestamp.to_le_bytes());
        payload.push(self.channel);
        payload.extend_from_slice(&(self.samples.len() as u32).to_le_bytes());
        payload.push(self.gates.len() as u8);
        for sample in &self.samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        for gate in &self.gates {
            payload.extend_from_slice(gate);
        }
    }
}

/// Encode multiple waveforms into one contiguous payload.
pub fn encode_waveforms(waveforms: &[Waveform]) -> Vec<u8> {
    let total: usize = waveforms.iter().map(Waveform::size).sum();
    let mut payload = Vec::with_capacity(total);
    for waveform in waveforms {
        waveform.encode_into(&mut payload);
    }
    payload
}

/// Decode concatenated waveforms from a payload.
///
/// The decoder reads each header, computes the event size and advances;
/// when a header claims more bytes than remain, it stops and the partial
/// tail is discarded with a warning.
pub fn decode_waveforms(payload: &[u8]) -> Vec<Waveform> {
    let mut waveforms = Vec::new();
    let mut offset = 0;

    while payload.len() - offset >= WAVEFORM_HEADER_SIZE {
        let header = &payload[offset..offset + WAVEFORM_HEADER_SIZE];
        let timestamp = u64::from_le_bytes(header[0..8].try_into().unwrap());
        let channel = header[8];
        let samples_number = u32::from_le_bytes(header[9..13].try_into().unwrap()) as usize;
        let additional_waveforms = header[13] as usize;

        let event_size = WAVEFORM_HEADER_SIZE + 2 * samples_number
            + additional_waveforms * samples_number;
        if payload.len() - offset < event_size {
            tracing::warn!(
                offset,
                claimed = event_size,
                remaining = payload.len() - offset,
                "waveform header claims more bytes than remain, stopping"
            );
            break;
        }

        let samples_offset = offset + WAVEFORM_HEADER_SIZE;
        let samples = payload[samples_offset..samples_offset + 2 * samples_number]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes(pair.try_into().unwrap()))
            .collect();

        let gates_offset = samples_offset + 2 * samples_number;
        let gates = (0..additional_waveforms)
            .map(|gate| {
                let start = gates_offset + gate * samples_number;
                payload[start..start + samples_number].to_vec()
            })
            .collect();

        waveforms.push(Waveform {
            timestamp,
            channel,
            samples,
            gates,
        });

        offset += event_size;
    }

    if offset < payload.len() {
        tracing::warn!(
            trailing = payload.len() - offset,
            "trailing bytes after the last decodable waveform"
        );
    }

    waveforms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sawtooth(timestamp: u64, channel: u8, samples_number: u32, gates: u8) -> Waveform {
        let mut waveform = Waveform::new(timestamp, channel, samples_number, gates);
        for (i, sample) in waveform.samples.iter_mut().enumerate() {
            *sample = (i % 1024) as u16;
        }
        for (g, gate) in waveform.gates.iter_mut().enumerate() {
            for (i, sample) in gate.iter_mut().enumerate() {
                *sample = ((i + g) % 2) as u8;
            }
        }
        waveform
    }

    #[test]
    fn size_matches_the_formula() {
        let waveform = sawtooth(0, 0, 100, 2);
        assert_eq!(waveform.size(), 14 + 2 * 100 + 2 * 100);
    }

    #[test]
    fn round_trip_with_gates() {
        let waveforms = vec![sawtooth(10, 1, 64, 2), sawtooth(20, 3, 16, 0)];
        let payload = encode_waveforms(&waveforms);
        assert_eq!(
            payload.len(),
            waveforms.iter().map(Waveform::size).sum::<usize>()
        );
        assert_eq!(decode_waveforms(&payload), waveforms);
    }

    #[test]
    fn header_layout() {
        let waveform = Waveform {
            timestamp: 0x0102030405060708,
            channel: 9,
            samples: vec![0xAABB],
            gates: vec![vec![1]],
        };
        let mut payload = Vec::new();
        waveform.encode_into(&mut payload);
        assert_eq!(
            payload,
            [
                0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // timestamp
                9,    // channel
                1, 0, 0, 0, // samples_number
                1,    // additional_waveforms
                0xBB, 0xAA, // sample
                1,    // gate sample
            ]
        );
    }

    #[test]
    fn truncated_event_stops_the_decoder() {
        let waveforms = vec![sawtooth(1, 0, 32, 1), sawtooth(2, 1, 32, 1)];
        let mut payload = encode_waveforms(&waveforms);
        // Drop the last byte: the second event's header now claims more
        // bytes than remain.
        payload.pop();
        let decoded = decode_waveforms(&payload);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], waveforms[0]);
    }

    #[test]
    fn short_header_yields_nothing() {
        assert!(decode_waveforms(&[0u8; 13]).is_empty());
        assert!(decode_waveforms(&[]).is_empty());
    }
}
