// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The 16-byte PSD event.

/// Encoded size of one PSD event.
pub const PSD_EVENT_SIZE: usize = 16;

/// A point-like record summarizing one detector pulse.
///
/// `timestamp` is in sample units of the producing digitizer; the two
/// integrated charges `qshort` and `qlong` are the inputs of the
/// pulse-shape discrimination downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsdEvent {
    pub timestamp: u64,
    pub qshort: u16,
    pub qlong: u16,
    pub baseline: u16,
    pub channel: u8,
    /// Pile-up-rejection flag.
    pub pur: u8,
}

impl PsdEvent {
    /// Encode to the wire layout: fields in declaration order,
    /// little-endian, no padding.
    pub fn to_bytes(&self) -> [u8; PSD_EVENT_SIZE] {
        let mut bytes = [0u8; PSD_EVENT_SIZE];
        bytes[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.qshort.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.qlong.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.baseline.to_le_bytes());
        bytes[14] = self.channel;
        bytes[15] = self.pur;
        bytes
    }

    /// Decode one event from exactly [`PSD_EVENT_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8; PSD_EVENT_SIZE]) -> Self {
        PsdEvent {
            timestamp: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            qshort: u16::from_le_bytes(bytes[8..10].try_into().unwrap()),
            qlong: u16::from_le_bytes(bytes[10..12].try_into().unwrap()),
            baseline: u16::from_le_bytes(bytes[12..14].try_into().unwrap()),
            channel: bytes[14],
            pur: bytes[15],
        }
    }
}

/// Encode a batch of events into one contiguous payload.
pub fn encode_psd_events(events: &[PsdEvent]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(events.len() * PSD_EVENT_SIZE);
    for event in events {
        payload.extend_from_slice(&event.to_bytes());
    }
    payload
}

/// Decode a payload into events, slicing by `size / 16`.
///
/// A length that is not a multiple of the event size is a warning, not a
/// fatal error: the tail is discarded.
pub fn decode_psd_events(payload: &[u8]) -> Vec<PsdEvent> {
    let remainder = payload.len() % PSD_EVENT_SIZE;
    if remainder != 0 {
        tracing::warn!(
            payload_size = payload.len(),
            trailing = remainder,
            "events payload is not a multiple of the event size, discarding tail"
        );
    }

    payload
        .chunks_exact(PSD_EVENT_SIZE)
        .map(|chunk| PsdEvent::from_bytes(chunk.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_matches_the_wire_layout() {
        let event = PsdEvent {
            timestamp: 0x0102030405060708,
            qshort: 0x1122,
            qlong: 0x3344,
            baseline: 0x5566,
            channel: 7,
            pur: 0,
        };

        let expected: [u8; 16] = [
            0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // timestamp
            0x22, 0x11, // qshort
            0x44, 0x33, // qlong
            0x66, 0x55, // baseline
            0x07, // channel
            0x00, // pur
        ];
        assert_eq!(event.to_bytes(), expected);
    }

    #[test]
    fn round_trip() {
        let event = PsdEvent {
            timestamp: u64::MAX,
            qshort: 12,
            qlong: 65535,
            baseline: 0,
            channel: 255,
            pur: 1,
        };
        assert_eq!(PsdEvent::from_bytes(&event.to_bytes()), event);
    }

    #[test]
    fn batch_round_trip_discards_trailing_bytes() {
        let events = vec![
            PsdEvent {
                timestamp: 1,
                qshort: 2,
                qlong: 3,
                baseline: 4,
                channel: 5,
                pur: 0,
            },
            PsdEvent {
                timestamp: 6,
                qshort: 7,
                qlong: 8,
                baseline: 9,
                channel: 10,
                pur: 1,
            },
        ];

        let mut payload = encode_psd_events(&events);
        assert_eq!(payload.len(), 32);
        assert_eq!(decode_psd_events(&payload), events);

        // A truncated tail is tolerated and dropped.
        payload.extend_from_slice(&[0xAA; 5]);
        assert_eq!(decode_psd_events(&payload), events);
    }
}
