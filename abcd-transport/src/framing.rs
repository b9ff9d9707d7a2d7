// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frame send and receive primitives.

use serde_json::Value;

use crate::error::TransportError;
use crate::topic::sized_topic;

/// A received frame, split into its topic (when requested) and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: Option<String>,
    pub payload: Vec<u8>,
}

/// Send one frame: `topic`, one space, `payload`, as a single atomic unit.
///
/// When the topic is empty the separator space is omitted and the payload
/// is sent bare (request/reply frames carry no topic).
pub fn send_framed(
    socket: &zmq::Socket,
    topic: &str,
    payload: &[u8],
) -> Result<(), TransportError> {
    if topic.is_empty() {
        socket.send(payload, 0)?;
        return Ok(());
    }

    let mut envelope = Vec::with_capacity(topic.len() + 1 + payload.len());
    envelope.extend_from_slice(topic.as_bytes());
    envelope.push(b' ');
    envelope.extend_from_slice(payload);

    socket.send(envelope, 0)?;

    Ok(())
}

/// Non-blocking receive of one frame.
///
/// Returns `Ok(None)` when no frame is ready. When `want_topic` is set the
/// first space byte splits topic from payload; a frame without separator
/// is a framing error.
pub fn receive_framed(
    socket: &zmq::Socket,
    want_topic: bool,
) -> Result<Option<Frame>, TransportError> {
    let envelope = match socket.recv_bytes(zmq::DONTWAIT) {
        Ok(envelope) => envelope,
        Err(zmq::Error::EAGAIN) => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if !want_topic {
        return Ok(Some(Frame {
            topic: None,
            payload: envelope,
        }));
    }

    let separator = envelope
        .iter()
        .position(|&byte| byte == b' ')
        .ok_or(TransportError::MissingSeparator(envelope.len()))?;

    let topic = std::str::from_utf8(&envelope[..separator])
        .map_err(|_| TransportError::TopicEncoding)?
        .to_string();
    let payload = envelope[separator + 1..].to_vec();

    Ok(Some(Frame {
        topic: Some(topic),
        payload,
    }))
}

/// Serialize `value` to compact JSON, append `_s<byte length>` to the
/// topic and send the frame.
pub fn send_json(
    socket: &zmq::Socket,
    base_topic: &str,
    value: &Value,
) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(value)?;
    let topic = if base_topic.is_empty() {
        String::new()
    } else {
        sized_topic(base_topic, payload.len())
    };
    send_framed(socket, &topic, &payload)
}

/// Non-blocking receive of a JSON message without topic extraction.
///
/// An empty queue yields `Value::Null`.
pub fn receive_json(socket: &zmq::Socket) -> Result<Value, TransportError> {
    match receive_framed(socket, false)? {
        Some(frame) => Ok(serde_json::from_slice(&frame.payload)?),
        None => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn pair(context: &zmq::Context, endpoint: &str) -> (zmq::Socket, zmq::Socket) {
        let pull = context.socket(zmq::PULL).unwrap();
        pull.bind(endpoint).unwrap();
        let push = context.socket(zmq::PUSH).unwrap();
        push.connect(endpoint).unwrap();
        (push, pull)
    }

    fn recv_until(socket: &zmq::Socket, want_topic: bool) -> Frame {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(frame) = receive_framed(socket, want_topic).unwrap() {
                return frame;
            }
            assert!(Instant::now() < deadline, "no frame within the deadline");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn frame_round_trip_is_bit_for_bit() {
        let context = zmq::Context::new();
        let (push, pull) = pair(&context, "inproc://frame-round-trip");

        let payload = [0u8, 1, 2, b' ', 254, 255];
        send_framed(&push, "data_abcd_events_v0_s6", &payload).unwrap();

        let frame = recv_until(&pull, true);
        assert_eq!(frame.topic.as_deref(), Some("data_abcd_events_v0_s6"));
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn empty_topic_omits_the_separator() {
        let context = zmq::Context::new();
        let (push, pull) = pair(&context, "inproc://bare-frame");

        send_framed(&push, "", b"reply-bytes").unwrap();

        let frame = recv_until(&pull, false);
        assert_eq!(frame.topic, None);
        assert_eq!(frame.payload, b"reply-bytes");
    }

    #[test]
    fn missing_separator_is_a_framing_error() {
        let context = zmq::Context::new();
        let (push, pull) = pair(&context, "inproc://missing-separator");

        send_framed(&push, "", b"no-space-here").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match receive_framed(&pull, true) {
                Ok(None) => {
                    assert!(Instant::now() < deadline);
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(Some(_)) => panic!("frame without separator was accepted"),
                Err(TransportError::MissingSeparator(size)) => {
                    assert_eq!(size, b"no-space-here".len());
                    return;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn empty_queue_is_not_an_error() {
        let context = zmq::Context::new();
        let pull = context.socket(zmq::PULL).unwrap();
        pull.bind("inproc://empty-queue").unwrap();

        assert!(receive_framed(&pull, true).unwrap().is_none());
        assert_eq!(receive_json(&pull).unwrap(), Value::Null);
    }

    #[test]
    fn json_topic_carries_the_serialized_size() {
        let context = zmq::Context::new();
        let (push, pull) = pair(&context, "inproc://json-topic");

        // {"a":1} serializes to 7 bytes
        send_json(&push, "status_spec", &json!({"a": 1})).unwrap();

        let frame = recv_until(&pull, true);
        assert_eq!(frame.topic.as_deref(), Some("status_spec_s7"));
        assert_eq!(frame.payload, b"{\"a\":1}");
    }
}
