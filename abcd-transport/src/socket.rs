// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Socket constructors for the roles the modules play on the bus.
//!
//! Each module owns exactly one context; sockets are owned by the module
//! and closed (dropped) before the context is destroyed.

use crate::error::TransportError;

/// Publisher bound to `address` (status and data streams).
pub fn publisher(context: &zmq::Context, address: &str) -> Result<zmq::Socket, TransportError> {
    let socket = context.socket(zmq::PUB)?;
    socket.bind(address)?;
    Ok(socket)
}

/// Subscriber connected to `address`, subscribed to each topic prefix.
///
/// An empty prefix list subscribes to everything.
pub fn subscriber(
    context: &zmq::Context,
    address: &str,
    topics: &[&str],
) -> Result<zmq::Socket, TransportError> {
    let socket = context.socket(zmq::SUB)?;
    socket.connect(address)?;
    if topics.is_empty() {
        socket.set_subscribe(b"")?;
    } else {
        for topic in topics {
            socket.set_subscribe(topic.as_bytes())?;
        }
    }
    Ok(socket)
}

/// Command sink bound to `address` (modules pull commands from here).
pub fn puller(context: &zmq::Context, address: &str) -> Result<zmq::Socket, TransportError> {
    let socket = context.socket(zmq::PULL)?;
    socket.bind(address)?;
    Ok(socket)
}

/// Command source connected to `address`.
pub fn pusher(context: &zmq::Context, address: &str) -> Result<zmq::Socket, TransportError> {
    let socket = context.socket(zmq::PUSH)?;
    socket.connect(address)?;
    Ok(socket)
}

/// Reply socket bound to `address` (the FIFO query interface).
pub fn replier(context: &zmq::Context, address: &str) -> Result<zmq::Socket, TransportError> {
    let socket = context.socket(zmq::REP)?;
    socket.bind(address)?;
    Ok(socket)
}

/// Request socket connected to `address`.
pub fn requester(context: &zmq::Context, address: &str) -> Result<zmq::Socket, TransportError> {
    let socket = context.socket(zmq::REQ)?;
    socket.connect(address)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{receive_framed, send_framed};
    use std::time::{Duration, Instant};

    #[test]
    fn pull_push_pair_delivers_commands() {
        let context = zmq::Context::new();
        let pull = puller(&context, "inproc://socket-commands").unwrap();
        let push = pusher(&context, "inproc://socket-commands").unwrap();

        send_framed(&push, "", b"{\"command\":\"quit\"}").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(frame) = receive_framed(&pull, false).unwrap() {
                assert_eq!(frame.payload, b"{\"command\":\"quit\"}");
                return;
            }
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn subscriber_filters_by_prefix() {
        let context = zmq::Context::new();
        let data_pub = publisher(&context, "inproc://socket-pubsub").unwrap();
        let data_sub =
            subscriber(&context, "inproc://socket-pubsub", &["data_abcd_events"]).unwrap();

        // Slow-joiner guard: even on inproc the subscription needs a moment
        // to reach the publisher.
        std::thread::sleep(Duration::from_millis(50));

        send_framed(&data_pub, "status_abcd_s2", b"{}").unwrap();
        send_framed(&data_pub, "data_abcd_events_v0_s4", &[1, 2, 3, 4]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(frame) = receive_framed(&data_sub, true).unwrap() {
                // The status frame must have been filtered out.
                assert_eq!(frame.topic.as_deref(), Some("data_abcd_events_v0_s4"));
                assert_eq!(frame.payload, [1, 2, 3, 4]);
                return;
            }
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
