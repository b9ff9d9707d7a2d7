// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Topic composition and inspection.

/// Compose a data topic: `<prefix>_v0_s<payload size>`.
pub fn data_topic(prefix: &str, payload_size: usize) -> String {
    format!("{prefix}_v0_s{payload_size}")
}

/// Append the format-version token to a topic prefix: `<prefix>_v0`.
///
/// Status and event topics are published under their versioned base;
/// [`send_json`](crate::framing::send_json) then appends the size suffix.
pub fn versioned_topic(prefix: &str) -> String {
    format!("{prefix}_v0")
}

/// Append the byte-size suffix to a topic: `<base>_s<payload size>`.
///
/// The size is advisory (the transport already knows the frame length) but
/// the recorder's raw dumps rely on it, so it stays.
pub fn sized_topic(base: &str, payload_size: usize) -> String {
    format!("{base}_s{payload_size}")
}

/// Parse the advertised payload size out of a topic, if it has one.
pub fn payload_size_of(topic: &str) -> Option<usize> {
    let (_, suffix) = topic.rsplit_once("_s")?;
    suffix.parse().ok()
}
