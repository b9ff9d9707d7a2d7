// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors of the transport layer.
///
/// Every state action maps these onto a communication-error state; they
/// never cross an action boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying socket rejected an operation.
    #[error("socket error: {0}")]
    Socket(#[from] zmq::Error),
    /// A frame that should carry a topic has no separator space.
    #[error("missing topic separator in frame of {0} bytes")]
    MissingSeparator(usize),
    /// The topic bytes are not valid UTF-8.
    #[error("topic is not valid UTF-8")]
    TopicEncoding,
    /// A JSON payload failed to parse.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
