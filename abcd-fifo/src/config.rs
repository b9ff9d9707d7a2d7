// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration tree of the FIFO responder.

use serde::{Deserialize, Serialize};

/// Module configuration; unknown fields are ignored, missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FifoConfig {
    pub status_address: String,
    pub reply_address: String,
    pub commands_address: String,
    pub abcd_data_address: String,
    /// Retention of the stored payloads, in seconds.
    pub expiration_time_secs: u64,
    pub publish_period_secs: u64,
}

impl Default for FifoConfig {
    fn default() -> Self {
        FifoConfig {
            status_address: "tcp://127.0.0.1:16201".to_string(),
            reply_address: "tcp://127.0.0.1:16202".to_string(),
            commands_address: "tcp://127.0.0.1:16203".to_string(),
            abcd_data_address: "tcp://127.0.0.1:16181".to_string(),
            expiration_time_secs: 3600,
            publish_period_secs: 3,
        }
    }
}
