// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration tree of a digitizer session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One channel descriptor. Module-specific fields beyond `id` and
/// `enable` stay in the opaque `digitizer` section of [`SessionConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub id: u8,
    pub enable: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            id: 0,
            enable: true,
        }
    }
}

/// Session configuration; unknown fields are ignored, missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub status_address: String,
    pub data_address: String,
    pub commands_address: String,
    pub channels: Vec<ChannelConfig>,
    /// The buffer publishes once it holds this many waveforms, even if
    /// the publication interval has not elapsed yet.
    pub events_buffer_max_size: usize,
    pub publish_period_secs: u64,
    /// Vendor-specific settings, passed to `Digitizer::configure` as-is.
    pub digitizer: Value,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            status_address: "tcp://127.0.0.1:16180".to_string(),
            data_address: "tcp://127.0.0.1:16181".to_string(),
            commands_address: "tcp://127.0.0.1:16182".to_string(),
            channels: Vec::new(),
            events_buffer_max_size: 4096,
            publish_period_secs: 3,
            digitizer: Value::Null,
        }
    }
}

impl SessionConfig {
    /// True when `channel` is enabled by the configuration.
    pub fn channel_enabled(&self, channel: u8) -> bool {
        self.channels
            .iter()
            .find(|entry| entry.id == channel)
            .map_or(false, |entry| entry.enable)
    }
}
