// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration tree of the recorder.

use serde::{Deserialize, Serialize};

/// File extensions of the three run files.
pub const EXTENSION_EVENTS: &str = "ade";
pub const EXTENSION_WAVEFORMS: &str = "adw";
pub const EXTENSION_RAW: &str = "adr";

/// Module configuration; unknown fields are ignored, missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DasaConfig {
    pub status_address: String,
    pub commands_address: String,
    /// Producer data stream (events and waveforms).
    pub abcd_data_address: String,
    /// Producer status stream.
    pub abcd_status_address: String,
    /// Analyzer status stream.
    pub analyzer_status_address: String,
    pub publish_period_secs: u64,
}

impl Default for DasaConfig {
    fn default() -> Self {
        DasaConfig {
            status_address: "tcp://127.0.0.1:16193".to_string(),
            commands_address: "tcp://127.0.0.1:16194".to_string(),
            abcd_data_address: "tcp://127.0.0.1:16181".to_string(),
            abcd_status_address: "tcp://127.0.0.1:16180".to_string(),
            analyzer_status_address: "tcp://127.0.0.1:16185".to_string(),
            publish_period_secs: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_unknown_fields() {
        let config: DasaConfig =
            serde_json::from_str(r#"{"publish_period_secs": 10, "verbosity": 1}"#).unwrap();
        assert_eq!(config.publish_period_secs, 10);
        assert_eq!(config.status_address, DasaConfig::default().status_address);
    }
}
