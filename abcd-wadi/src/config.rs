// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration tree of the bridge.

use serde::{Deserialize, Serialize};

/// Module configuration; unknown fields are ignored, missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WadiConfig {
    pub data_address: String,
    pub abcd_data_address: String,
    pub publish_period_secs: u64,
}

impl Default for WadiConfig {
    fn default() -> Self {
        WadiConfig {
            data_address: "tcp://127.0.0.1:16210".to_string(),
            abcd_data_address: "tcp://127.0.0.1:16181".to_string(),
            publish_period_secs: 3,
        }
    }
}
