// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Assembly of the JSON messages every module publishes.
//!
//! All messages carry `module`, `timestamp` and `msg_ID`; status messages
//! add module-specific fields on top, lifecycle messages add a `type` of
//! `"event"` or `"error"` and the corresponding text.

use serde_json::{json, Value};

use crate::time::timestamp;

/// Base status message: `{module, timestamp, msg_ID}`.
pub fn compose_status(module: &str, msg_id: u64) -> Value {
    json!({
        "module": module,
        "timestamp": timestamp(),
        "msg_ID": msg_id,
    })
}

/// Lifecycle event message.
pub fn compose_event(module: &str, msg_id: u64, event: &str) -> Value {
    let mut message = compose_status(module, msg_id);
    message["type"] = json!("event");
    message["event"] = json!(event);
    message
}

/// Error event message.
pub fn compose_error(module: &str, msg_id: u64, error: &str) -> Value {
    let mut message = compose_status(module, msg_id);
    message["type"] = json!("error");
    message["error"] = json!(error);
    message
}

/// Extract the `command` field of a command message, if any.
pub fn command_of(message: &Value) -> Option<&str> {
    message.get("command").and_then(Value::as_str)
}

/// Extract the `arguments` object of a command message, if any.
pub fn arguments_of(message: &Value) -> Option<&Value> {
    message.get("arguments")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_carries_the_common_fields() {
        let message = compose_status("spec", 42);
        assert_eq!(message["module"], "spec");
        assert_eq!(message["msg_ID"], 42);
        assert!(message["timestamp"].is_string());
    }

    #[test]
    fn event_and_error_are_typed() {
        let event = compose_event("abcd", 1, "Start acquisition");
        assert_eq!(event["type"], "event");
        assert_eq!(event["event"], "Start acquisition");

        let error = compose_error("abcd", 2, "Digitizer failure");
        assert_eq!(error["type"], "error");
        assert_eq!(error["error"], "Digitizer failure");
    }

    #[test]
    fn command_accessors() {
        let message = json!({
            "msg_ID": 7,
            "command": "start",
            "arguments": {"file_name": "run42"},
        });
        assert_eq!(command_of(&message), Some("start"));
        assert_eq!(arguments_of(&message).unwrap()["file_name"], "run42");
        assert_eq!(command_of(&json!({})), None);
    }
}
