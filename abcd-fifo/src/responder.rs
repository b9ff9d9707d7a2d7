// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Request handling, independent of the transport.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use abcd_binary_fifo::BinaryFifo;
use abcd_common::message::{arguments_of, command_of};
use abcd_common::time::{parse_timestamp, timestamp, to_system_time};

const MODULE: &str = "fifo";

/// Answer one request against the FIFO.
///
/// A `get_data` request with parsable `from`/`to` strings replies
/// `type: "data"` with the matching payloads base64-encoded and their
/// total byte size; everything else replies `type: "error"` with an
/// accumulated description. The reply always echoes the request's
/// `msg_ID` as `request_ID`.
pub fn handle_request(fifo: &mut BinaryFifo, request: &Value, reply_msg_id: u64) -> Value {
    let request_id = request.get("msg_ID").and_then(Value::as_u64).unwrap_or(0);

    let mut reply = json!({
        "module": MODULE,
        "timestamp": timestamp(),
        "msg_ID": reply_msg_id,
        "request_ID": request_id,
    });

    let mut errors = String::new();

    match command_of(request) {
        Some("get_data") => {
            let arguments = arguments_of(request).cloned().unwrap_or(Value::Null);
            let from = arguments
                .get("from")
                .and_then(Value::as_str)
                .ok_or("missing 'from' time string;")
                .and_then(|text| {
                    parse_timestamp(text).map_err(|_| "parsing error of 'from' time string;")
                });
            let to = arguments
                .get("to")
                .and_then(Value::as_str)
                .ok_or("missing 'to' time string;")
                .and_then(|text| {
                    parse_timestamp(text).map_err(|_| "parsing error of 'to' time string;")
                });

            match (from, to) {
                (Ok(from), Ok(to)) => {
                    // Clean up the FIFO before retrieving the data.
                    fifo.update();

                    let data = fifo.get_data(to_system_time(from), to_system_time(to));
                    let total_size: usize = data.iter().map(Vec::len).sum();
                    let encoded: Vec<String> =
                        data.iter().map(|payload| BASE64.encode(payload)).collect();

                    reply["data"] = json!(encoded);
                    reply["size"] = json!(total_size);
                }
                (from, to) => {
                    if let Err(text) = from {
                        errors.push_str(text);
                    }
                    if let Err(text) = to {
                        errors.push_str(text);
                    }
                }
            }
        }
        Some(other) => {
            errors.push_str(&format!("unknown command: {other};"));
        }
        None => {
            errors.push_str("missing command;");
        }
    }

    if errors.is_empty() {
        reply["type"] = json!("data");
    } else {
        reply["type"] = json!("error");
        reply["error"] = json!(errors);
    }

    reply
}
