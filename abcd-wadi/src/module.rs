// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The wadi module: the bridge wired to the bus.

use std::time::{Duration, Instant};

use abcd_common::machine::State;
use abcd_common::message::compose_status;
use abcd_common::{should_terminate, topics};
use abcd_transport::framing::{receive_framed, send_framed};
use abcd_transport::{data_topic, socket};

use crate::bridge::select_waveforms;
use crate::config::WadiConfig;

const MODULE: &str = "wadi";

pub struct WadiStatus {
    pub config: WadiConfig,
    context: Option<zmq::Context>,
    data_socket: Option<zmq::Socket>,
    abcd_data_socket: Option<zmq::Socket>,
    data_msg_id: u64,
    messages_converted: u64,
    last_publication: Instant,
    last_error: String,
}

impl WadiStatus {
    pub fn new(config: WadiConfig) -> Self {
        WadiStatus {
            config,
            context: None,
            data_socket: None,
            abcd_data_socket: None,
            data_msg_id: 0,
            messages_converted: 0,
            last_publication: Instant::now(),
            last_error: String::new(),
        }
    }

    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    pub fn messages_converted(&self) -> u64 {
        self.messages_converted
    }

    fn publish_period(&self) -> Duration {
        Duration::from_secs(self.config.publish_period_secs)
    }
}

pub mod states {
    use super::*;

    pub const START: State<WadiStatus> = State {
        id: 100,
        description: "start",
        action: actions::start,
    };
    pub const CREATE_CONTEXT: State<WadiStatus> = State {
        id: 110,
        description: "create context",
        action: actions::create_context,
    };
    pub const CREATE_SOCKETS: State<WadiStatus> = State {
        id: 120,
        description: "create sockets",
        action: actions::create_sockets,
    };
    pub const PUBLISH_STATUS: State<WadiStatus> = State {
        id: 200,
        description: "publish status",
        action: actions::publish_status,
    };
    pub const READ_SOCKET: State<WadiStatus> = State {
        id: 210,
        description: "read socket",
        action: actions::read_socket,
    };
    pub const CLOSE_SOCKETS: State<WadiStatus> = State {
        id: 800,
        description: "close sockets",
        action: actions::close_sockets,
    };
    pub const DESTROY_CONTEXT: State<WadiStatus> = State {
        id: 810,
        description: "destroy context",
        action: actions::destroy_context,
    };
    pub const STOP: State<WadiStatus> = State {
        id: 899,
        description: "stop",
        action: actions::stop,
    };
    pub const COMMUNICATION_ERROR: State<WadiStatus> = State {
        id: 900,
        description: "communication error",
        action: actions::communication_error,
    };
}

mod actions {
    use super::*;

    pub fn start(_status: &mut WadiStatus) -> State<WadiStatus> {
        states::CREATE_CONTEXT
    }

    pub fn create_context(status: &mut WadiStatus) -> State<WadiStatus> {
        status.context = Some(zmq::Context::new());
        states::CREATE_SOCKETS
    }

    pub fn create_sockets(status: &mut WadiStatus) -> State<WadiStatus> {
        let Some(context) = status.context.clone() else {
            status.last_error = "no transport context".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let sockets = (|| -> Result<_, abcd_transport::TransportError> {
            let data_socket = socket::publisher(&context, &status.config.data_address)?;
            let abcd_data_socket = socket::subscriber(
                &context,
                &status.config.abcd_data_address,
                &[topics::DATA_ABCD_WAVEFORMS],
            )?;
            Ok((data_socket, abcd_data_socket))
        })();

        match sockets {
            Ok((data_socket, abcd_data_socket)) => {
                status.data_socket = Some(data_socket);
                status.abcd_data_socket = Some(abcd_data_socket);
                states::PUBLISH_STATUS
            }
            Err(err) => {
                status.last_error = format!("socket creation: {err}");
                states::COMMUNICATION_ERROR
            }
        }
    }

    pub fn publish_status(status: &mut WadiStatus) -> State<WadiStatus> {
        tracing::info!(
            messages_converted = status.messages_converted,
            "bridge heartbeat"
        );
        status.last_publication = Instant::now();
        states::READ_SOCKET
    }

    pub fn read_socket(status: &mut WadiStatus) -> State<WadiStatus> {
        if should_terminate() {
            return states::CLOSE_SOCKETS;
        }

        let Some(socket) = status.abcd_data_socket.take() else {
            status.last_error = "no data socket".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let mut failure: Option<String> = None;
        loop {
            match receive_framed(&socket, true) {
                Ok(Some(frame)) => {
                    let topic = frame.topic.as_deref().unwrap_or_default();
                    if !topic.starts_with(topics::DATA_ABCD_WAVEFORMS) {
                        continue;
                    }
                    let mut message = compose_status(MODULE, status.data_msg_id);
                    let selection = select_waveforms(&frame.payload);
                    message["active_channels"] = selection["active_channels"].clone();
                    message["channels"] = selection["channels"].clone();
                    status.data_msg_id += 1;
                    status.messages_converted += 1;

                    let payload = serde_json::to_vec(&message).unwrap_or_default();
                    let out_topic = data_topic(topics::DATA_WADI_WAVEFORMS, payload.len());
                    if let Some(data_socket) = &status.data_socket {
                        if let Err(err) = send_framed(data_socket, &out_topic, &payload) {
                            tracing::error!(%err, "unable to publish converted waveforms");
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    failure = Some(format!("data receive: {err}"));
                    break;
                }
            }
        }

        status.abcd_data_socket = Some(socket);

        if let Some(text) = failure {
            status.last_error = text;
            return states::COMMUNICATION_ERROR;
        }

        if status.last_publication.elapsed() > status.publish_period() {
            states::PUBLISH_STATUS
        } else {
            states::READ_SOCKET
        }
    }

    pub fn close_sockets(status: &mut WadiStatus) -> State<WadiStatus> {
        status.data_socket = None;
        status.abcd_data_socket = None;
        states::DESTROY_CONTEXT
    }

    pub fn destroy_context(status: &mut WadiStatus) -> State<WadiStatus> {
        status.context = None;
        states::STOP
    }

    pub fn stop(_status: &mut WadiStatus) -> State<WadiStatus> {
        states::STOP
    }

    pub fn communication_error(status: &mut WadiStatus) -> State<WadiStatus> {
        tracing::error!(error = %status.last_error, "communication error");
        status.last_error.clear();
        states::CLOSE_SOCKETS
    }
}

/// Drive the module until its terminal state.
pub fn run(config: WadiConfig, base_period: Duration) -> u32 {
    if let Err(err) = abcd_common::install_signal_handlers() {
        tracing::error!(%err, "unable to install the signal handlers");
    }
    let mut status = WadiStatus::new(config);
    abcd_common::run_machine(&mut status, states::START, states::STOP.id, base_period)
}
