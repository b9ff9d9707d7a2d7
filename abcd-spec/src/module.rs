// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The spec module: the spectra wired to the bus.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use abcd_common::machine::State;
use abcd_common::message::{arguments_of, command_of, compose_error, compose_event, compose_status};
use abcd_common::{should_terminate, topics};
use abcd_events::decode_psd_events;
use abcd_histogram::{Histogram, Histogram2D};
use abcd_transport::framing::{receive_framed, receive_json, send_json};
use abcd_transport::{socket, versioned_topic};

use crate::config::SpecConfig;
use crate::spectra::Spectra;

const MODULE: &str = "spec";

pub struct SpecStatus {
    pub config: SpecConfig,
    context: Option<zmq::Context>,
    status_socket: Option<zmq::Socket>,
    data_socket: Option<zmq::Socket>,
    commands_socket: Option<zmq::Socket>,
    abcd_data_socket: Option<zmq::Socket>,
    status_msg_id: u64,
    data_msg_id: u64,
    last_publication: Instant,
    spectra: Spectra,
    last_error: String,
}

impl SpecStatus {
    pub fn new(config: SpecConfig) -> Self {
        let spectra = Spectra::new(config.energy, config.psd);
        SpecStatus {
            config,
            context: None,
            status_socket: None,
            data_socket: None,
            commands_socket: None,
            abcd_data_socket: None,
            status_msg_id: 0,
            data_msg_id: 0,
            last_publication: Instant::now(),
            spectra,
            last_error: String::new(),
        }
    }

    pub fn spectra(&self) -> &Spectra {
        &self.spectra
    }

    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    fn publish_period(&self) -> Duration {
        Duration::from_secs(self.config.publish_period_secs)
    }

    fn publish_message(&mut self, topic: &str, message: &Value) {
        if let Some(socket) = &self.status_socket {
            if let Err(err) = send_json(socket, &versioned_topic(topic), message) {
                tracing::error!(%err, topic, "unable to publish message");
            }
        }
        self.status_msg_id += 1;
    }

    fn publish_event(&mut self, text: &str) {
        let message = compose_event(MODULE, self.status_msg_id, text);
        self.publish_message(topics::EVENTS_SPEC, &message);
    }

    fn publish_error(&mut self) {
        let text = std::mem::take(&mut self.last_error);
        let message = compose_error(MODULE, self.status_msg_id, &text);
        self.publish_message(topics::EVENTS_SPEC, &message);
    }
}

pub mod states {
    use super::*;

    pub const START: State<SpecStatus> = State {
        id: 100,
        description: "start",
        action: actions::start,
    };
    pub const CREATE_CONTEXT: State<SpecStatus> = State {
        id: 110,
        description: "create context",
        action: actions::create_context,
    };
    pub const CREATE_SOCKETS: State<SpecStatus> = State {
        id: 120,
        description: "create sockets",
        action: actions::create_sockets,
    };
    pub const APPLY_CONFIG: State<SpecStatus> = State {
        id: 130,
        description: "apply config",
        action: actions::apply_config,
    };
    pub const PUBLISH_STATUS: State<SpecStatus> = State {
        id: 200,
        description: "publish status",
        action: actions::publish_status,
    };
    pub const PUBLISH_DATA: State<SpecStatus> = State {
        id: 210,
        description: "publish data",
        action: actions::publish_data,
    };
    pub const RECEIVE_COMMANDS: State<SpecStatus> = State {
        id: 220,
        description: "receive commands",
        action: actions::receive_commands,
    };
    pub const READ_SOCKET: State<SpecStatus> = State {
        id: 230,
        description: "read socket",
        action: actions::read_socket,
    };
    pub const CLOSE_SOCKETS: State<SpecStatus> = State {
        id: 800,
        description: "close sockets",
        action: actions::close_sockets,
    };
    pub const DESTROY_CONTEXT: State<SpecStatus> = State {
        id: 810,
        description: "destroy context",
        action: actions::destroy_context,
    };
    pub const STOP: State<SpecStatus> = State {
        id: 899,
        description: "stop",
        action: actions::stop,
    };
    pub const COMMUNICATION_ERROR: State<SpecStatus> = State {
        id: 900,
        description: "communication error",
        action: actions::communication_error,
    };
    pub const PARSE_ERROR: State<SpecStatus> = State {
        id: 910,
        description: "parse error",
        action: actions::parse_error,
    };
    pub const CONFIGURE_ERROR: State<SpecStatus> = State {
        id: 920,
        description: "configure error",
        action: actions::configure_error,
    };
}

mod actions {
    use super::*;

    pub fn start(_status: &mut SpecStatus) -> State<SpecStatus> {
        states::CREATE_CONTEXT
    }

    pub fn create_context(status: &mut SpecStatus) -> State<SpecStatus> {
        status.context = Some(zmq::Context::new());
        states::CREATE_SOCKETS
    }

    pub fn create_sockets(status: &mut SpecStatus) -> State<SpecStatus> {
        let Some(context) = status.context.clone() else {
            status.last_error = "no transport context".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let sockets = (|| -> Result<_, abcd_transport::TransportError> {
            let status_socket = socket::publisher(&context, &status.config.status_address)?;
            let data_socket = socket::publisher(&context, &status.config.data_address)?;
            let commands_socket = socket::puller(&context, &status.config.commands_address)?;
            let abcd_data_socket = socket::subscriber(
                &context,
                &status.config.abcd_data_address,
                &[topics::DATA_ABCD_EVENTS],
            )?;
            Ok((status_socket, data_socket, commands_socket, abcd_data_socket))
        })();

        match sockets {
            Ok((status_socket, data_socket, commands_socket, abcd_data_socket)) => {
                status.status_socket = Some(status_socket);
                status.data_socket = Some(data_socket);
                status.commands_socket = Some(commands_socket);
                status.abcd_data_socket = Some(abcd_data_socket);
                states::APPLY_CONFIG
            }
            Err(err) => {
                status.last_error = format!("socket creation: {err}");
                states::COMMUNICATION_ERROR
            }
        }
    }

    pub fn apply_config(status: &mut SpecStatus) -> State<SpecStatus> {
        if let Err(err) = Histogram::from_config(&status.config.energy)
            .map(drop)
            .and_then(|()| Histogram2D::from_config(&status.config.psd).map(drop))
        {
            status.last_error = format!("configuration: {err}");
            return states::CONFIGURE_ERROR;
        }

        status.spectra.reconfigure(status.config.energy, status.config.psd);
        status.publish_event("Configuration applied");
        states::PUBLISH_STATUS
    }

    pub fn publish_status(status: &mut SpecStatus) -> State<SpecStatus> {
        let elapsed = status.last_publication.elapsed().as_secs_f64();

        let mut message = compose_status(MODULE, status.status_msg_id);
        message["statuses"] = json!(status.spectra.statuses_json(elapsed));
        message["active_channels"] =
            json!(status.spectra.channels().map(|(id, _)| id).collect::<Vec<_>>());
        message["config"] = serde_json::to_value(&status.config).unwrap_or(Value::Null);

        status.publish_message(topics::STATUS_SPEC, &message);

        status.spectra.reset_partial_counts();

        // Scaling right after the publication so the counts in between two
        // publications are not decaying.
        if status.config.time_decay.enable {
            status.spectra.apply_decay(
                elapsed,
                status.config.time_decay.tau,
                status.config.time_decay.counts_minimum,
            );
        }

        states::PUBLISH_DATA
    }

    pub fn publish_data(status: &mut SpecStatus) -> State<SpecStatus> {
        let elapsed = status.last_publication.elapsed().as_secs_f64();

        let mut message = compose_status(MODULE, status.data_msg_id);
        message["data"] = json!(status.spectra.data_json(elapsed));
        message["active_channels"] =
            json!(status.spectra.channels().map(|(id, _)| id).collect::<Vec<_>>());
        status.data_msg_id += 1;

        if let Some(socket) = &status.data_socket {
            if let Err(err) = send_json(socket, &versioned_topic(topics::DATA_SPEC_HISTOGRAMS), &message) {
                tracing::error!(%err, "unable to publish histograms");
            }
        }

        status.last_publication = Instant::now();
        states::RECEIVE_COMMANDS
    }

    pub fn receive_commands(status: &mut SpecStatus) -> State<SpecStatus> {
        if should_terminate() {
            return states::CLOSE_SOCKETS;
        }

        let Some(socket) = &status.commands_socket else {
            status.last_error = "no commands socket".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let message = match receive_json(socket) {
            Ok(message) => message,
            Err(err) => {
                status.last_error = format!("command: {err}");
                return states::PARSE_ERROR;
            }
        };

        match command_of(&message) {
            Some("reset") => {
                let channel = arguments_of(&message).and_then(|arguments| arguments.get("channel"));
                match channel {
                    Some(Value::Number(number)) => {
                        if let Some(id) = number.as_u64().filter(|&id| id <= u64::from(u8::MAX)) {
                            status.spectra.reset(Some(id as u8));
                            status.publish_event(&format!("Reset of channel {id}"));
                        }
                    }
                    _ => {
                        status.spectra.reset(None);
                        status.publish_event("Reset of all channels");
                    }
                }
                states::READ_SOCKET
            }
            Some("reconfigure") => {
                let config = arguments_of(&message).and_then(|arguments| arguments.get("config"));
                match config.map(|config| serde_json::from_value(config.clone())) {
                    Some(Ok(config)) => {
                        status.config = config;
                        status.publish_event("Special command: reconfigure");
                        states::APPLY_CONFIG
                    }
                    _ => {
                        status.last_error = "invalid reconfigure arguments".to_string();
                        states::PARSE_ERROR
                    }
                }
            }
            Some("quit") => {
                status.publish_event("Quitting");
                states::CLOSE_SOCKETS
            }
            _ => states::READ_SOCKET,
        }
    }

    pub fn read_socket(status: &mut SpecStatus) -> State<SpecStatus> {
        let Some(socket) = status.abcd_data_socket.take() else {
            status.last_error = "no data socket".to_string();
            return states::COMMUNICATION_ERROR;
        };

        loop {
            match receive_framed(&socket, true) {
                Ok(Some(frame)) => {
                    let topic = frame.topic.as_deref().unwrap_or_default();
                    if topic.starts_with(topics::DATA_ABCD_EVENTS) {
                        let events = decode_psd_events(&frame.payload);
                        status.spectra.fill_batch(&events);
                        tracing::debug!(events = events.len(), "accumulated batch");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    status.abcd_data_socket = Some(socket);
                    status.last_error = format!("data receive: {err}");
                    return states::COMMUNICATION_ERROR;
                }
            }
        }

        status.abcd_data_socket = Some(socket);

        if status.last_publication.elapsed() > status.publish_period() {
            states::PUBLISH_STATUS
        } else {
            states::RECEIVE_COMMANDS
        }
    }

    pub fn close_sockets(status: &mut SpecStatus) -> State<SpecStatus> {
        status.publish_event("Closing the sockets");
        status.status_socket = None;
        status.data_socket = None;
        status.commands_socket = None;
        status.abcd_data_socket = None;
        states::DESTROY_CONTEXT
    }

    pub fn destroy_context(status: &mut SpecStatus) -> State<SpecStatus> {
        status.context = None;
        states::STOP
    }

    pub fn stop(_status: &mut SpecStatus) -> State<SpecStatus> {
        states::STOP
    }

    pub fn communication_error(status: &mut SpecStatus) -> State<SpecStatus> {
        tracing::error!(error = %status.last_error, "communication error");
        status.publish_error();
        states::CLOSE_SOCKETS
    }

    pub fn parse_error(status: &mut SpecStatus) -> State<SpecStatus> {
        tracing::warn!(error = %status.last_error, "parse error");
        status.publish_error();
        states::READ_SOCKET
    }

    pub fn configure_error(status: &mut SpecStatus) -> State<SpecStatus> {
        tracing::warn!(error = %status.last_error, "configure error");
        status.publish_error();
        // The previous spectra stay in place.
        states::RECEIVE_COMMANDS
    }
}

/// Drive the module until its terminal state.
pub fn run(config: SpecConfig, base_period: Duration) -> u32 {
    if let Err(err) = abcd_common::install_signal_handlers() {
        tracing::error!(%err, "unable to install the signal handlers");
    }
    let mut status = SpecStatus::new(config);
    abcd_common::run_machine(&mut status, states::START, states::STOP.id, base_period)
}
