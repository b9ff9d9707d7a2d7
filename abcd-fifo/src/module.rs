// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The fifo module: retention and the reply loop wired to the bus.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use abcd_binary_fifo::BinaryFifo;
use abcd_common::machine::State;
use abcd_common::message::{command_of, compose_error, compose_event, compose_status};
use abcd_common::{should_terminate, topics};
use abcd_transport::framing::{receive_framed, receive_json, send_framed, send_json};
use abcd_transport::{socket, versioned_topic};

use crate::config::FifoConfig;
use crate::responder::handle_request;

const MODULE: &str = "fifo";

pub struct FifoStatus {
    pub config: FifoConfig,
    context: Option<zmq::Context>,
    status_socket: Option<zmq::Socket>,
    reply_socket: Option<zmq::Socket>,
    commands_socket: Option<zmq::Socket>,
    abcd_data_socket: Option<zmq::Socket>,
    status_msg_id: u64,
    reply_msg_id: u64,
    last_publication: Instant,
    fifo: BinaryFifo,
    last_error: String,
}

impl FifoStatus {
    pub fn new(config: FifoConfig) -> Self {
        let fifo = BinaryFifo::new(Duration::from_secs(config.expiration_time_secs));
        FifoStatus {
            config,
            context: None,
            status_socket: None,
            reply_socket: None,
            commands_socket: None,
            abcd_data_socket: None,
            status_msg_id: 0,
            reply_msg_id: 0,
            last_publication: Instant::now(),
            fifo,
            last_error: String::new(),
        }
    }

    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    pub fn fifo(&self) -> &BinaryFifo {
        &self.fifo
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
        self.publish_message(topics::EVENTS_FIFO, &message);
    }

    fn publish_error(&mut self) {
        let text = std::mem::take(&mut self.last_error);
        let message = compose_error(MODULE, self.status_msg_id, &text);
        self.publish_message(topics::EVENTS_FIFO, &message);
    }
}

pub mod states {
    use super::*;

    pub const START: State<FifoStatus> = State {
        id: 100,
        description: "start",
        action: actions::start,
    };
    pub const CREATE_CONTEXT: State<FifoStatus> = State {
        id: 110,
        description: "create context",
        action: actions::create_context,
    };
    pub const CREATE_SOCKETS: State<FifoStatus> = State {
        id: 120,
        description: "create sockets",
        action: actions::create_sockets,
    };
    pub const PUBLISH_STATUS: State<FifoStatus> = State {
        id: 200,
        description: "publish status",
        action: actions::publish_status,
    };
    pub const RECEIVE_COMMANDS: State<FifoStatus> = State {
        id: 210,
        description: "receive commands",
        action: actions::receive_commands,
    };
    pub const READ_SOCKET: State<FifoStatus> = State {
        id: 220,
        description: "read socket",
        action: actions::read_socket,
    };
    pub const REPLY_REQUESTS: State<FifoStatus> = State {
        id: 230,
        description: "reply requests",
        action: actions::reply_requests,
    };
    pub const CLOSE_SOCKETS: State<FifoStatus> = State {
        id: 800,
        description: "close sockets",
        action: actions::close_sockets,
    };
    pub const DESTROY_CONTEXT: State<FifoStatus> = State {
        id: 810,
        description: "destroy context",
        action: actions::destroy_context,
    };
    pub const STOP: State<FifoStatus> = State {
        id: 899,
        description: "stop",
        action: actions::stop,
    };
    pub const COMMUNICATION_ERROR: State<FifoStatus> = State {
        id: 900,
        description: "communication error",
        action: actions::communication_error,
    };
    pub const PARSE_ERROR: State<FifoStatus> = State {
        id: 910,
        description: "parse error",
        action: actions::parse_error,
    };
}

mod actions {
    use super::*;

    pub fn start(_status: &mut FifoStatus) -> State<FifoStatus> {
        states::CREATE_CONTEXT
    }

    pub fn create_context(status: &mut FifoStatus) -> State<FifoStatus> {
        status.context = Some(zmq::Context::new());
        states::CREATE_SOCKETS
    }

    pub fn create_sockets(status: &mut FifoStatus) -> State<FifoStatus> {
        let Some(context) = status.context.clone() else {
            status.last_error = "no transport context".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let sockets = (|| -> Result<_, abcd_transport::TransportError> {
            let status_socket = socket::publisher(&context, &status.config.status_address)?;
            let reply_socket = socket::replier(&context, &status.config.reply_address)?;
            let commands_socket = socket::puller(&context, &status.config.commands_address)?;
            let abcd_data_socket = socket::subscriber(
                &context,
                &status.config.abcd_data_address,
                &[topics::DATA_ABCD_EVENTS],
            )?;
            Ok((status_socket, reply_socket, commands_socket, abcd_data_socket))
        })();

        match sockets {
            Ok((status_socket, reply_socket, commands_socket, abcd_data_socket)) => {
                status.status_socket = Some(status_socket);
                status.reply_socket = Some(reply_socket);
                status.commands_socket = Some(commands_socket);
                status.abcd_data_socket = Some(abcd_data_socket);
                states::PUBLISH_STATUS
            }
            Err(err) => {
                status.last_error = format!("socket creation: {err}");
                states::COMMUNICATION_ERROR
            }
        }
    }

    pub fn publish_status(status: &mut FifoStatus) -> State<FifoStatus> {
        status.fifo.update();

        let mut message = compose_status(MODULE, status.status_msg_id);
        message["count"] = json!(status.fifo.count());
        message["size"] = json!(status.fifo.size());
        message["expiration_time"] = json!(status.config.expiration_time_secs);

        status.publish_message(topics::STATUS_FIFO, &message);
        status.last_publication = Instant::now();

        states::RECEIVE_COMMANDS
    }

    pub fn receive_commands(status: &mut FifoStatus) -> State<FifoStatus> {
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
            Some("quit") => {
                status.publish_event("Quitting");
                states::CLOSE_SOCKETS
            }
            _ => states::READ_SOCKET,
        }
    }

    pub fn read_socket(status: &mut FifoStatus) -> State<FifoStatus> {
        let Some(socket) = status.abcd_data_socket.take() else {
            status.last_error = "no data socket".to_string();
            return states::COMMUNICATION_ERROR;
        };

        loop {
            match receive_framed(&socket, true) {
                Ok(Some(frame)) => {
                    let topic = frame.topic.as_deref().unwrap_or_default();
                    if topic.starts_with(topics::DATA_ABCD_EVENTS) {
                        status.fifo.push(frame.payload);
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
        status.fifo.update();

        states::REPLY_REQUESTS
    }

    pub fn reply_requests(status: &mut FifoStatus) -> State<FifoStatus> {
        let Some(socket) = status.reply_socket.take() else {
            status.last_error = "no reply socket".to_string();
            return states::COMMUNICATION_ERROR;
        };

        // One request per tick: a reply socket must answer before it can
        // receive again.
        let next = match receive_framed(&socket, false) {
            Ok(Some(frame)) => {
                let request: Value = serde_json::from_slice(&frame.payload).unwrap_or(Value::Null);
                let reply = handle_request(&mut status.fifo, &request, status.reply_msg_id);
                status.reply_msg_id += 1;

                let payload = serde_json::to_vec(&reply).unwrap_or_default();
                match send_framed(&socket, "", &payload) {
                    Ok(()) => None,
                    Err(err) => {
                        status.last_error = format!("reply send: {err}");
                        Some(states::COMMUNICATION_ERROR)
                    }
                }
            }
            Ok(None) => None,
            Err(err) => {
                status.last_error = format!("request receive: {err}");
                Some(states::COMMUNICATION_ERROR)
            }
        };

        status.reply_socket = Some(socket);

        if let Some(state) = next {
            return state;
        }

        if status.last_publication.elapsed() > status.publish_period() {
            states::PUBLISH_STATUS
        } else {
            states::RECEIVE_COMMANDS
        }
    }

    pub fn close_sockets(status: &mut FifoStatus) -> State<FifoStatus> {
        status.publish_event("Closing the sockets");
        status.status_socket = None;
        status.reply_socket = None;
        status.commands_socket = None;
        status.abcd_data_socket = None;
        states::DESTROY_CONTEXT
    }

    pub fn destroy_context(status: &mut FifoStatus) -> State<FifoStatus> {
        status.context = None;
        states::STOP
    }

    pub fn stop(_status: &mut FifoStatus) -> State<FifoStatus> {
        states::STOP
    }

    pub fn communication_error(status: &mut FifoStatus) -> State<FifoStatus> {
        tracing::error!(error = %status.last_error, "communication error");
        status.publish_error();
        states::CLOSE_SOCKETS
    }

    pub fn parse_error(status: &mut FifoStatus) -> State<FifoStatus> {
        tracing::warn!(error = %status.last_error, "parse error");
        status.publish_error();
        states::READ_SOCKET
    }
}

/// Drive the module until its terminal state.
pub fn run(config: FifoConfig, base_period: Duration) -> u32 {
    if let Err(err) = abcd_common::install_signal_handlers() {
        tracing::error!(%err, "unable to install the signal handlers");
    }
    let mut status = FifoStatus::new(config);
    abcd_common::run_machine(&mut status, states::START, states::STOP.id, base_period)
}
