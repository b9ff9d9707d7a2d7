// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The session state graph.
//!
//! `create_context → create_sockets → read_config → create_digitizer →
//! configure_digitizer → allocate_memory → publish_status ⇄
//! receive_commands`; `start` enters the acquisition inner loop,
//! `stop` unwinds it, and acquisition errors route through the restart
//! sub-graph, which destroys and recreates the device without dropping
//! the transport context.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use abcd_common::machine::State;
use abcd_common::message::{arguments_of, command_of, compose_error, compose_event, compose_status};
use abcd_common::{should_terminate, topics};
use abcd_events::{encode_waveforms, Waveform};
use abcd_transport::framing::{receive_json, send_framed, send_json};
use abcd_transport::{data_topic, socket, versioned_topic};

use crate::config::SessionConfig;
use crate::device::{Capture, Digitizer};

const MODULE: &str = "abcd";

/// Creates the vendor device; invoked at initialization and again by the
/// restart sub-graph after the previous device was destroyed.
pub type DigitizerFactory = Box<dyn FnMut(&SessionConfig) -> Box<dyn Digitizer>>;

pub struct SessionStatus {
    pub config: SessionConfig,
    factory: DigitizerFactory,
    digitizer: Option<Box<dyn Digitizer>>,
    context: Option<zmq::Context>,
    status_socket: Option<zmq::Socket>,
    data_socket: Option<zmq::Socket>,
    commands_socket: Option<zmq::Socket>,
    status_msg_id: u64,
    data_msg_id: u64,
    last_status_publication: Instant,
    last_events_publication: Instant,
    waveforms_buffer: Vec<Waveform>,
    counts_total: BTreeMap<u8, u64>,
    counts_partial: BTreeMap<u8, u64>,
    acquiring: bool,
    quit_requested: bool,
    restart_to_acquisition: bool,
    last_error: String,
}

impl SessionStatus {
    pub fn new(config: SessionConfig, factory: DigitizerFactory) -> Self {
        SessionStatus {
            config,
            factory,
            digitizer: None,
            context: None,
            status_socket: None,
            data_socket: None,
            commands_socket: None,
            status_msg_id: 0,
            data_msg_id: 0,
            last_status_publication: Instant::now(),
            last_events_publication: Instant::now(),
            waveforms_buffer: Vec::new(),
            counts_total: BTreeMap::new(),
            counts_partial: BTreeMap::new(),
            acquiring: false,
            quit_requested: false,
            restart_to_acquisition: false,
            last_error: String::new(),
        }
    }

    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    pub fn acquiring(&self) -> bool {
        self.acquiring
    }

    pub fn has_digitizer(&self) -> bool {
        self.digitizer.is_some()
    }

    pub fn buffered_waveforms(&self) -> usize {
        self.waveforms_buffer.len()
    }

    pub fn counts_total(&self) -> &BTreeMap<u8, u64> {
        &self.counts_total
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
        self.publish_message(topics::EVENTS_ABCD, &message);
    }

    fn publish_error(&mut self) {
        let text = std::mem::take(&mut self.last_error);
        let message = compose_error(MODULE, self.status_msg_id, &text);
        self.publish_message(topics::EVENTS_ABCD, &message);
    }

    /// Append one fetched capture to the waveform buffer, converting the
    /// signed device counts to the unsigned wire scale.
    fn buffer_capture(&mut self, capture: Capture) {
        if !self.config.channel_enabled(capture.channel) {
            return;
        }

        let mut waveform = Waveform {
            timestamp: capture.timestamp,
            channel: capture.channel,
            samples: Vec::with_capacity(capture.samples.len()),
            gates: capture.gates,
        };
        for sample in capture.samples {
            waveform.samples.push((sample as i32 + (1 << 15)) as u16);
        }
        self.waveforms_buffer.push(waveform);

        *self.counts_total.entry(capture.channel).or_insert(0) += 1;
        *self.counts_partial.entry(capture.channel).or_insert(0) += 1;
    }

    /// Serialize and publish the buffered waveforms as one payload.
    fn publish_buffered_events(&mut self) {
        if !self.waveforms_buffer.is_empty() {
            let payload = encode_waveforms(&self.waveforms_buffer);
            let topic = data_topic(topics::DATA_ABCD_WAVEFORMS, payload.len());
            if let Some(socket) = &self.data_socket {
                if let Err(err) = send_framed(socket, &topic, &payload) {
                    tracing::error!(%err, "unable to publish waveforms");
                }
            }
            tracing::debug!(
                waveforms = self.waveforms_buffer.len(),
                payload = payload.len(),
                "published waveforms"
            );
            self.data_msg_id += 1;
            self.waveforms_buffer.clear();
        }
        self.last_events_publication = Instant::now();
    }

    fn destroy_digitizer(&mut self) {
        if let Some(mut digitizer) = self.digitizer.take() {
            digitizer.close();
        }
        self.acquiring = false;
    }
}

pub mod states {
    use super::*;

    // Initialization
    pub const START: State<SessionStatus> = State {
        id: 100,
        description: "start",
        action: actions::start,
    };
    pub const CREATE_CONTEXT: State<SessionStatus> = State {
        id: 110,
        description: "create context",
        action: actions::create_context,
    };
    pub const CREATE_SOCKETS: State<SessionStatus> = State {
        id: 120,
        description: "create sockets",
        action: actions::create_sockets,
    };
    pub const READ_CONFIG: State<SessionStatus> = State {
        id: 130,
        description: "read config",
        action: actions::read_config,
    };
    pub const CREATE_DIGITIZER: State<SessionStatus> = State {
        id: 140,
        description: "create digitizer",
        action: actions::create_digitizer,
    };
    pub const CONFIGURE_DIGITIZER: State<SessionStatus> = State {
        id: 150,
        description: "configure digitizer",
        action: actions::configure_digitizer,
    };
    pub const ALLOCATE_MEMORY: State<SessionStatus> = State {
        id: 160,
        description: "allocate memory",
        action: actions::allocate_memory,
    };

    // Idle loop
    pub const PUBLISH_STATUS: State<SessionStatus> = State {
        id: 200,
        description: "publish status",
        action: actions::publish_status,
    };
    pub const RECEIVE_COMMANDS: State<SessionStatus> = State {
        id: 210,
        description: "receive commands",
        action: actions::receive_commands,
    };

    // Acquisition inner loop
    pub const START_ACQUISITION: State<SessionStatus> = State {
        id: 220,
        description: "start acquisition",
        action: actions::start_acquisition,
    };
    pub const ACQUISITION_RECEIVE_COMMANDS: State<SessionStatus> = State {
        id: 230,
        description: "acquisition receive commands",
        action: actions::acquisition_receive_commands,
    };
    pub const ADD_TO_BUFFER: State<SessionStatus> = State {
        id: 240,
        description: "add to buffer",
        action: actions::add_to_buffer,
    };
    pub const PUBLISH_EVENTS: State<SessionStatus> = State {
        id: 250,
        description: "publish events",
        action: actions::publish_events,
    };
    pub const ACQUISITION_PUBLISH_STATUS: State<SessionStatus> = State {
        id: 260,
        description: "acquisition publish status",
        action: actions::acquisition_publish_status,
    };
    pub const STOP_PUBLISH_EVENTS: State<SessionStatus> = State {
        id: 270,
        description: "stop publish events",
        action: actions::stop_publish_events,
    };
    pub const STOP_ACQUISITION: State<SessionStatus> = State {
        id: 280,
        description: "stop acquisition",
        action: actions::stop_acquisition,
    };

    // Reconfiguration
    pub const RECONFIGURE_CLEAR_MEMORY: State<SessionStatus> = State {
        id: 300,
        description: "reconfigure clear memory",
        action: actions::reconfigure_clear_memory,
    };
    pub const RECONFIGURE_DESTROY_DIGITIZER: State<SessionStatus> = State {
        id: 310,
        description: "reconfigure destroy digitizer",
        action: actions::reconfigure_destroy_digitizer,
    };

    // Shutdown
    pub const CLEAR_MEMORY: State<SessionStatus> = State {
        id: 800,
        description: "clear memory",
        action: actions::clear_memory,
    };
    pub const DESTROY_DIGITIZER: State<SessionStatus> = State {
        id: 810,
        description: "destroy digitizer",
        action: actions::destroy_digitizer,
    };
    pub const CLOSE_SOCKETS: State<SessionStatus> = State {
        id: 820,
        description: "close sockets",
        action: actions::close_sockets,
    };
    pub const DESTROY_CONTEXT: State<SessionStatus> = State {
        id: 830,
        description: "destroy context",
        action: actions::destroy_context,
    };
    pub const STOP: State<SessionStatus> = State {
        id: 899,
        description: "stop",
        action: actions::stop,
    };

    // Errors and the restart sub-graph
    pub const COMMUNICATION_ERROR: State<SessionStatus> = State {
        id: 900,
        description: "communication error",
        action: actions::communication_error,
    };
    pub const PARSE_ERROR: State<SessionStatus> = State {
        id: 905,
        description: "parse error",
        action: actions::parse_error,
    };
    pub const CONFIGURE_ERROR: State<SessionStatus> = State {
        id: 910,
        description: "configure error",
        action: actions::configure_error,
    };
    pub const DIGITIZER_ERROR: State<SessionStatus> = State {
        id: 915,
        description: "digitizer error",
        action: actions::digitizer_error,
    };
    pub const ACQUISITION_ERROR: State<SessionStatus> = State {
        id: 920,
        description: "acquisition error",
        action: actions::acquisition_error,
    };
    pub const RESTART_PUBLISH_EVENTS: State<SessionStatus> = State {
        id: 930,
        description: "restart publish events",
        action: actions::restart_publish_events,
    };
    pub const RESTART_STOP_ACQUISITION: State<SessionStatus> = State {
        id: 935,
        description: "restart stop acquisition",
        action: actions::restart_stop_acquisition,
    };
    pub const RESTART_CLEAR_MEMORY: State<SessionStatus> = State {
        id: 940,
        description: "restart clear memory",
        action: actions::restart_clear_memory,
    };
    pub const RESTART_DESTROY_DIGITIZER: State<SessionStatus> = State {
        id: 945,
        description: "restart destroy digitizer",
        action: actions::restart_destroy_digitizer,
    };
    pub const RESTART_CREATE_DIGITIZER: State<SessionStatus> = State {
        id: 950,
        description: "restart create digitizer",
        action: actions::restart_create_digitizer,
    };
    pub const RESTART_CONFIGURE_DIGITIZER: State<SessionStatus> = State {
        id: 955,
        description: "restart configure digitizer",
        action: actions::restart_configure_digitizer,
    };
    pub const RESTART_ALLOCATE_MEMORY: State<SessionStatus> = State {
        id: 960,
        description: "restart allocate memory",
        action: actions::restart_allocate_memory,
    };
}

mod actions {
    use super::*;

    pub fn start(_status: &mut SessionStatus) -> State<SessionStatus> {
        states::CREATE_CONTEXT
    }

    pub fn create_context(status: &mut SessionStatus) -> State<SessionStatus> {
        status.context = Some(zmq::Context::new());
        states::CREATE_SOCKETS
    }

    pub fn create_sockets(status: &mut SessionStatus) -> State<SessionStatus> {
        let Some(context) = status.context.clone() else {
            status.last_error = "no transport context".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let sockets = (|| -> Result<_, abcd_transport::TransportError> {
            let status_socket = socket::publisher(&context, &status.config.status_address)?;
            let data_socket = socket::publisher(&context, &status.config.data_address)?;
            let commands_socket = socket::puller(&context, &status.config.commands_address)?;
            Ok((status_socket, data_socket, commands_socket))
        })();

        match sockets {
            Ok((status_socket, data_socket, commands_socket)) => {
                status.status_socket = Some(status_socket);
                status.data_socket = Some(data_socket);
                status.commands_socket = Some(commands_socket);
                states::READ_CONFIG
            }
            Err(err) => {
                status.last_error = format!("socket creation: {err}");
                states::COMMUNICATION_ERROR
            }
        }
    }

    pub fn read_config(status: &mut SessionStatus) -> State<SessionStatus> {
        if status.config.events_buffer_max_size == 0 {
            status.last_error = "events_buffer_max_size cannot be zero".to_string();
            return states::CONFIGURE_ERROR;
        }
        states::CREATE_DIGITIZER
    }

    pub fn create_digitizer(status: &mut SessionStatus) -> State<SessionStatus> {
        let mut digitizer = (status.factory)(&status.config);
        match digitizer.open() {
            Ok(()) => {
                status.digitizer = Some(digitizer);
                status.publish_event("Digitizer opened");
                states::CONFIGURE_DIGITIZER
            }
            Err(err) => {
                status.last_error = format!("digitizer open: {err}");
                states::DIGITIZER_ERROR
            }
        }
    }

    pub fn configure_digitizer(status: &mut SessionStatus) -> State<SessionStatus> {
        let digitizer_config = status.config.digitizer.clone();
        let Some(digitizer) = &mut status.digitizer else {
            status.last_error = "no digitizer to configure".to_string();
            return states::DIGITIZER_ERROR;
        };
        match digitizer.configure(&digitizer_config) {
            Ok(()) => states::ALLOCATE_MEMORY,
            Err(err) => {
                status.last_error = format!("digitizer configure: {err}");
                states::CONFIGURE_ERROR
            }
        }
    }

    pub fn allocate_memory(status: &mut SessionStatus) -> State<SessionStatus> {
        let max = status.config.events_buffer_max_size;
        status.waveforms_buffer = Vec::with_capacity(max + max / 10);
        states::PUBLISH_STATUS
    }

    pub fn publish_status(status: &mut SessionStatus) -> State<SessionStatus> {
        let elapsed = status.last_status_publication.elapsed().as_secs_f64();

        let mut statuses = Vec::new();
        for (&channel, &total) in &status.counts_total {
            let partial = status.counts_partial.get(&channel).copied().unwrap_or(0);
            statuses.push(json!({
                "id": channel,
                "enabled": status.config.channel_enabled(channel),
                "rate": partial as f64 / elapsed,
                "counts": total,
            }));
        }

        let mut message = compose_status(MODULE, status.status_msg_id);
        message["digitizer_active"] = json!(status.digitizer.is_some());
        message["acquiring"] = json!(status.acquiring);
        message["statuses"] = json!(statuses);
        message["events_buffer_size"] = json!(status.waveforms_buffer.len());
        message["config"] = serde_json::to_value(&status.config).unwrap_or(Value::Null);

        status.publish_message(topics::STATUS_ABCD, &message);
        for partial in status.counts_partial.values_mut() {
            *partial = 0;
        }
        status.last_status_publication = Instant::now();

        states::RECEIVE_COMMANDS
    }

    pub fn receive_commands(status: &mut SessionStatus) -> State<SessionStatus> {
        if should_terminate() || status.quit_requested {
            return states::CLEAR_MEMORY;
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

        let next = match command_of(&message) {
            Some("start") => {
                if status.digitizer.is_some() {
                    return states::START_ACQUISITION;
                }
                status.last_error = "start requested without a digitizer".to_string();
                states::DIGITIZER_ERROR
            }
            Some("reconfigure") => {
                let config = arguments_of(&message).and_then(|arguments| arguments.get("config"));
                match config.map(|config| serde_json::from_value(config.clone())) {
                    Some(Ok(config)) => {
                        status.config = config;
                        status.publish_event("Special command: reconfigure");
                        states::RECONFIGURE_CLEAR_MEMORY
                    }
                    _ => {
                        status.last_error = "invalid reconfigure arguments".to_string();
                        states::PARSE_ERROR
                    }
                }
            }
            Some("off") => {
                status.publish_event("Turning the digitizer off");
                status.destroy_digitizer();
                states::PUBLISH_STATUS
            }
            Some("quit") => {
                status.publish_event("Quitting");
                states::CLEAR_MEMORY
            }
            _ => {
                if status.last_status_publication.elapsed() > status.publish_period() {
                    states::PUBLISH_STATUS
                } else {
                    states::RECEIVE_COMMANDS
                }
            }
        };
        next
    }

    pub fn start_acquisition(status: &mut SessionStatus) -> State<SessionStatus> {
        let Some(digitizer) = &mut status.digitizer else {
            status.last_error = "no digitizer to start".to_string();
            return states::DIGITIZER_ERROR;
        };
        match digitizer.start() {
            Ok(()) => {
                status.acquiring = true;
                status.last_events_publication = Instant::now();
                status.publish_event("Start acquisition");
                states::ACQUISITION_RECEIVE_COMMANDS
            }
            Err(err) => {
                status.last_error = format!("acquisition start: {err}");
                states::ACQUISITION_ERROR
            }
        }
    }

    pub fn acquisition_receive_commands(status: &mut SessionStatus) -> State<SessionStatus> {
        if should_terminate() {
            status.quit_requested = true;
            return states::STOP_PUBLISH_EVENTS;
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
            Some("stop") => states::STOP_PUBLISH_EVENTS,
            Some("quit") => {
                status.quit_requested = true;
                states::STOP_PUBLISH_EVENTS
            }
            _ => states::ADD_TO_BUFFER,
        }
    }

    pub fn add_to_buffer(status: &mut SessionStatus) -> State<SessionStatus> {
        let Some(mut digitizer) = status.digitizer.take() else {
            status.last_error = "no digitizer to poll".to_string();
            return states::DIGITIZER_ERROR;
        };

        let polled = digitizer.poll().and_then(|ready| {
            if ready {
                digitizer.fetch().map(Some)
            } else {
                Ok(None)
            }
        });
        status.digitizer = Some(digitizer);

        match polled {
            Ok(Some(captures)) => {
                for capture in captures {
                    status.buffer_capture(capture);
                }
            }
            Ok(None) => {}
            Err(err) => {
                status.last_error = format!("readout: {err}");
                return states::ACQUISITION_ERROR;
            }
        }

        let high_water = status.waveforms_buffer.len() >= status.config.events_buffer_max_size;
        if high_water || status.last_events_publication.elapsed() > status.publish_period() {
            states::PUBLISH_EVENTS
        } else {
            states::ACQUISITION_RECEIVE_COMMANDS
        }
    }

    pub fn publish_events(status: &mut SessionStatus) -> State<SessionStatus> {
        status.publish_buffered_events();
        states::ACQUISITION_PUBLISH_STATUS
    }

    pub fn acquisition_publish_status(status: &mut SessionStatus) -> State<SessionStatus> {
        if status.last_status_publication.elapsed() > status.publish_period() {
            let next = publish_status(status);
            debug_assert_eq!(next, states::RECEIVE_COMMANDS);
        }
        states::ACQUISITION_RECEIVE_COMMANDS
    }

    pub fn stop_publish_events(status: &mut SessionStatus) -> State<SessionStatus> {
        status.publish_buffered_events();
        states::STOP_ACQUISITION
    }

    pub fn stop_acquisition(status: &mut SessionStatus) -> State<SessionStatus> {
        if let Some(digitizer) = &mut status.digitizer {
            if let Err(err) = digitizer.stop() {
                tracing::error!(%err, "unable to stop the acquisition");
            }
        }
        status.acquiring = false;
        status.publish_event("Stop acquisition");
        states::RECEIVE_COMMANDS
    }

    pub fn reconfigure_clear_memory(status: &mut SessionStatus) -> State<SessionStatus> {
        status.waveforms_buffer.clear();
        states::RECONFIGURE_DESTROY_DIGITIZER
    }

    pub fn reconfigure_destroy_digitizer(status: &mut SessionStatus) -> State<SessionStatus> {
        status.destroy_digitizer();
        states::CREATE_DIGITIZER
    }

    pub fn clear_memory(status: &mut SessionStatus) -> State<SessionStatus> {
        status.waveforms_buffer.clear();
        status.waveforms_buffer.shrink_to_fit();
        states::DESTROY_DIGITIZER
    }

    pub fn destroy_digitizer(status: &mut SessionStatus) -> State<SessionStatus> {
        status.destroy_digitizer();
        states::CLOSE_SOCKETS
    }

    pub fn close_sockets(status: &mut SessionStatus) -> State<SessionStatus> {
        status.publish_event("Closing the sockets");
        status.status_socket = None;
        status.data_socket = None;
        status.commands_socket = None;
        states::DESTROY_CONTEXT
    }

    pub fn destroy_context(status: &mut SessionStatus) -> State<SessionStatus> {
        status.context = None;
        states::STOP
    }

    pub fn stop(_status: &mut SessionStatus) -> State<SessionStatus> {
        states::STOP
    }

    pub fn communication_error(status: &mut SessionStatus) -> State<SessionStatus> {
        tracing::error!(error = %status.last_error, "communication error");
        status.publish_error();
        states::CLEAR_MEMORY
    }

    pub fn parse_error(status: &mut SessionStatus) -> State<SessionStatus> {
        tracing::warn!(error = %status.last_error, "parse error");
        status.publish_error();
        if status.acquiring {
            states::ACQUISITION_RECEIVE_COMMANDS
        } else {
            states::RECEIVE_COMMANDS
        }
    }

    pub fn configure_error(status: &mut SessionStatus) -> State<SessionStatus> {
        tracing::error!(error = %status.last_error, "configure error");
        status.publish_error();
        status.restart_to_acquisition = false;
        states::RESTART_CLEAR_MEMORY
    }

    pub fn digitizer_error(status: &mut SessionStatus) -> State<SessionStatus> {
        tracing::error!(error = %status.last_error, "digitizer error");
        status.publish_error();
        status.restart_to_acquisition = false;
        states::RESTART_CLEAR_MEMORY
    }

    pub fn acquisition_error(status: &mut SessionStatus) -> State<SessionStatus> {
        tracing::error!(error = %status.last_error, "acquisition error");
        status.publish_error();
        status.restart_to_acquisition = true;
        states::RESTART_PUBLISH_EVENTS
    }

    pub fn restart_publish_events(status: &mut SessionStatus) -> State<SessionStatus> {
        status.publish_buffered_events();
        states::RESTART_STOP_ACQUISITION
    }

    pub fn restart_stop_acquisition(status: &mut SessionStatus) -> State<SessionStatus> {
        if let Some(digitizer) = &mut status.digitizer {
            let _ = digitizer.stop();
        }
        status.acquiring = false;
        states::RESTART_CLEAR_MEMORY
    }

    pub fn restart_clear_memory(status: &mut SessionStatus) -> State<SessionStatus> {
        status.waveforms_buffer.clear();
        states::RESTART_DESTROY_DIGITIZER
    }

    pub fn restart_destroy_digitizer(status: &mut SessionStatus) -> State<SessionStatus> {
        status.destroy_digitizer();
        states::RESTART_CREATE_DIGITIZER
    }

    pub fn restart_create_digitizer(status: &mut SessionStatus) -> State<SessionStatus> {
        if should_terminate() {
            return states::CLEAR_MEMORY;
        }
        let mut digitizer = (status.factory)(&status.config);
        match digitizer.open() {
            Ok(()) => {
                status.digitizer = Some(digitizer);
                status.publish_event("Digitizer recreated");
                states::RESTART_CONFIGURE_DIGITIZER
            }
            Err(err) => {
                status.last_error = format!("digitizer reopen: {err}");
                status.publish_error();
                // Keep retrying; the base period throttles the loop.
                states::RESTART_CREATE_DIGITIZER
            }
        }
    }

    pub fn restart_configure_digitizer(status: &mut SessionStatus) -> State<SessionStatus> {
        let digitizer_config = status.config.digitizer.clone();
        let Some(digitizer) = &mut status.digitizer else {
            return states::RESTART_CREATE_DIGITIZER;
        };
        match digitizer.configure(&digitizer_config) {
            Ok(()) => states::RESTART_ALLOCATE_MEMORY,
            Err(err) => {
                status.last_error = format!("digitizer reconfigure: {err}");
                status.publish_error();
                states::RESTART_DESTROY_DIGITIZER
            }
        }
    }

    pub fn restart_allocate_memory(status: &mut SessionStatus) -> State<SessionStatus> {
        let max = status.config.events_buffer_max_size;
        status.waveforms_buffer = Vec::with_capacity(max + max / 10);
        if status.restart_to_acquisition {
            status.restart_to_acquisition = false;
            states::START_ACQUISITION
        } else {
            states::PUBLISH_STATUS
        }
    }
}

/// Drive the session until its terminal state.
pub fn run(config: SessionConfig, factory: DigitizerFactory, base_period: Duration) -> u32 {
    if let Err(err) = abcd_common::install_signal_handlers() {
        tracing::error!(%err, "unable to install the signal handlers");
    }
    let mut status = SessionStatus::new(config, factory);
    abcd_common::run_machine(&mut status, states::START, states::STOP.id, base_period)
}
